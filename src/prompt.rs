//! Integration prompt synthesis.
//!
//! [`render`] turns an indexed record and (when available) its payload into
//! advisory text that tells an agent how to add the component to a project.
//! It is a pure function: no I/O, no store mutation.
//!
//! The text branches on the record's shape:
//!
//! * **reference**: every file's content is embedded verbatim under its
//!   target path, with a note about the shared `cn` styling helper when the
//!   code or dependencies need it.
//! * **inline**: no authoritative source exists, so the prompt carries the
//!   installation command, the files it will create, and the dependencies
//!   split into registry-internal components and external packages.

use std::fmt::Write;

use crate::models::{FullComponentPayload, IndexedComponentInfo, SourceShape};

/// Packages every target project already has.
const FRAMEWORK_PACKAGES: &[&str] = &["react", "react-dom", "next", "tailwindcss"];

/// Dependencies that imply the `cn` class-merging helper.
const STYLING_PACKAGES: &[&str] = &["clsx", "tailwind-merge"];

const CN_UTILITY: &str = r#"import { clsx, type ClassValue } from "clsx";
import { twMerge } from "tailwind-merge";

export function cn(...inputs: ClassValue[]) {
  return twMerge(clsx(inputs));
}"#;

/// Renders the integration artifact for a harvested component.
pub fn render(info: &IndexedComponentInfo, payload: Option<&FullComponentPayload>) -> String {
    let mut out = String::new();
    header(&mut out, info);

    match payload {
        None => {
            let _ = writeln!(out, "## Warning");
            let _ = writeln!(
                out,
                "The stored payload for this component is missing. Scan it again to \
                 restore file details; the steps below use index metadata only."
            );
            let _ = writeln!(out);
        }
        Some(payload) => match info.shape {
            SourceShape::Reference => reference_body(&mut out, info, payload),
            SourceShape::Inline => inline_body(&mut out, info, payload),
        },
    }

    closing_steps(&mut out, info);
    out
}

fn header(out: &mut String, info: &IndexedComponentInfo) {
    let _ = writeln!(out, "# Integrate {} ({})", info.name, info.source);
    let _ = writeln!(out);
    if let Some(description) = info.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(out, "{}", description.trim());
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "- Slug: `{}`", info.slug);
    let _ = writeln!(out, "- Source: {}", info.source_url);
    let _ = writeln!(out, "- Last scanned: {}", info.last_scanned.to_rfc3339());
    let _ = writeln!(out);
}

fn reference_body(out: &mut String, info: &IndexedComponentInfo, payload: &FullComponentPayload) {
    let deps = merged(&info.dependencies, &payload.dependencies);
    if !deps.is_empty() {
        let _ = writeln!(out, "## Install dependencies");
        let _ = writeln!(out, "```bash");
        let _ = writeln!(out, "npm install {}", deps.join(" "));
        let _ = writeln!(out, "```");
        let _ = writeln!(out);
    }
    let dev = merged(&info.dev_dependencies, &payload.dev_dependencies);
    if !dev.is_empty() {
        let _ = writeln!(out, "```bash");
        let _ = writeln!(out, "npm install -D {}", dev.join(" "));
        let _ = writeln!(out, "```");
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "## Files ({})", payload.files.len());
    let _ = writeln!(out);
    for file in &payload.files {
        let _ = writeln!(out, "### `{}`", file.path);
        let _ = writeln!(out, "```{}", fence_language(&file.path));
        let _ = write!(out, "{}", file.content);
        if !file.content.ends_with('\n') {
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "```");
        let _ = writeln!(out);
    }

    if needs_cn_utility(&deps, payload) {
        let _ = writeln!(out, "## Styling utility");
        let _ = writeln!(
            out,
            "This component uses the `cn` helper. If `@/lib/utils` does not already \
             export it, create `lib/utils.ts`:"
        );
        let _ = writeln!(out, "```ts");
        let _ = writeln!(out, "{}", CN_UTILITY);
        let _ = writeln!(out, "```");
        let _ = writeln!(out);
    }
}

fn inline_body(out: &mut String, info: &IndexedComponentInfo, payload: &FullComponentPayload) {
    let _ = writeln!(out, "## Install");
    match payload.install_command.as_deref() {
        Some(command) => {
            let _ = writeln!(out, "```bash");
            let _ = writeln!(out, "{}", command);
            let _ = writeln!(out, "```");
        }
        None => {
            let _ = writeln!(
                out,
                "No installation command was recorded; add `{}` with the registry's CLI.",
                info.slug
            );
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "The registry does not publish file contents, so none are reproduced here. \
         The command above writes them."
    );
    let _ = writeln!(out);

    if !payload.files.is_empty() {
        let _ = writeln!(out, "## Files created");
        for file in &payload.files {
            let _ = writeln!(out, "- `{}`", file.path);
        }
        let _ = writeln!(out);
    }

    let internal = merged(&info.registry_dependencies, &payload.registry_dependencies);
    if !internal.is_empty() {
        let _ = writeln!(out, "## Registry components");
        let _ = writeln!(
            out,
            "Installed alongside by the registry CLI; make sure they resolve:"
        );
        for name in &internal {
            let _ = writeln!(out, "- `{}`", name);
        }
        let _ = writeln!(out);
    }

    let external = external_packages(info, payload, &internal);
    if !external.is_empty() {
        let _ = writeln!(out, "## External packages");
        let _ = writeln!(out, "```bash");
        let _ = writeln!(out, "npm install {}", external.join(" "));
        let _ = writeln!(out, "```");
        let _ = writeln!(out);
    }
}

fn closing_steps(out: &mut String, info: &IndexedComponentInfo) {
    let _ = writeln!(out, "## Integration steps");
    let _ = writeln!(
        out,
        "1. Add the files above to the project, keeping their paths relative to the components root."
    );
    let _ = writeln!(out, "2. Install the listed dependencies.");
    let _ = writeln!(
        out,
        "3. Import `{}` where it is needed and adapt props, copy, and styling to the surrounding UI.",
        info.name
    );
}

/// Dependencies from `dependencies` and `devDependencies` that are neither
/// registry components nor provided by the framework.
fn external_packages(
    info: &IndexedComponentInfo,
    payload: &FullComponentPayload,
    internal: &[String],
) -> Vec<String> {
    let declared = merged(
        &merged(&info.dependencies, &payload.dependencies),
        &merged(&info.dev_dependencies, &payload.dev_dependencies),
    );
    declared
        .into_iter()
        .filter(|dep| !internal.contains(dep))
        .filter(|dep| !FRAMEWORK_PACKAGES.contains(&package_name(dep)))
        .collect()
}

/// Strips a version specifier: `motion@11` → `motion`, `@scope/pkg@1` → `@scope/pkg`.
fn package_name(dep: &str) -> &str {
    let search_from = usize::from(dep.starts_with('@'));
    match dep[search_from..].find('@') {
        Some(i) => &dep[..search_from + i],
        None => dep,
    }
}

fn needs_cn_utility(deps: &[String], payload: &FullComponentPayload) -> bool {
    deps.iter()
        .any(|d| STYLING_PACKAGES.contains(&package_name(d)))
        || payload
            .files
            .iter()
            .any(|f| f.content.contains("cn(") || f.content.contains("@/lib/utils"))
}

/// Order-preserving union.
fn merged(a: &[String], b: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for item in a.iter().chain(b) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

fn fence_language(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("tsx") => "tsx",
        Some("ts") => "ts",
        Some("jsx") => "jsx",
        Some("js") | Some("mjs") => "js",
        Some("css") => "css",
        Some("json") => "json",
        _ => "",
    }
}
