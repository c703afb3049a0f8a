//! Shared fixtures: a local registry server and configs pointing at it.
#![allow(dead_code)]

use std::path::Path;

use axum::{extract::Path as UrlPath, http::StatusCode, routing::get, Router};
use tokio::net::TcpListener;

pub const LISTING_HTML: &str = r#"<!doctype html>
<html><body>
<nav><a href="/components">All components</a></nav>
<main>
  <a href="/components/3d-pin" class="card"><div><h3>3D Pin</h3><p>A gradient pin.</p></div></a>
  <a href="/components/bento-grid" aria-label="Bento Grid"><img src="/bento.png"/></a>
</main>
</body></html>"#;

pub const PIN_UTILS: &str = "import { clsx } from \"clsx\";\nexport function cn(...inputs) {\n  return clsx(inputs);\n}";
pub const PIN_SOURCE: &str = "\"use client\";\nimport { cn } from \"@/lib/utils\";\n\nexport const PinContainer = ({ title }) => <div className={cn(\"pin\")}>{title}</div>;";

pub fn pin_json() -> String {
    serde_json::json!({
        "name": "3d-pin",
        "type": "registry:ui",
        "dependencies": ["motion", "clsx", "tailwind-merge"],
        "files": [
            { "path": "registry/3d-pin.tsx", "target": "components/ui/3d-pin.tsx", "content": PIN_SOURCE },
            { "path": "lib/utils.ts", "content": PIN_UTILS }
        ]
    })
    .to_string()
}

pub fn bento_json() -> String {
    serde_json::json!({
        "name": "bento-grid",
        "files": [
            { "path": "components/ui/bento-grid.tsx", "content": "export const BentoGrid = () => null;" }
        ]
    })
    .to_string()
}

pub const KIT_REGISTRY: &str = r#"{
  "name": "kit",
  "items": [
    {
      "name": "marquee",
      "type": "registry:ui",
      "title": "Marquee",
      "description": "An infinite scrolling component.",
      "dependencies": ["motion"],
      "files": [{ "path": "registry/kit/marquee.tsx", "type": "registry:ui" }]
    },
    {
      "name": "animated-beam",
      "type": "registry:ui",
      "title": "Animated Beam",
      "registryDependencies": ["button"],
      "files": [{ "path": "registry/kit/animated-beam.tsx", "type": "registry:ui" }]
    },
    { "name": "marquee-demo", "type": "registry:example", "files": [] }
  ]
}"#;

async fn payload(UrlPath(file): UrlPath<String>) -> Result<String, StatusCode> {
    match file.as_str() {
        "3d-pin.json" => Ok(pin_json()),
        "bento-grid.json" => Ok(bento_json()),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

/// Starts the fixture registry on an ephemeral port. Returns its base URL.
pub async fn spawn_registry() -> String {
    let app = Router::new()
        .route("/components", get(|| async { LISTING_HTML }))
        .route("/registry/{file}", get(payload))
        .route("/r/registry.json", get(|| async { KIT_REGISTRY }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
    serve(app).await
}

/// Serves `app` on an ephemeral port for the rest of the test.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A config with a reference source `acme` and an inline source `kit`, both
/// served from `base`.
pub fn config_toml(base: &str, store_dir: &Path) -> String {
    format!(
        r#"[store]
dir = '{dir}'

[http]
timeout_secs = 5

[sources.acme]
shape = "reference"
listing_url = '{base}/components'
component_url = '{base}/registry/{{slug}}.json'
page_url = '{base}/components/{{slug}}'

[sources.acme.overrides]
"Ghost Card" = "ghost-card"

[sources.kit]
shape = "inline"
listing_url = '{base}/r/registry.json'
install_command = 'npx shadcn@latest add "{base}/r/{{slug}}"'
"#,
        dir = store_dir.display(),
        base = base
    )
}
