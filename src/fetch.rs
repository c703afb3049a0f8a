//! Remote retrieval and per-component payloads.
//!
//! [`Fetch`] is the HTTP boundary: registry caches and the component fetcher
//! only ever ask it for the body of a URL. [`HttpFetcher`] is the `reqwest`
//! implementation; tests substitute an in-memory one.
//!
//! Reference-shape sources resolve a slug to a shadcn-style registry item
//! with full file contents ([`fetch_component`]). Inline-shape sources have
//! nothing more to fetch, so their payload is synthesized from the cached
//! record with placeholder contents ([`synthesize_payload`]).
//!
//! There is no retry here. A single attempt is made per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::HttpConfig;
use crate::error::HarvestError;
use crate::models::{FullComponentPayload, InlineComponent, PayloadFile};

/// Retrieves the body of a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fails with `NotFound` for a 404, `Network` for any other failure.
    async fn get_text(&self, url: &str) -> Result<String, HarvestError>;
}

/// [`Fetch`] over a shared `reqwest` client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get_text(&self, url: &str) -> Result<String, HarvestError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(HarvestError::not_found(format!("{} returned 404", url)));
        }
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{} returned {}", url, status)));
        }

        Ok(response.text().await?)
    }
}

/// Rejects slugs that are unsafe to splice into URLs and file paths.
pub fn validate_slug(slug: &str) -> Result<(), HarvestError> {
    let ok = !slug.is_empty()
        && !slug.starts_with('.')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(HarvestError::invalid(format!("unsafe component slug: {:?}", slug)))
    }
}

/// Derives a slug from a caller-supplied component URL: the last non-empty
/// path segment, minus a `.json` suffix, query, and fragment.
pub fn slug_from_url(url: &str) -> Result<String, HarvestError> {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim();
    let slug = segment.strip_suffix(".json").unwrap_or(segment);
    validate_slug(slug)
        .map_err(|_| HarvestError::invalid(format!("cannot derive a component slug from {:?}", url)))?;
    Ok(slug.to_string())
}

// Shape of a shadcn-style registry item. Only the fields we persist.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryItem {
    #[serde(default)]
    name: Option<String>,
    files: Vec<RegistryItemFile>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    dev_dependencies: Vec<String>,
    #[serde(default)]
    registry_dependencies: Vec<String>,
}

#[derive(Deserialize)]
struct RegistryItemFile {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    target: Option<String>,
    content: String,
}

/// Parses a per-component payload body.
pub fn parse_payload(slug: &str, body: &str) -> Result<FullComponentPayload, HarvestError> {
    let item: RegistryItem = serde_json::from_str(body)
        .map_err(|e| HarvestError::parse(format!("component {}: {}", slug, e)))?;

    let mut files = Vec::with_capacity(item.files.len());
    for (i, file) in item.files.into_iter().enumerate() {
        let path = file
            .target
            .filter(|t| !t.trim().is_empty())
            .or(file.path)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                HarvestError::parse(format!("component {}: file #{} has no path", slug, i))
            })?;
        files.push(PayloadFile {
            path,
            content: file.content,
        });
    }

    Ok(FullComponentPayload {
        name: item.name.unwrap_or_else(|| slug.to_string()),
        files,
        dependencies: item.dependencies,
        dev_dependencies: item.dev_dependencies,
        registry_dependencies: item.registry_dependencies,
        install_command: None,
    })
}

/// Fetches and parses the authoritative payload for a reference-shape slug.
pub async fn fetch_component(
    http: &dyn Fetch,
    url: &str,
    slug: &str,
) -> Result<FullComponentPayload, HarvestError> {
    validate_slug(slug)?;
    tracing::debug!(slug, url, "fetching component payload");
    let body = http.get_text(url).await.map_err(|e| match e {
        HarvestError::NotFound(_) => {
            HarvestError::not_found(format!("component '{}' does not exist at {}", slug, url))
        }
        other => other,
    })?;
    parse_payload(slug, &body)
}

/// Builds the local stand-in payload for an inline-shape component.
pub fn synthesize_payload(record: &InlineComponent, install_command: &str) -> FullComponentPayload {
    let files = record
        .files
        .iter()
        .map(|path| PayloadFile {
            path: path.clone(),
            content: placeholder_content(path, install_command),
        })
        .collect();

    FullComponentPayload {
        name: record.slug.clone(),
        files,
        dependencies: record.dependencies.clone(),
        dev_dependencies: record.dev_dependencies.clone(),
        registry_dependencies: record.registry_dependencies.clone(),
        install_command: Some(install_command.to_string()),
    }
}

fn placeholder_content(path: &str, install_command: &str) -> String {
    format!(
        "// Source for {} is not published in the registry listing.\n\
         // Retrieve it by running:\n\
         //   {}\n",
        path, install_command
    )
}
