//! Core data models shared by the registry caches, the index store, and the
//! prompt synthesizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a registry exposes its components. Fixed per source for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceShape {
    /// Lightweight listing plus a per-component fetch for full content.
    Reference,
    /// Full metadata in the listing, no further fetchable detail.
    Inline,
}

impl SourceShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Inline => "inline",
        }
    }
}

/// A cached registry entry, tagged by the shape of its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RegistryEntry {
    Reference(ComponentRef),
    Inline(InlineComponent),
}

impl RegistryEntry {
    pub fn slug(&self) -> &str {
        match self {
            Self::Reference(r) => &r.slug,
            Self::Inline(c) => &c.slug,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Reference(r) => &r.name,
            Self::Inline(c) => &c.name,
        }
    }
}

/// Reference-shape entry: just enough to fetch the payload later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentRef {
    pub name: String,
    pub slug: String,
}

/// Inline-shape entry: the full metadata record from the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineComponent {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub dependencies: Vec<String>,
    pub dev_dependencies: Vec<String>,
    pub registry_dependencies: Vec<String>,
    pub files: Vec<String>,
}

/// Durable, source-qualified summary of a harvested component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedComponentInfo {
    pub name: String,
    pub source: String,
    pub shape: SourceShape,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Payload path relative to the store directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub source_url: String,
    pub last_scanned: DateTime<Utc>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub dev_dependencies: Vec<String>,
    #[serde(default)]
    pub registry_dependencies: Vec<String>,
}

/// One file a component installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFile {
    /// Path the file should be written to in the target project.
    pub path: String,
    pub content: String,
}

/// The rich artifact referenced by [`IndexedComponentInfo::file_path`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullComponentPayload {
    pub name: String,
    pub files: Vec<PayloadFile>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub dev_dependencies: Vec<String>,
    #[serde(default)]
    pub registry_dependencies: Vec<String>,
    /// Set on locally synthesized payloads whose file contents are placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
}

/// Which part of the index a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFilter {
    All,
    Source(String),
}

impl SourceFilter {
    /// Parses `"all"` (or nothing) as [`SourceFilter::All`], anything else as a source name.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Self::All,
            Some(source) => Self::Source(source.to_string()),
        }
    }

    pub fn matches(&self, source: &str) -> bool {
        match self {
            Self::All => true,
            Self::Source(s) => s == source,
        }
    }
}
