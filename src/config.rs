//! TOML configuration.
//!
//! ```toml
//! [store]
//! dir = "./data/harvest"
//!
//! [server]
//! bind = "127.0.0.1:7341"
//!
//! [http]
//! timeout_secs = 30
//!
//! [sources.aceternity]
//! shape = "reference"
//! listing_url = "https://ui.aceternity.com/components"
//! component_url = "https://ui.aceternity.com/registry/{slug}.json"
//! page_url = "https://ui.aceternity.com/components/{slug}"
//!
//! [sources.aceternity.overrides]
//! "3D Pin" = "3d-pin"
//!
//! [sources.magicui]
//! shape = "inline"
//! listing_url = "https://magicui.design/registry.json"
//! page_url = "https://magicui.design/docs/components/{slug}"
//! install_command = "npx shadcn@latest add \"https://magicui.design/r/{slug}\""
//! ```
//!
//! Every table is optional; omitted tables take the defaults shown above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fetch::validate_slug;
use crate::models::SourceShape;
use crate::normalize::{normalize, CanonicalKey};

/// Placeholder substituted in URL and command templates.
pub const SLUG_PLACEHOLDER: &str = "{slug}";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_sources")]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            index_file: default_index_file(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./data/harvest")
}
fn default_index_file() -> String {
    "index.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("component-harvest/{}", env!("CARGO_PKG_VERSION"))
}

/// One remote registry.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub shape: SourceShape,
    /// HTML listing page (reference) or registry JSON (inline).
    pub listing_url: String,
    /// Per-component payload URL template. Reference sources only.
    #[serde(default)]
    pub component_url: Option<String>,
    /// Human-facing page URL template, recorded as provenance.
    #[serde(default)]
    pub page_url: Option<String>,
    /// CLI installation command template. Required for inline sources.
    #[serde(default)]
    pub install_command: Option<String>,
    /// Display name → slug entries known to be missing from the listing.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl SourceConfig {
    /// Looks up the override table by canonical key.
    pub fn override_slug(&self, key: &CanonicalKey) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(name, _)| normalize(name).is_ok_and(|k| &k == key))
            .map(|(_, slug)| slug.as_str())
    }

    pub fn component_url_for(&self, slug: &str) -> Option<String> {
        self.component_url.as_deref().map(|t| fill_slug(t, slug))
    }

    /// Provenance URL: the page template when configured, else the payload URL,
    /// else the listing itself.
    pub fn page_url_for(&self, slug: &str) -> String {
        self.page_url
            .as_deref()
            .or(self.component_url.as_deref())
            .map(|t| fill_slug(t, slug))
            .unwrap_or_else(|| self.listing_url.clone())
    }

    pub fn install_command_for(&self, slug: &str) -> Option<String> {
        self.install_command.as_deref().map(|t| fill_slug(t, slug))
    }
}

pub fn fill_slug(template: &str, slug: &str) -> String {
    template.replace(SLUG_PLACEHOLDER, slug)
}

fn default_sources() -> BTreeMap<String, SourceConfig> {
    let mut sources = BTreeMap::new();
    sources.insert(
        "aceternity".to_string(),
        SourceConfig {
            shape: SourceShape::Reference,
            listing_url: "https://ui.aceternity.com/components".to_string(),
            component_url: Some("https://ui.aceternity.com/registry/{slug}.json".to_string()),
            page_url: Some("https://ui.aceternity.com/components/{slug}".to_string()),
            install_command: Some(
                "npx shadcn@latest add \"https://ui.aceternity.com/registry/{slug}.json\""
                    .to_string(),
            ),
            overrides: BTreeMap::from([("3D Pin".to_string(), "3d-pin".to_string())]),
        },
    );
    sources.insert(
        "magicui".to_string(),
        SourceConfig {
            shape: SourceShape::Inline,
            listing_url: "https://magicui.design/registry.json".to_string(),
            component_url: None,
            page_url: Some("https://magicui.design/docs/components/{slug}".to_string()),
            install_command: Some(
                "npx shadcn@latest add \"https://magicui.design/r/{slug}\"".to_string(),
            ),
            overrides: BTreeMap::new(),
        },
    );
    sources
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig::default(),
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            sources: default_sources(),
        }
    }

    /// Absolute-or-relative path of the durable index file.
    pub fn index_path(&self) -> PathBuf {
        self.store.dir.join(&self.store.index_file)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    if config.store.index_file.trim().is_empty() {
        anyhow::bail!("store.index_file must not be empty");
    }

    if config.sources.is_empty() {
        anyhow::bail!("at least one [sources.<name>] table is required");
    }

    for (name, source) in &config.sources {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            anyhow::bail!(
                "source name '{}' must be lowercase ASCII letters, digits, or '_'",
                name
            );
        }
        if source.listing_url.trim().is_empty() {
            anyhow::bail!("sources.{}.listing_url must not be empty", name);
        }

        match source.shape {
            SourceShape::Reference => {
                let template = source.component_url.as_deref().unwrap_or("");
                if !template.contains(SLUG_PLACEHOLDER) {
                    anyhow::bail!(
                        "sources.{}.component_url must contain {} for reference sources",
                        name,
                        SLUG_PLACEHOLDER
                    );
                }
            }
            SourceShape::Inline => {
                let template = source.install_command.as_deref().unwrap_or("");
                if !template.contains(SLUG_PLACEHOLDER) {
                    anyhow::bail!(
                        "sources.{}.install_command must contain {} for inline sources",
                        name,
                        SLUG_PLACEHOLDER
                    );
                }
            }
        }

        for (display, slug) in &source.overrides {
            normalize(display)
                .with_context(|| format!("sources.{}.overrides: bad name {:?}", name, display))?;
            validate_slug(slug)
                .with_context(|| format!("sources.{}.overrides.{:?}", name, display))?;
        }
    }

    Ok(())
}
