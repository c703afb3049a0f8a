//! Per-source registry caches.
//!
//! A [`RegistryCache`] maps canonical keys to [`RegistryEntry`] values for one
//! source. It starts empty and is filled by [`RegistryCache::refresh`], which
//! fetches the source's listing and swaps in a complete new snapshot. Readers
//! never observe a half-built map, and a failed refresh leaves the previous
//! snapshot in place (stale but available).
//!
//! # Shapes
//!
//! | Shape | Listing | Entry |
//! |-------|---------|-------|
//! | reference | HTML page, scraped by [`crate::extract`] | [`ComponentRef`] (slug only) |
//! | inline | registry JSON (`items[]`) | [`InlineComponent`] (full metadata) |

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::HarvestError;
use crate::extract::extract_listing;
use crate::fetch::{validate_slug, Fetch};
use crate::models::{ComponentRef, InlineComponent, RegistryEntry, SourceShape};
use crate::normalize::{normalize, CanonicalKey};

#[derive(Debug, Default)]
struct Snapshot {
    entries: BTreeMap<CanonicalKey, RegistryEntry>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// In-memory lookup table for one registry source.
pub struct RegistryCache {
    source: String,
    config: SourceConfig,
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl RegistryCache {
    /// Creates an empty cache. Nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(source: impl Into<String>, config: SourceConfig) -> Self {
        Self {
            source: source.into(),
            config,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn shape(&self) -> SourceShape {
        self.config.shape
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn current(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the whole cache from the remote listing.
    ///
    /// Concurrent refreshes of the same cache are serialized. On any failure
    /// the previous contents are kept and the error is returned for the
    /// caller to report. Returns the number of keys now cached.
    pub async fn refresh(&self, http: &dyn Fetch) -> Result<usize, HarvestError> {
        let _guard = self.refresh_lock.lock().await;

        let body = http.get_text(&self.config.listing_url).await?;
        let entries = match self.config.shape {
            SourceShape::Reference => reference_entries(&self.source, &body),
            SourceShape::Inline => inline_entries(&self.source, &body)?,
        };

        if entries.is_empty() {
            return Err(HarvestError::parse(format!(
                "{} listing at {} yielded no components",
                self.source, self.config.listing_url
            )));
        }

        let count = entries.len();
        let next = Arc::new(Snapshot {
            entries,
            refreshed_at: Some(Utc::now()),
        });
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }

        tracing::info!(source = %self.source, entries = count, "registry cache refreshed");
        Ok(count)
    }

    pub fn lookup(&self, key: &CanonicalKey) -> Option<RegistryEntry> {
        self.current().entries.get(key).cloned()
    }

    /// Cache lookup, falling back to the override table when the cache has
    /// nothing for `key`.
    pub fn resolve(&self, key: &CanonicalKey) -> Option<RegistryEntry> {
        if let Some(entry) = self.lookup(key) {
            return Some(entry);
        }

        let slug = self.config.override_slug(key)?;
        tracing::debug!(source = %self.source, key = %key, slug, "resolved through override table");
        match self.config.shape {
            SourceShape::Reference => {
                let name = self
                    .config
                    .overrides
                    .iter()
                    .find(|(_, s)| s.as_str() == slug)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_else(|| key.to_string());
                Some(RegistryEntry::Reference(ComponentRef {
                    name,
                    slug: slug.to_string(),
                }))
            }
            // Inline records cannot be conjured from a slug; the override only
            // redirects to a cached record.
            SourceShape::Inline => self.find_by_slug(slug),
        }
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<RegistryEntry> {
        self.current()
            .entries
            .values()
            .find(|entry| entry.slug() == slug)
            .cloned()
    }

    /// Every distinct component, in key order. Components cached under
    /// several keys appear once.
    pub fn components(&self) -> Vec<RegistryEntry> {
        let snapshot = self.current();
        let mut seen = std::collections::HashSet::new();
        snapshot
            .entries
            .values()
            .filter(|entry| seen.insert(entry.slug().to_string()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().entries.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.current().refreshed_at
    }
}

fn reference_entries(source: &str, html: &str) -> BTreeMap<CanonicalKey, RegistryEntry> {
    let extraction = extract_listing(html);
    if extraction.skipped > 0 {
        tracing::warn!(source, skipped = extraction.skipped, "listing entries could not be extracted");
    }

    let mut entries = BTreeMap::new();
    for item in extraction.entries {
        let Ok(key) = normalize(&item.name) else {
            continue;
        };
        entries.entry(key).or_insert_with(|| {
            RegistryEntry::Reference(ComponentRef {
                name: item.name,
                slug: item.slug,
            })
        });
    }
    entries
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InlineListing {
    Wrapped { items: Vec<Value> },
    Bare(Vec<Value>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineItem {
    name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    dev_dependencies: Vec<String>,
    #[serde(default)]
    registry_dependencies: Vec<String>,
    #[serde(default)]
    files: Vec<InlineFile>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InlineFile {
    Path(String),
    Entry {
        path: String,
        #[serde(default)]
        target: Option<String>,
    },
}

impl InlineFile {
    fn into_path(self) -> String {
        match self {
            Self::Path(path) => path,
            Self::Entry { path, target } => target.filter(|t| !t.is_empty()).unwrap_or(path),
        }
    }
}

fn inline_entries(
    source: &str,
    body: &str,
) -> Result<BTreeMap<CanonicalKey, RegistryEntry>, HarvestError> {
    let listing: InlineListing = serde_json::from_str(body)
        .map_err(|e| HarvestError::parse(format!("{} registry listing: {}", source, e)))?;
    let items = match listing {
        InlineListing::Wrapped { items } => items,
        InlineListing::Bare(items) => items,
    };

    let mut entries = BTreeMap::new();
    let mut skipped = 0usize;
    for raw in items {
        let item: InlineItem = match serde_json::from_value(raw) {
            Ok(item) => item,
            Err(e) => {
                tracing::debug!(source, error = %e, "skipping malformed registry item");
                skipped += 1;
                continue;
            }
        };
        if item.kind.as_deref().is_some_and(|k| k.ends_with(":example")) {
            continue;
        }
        if validate_slug(&item.name).is_err() {
            skipped += 1;
            continue;
        }

        let display = item
            .title
            .clone()
            .filter(|t| normalize(t).is_ok())
            .unwrap_or_else(|| item.name.clone());
        let mut keys = Vec::new();
        keys.extend(normalize(&display).ok());
        keys.extend(normalize(&item.name).ok());

        let record = RegistryEntry::Inline(InlineComponent {
            name: display,
            slug: item.name,
            description: item.description,
            dependencies: item.dependencies,
            dev_dependencies: item.dev_dependencies,
            registry_dependencies: item.registry_dependencies,
            files: item.files.into_iter().map(InlineFile::into_path).collect(),
        });
        for key in keys {
            entries.entry(key).or_insert_with(|| record.clone());
        }
    }

    if skipped > 0 {
        tracing::warn!(source, skipped, "registry items could not be parsed");
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies; unknown URLs fail with a network error.
    struct CannedFetch {
        bodies: Mutex<HashMap<String, String>>,
    }

    impl CannedFetch {
        fn new() -> Self {
            Self {
                bodies: Mutex::new(HashMap::new()),
            }
        }

        fn serve(&self, url: &str, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
        }

        fn fail(&self, url: &str) {
            self.bodies.lock().unwrap().remove(url);
        }
    }

    #[async_trait]
    impl Fetch for CannedFetch {
        async fn get_text(&self, url: &str) -> Result<String, HarvestError> {
            self.bodies
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| HarvestError::Network(format!("connection refused: {}", url)))
        }
    }

    fn reference_config() -> SourceConfig {
        SourceConfig {
            shape: SourceShape::Reference,
            listing_url: "http://registry.test/components".into(),
            component_url: Some("http://registry.test/r/{slug}.json".into()),
            page_url: None,
            install_command: None,
            overrides: BTreeMap::from([("Magic Pin".to_string(), "magic-pin".to_string())]),
        }
    }

    fn inline_config() -> SourceConfig {
        SourceConfig {
            shape: SourceShape::Inline,
            listing_url: "http://kit.test/registry.json".into(),
            component_url: None,
            page_url: None,
            install_command: Some("npx shadcn@latest add kit/{slug}".into()),
            overrides: BTreeMap::from([("Ticker".to_string(), "marquee".to_string())]),
        }
    }

    const LISTING: &str = r#"
        <a href="/components/3d-pin"><h3>3D Pin</h3></a>
        <a href="/components/bento-grid"><h3>Bento Grid</h3></a>
    "#;

    const REGISTRY: &str = r#"{
        "name": "kit",
        "items": [
            {
                "name": "marquee",
                "type": "registry:ui",
                "title": "Marquee",
                "description": "Infinite scroll",
                "dependencies": ["motion"],
                "files": [{ "path": "registry/kit/marquee.tsx", "type": "registry:ui" }]
            },
            {
                "name": "animated-beam",
                "type": "registry:ui",
                "title": "Animated Beam",
                "registryDependencies": ["button"],
                "files": ["registry/kit/animated-beam.tsx"]
            },
            { "name": "marquee-demo", "type": "registry:example", "files": [] },
            { "title": "no name" }
        ]
    }"#;

    #[tokio::test]
    async fn reference_refresh_and_lookup() {
        let http = CannedFetch::new();
        http.serve("http://registry.test/components", LISTING);
        let cache = RegistryCache::new("acme", reference_config());
        assert!(cache.is_empty());

        let count = cache.refresh(&http).await.unwrap();
        assert_eq!(count, 2);
        assert!(cache.refreshed_at().is_some());

        let entry = cache.lookup(&normalize("3d pin").unwrap()).unwrap();
        assert_eq!(
            entry,
            RegistryEntry::Reference(ComponentRef {
                name: "3D Pin".into(),
                slug: "3d-pin".into()
            })
        );
        assert!(cache.lookup(&normalize("magic pin").unwrap()).is_none());
    }

    #[tokio::test]
    async fn overrides_apply_only_when_cache_misses() {
        let http = CannedFetch::new();
        http.serve(
            "http://registry.test/components",
            r#"<a href="/components/magic-pin-v2"><h3>Magic Pin</h3></a>"#,
        );
        let cache = RegistryCache::new("acme", reference_config());

        // Empty cache: the override answers.
        let key = normalize("magic-pin").unwrap();
        assert_eq!(cache.resolve(&key).unwrap().slug(), "magic-pin");

        // Once the listing has it, the listing wins.
        cache.refresh(&http).await.unwrap();
        assert_eq!(cache.resolve(&key).unwrap().slug(), "magic-pin-v2");

        assert!(cache.resolve(&normalize("nothing").unwrap()).is_none());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_contents() {
        let http = CannedFetch::new();
        http.serve("http://registry.test/components", LISTING);
        let cache = RegistryCache::new("acme", reference_config());
        cache.refresh(&http).await.unwrap();
        let before = cache.components();
        let stamp = cache.refreshed_at();

        http.fail("http://registry.test/components");
        let err = cache.refresh(&http).await.unwrap_err();
        assert!(matches!(err, HarvestError::Network(_)));
        assert_eq!(cache.components(), before);
        assert_eq!(cache.refreshed_at(), stamp);

        // A page that parses to nothing is a failure too.
        http.serve("http://registry.test/components", "<html>redesigned</html>");
        let err = cache.refresh(&http).await.unwrap_err();
        assert!(matches!(err, HarvestError::Parse(_)));
        assert_eq!(cache.components(), before);
    }

    #[tokio::test]
    async fn inline_refresh_indexes_title_and_name() {
        let http = CannedFetch::new();
        http.serve("http://kit.test/registry.json", REGISTRY);
        let cache = RegistryCache::new("kit", inline_config());
        cache.refresh(&http).await.unwrap();

        let by_title = cache.lookup(&normalize("Animated Beam").unwrap()).unwrap();
        let by_name = cache.lookup(&normalize("animated-beam").unwrap()).unwrap();
        assert_eq!(by_title, by_name);

        let RegistryEntry::Inline(record) = by_title else {
            panic!("expected inline entry");
        };
        assert_eq!(record.slug, "animated-beam");
        assert_eq!(record.registry_dependencies, vec!["button"]);
        assert_eq!(record.files, vec!["registry/kit/animated-beam.tsx"]);

        // Examples are not components; listing is de-duplicated by slug.
        let slugs: Vec<_> = cache
            .components()
            .iter()
            .map(|c| c.slug().to_string())
            .collect();
        assert_eq!(slugs, vec!["animated-beam", "marquee"]);
    }

    #[tokio::test]
    async fn inline_override_redirects_to_cached_record() {
        let http = CannedFetch::new();
        http.serve("http://kit.test/registry.json", REGISTRY);
        let cache = RegistryCache::new("kit", inline_config());
        cache.refresh(&http).await.unwrap();

        let entry = cache.resolve(&normalize("ticker").unwrap()).unwrap();
        assert_eq!(entry.slug(), "marquee");
        assert_eq!(entry.display_name(), "Marquee");
    }

    #[tokio::test]
    async fn bare_array_registry_is_accepted() {
        let http = CannedFetch::new();
        http.serve(
            "http://kit.test/registry.json",
            r#"[{ "name": "dock", "files": ["registry/dock.tsx"] }]"#,
        );
        let cache = RegistryCache::new("kit", inline_config());
        assert_eq!(cache.refresh(&http).await.unwrap(), 1);
        assert_eq!(
            cache.lookup(&normalize("Dock").unwrap()).unwrap().slug(),
            "dock"
        );
    }

    #[tokio::test]
    async fn malformed_registry_is_parse_error() {
        let http = CannedFetch::new();
        http.serve("http://kit.test/registry.json", "{ not json");
        let cache = RegistryCache::new("kit", inline_config());
        let err = cache.refresh(&http).await.unwrap_err();
        assert!(matches!(err, HarvestError::Parse(_)));
        assert!(cache.is_empty());
    }
}
