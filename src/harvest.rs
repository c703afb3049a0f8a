//! The harvesting pipeline.
//!
//! [`Harvester`] owns the explicit lifecycle of every piece of mutable state:
//!
//! ```text
//! Harvester::new()        construct: empty caches, empty index mirror
//!   └─ start()            load the index, refresh every registry concurrently
//!        ├─ scan()        name → key → cache/override → fetch|synthesize → payload file → index
//!        ├─ list_*()      served from memory
//!        └─ prompt()      index record + payload file → integration text
//! ```
//!
//! Requests are processed one at a time by the transports; the index store
//! serializes its own writers regardless.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::error::HarvestError;
use crate::fetch::{fetch_component, slug_from_url, synthesize_payload, Fetch};
use crate::models::{
    ComponentRef, IndexedComponentInfo, RegistryEntry, SourceFilter, SourceShape,
};
use crate::normalize::{normalize, CanonicalKey};
use crate::prompt;
use crate::registry::RegistryCache;
use crate::store::IndexStore;

/// What a successful scan persisted.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub id: String,
    pub info: IndexedComponentInfo,
    /// Absolute location of the payload file.
    pub payload_path: std::path::PathBuf,
    /// True when file contents are locally synthesized placeholders.
    pub placeholder_content: bool,
}

impl ScanOutcome {
    /// Human-readable result, flagging placeholder content explicitly.
    pub fn message(&self) -> String {
        let mut msg = format!(
            "Harvested {} from {} (slug `{}`) to {}",
            self.info.name,
            self.info.source,
            self.info.slug,
            self.payload_path.display()
        );
        if self.placeholder_content {
            msg.push_str(
                ". File contents are placeholders; the registry only publishes metadata, \
                 so use the installation command in the component prompt.",
            );
        }
        msg
    }
}

/// Result of refreshing one registry at startup or on demand.
#[derive(Debug)]
pub struct RefreshReport {
    pub source: String,
    pub result: Result<usize, HarvestError>,
}

/// Registry caches, index store, and the HTTP boundary, wired together.
pub struct Harvester {
    config: Arc<Config>,
    http: Arc<dyn Fetch>,
    caches: BTreeMap<String, Arc<RegistryCache>>,
    store: Arc<IndexStore>,
}

impl Harvester {
    pub fn new(config: Arc<Config>, http: Arc<dyn Fetch>) -> Self {
        let caches = config
            .sources
            .iter()
            .map(|(name, source)| {
                (
                    name.clone(),
                    Arc::new(RegistryCache::new(name.clone(), source.clone())),
                )
            })
            .collect();
        let store = Arc::new(IndexStore::from_config(&config.store));
        Self {
            config,
            http,
            caches,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn caches(&self) -> impl Iterator<Item = &Arc<RegistryCache>> {
        self.caches.values()
    }

    pub fn cache(&self, source: &str) -> Result<&Arc<RegistryCache>, HarvestError> {
        self.caches.get(source).ok_or_else(|| {
            HarvestError::invalid(format!(
                "unknown source '{}' (configured: {})",
                source,
                self.caches.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Loads the index and refreshes every registry. Never fails: refresh
    /// errors are logged and leave that cache empty.
    pub async fn start(&self) -> Vec<RefreshReport> {
        self.store.load();
        self.refresh_all().await
    }

    /// Refreshes all registries concurrently and waits for every one.
    pub async fn refresh_all(&self) -> Vec<RefreshReport> {
        let mut tasks = JoinSet::new();
        for (name, cache) in &self.caches {
            let name = name.clone();
            let cache = Arc::clone(cache);
            let http = Arc::clone(&self.http);
            tasks.spawn(async move {
                let result = cache.refresh(http.as_ref()).await;
                RefreshReport {
                    source: name,
                    result,
                }
            });
        }

        let mut reports = Vec::with_capacity(self.caches.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if let Err(e) = &report.result {
                        tracing::warn!(source = %report.source, error = %e, "registry refresh failed");
                    }
                    reports.push(report);
                }
                Err(e) => tracing::warn!(error = %e, "registry refresh task aborted"),
            }
        }
        reports.sort_by(|a, b| a.source.cmp(&b.source));
        reports
    }

    /// Refreshes a single registry on demand.
    pub async fn refresh(&self, source: &str) -> Result<usize, HarvestError> {
        let cache = self.cache(source)?;
        cache.refresh(self.http.as_ref()).await
    }

    /// Resolves `name` against `source`, materializes its payload, and
    /// records it in the index.
    pub async fn scan(
        &self,
        source: &str,
        name: &str,
        component_url: Option<&str>,
    ) -> Result<ScanOutcome, HarvestError> {
        let cache = self.cache(source)?;
        let key = normalize(name)?;
        let component_url = component_url.map(str::trim).filter(|u| !u.is_empty());

        let entry = match cache.resolve(&key) {
            Some(entry) => entry,
            None => self.entry_from_url(cache, name, &key, component_url)?,
        };
        tracing::info!(source, key = %key, slug = entry.slug(), "scanning component");

        let source_config = cache.config();
        let (payload, description, placeholder) = match &entry {
            RegistryEntry::Reference(reference) => {
                let url = source_config.component_url_for(&reference.slug).ok_or_else(|| {
                    HarvestError::invalid(format!("source '{}' has no component_url", source))
                })?;
                let payload = fetch_component(self.http.as_ref(), &url, &reference.slug).await?;
                (payload, None, false)
            }
            RegistryEntry::Inline(record) => {
                let command = source_config.install_command_for(&record.slug).ok_or_else(|| {
                    HarvestError::invalid(format!("source '{}' has no install_command", source))
                })?;
                (
                    synthesize_payload(record, &command),
                    record.description.clone(),
                    true,
                )
            }
        };

        let relative = IndexStore::payload_relative(source, entry.slug())?;
        let source_url = match (&entry, component_url) {
            (RegistryEntry::Reference(_), Some(url)) => url.to_string(),
            _ => source_config.page_url_for(entry.slug()),
        };

        // Aliases and spellings of one component share a single record.
        let key = identity_key(&entry, key);
        let info = IndexedComponentInfo {
            name: entry.display_name().to_string(),
            source: source.to_string(),
            shape: cache.shape(),
            slug: entry.slug().to_string(),
            description,
            file_path: Some(relative.clone()),
            source_url,
            last_scanned: Utc::now(),
            dependencies: payload.dependencies.clone(),
            dev_dependencies: payload.dev_dependencies.clone(),
            registry_dependencies: payload.registry_dependencies.clone(),
        };

        let store = Arc::clone(&self.store);
        let (owned_source, owned_key, record) = (source.to_string(), key.clone(), info.clone());
        tokio::task::spawn_blocking(move || {
            store.commit(&owned_source, &owned_key, &payload, record)
        })
        .await
        .map_err(|e| {
            HarvestError::storage("commit", self.store.index_path(), std::io::Error::other(e))
        })??;

        Ok(ScanOutcome {
            id: crate::store::index_id(source, &key),
            info,
            payload_path: self.store.dir().join(relative),
            placeholder_content: placeholder,
        })
    }

    /// Last-resort resolution through a caller-supplied component URL.
    fn entry_from_url(
        &self,
        cache: &RegistryCache,
        name: &str,
        key: &CanonicalKey,
        component_url: Option<&str>,
    ) -> Result<RegistryEntry, HarvestError> {
        let not_found = || {
            HarvestError::not_found(format!(
                "'{}' ({}) is not in the {} registry; pass componentURL to scan it anyway",
                name,
                key,
                cache.source()
            ))
        };
        let url = component_url.ok_or_else(not_found)?;
        let slug = slug_from_url(url)?;

        match cache.shape() {
            SourceShape::Reference => Ok(RegistryEntry::Reference(ComponentRef {
                name: name.trim().to_string(),
                slug,
            })),
            SourceShape::Inline => cache.find_by_slug(&slug).ok_or_else(not_found),
        }
    }

    /// Indexed records, filtered by source.
    pub fn list_harvested(
        &self,
        filter: &SourceFilter,
    ) -> Result<Vec<(String, IndexedComponentInfo)>, HarvestError> {
        if let SourceFilter::Source(source) = filter {
            self.cache(source)?;
        }
        Ok(self.store.list(filter))
    }

    /// Components straight from a metadata-only registry cache.
    pub fn list_registry(&self, source: &str) -> Result<Vec<RegistryEntry>, HarvestError> {
        let cache = self.cache(source)?;
        if cache.shape() != SourceShape::Inline {
            return Err(HarvestError::invalid(format!(
                "source '{}' does not publish metadata listings",
                source
            )));
        }
        Ok(cache.components())
    }

    /// Renders the integration prompt for a harvested component.
    pub fn prompt(&self, source: &str, name: &str) -> Result<String, HarvestError> {
        let cache = self.cache(source)?;
        let key = normalize(name)?;
        let found = self.store.lookup(source, &key).or_else(|| {
            let entry = cache.resolve(&key)?;
            self.store.lookup(source, &identity_key(&entry, key.clone()))
        });
        let info = found.ok_or_else(|| {
            HarvestError::not_found(format!(
                "'{}' has not been scanned from {} yet; run scan_{}_component first",
                name, source, source
            ))
        })?;

        let payload = match info.file_path.as_deref() {
            Some(path) => {
                let payload = self.store.read_payload(path)?;
                if payload.is_none() {
                    tracing::warn!(source, key = %key, path, "payload file missing");
                }
                payload
            }
            None => None,
        };

        Ok(prompt::render(&info, payload.as_ref()))
    }
}

/// Index key for a resolved entry: the key of its registry name, so that
/// overrides and alternate spellings land on one record. Falls back to the
/// requested key when the registry name does not normalize.
fn identity_key(entry: &RegistryEntry, requested: CanonicalKey) -> CanonicalKey {
    normalize(entry.display_name()).unwrap_or(requested)
}

/// Formats harvested records the way the listing tools and CLI print them.
pub fn format_harvested(records: &[(String, IndexedComponentInfo)]) -> String {
    if records.is_empty() {
        return "No harvested components.\n".to_string();
    }
    let mut out = format!("{} harvested component(s):\n", records.len());
    for (id, info) in records {
        out.push_str(&format!(
            "- {}: {} [{}] scanned {}{}\n",
            id,
            info.name,
            info.shape.as_str(),
            info.last_scanned.format("%Y-%m-%d %H:%M UTC"),
            info.file_path
                .as_deref()
                .map(|p| format!(", payload {}", p))
                .unwrap_or_default()
        ));
    }
    out
}

/// Formats a registry listing.
pub fn format_registry(source: &str, entries: &[RegistryEntry]) -> String {
    if entries.is_empty() {
        return format!(
            "The {} registry cache is empty (the listing could not be fetched).\n",
            source
        );
    }
    let mut out = format!("{} component(s) in {}:\n", entries.len(), source);
    for entry in entries {
        match entry {
            RegistryEntry::Inline(record) => {
                out.push_str(&format!("- {} (`{}`)", record.name, record.slug));
                if let Some(description) = record.description.as_deref() {
                    out.push_str(&format!(": {}", description));
                }
                out.push('\n');
            }
            RegistryEntry::Reference(reference) => {
                out.push_str(&format!("- {} (`{}`)\n", reference.name, reference.slug));
            }
        }
    }
    out
}
