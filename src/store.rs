//! Durable index of harvested components.
//!
//! The index is one JSON file mapping `"<source>:<key>"` to an
//! [`IndexedComponentInfo`], plus one payload file per component at
//! `<source>/<slug>.json`. [`IndexStore`] keeps an in-memory mirror of the
//! index that serves every read; only mutations touch the disk.
//!
//! # Consistency
//!
//! * [`IndexStore::load`] never fails. A missing or corrupt file starts an
//!   empty mirror with a warning.
//! * [`IndexStore::upsert`] holds an exclusive lock on `index.lock` for the
//!   whole read-merge-write, merges into what is on disk *now* (so external
//!   edits survive), writes through a temp file and rename, and only then
//!   replaces the mirror with exactly what was written. If any step fails the
//!   mirror is untouched.
//! * [`IndexStore::commit`] writes a payload file and its index record under
//!   the same lock. A failed index write puts the previous payload back.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use fs4::FileExt;

use crate::config::StoreConfig;
use crate::error::HarvestError;
use crate::fetch::validate_slug;
use crate::models::{FullComponentPayload, IndexedComponentInfo, SourceFilter};
use crate::normalize::CanonicalKey;

const LOCK_FILE: &str = "index.lock";

type IndexMap = BTreeMap<String, IndexedComponentInfo>;

/// Index identity of a component: `"<source>:<key>"`.
pub fn index_id(source: &str, key: &CanonicalKey) -> String {
    format!("{}:{}", source, key)
}

/// Durable index file plus its in-memory mirror.
pub struct IndexStore {
    dir: PathBuf,
    index_path: PathBuf,
    mirror: RwLock<IndexMap>,
    write_lock: Mutex<()>,
}

impl IndexStore {
    /// Creates a store with an empty mirror. Call [`load`](Self::load) once
    /// at startup to read the durable file.
    pub fn new(dir: impl Into<PathBuf>, index_file: &str) -> Self {
        let dir = dir.into();
        Self {
            index_path: dir.join(index_file),
            dir,
            mirror: RwLock::new(IndexMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.dir, &config.index_file)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Reads the durable file into the mirror. Returns the number of records.
    pub fn load(&self) -> usize {
        let map = match read_index(&self.index_path) {
            Ok(IndexFile::Loaded(map)) => map,
            Ok(IndexFile::Missing) => {
                tracing::warn!(path = %self.index_path.display(), "index file not found, starting empty");
                IndexMap::new()
            }
            Ok(IndexFile::Corrupt(reason)) => {
                tracing::warn!(path = %self.index_path.display(), %reason, "index file is corrupt, starting empty");
                IndexMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %self.index_path.display(), error = %e, "index file unreadable, starting empty");
                IndexMap::new()
            }
        };

        let count = map.len();
        *self.mirror.write().unwrap_or_else(PoisonError::into_inner) = map;
        tracing::info!(records = count, "index loaded");
        count
    }

    /// Writes `record` under `(source, key)` to disk and the mirror.
    ///
    /// The record replaces any previous one wholesale. On error the mirror is
    /// left exactly as it was before the call.
    pub fn upsert(
        &self,
        source: &str,
        key: &CanonicalKey,
        record: IndexedComponentInfo,
    ) -> Result<(), HarvestError> {
        check_source(source, &record)?;
        let _serial = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = IndexLock::acquire(&self.dir.join(LOCK_FILE))?;
        self.merge_locked(source, key, record)
    }

    /// Writes the payload for `record` and then upserts `record`, as one unit.
    ///
    /// Both happen under the index lock. If the index write fails, the
    /// payload file is put back the way it was (or removed if it did not
    /// exist), so a failed call leaves neither half behind. Returns the
    /// payload path relative to the store directory.
    pub fn commit(
        &self,
        source: &str,
        key: &CanonicalKey,
        payload: &FullComponentPayload,
        record: IndexedComponentInfo,
    ) -> Result<String, HarvestError> {
        check_source(source, &record)?;
        let relative = Self::payload_relative(source, &record.slug)?;
        let path = self.dir.join(&relative);

        let _serial = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = IndexLock::acquire(&self.dir.join(LOCK_FILE))?;

        let previous = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(HarvestError::storage("read", &path, e)),
        };
        write_payload_file(&path, payload)?;

        if let Err(e) = self.merge_locked(source, key, record) {
            let restored = match &previous {
                Some(bytes) => write_atomic(&path, bytes),
                None => fs::remove_file(&path).map_err(|io| HarvestError::storage("remove", &path, io)),
            };
            if let Err(restore) = restored {
                tracing::error!(path = %path.display(), error = %restore, "could not restore payload after failed index write");
            }
            return Err(e);
        }
        Ok(relative)
    }

    /// Read-merge-write of one record. Caller holds both locks.
    fn merge_locked(
        &self,
        source: &str,
        key: &CanonicalKey,
        record: IndexedComponentInfo,
    ) -> Result<(), HarvestError> {
        let id = index_id(source, key);

        let mut merged = match read_index(&self.index_path)? {
            IndexFile::Loaded(map) => map,
            IndexFile::Missing => IndexMap::new(),
            IndexFile::Corrupt(reason) => {
                tracing::warn!(path = %self.index_path.display(), %reason, "replacing corrupt index with in-memory copy");
                self.snapshot()
            }
        };
        merged.insert(id.clone(), record);

        let bytes = serde_json::to_vec_pretty(&merged).map_err(|e| {
            HarvestError::storage("serialize", &self.index_path, std::io::Error::other(e))
        })?;
        write_atomic(&self.index_path, &bytes)?;

        let total = merged.len();
        *self.mirror.write().unwrap_or_else(PoisonError::into_inner) = merged;
        tracing::info!(id = %id, records = total, "index updated");
        Ok(())
    }

    /// Mirror-only lookup.
    pub fn lookup(&self, source: &str, key: &CanonicalKey) -> Option<IndexedComponentInfo> {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&index_id(source, key))
            .cloned()
    }

    /// Records matching `filter`, as `(id, record)` pairs in id order.
    pub fn list(&self, filter: &SourceFilter) -> Vec<(String, IndexedComponentInfo)> {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, info)| filter.matches(&info.source))
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.mirror.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> IndexMap {
        self.mirror
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store-relative payload location for `(source, slug)`.
    pub fn payload_relative(source: &str, slug: &str) -> Result<String, HarvestError> {
        validate_slug(source)?;
        validate_slug(slug)?;
        Ok(format!("{}/{}.json", source, slug))
    }

    /// Persists a payload at `<source>/<slug>.json` without touching the
    /// index. Returns the path relative to the store directory.
    pub fn write_payload(
        &self,
        source: &str,
        slug: &str,
        payload: &FullComponentPayload,
    ) -> Result<String, HarvestError> {
        let relative = Self::payload_relative(source, slug)?;
        let path = self.dir.join(&relative);

        let _serial = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = IndexLock::acquire(&self.dir.join(LOCK_FILE))?;
        write_payload_file(&path, payload)?;
        Ok(relative)
    }

    /// Reads a payload by its store-relative path. `Ok(None)` if it is gone.
    pub fn read_payload(
        &self,
        relative: &str,
    ) -> Result<Option<FullComponentPayload>, HarvestError> {
        let rel = Path::new(relative);
        if !rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(HarvestError::invalid(format!(
                "payload path must stay inside the store: {:?}",
                relative
            )));
        }

        let path = self.dir.join(rel);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarvestError::storage("read", &path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| HarvestError::parse(format!("payload {}: {}", path.display(), e)))
    }
}

fn check_source(source: &str, record: &IndexedComponentInfo) -> Result<(), HarvestError> {
    if record.source != source {
        return Err(HarvestError::invalid(format!(
            "record source '{}' does not match '{}'",
            record.source, source
        )));
    }
    Ok(())
}

enum IndexFile {
    Missing,
    Loaded(IndexMap),
    Corrupt(String),
}

fn read_index(path: &Path) -> Result<IndexFile, HarvestError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexFile::Missing),
        Err(e) => return Err(HarvestError::storage("read", path, e)),
    };
    if content.trim().is_empty() {
        return Ok(IndexFile::Loaded(IndexMap::new()));
    }
    Ok(match serde_json::from_str(&content) {
        Ok(map) => IndexFile::Loaded(map),
        Err(e) => IndexFile::Corrupt(e.to_string()),
    })
}

fn write_payload_file(path: &Path, payload: &FullComponentPayload) -> Result<(), HarvestError> {
    let bytes = serde_json::to_vec_pretty(payload)
        .map_err(|e| HarvestError::storage("serialize", path, std::io::Error::other(e)))?;
    write_atomic(path, &bytes)?;
    tracing::debug!(path = %path.display(), files = payload.files.len(), "payload written");
    Ok(())
}

/// Writes through a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), HarvestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| HarvestError::storage("create", parent, e))?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, bytes).map_err(|e| HarvestError::storage("write", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        HarvestError::storage("replace", path, e)
    })
}

/// Exclusive advisory lock on the index, released on drop.
struct IndexLock {
    file: File,
}

impl IndexLock {
    fn acquire(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| HarvestError::storage("create", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| HarvestError::storage("open", path, e))?;
        file.lock_exclusive()
            .map_err(|e| HarvestError::storage("lock", path, e))?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PayloadFile, SourceShape};
    use crate::normalize::normalize;
    use chrono::{TimeZone, Utc};

    fn record(source: &str, name: &str, slug: &str) -> IndexedComponentInfo {
        IndexedComponentInfo {
            name: name.to_string(),
            source: source.to_string(),
            shape: SourceShape::Reference,
            slug: slug.to_string(),
            description: Some(format!("{} component", name)),
            file_path: Some(format!("{}/{}.json", source, slug)),
            source_url: format!("https://example.test/{}", slug),
            last_scanned: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            dependencies: vec!["motion".into()],
            dev_dependencies: vec![],
            registry_dependencies: vec![],
        }
    }

    fn key(s: &str) -> CanonicalKey {
        normalize(s).unwrap()
    }

    #[test]
    fn upsert_then_lookup_returns_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let rec = record("acme", "3D Pin", "3d-pin");

        store.upsert("acme", &key("3D Pin"), rec.clone()).unwrap();
        assert_eq!(store.lookup("acme", &key("3d pin")), Some(rec));
        assert_eq!(store.lookup("other", &key("3d pin")), None);
    }

    #[test]
    fn survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record("acme", "Bento Grid", "bento-grid");
        {
            let store = IndexStore::new(dir.path(), "index.json");
            store.load();
            store.upsert("acme", &key("Bento Grid"), rec.clone()).unwrap();
        }

        let restarted = IndexStore::new(dir.path(), "index.json");
        assert_eq!(restarted.load(), 1);
        assert_eq!(restarted.lookup("acme", &key("bento-grid")), Some(rec));

        let raw = fs::read_to_string(dir.path().join("index.json")).unwrap();
        assert!(raw.contains("\"acme:BentoGrid\""));
        assert!(raw.contains("\"lastScanned\""));
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path().join("nested"), "index.json");
        assert_eq!(store.load(), 0);

        fs::write(dir.path().join("index.json"), "{ this is not json").unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        assert_eq!(store.load(), 0);
        assert!(store.is_empty());

        // The next upsert repairs the file.
        store
            .upsert("acme", &key("Lamp"), record("acme", "Lamp", "lamp"))
            .unwrap();
        let repaired = IndexStore::new(dir.path(), "index.json");
        assert_eq!(repaired.load(), 1);
    }

    #[test]
    fn failed_write_rolls_back_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let first = record("acme", "Lamp", "lamp");
        store.upsert("acme", &key("Lamp"), first.clone()).unwrap();

        // A directory squatting on the temp path makes the write fail.
        fs::create_dir(dir.path().join("index.json.tmp")).unwrap();

        let mut changed = first.clone();
        changed.description = Some("changed".into());
        let err = store
            .upsert("acme", &key("Lamp"), changed)
            .unwrap_err();
        assert!(matches!(err, HarvestError::Storage { .. }));

        let err = store
            .upsert("acme", &key("Sparkles"), record("acme", "Sparkles", "sparkles"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::Storage { .. }));

        assert_eq!(store.lookup("acme", &key("Lamp")), Some(first));
        assert_eq!(store.lookup("acme", &key("Sparkles")), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn merges_external_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        store.load();
        store
            .upsert("acme", &key("Lamp"), record("acme", "Lamp", "lamp"))
            .unwrap();

        // Another writer adds a record behind our back.
        let mut on_disk: IndexMap =
            serde_json::from_str(&fs::read_to_string(store.index_path()).unwrap()).unwrap();
        on_disk.insert(
            "kit:Marquee".into(),
            record("kit", "Marquee", "marquee"),
        );
        fs::write(store.index_path(), serde_json::to_vec(&on_disk).unwrap()).unwrap();

        store
            .upsert("acme", &key("Sparkles"), record("acme", "Sparkles", "sparkles"))
            .unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.lookup("kit", &key("Marquee")).is_some());
        let reloaded = IndexStore::new(dir.path(), "index.json");
        assert_eq!(reloaded.load(), 3);
    }

    #[test]
    fn repeated_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let rec = record("acme", "Lamp", "lamp");
        store.upsert("acme", &key("Lamp"), rec.clone()).unwrap();
        let once = fs::read(store.index_path()).unwrap();
        store.upsert("acme", &key("Lamp"), rec.clone()).unwrap();
        let twice = fs::read(store.index_path()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn list_filters_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        store.upsert("acme", &key("Lamp"), record("acme", "Lamp", "lamp")).unwrap();
        store.upsert("acme", &key("Pin"), record("acme", "Pin", "pin")).unwrap();
        store.upsert("kit", &key("Dock"), record("kit", "Dock", "dock")).unwrap();

        let all = store.list(&SourceFilter::All);
        let acme = store.list(&SourceFilter::Source("acme".into()));
        let kit = store.list(&SourceFilter::Source("kit".into()));
        assert_eq!(all.len(), 3);
        assert_eq!(acme.len(), 2);
        assert_eq!(kit.len(), 1);

        let mut union: Vec<_> = acme.into_iter().chain(kit).map(|(id, _)| id).collect();
        union.sort();
        let all_ids: Vec<_> = all.into_iter().map(|(id, _)| id).collect();
        assert_eq!(union, all_ids);
    }

    #[test]
    fn rejects_mismatched_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let err = store
            .upsert("kit", &key("Lamp"), record("acme", "Lamp", "lamp"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidInput(_)));
        assert!(!store.index_path().exists());
    }

    #[test]
    fn lock_is_released_after_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        store.upsert("acme", &key("Lamp"), record("acme", "Lamp", "lamp")).unwrap();

        let lock = File::open(dir.path().join(LOCK_FILE)).unwrap();
        lock.try_lock_exclusive().unwrap();
        FileExt::unlock(&lock).unwrap();
    }

    #[test]
    fn payload_round_trip_and_path_safety() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let payload = FullComponentPayload {
            name: "lamp".into(),
            files: vec![PayloadFile {
                path: "components/ui/lamp.tsx".into(),
                content: "export const Lamp = () => null;".into(),
            }],
            dependencies: vec!["motion".into()],
            dev_dependencies: vec![],
            registry_dependencies: vec![],
            install_command: None,
        };

        let rel = store.write_payload("acme", "lamp", &payload).unwrap();
        assert_eq!(rel, "acme/lamp.json");
        assert_eq!(store.read_payload(&rel).unwrap(), Some(payload.clone()));
        assert_eq!(store.read_payload("acme/missing.json").unwrap(), None);

        assert!(store.write_payload("acme", "../escape", &payload).is_err());
        assert!(matches!(
            store.read_payload("../outside.json"),
            Err(HarvestError::InvalidInput(_))
        ));
        assert!(store.read_payload("/etc/passwd").is_err());
    }

    fn payload(content: &str) -> FullComponentPayload {
        FullComponentPayload {
            name: "lamp".into(),
            files: vec![PayloadFile {
                path: "components/ui/lamp.tsx".into(),
                content: content.into(),
            }],
            dependencies: vec!["motion".into()],
            dev_dependencies: vec![],
            registry_dependencies: vec![],
            install_command: None,
        }
    }

    #[test]
    fn commit_writes_payload_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let rec = record("acme", "Lamp", "lamp");

        let rel = store.commit("acme", &key("Lamp"), &payload("v1"), rec.clone()).unwrap();
        assert_eq!(rel, "acme/lamp.json");
        assert_eq!(store.lookup("acme", &key("Lamp")), Some(rec));
        assert_eq!(store.read_payload(&rel).unwrap(), Some(payload("v1")));
    }

    #[test]
    fn failed_commit_restores_previous_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");
        let first = record("acme", "Lamp", "lamp");
        store.commit("acme", &key("Lamp"), &payload("v1"), first.clone()).unwrap();
        let before = fs::read(dir.path().join("acme/lamp.json")).unwrap();

        fs::create_dir(dir.path().join("index.json.tmp")).unwrap();

        let mut changed = first.clone();
        changed.dependencies = vec!["gsap".into()];
        let err = store
            .commit("acme", &key("Lamp"), &payload("v2"), changed)
            .unwrap_err();
        assert!(matches!(err, HarvestError::Storage { .. }));

        assert_eq!(fs::read(dir.path().join("acme/lamp.json")).unwrap(), before);
        assert_eq!(store.lookup("acme", &key("Lamp")), Some(first));

        // A component that was never stored leaves no payload behind.
        let err = store
            .commit("acme", &key("Pin"), &payload("pin"), record("acme", "Pin", "pin"))
            .unwrap_err();
        assert!(matches!(err, HarvestError::Storage { .. }));
        assert!(!dir.path().join("acme/pin.json").exists());
    }

    #[test]
    fn concurrent_payload_writes_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path(), "index.json");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || {
                        store.write_payload("acme", "lamp", &payload(&format!("v{}", i)))
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), "acme/lamp.json");
            }
        });

        let stored = store.read_payload("acme/lamp.json").unwrap().unwrap();
        assert!(stored.files[0].content.starts_with('v'));
        assert!(!dir.path().join("acme/lamp.json.tmp").exists());
    }
}
