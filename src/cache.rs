//! Persistent look-aside cache for document embeddings.
//!
//! Entries are keyed by `(document id, content hash)`, so an edited
//! document misses the cache and gets a fresh embedding while the stale
//! entry is simply left unused. Nothing is evicted automatically.
//!
//! # Persistence
//!
//! The backing JSON file is read lazily, once, on first access. A missing
//! file yields an empty cache. A corrupt file also yields an empty cache,
//! with a warning logged and recorded in [`CacheStats::load_warning`].
//! Any other read error is returned from the call that triggered the load
//! and the load is retried on the next access, so a later flush never
//! replaces a file that was merely unreadable for a moment.
//!
//! Writes stay in memory until [`EmbeddingCache::flush`], which writes a
//! temp file next to the target and renames it into place, so readers never
//! see a half-written file and a crash keeps the previous version intact.
//! Flushes through one cache are serialized.
//!
//! ```text
//! {
//!   "version": "1.0",
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "embeddings": [
//!     { "document_id": "...", "content_hash": "...", "embedding": [...], "created_at": "..." }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::models::Document;

/// Format version written to the cache file.
pub const CACHE_VERSION: &str = "1.0";

/// One cached embedding, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEmbedding {
    pub document_id: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: String,
    created_at: DateTime<Utc>,
    embeddings: Vec<CachedEmbedding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    document_id: String,
    content_hash: String,
}

impl CacheKey {
    fn for_document(doc: &Document) -> Self {
        Self {
            document_id: doc.id.clone(),
            content_hash: doc.content_hash(),
        }
    }
}

/// Snapshot of cache state for `rag-bot cache stats`.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub path: PathBuf,
    pub entries: usize,
    /// Distinct document ids among the entries.
    pub documents: usize,
    /// Creation time of the most recent entry.
    pub newest: Option<DateTime<Utc>>,
    /// Set when the file existed but could not be parsed.
    pub load_warning: Option<String>,
}

#[derive(Default)]
struct CacheState {
    loaded: bool,
    entries: HashMap<CacheKey, CachedEmbedding>,
    load_warning: Option<String>,
}

/// Embedding cache backed by a single JSON file.
pub struct EmbeddingCache {
    path: PathBuf,
    state: RwLock<CacheState>,
    flush_lock: Mutex<()>,
}

impl EmbeddingCache {
    /// Create a cache for `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(CacheState::default()),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the embedding for the document's current content.
    ///
    /// Returns `None` on a miss, including when an entry exists for the
    /// same id under a different content hash. A file that cannot be read
    /// is logged and treated as a miss.
    pub fn get(&self, doc: &Document) -> Option<Vec<f32>> {
        if let Err(e) = self.ensure_loaded() {
            warn!(path = %self.path.display(), error = %e, "embedding cache lookup skipped");
            return None;
        }
        let key = CacheKey::for_document(doc);
        self.read_state()
            .entries
            .get(&key)
            .map(|cached| cached.embedding.clone())
    }

    /// Store an embedding for the document's current content, in memory only.
    ///
    /// Overwrites any entry with the same `(id, content hash)`.
    pub fn set(&self, doc: &Document, embedding: Vec<f32>) -> Result<(), CacheError> {
        let mut state = self.loaded_state()?;
        let key = CacheKey::for_document(doc);
        let entry = CachedEmbedding {
            document_id: key.document_id.clone(),
            content_hash: key.content_hash.clone(),
            embedding,
            created_at: Utc::now(),
        };
        state.entries.insert(key, entry);
        Ok(())
    }

    /// Write the whole cache to disk atomically.
    ///
    /// Serializes to `<path>.tmp`, syncs it, and renames it over `<path>`.
    /// If the rename fails the temp file is removed.
    pub fn flush(&self) -> Result<(), CacheError> {
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_loaded()?;
        let state = self.read_state();

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| CacheError::io("create directory", dir, e))?;
        }

        let mut embeddings: Vec<CachedEmbedding> = state.entries.values().cloned().collect();
        // Stable file contents for identical caches.
        embeddings.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        let file = CacheFile {
            version: CACHE_VERSION.to_string(),
            created_at: Utc::now(),
            embeddings,
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let tmp_path = temp_path(&self.path);
        write_synced(&tmp_path, &data).map_err(|e| CacheError::io("write", &tmp_path, e))?;

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(CacheError::io("replace", &self.path, e));
        }

        debug!(path = %self.path.display(), entries = file.embeddings.len(), "embedding cache flushed");
        Ok(())
    }

    /// Entry count and load diagnostics, loading the file if needed.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        self.ensure_loaded()?;
        let state = self.read_state();
        let documents: HashSet<&str> = state
            .entries
            .keys()
            .map(|k| k.document_id.as_str())
            .collect();
        Ok(CacheStats {
            path: self.path.clone(),
            entries: state.entries.len(),
            documents: documents.len(),
            newest: state.entries.values().map(|e| e.created_at).max(),
            load_warning: state.load_warning.clone(),
        })
    }

    /// Entries currently in memory. Does not trigger a load.
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every in-memory entry. The file is untouched until the next flush.
    pub fn clear(&self) {
        let mut state = self.write_state();
        state.entries.clear();
        // Cleared means empty; a later access must not resurrect the file.
        state.loaded = true;
    }

    fn ensure_loaded(&self) -> Result<(), CacheError> {
        if !self.read_state().loaded {
            drop(self.loaded_state()?);
        }
        Ok(())
    }

    /// Write guard over a state that is guaranteed to be loaded.
    ///
    /// A failed read leaves the state unloaded so the next call retries.
    fn loaded_state(&self) -> Result<RwLockWriteGuard<'_, CacheState>, CacheError> {
        let mut state = self.write_state();
        if !state.loaded {
            self.load_into(&mut state)?;
            state.loaded = true;
        }
        Ok(state)
    }

    fn load_into(&self, state: &mut CacheState) -> Result<(), CacheError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no embedding cache file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(CacheError::io("read", &self.path, e)),
        };

        match serde_json::from_slice::<CacheFile>(&data) {
            Ok(file) => {
                for cached in file.embeddings {
                    let key = CacheKey {
                        document_id: cached.document_id.clone(),
                        content_hash: cached.content_hash.clone(),
                    };
                    state.entries.insert(key, cached);
                }
                info!(path = %self.path.display(), entries = state.entries.len(), "embedding cache loaded");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "embedding cache is corrupt, starting empty");
                state.load_warning = Some(format!("corrupt cache file ignored: {}", e));
            }
        }
        Ok(())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn doc(id: &str, content: &str) -> Document {
        Document::new(id, format!("Title {}", id), "", content)
    }

    #[test]
    fn missing_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path().join("cache.json"));

        assert_eq!(cache.get(&doc("a", "x")), None);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 0);
        assert!(stats.load_warning.is_none());
    }

    #[test]
    fn set_overwrites_same_key() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path().join("cache.json"));
        let d = doc("a", "x");

        cache.set(&d, vec![1.0, 0.0]).unwrap();
        cache.set(&d, vec![0.0, 1.0]).unwrap();

        assert_eq!(cache.get(&d), Some(vec![0.0, 1.0]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn content_edit_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path().join("cache.json"));

        cache.set(&doc("a", "old body"), vec![1.0]).unwrap();

        assert_eq!(cache.get(&doc("a", "new body")), None);
        assert_eq!(cache.get(&doc("a", "old body")), Some(vec![1.0]));
    }

    #[test]
    fn reverted_content_hits_old_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = EmbeddingCache::new(tmp.path().join("cache.json"));

        cache.set(&doc("a", "v1"), vec![1.0]).unwrap();
        cache.set(&doc("a", "v2"), vec![2.0]).unwrap();

        assert_eq!(cache.get(&doc("a", "v1")), Some(vec![1.0]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn flush_then_reload_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("cache.json");

        let cache = EmbeddingCache::new(&path);
        for i in 0..5 {
            cache.set(&doc(&format!("d{}", i), "body"), vec![i as f32, 0.5, -0.25]).unwrap();
        }
        cache.flush().unwrap();
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let reloaded = EmbeddingCache::new(&path);
        let stats = reloaded.stats().unwrap();
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.documents, 5);
        assert!(stats.newest.is_some());
        for i in 0..5 {
            assert_eq!(
                reloaded.get(&doc(&format!("d{}", i), "body")),
                Some(vec![i as f32, 0.5, -0.25])
            );
        }
    }

    #[test]
    fn set_does_not_write_through() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let cache = EmbeddingCache::new(&path);

        cache.set(&doc("a", "x"), vec![1.0]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_starts_empty_with_warning() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = EmbeddingCache::new(&path);
        assert_eq!(cache.get(&doc("a", "x")), None);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entries, 0);
        assert!(stats.load_warning.is_some());

        // The next flush replaces the corrupt file with a valid one.
        cache.set(&doc("a", "x"), vec![3.0]).unwrap();
        cache.flush().unwrap();
        let reloaded = EmbeddingCache::new(&path);
        assert_eq!(reloaded.get(&doc("a", "x")), Some(vec![3.0]));
        assert!(reloaded.stats().unwrap().load_warning.is_none());
    }

    #[test]
    fn clear_drops_memory_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let cache = EmbeddingCache::new(&path);
        cache.set(&doc("a", "x"), vec![1.0]).unwrap();
        cache.flush().unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&doc("a", "x")), None);
        assert_eq!(EmbeddingCache::new(&path).stats().unwrap().entries, 1);

        cache.flush().unwrap();
        assert_eq!(EmbeddingCache::new(&path).stats().unwrap().entries, 0);
    }

    #[test]
    fn flush_before_any_access_keeps_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");

        let first = EmbeddingCache::new(&path);
        first.set(&doc("a", "x"), vec![1.0]).unwrap();
        first.flush().unwrap();

        let second = EmbeddingCache::new(&path);
        second.flush().unwrap();
        assert_eq!(EmbeddingCache::new(&path).stats().unwrap().entries, 1);
    }

    #[test]
    fn file_has_expected_shape() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let cache = EmbeddingCache::new(&path);
        let d = doc("a", "x");
        cache.set(&d, vec![0.5]).unwrap();
        cache.flush().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
        assert!(json["created_at"].is_string());
        let entry = &json["embeddings"][0];
        assert_eq!(entry["document_id"], "a");
        assert_eq!(entry["content_hash"], d.content_hash());
        assert_eq!(entry["embedding"][0], 0.5);
        assert!(entry["created_at"].is_string());
    }

    #[test]
    fn flush_into_unwritable_location_fails() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        let cache = EmbeddingCache::new(blocker.join("cache.json"));
        cache.set(&doc("a", "x"), vec![1.0]).unwrap();

        fs::write(&blocker, "file, not a directory").unwrap();
        assert!(cache.flush().is_err());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let cache = EmbeddingCache::new(&path);
        cache.set(&doc("a", "x"), vec![1.0]).unwrap();

        // A non-empty directory cannot be replaced by a file.
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        assert!(matches!(
            cache.flush(),
            Err(CacheError::Io { action: "replace", .. })
        ));
        assert!(!temp_path(&path).exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn unreadable_file_is_an_error_and_retried() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let saved = tmp.path().join("saved.json");

        let first = EmbeddingCache::new(&path);
        for id in ["a", "b", "c"] {
            first.set(&doc(id, "body"), vec![1.0]).unwrap();
        }
        first.flush().unwrap();

        // Make the cache path unreadable as a file for a while.
        fs::rename(&path, &saved).unwrap();
        fs::create_dir(&path).unwrap();

        let cache = EmbeddingCache::new(&path);
        assert!(matches!(cache.stats(), Err(CacheError::Io { action: "read", .. })));
        assert!(cache.set(&doc("d", "body"), vec![2.0]).is_err());
        assert_eq!(cache.get(&doc("a", "body")), None);

        fs::remove_dir(&path).unwrap();
        fs::rename(&saved, &path).unwrap();

        cache.set(&doc("d", "body"), vec![2.0]).unwrap();
        cache.flush().unwrap();

        let reloaded = EmbeddingCache::new(&path);
        assert_eq!(reloaded.stats().unwrap().entries, 4);
        assert_eq!(reloaded.get(&doc("a", "body")), Some(vec![1.0]));
    }

    #[test]
    fn concurrent_flushes_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let cache = Arc::new(EmbeddingCache::new(&path));
        for i in 0..500 {
            cache
                .set(&doc(&format!("d{}", i), "body"), vec![i as f32; 8])
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || (0..10).filter(|_| cache.flush().is_err()).count())
            })
            .collect();
        let failures: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(failures, 0);
        assert!(!temp_path(&path).exists());
        assert_eq!(EmbeddingCache::new(&path).stats().unwrap().entries, 500);
    }

    #[test]
    fn concurrent_sets_are_all_kept() {
        let tmp = TempDir::new().unwrap();
        let cache = Arc::new(EmbeddingCache::new(tmp.path().join("cache.json")));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let d = doc(&format!("t{}-{}", t, i), "body");
                        cache.set(&d, vec![t as f32, i as f32]).unwrap();
                        assert!(cache.get(&d).is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.stats().unwrap().entries, 200);
    }
}
