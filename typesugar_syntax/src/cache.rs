//! Content-addressed memoization of expansion output.
//!
//! Keyed by a 128-bit digest of `(file content, config hash, registry
//! version)`: any change to the source, the configuration, or the set of
//! registered macros misses. In-memory entries live in a bounded LRU;
//! optionally each entry is persisted to a content-addressed store on
//! disk (`<hex-digest>.json`).
//!
//! This is the only cross-file mutable structure in the engine, so it is
//! wrapped in a mutex; last-write-wins is sufficient.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use typesugar_errors::Diagnostic;

/// 128-bit cache key, hex-encoded on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    pub fn compute(file_content: &str, config_hash: &str, registry_version: u64) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(file_content.as_bytes());
        hasher.update([0]);
        hasher.update(config_hash.as_bytes());
        hasher.update([0]);
        hasher.update(registry_version.to_le_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 16];
        key.copy_from_slice(&digest[..16]);
        CacheKey(key)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

/// One memoized expansion: the transformed text plus its diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedExpansion {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ExpansionCache {
    entries: Mutex<LruCache<CacheKey, CachedExpansion>>,
    /// Directory of the persisted content-addressed store, when enabled.
    disk: Option<PathBuf>,
}

impl ExpansionCache {
    pub fn new(max_entries: usize) -> ExpansionCache {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("capacity is at least one");
        ExpansionCache {
            entries: Mutex::new(LruCache::new(capacity)),
            disk: None,
        }
    }

    /// Enable the on-disk store rooted at `dir`. Entries are written as
    /// `<hex-digest>.json`; unreadable entries are treated as misses.
    pub fn with_disk_store(mut self, dir: PathBuf) -> ExpansionCache {
        self.disk = Some(dir);
        self
    }

    pub fn get(&self, key: CacheKey) -> Option<CachedExpansion> {
        if let Some(entry) = self.entries.lock().expect("cache lock").get(&key).cloned() {
            debug!("expansion cache hit (memory) for {}", key.to_hex());
            return Some(entry);
        }
        let dir = self.disk.as_ref()?;
        let path = dir.join(format!("{}.json", key.to_hex()));
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<CachedExpansion>(&bytes) {
            Ok(entry) => {
                debug!("expansion cache hit (disk) for {}", key.to_hex());
                self.entries
                    .lock()
                    .expect("cache lock")
                    .put(key, entry.clone());
                Some(entry)
            }
            Err(e) => {
                warn!("discarding corrupt cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn put(&self, key: CacheKey, entry: CachedExpansion) {
        if let Some(dir) = &self.disk {
            if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| {
                let path = dir.join(format!("{}.json", key.to_hex()));
                let bytes =
                    serde_json::to_vec(&entry).expect("cache entries always serialize");
                std::fs::write(path, bytes)
            }) {
                warn!("failed to persist cache entry {}: {}", key.to_hex(), e);
            }
        }
        self.entries.lock().expect("cache lock").put(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str) -> CachedExpansion {
        CachedExpansion {
            text: text.to_string(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn key_tracks_all_three_inputs() {
        let base = CacheKey::compute("src", "cfg", 1);
        assert_eq!(base, CacheKey::compute("src", "cfg", 1));
        assert_ne!(base, CacheKey::compute("src2", "cfg", 1));
        assert_ne!(base, CacheKey::compute("src", "cfg2", 1));
        assert_ne!(base, CacheKey::compute("src", "cfg", 2));
    }

    #[test]
    fn lru_evicts_oldest() {
        let cache = ExpansionCache::new(2);
        let (a, b, c) = (
            CacheKey::compute("a", "", 0),
            CacheKey::compute("b", "", 0),
            CacheKey::compute("c", "", 0),
        );
        cache.put(a, entry("a"));
        cache.put(b, entry("b"));
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.get(a).is_some());
        cache.put(c, entry("c"));
        assert!(cache.get(a).is_some());
        assert!(cache.get(b).is_none());
        assert!(cache.get(c).is_some());
    }

    #[test]
    fn disk_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::compute("source", "cfg", 3);
        {
            let cache = ExpansionCache::new(4).with_disk_store(dir.path().to_path_buf());
            cache.put(key, entry("expanded"));
        }
        // A fresh cache with an empty memory tier reads the entry back.
        let cache = ExpansionCache::new(4).with_disk_store(dir.path().to_path_buf());
        let restored = cache.get(key).unwrap();
        assert_eq!(restored.text, "expanded");
    }
}
