//! Two-tier response cache with TTL expiry and LRU eviction
//!
//! Fast memory tier backed by an optional durable tier of one JSON
//! artifact per key. Durable-tier failures are recovered locally and
//! logged; they never surface as request failures.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::response::Response;

const ARTIFACT_EXTENSION: &str = "cache";

/// Single cached response with its expiry bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    response: Response,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    fn new(response: Response, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX);
        Self {
            response,
            cached_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_accessed: now,
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub max_size: usize,
    pub durable_enabled: bool,
}

/// Thread-safe two-tier response cache
///
/// Keys are derived from method, URL, and sorted query parameters only;
/// request bodies and headers are deliberately excluded from the key.
pub struct ResponseCache {
    max_size: usize,
    default_ttl: Duration,
    durable_dir: Option<PathBuf>,
    memory: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let durable_dir = if config.durable_enabled {
            match &config.durable_directory {
                Some(dir) => match fs::create_dir_all(dir) {
                    Ok(()) => Some(dir.clone()),
                    Err(e) => {
                        log::warn!(
                            "failed to create cache directory {}, continuing memory-only: {}",
                            dir.display(),
                            e
                        );
                        None
                    }
                },
                None => None,
            }
        } else {
            None
        };
        Self {
            max_size: config.max_size,
            default_ttl: Duration::from_secs(config.default_ttl),
            durable_dir,
            memory: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic digest of (method, url, sorted param pairs)
    fn cache_key(method: &str, url: &str, params: Option<&[(String, String)]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b":");
        hasher.update(url.as_bytes());
        if let Some(params) = params {
            let mut pairs: Vec<&(String, String)> = params.iter().collect();
            pairs.sort();
            for (name, value) in pairs {
                hasher.update(b":");
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached response; `from_cache` is set on the returned copy
    pub fn get(
        &self,
        method: &str,
        url: &str,
        params: Option<&[(String, String)]>,
    ) -> Option<Response> {
        let key = Self::cache_key(method, url, params);
        {
            let mut memory = self.memory.lock().unwrap();
            if let Some(entry) = memory.get_mut(&key) {
                if entry.is_expired() {
                    memory.remove(&key);
                } else {
                    entry.last_accessed = Utc::now();
                    let mut response = entry.response.clone();
                    response.from_cache = true;
                    return Some(response);
                }
            }
        }

        // memory miss: try the durable tier and promote on validity
        let mut entry = self.load_durable(&key)?;
        entry.last_accessed = Utc::now();
        let mut response = entry.response.clone();
        response.from_cache = true;
        self.insert_memory(key, entry);
        Some(response)
    }

    /// Cache a response under the given request identity
    pub fn set(
        &self,
        method: &str,
        url: &str,
        params: Option<&[(String, String)]>,
        response: &Response,
        ttl: Option<Duration>,
    ) {
        let key = Self::cache_key(method, url, params);
        let mut stored = response.clone();
        stored.from_cache = false;
        let entry = CacheEntry::new(stored, ttl.unwrap_or(self.default_ttl));
        self.store_durable(&key, &entry);
        self.insert_memory(key, entry);
    }

    /// Remove a cached response from both tiers
    pub fn delete(&self, method: &str, url: &str, params: Option<&[(String, String)]>) {
        let key = Self::cache_key(method, url, params);
        self.memory.lock().unwrap().remove(&key);
        if let Some(path) = self.durable_path(&key) {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to delete cache artifact {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Drop every cached response from both tiers
    pub fn clear(&self) {
        self.memory.lock().unwrap().clear();
        let Some(dir) = &self.durable_dir else {
            return;
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("failed to list cache directory {}: {}", dir.display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION) {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("failed to delete cache artifact {}: {}", path.display(), e);
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory.lock().unwrap();
        let expired = memory.values().filter(|e| e.is_expired()).count();
        CacheStats {
            total_entries: memory.len(),
            valid_entries: memory.len() - expired,
            expired_entries: expired,
            max_size: self.max_size,
            durable_enabled: self.durable_dir.is_some(),
        }
    }

    /// Insert into the memory tier, purging expired entries and evicting
    /// least-recently-accessed entries above max_size
    fn insert_memory(&self, key: String, entry: CacheEntry) {
        let mut memory = self.memory.lock().unwrap();
        memory.insert(key, entry);
        memory.retain(|_, e| !e.is_expired());
        while memory.len() > self.max_size {
            let oldest = memory
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    memory.remove(&key);
                }
                None => break,
            }
        }
    }

    fn durable_path(&self, key: &str) -> Option<PathBuf> {
        self.durable_dir
            .as_ref()
            .map(|dir| dir.join(format!("{key}.{ARTIFACT_EXTENSION}")))
    }

    /// Load a durable artifact; expired or corrupted artifacts are deleted
    /// and treated as a miss
    fn load_durable(&self, key: &str) -> Option<CacheEntry> {
        let path = self.durable_path(key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to read cache artifact {}: {}", path.display(), e);
                }
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if !entry.is_expired() => Some(entry),
            Ok(_) => {
                let _ = fs::remove_file(&path);
                None
            }
            Err(e) => {
                log::warn!("corrupted cache artifact {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Persist an entry; failures are logged and swallowed so the cache
    /// stays correct as memory-only
    fn store_durable(&self, key: &str, entry: &CacheEntry) {
        let Some(path) = self.durable_path(key) else {
            return;
        };
        match serde_json::to_vec(entry) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    log::warn!("failed to write cache artifact {}: {}", path.display(), e);
                }
            }
            Err(e) => {
                log::warn!("failed to serialize cache entry for {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Headers;

    fn response(url: &str) -> Response {
        Response {
            url: url.to_string(),
            status_code: 200,
            headers: Headers::new(),
            body: b"body".to_vec(),
            text: "body".to_string(),
            encoding: "utf-8".to_string(),
            response_time: 0.05,
            from_cache: false,
        }
    }

    fn memory_cache(max_size: usize) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            max_size,
            default_ttl: 3600,
            durable_enabled: false,
            durable_directory: None,
        })
    }

    fn durable_cache(dir: &std::path::Path) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            max_size: 100,
            default_ttl: 3600,
            durable_enabled: true,
            durable_directory: Some(dir.to_path_buf()),
        })
    }

    #[test]
    fn test_set_then_get_flags_provenance() {
        let cache = memory_cache(10);
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        let hit = cache.get("GET", "http://x/a", None).unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.url, "http://x/a");
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache = memory_cache(10);
        assert!(cache.get("GET", "http://x/a", None).is_none());
    }

    #[test]
    fn test_key_distinguishes_method_and_params() {
        let cache = memory_cache(10);
        let params = vec![("q".to_string(), "1".to_string())];
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        assert!(cache.get("POST", "http://x/a", None).is_none());
        assert!(cache.get("GET", "http://x/a", Some(&params)).is_none());
    }

    #[test]
    fn test_key_ignores_param_order() {
        let cache = memory_cache(10);
        let ab = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let ba = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ];
        cache.set("GET", "http://x/a", Some(&ab), &response("http://x/a"), None);
        assert!(cache.get("GET", "http://x/a", Some(&ba)).is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = memory_cache(10);
        cache.set(
            "GET",
            "http://x/a",
            None,
            &response("http://x/a"),
            Some(Duration::from_millis(20)),
        );
        assert!(cache.get("GET", "http://x/a", None).is_some());
        std::thread::sleep(Duration::from_millis(50));
        assert!(cache.get("GET", "http://x/a", None).is_none());
    }

    #[test]
    fn test_lru_eviction_prefers_least_recently_accessed() {
        let cache = memory_cache(3);
        cache.set("GET", "http://x/c", None, &response("http://x/c"), None);
        std::thread::sleep(Duration::from_millis(5));
        cache.set("GET", "http://x/b", None, &response("http://x/b"), None);
        std::thread::sleep(Duration::from_millis(5));
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        std::thread::sleep(Duration::from_millis(5));

        // touch B and A so C is the least recently accessed
        cache.get("GET", "http://x/b", None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.get("GET", "http://x/a", None).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        cache.set("GET", "http://x/d", None, &response("http://x/d"), None);

        assert!(cache.get("GET", "http://x/c", None).is_none());
        assert!(cache.get("GET", "http://x/a", None).is_some());
        assert!(cache.get("GET", "http://x/b", None).is_some());
        assert!(cache.get("GET", "http://x/d", None).is_some());
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = memory_cache(10);
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        cache.set("GET", "http://x/b", None, &response("http://x/b"), None);
        cache.delete("GET", "http://x/a", None);
        assert!(cache.get("GET", "http://x/a", None).is_none());
        assert!(cache.get("GET", "http://x/b", None).is_some());
        cache.clear();
        assert!(cache.get("GET", "http://x/b", None).is_none());
    }

    #[test]
    fn test_durable_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let cache = durable_cache(dir.path());
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);

        // a fresh instance over the same directory sees the artifact
        let revived = durable_cache(dir.path());
        let hit = revived.get("GET", "http://x/a", None).unwrap();
        assert!(hit.from_cache);

        // and promoted it to the memory tier
        assert_eq!(revived.stats().total_entries, 1);
    }

    #[test]
    fn test_corrupted_artifact_deleted_and_missed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = durable_cache(dir.path());
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);

        let artifact = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .find(|p| p.extension().is_some_and(|ext| ext == "cache"))
            .unwrap();
        fs::write(&artifact, b"not json").unwrap();

        let revived = durable_cache(dir.path());
        assert!(revived.get("GET", "http://x/a", None).is_none());
        assert!(!artifact.exists());
    }

    #[test]
    fn test_expired_artifact_not_promoted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = durable_cache(dir.path());
        cache.set(
            "GET",
            "http://x/a",
            None,
            &response("http://x/a"),
            Some(Duration::from_millis(20)),
        );
        std::thread::sleep(Duration::from_millis(50));

        let revived = durable_cache(dir.path());
        assert!(revived.get("GET", "http://x/a", None).is_none());
        assert_eq!(revived.stats().total_entries, 0);
    }

    #[test]
    fn test_durable_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = durable_cache(dir.path());
        // removing the directory makes every artifact write fail
        drop(dir);
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        // the memory tier still serves the entry
        assert!(cache.get("GET", "http://x/a", None).is_some());
    }

    #[test]
    fn test_clear_removes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = durable_cache(dir.path());
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        cache.clear();
        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 0);
        assert!(cache.get("GET", "http://x/a", None).is_none());
    }

    #[test]
    fn test_stats() {
        let cache = memory_cache(10);
        cache.set("GET", "http://x/a", None, &response("http://x/a"), None);
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.max_size, 10);
        assert!(!stats.durable_enabled);
    }
}
