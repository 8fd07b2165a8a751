//! Advisory expiring key-value cache over persistent client storage.
//!
//! Nothing depends on the cache for correctness: every failure degrades to a
//! miss. Entries expire lazily on read; there is no sweep and no size bound.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_TTL: Duration = Duration::from_millis(600_000);
pub const DEFAULT_NAMESPACE: &str = "tripdesk_cache_";

/// String key-value storage, shaped like browser local storage.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, Error>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), Error>;
    fn remove_item(&self, key: &str) -> Result<(), Error>;
    fn keys(&self) -> Result<Vec<String>, Error>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        self.items.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.items.lock().keys().cloned().collect())
    }
}

/// Storage persisted as one JSON object file.
///
/// Every write rewrites the file through a sibling temp file and a rename.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let items = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Storage(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Storage(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), Error> {
        let bytes = serde_json::to_vec(items)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.items.lock().get(key).cloned())
    }

    /// The in-memory view only changes if the file write succeeds.
    fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut items = self.items.lock();
        let previous = items.insert(key.to_owned(), value.to_owned());
        if let Err(e) = self.persist(&items) {
            match previous {
                Some(previous) => items.insert(key.to_owned(), previous),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), Error> {
        let mut items = self.items.lock();
        if let Some(previous) = items.remove(key) {
            if let Err(e) = self.persist(&items) {
                items.insert(key.to_owned(), previous);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.items.lock().keys().cloned().collect())
    }
}

/// Key prefix and default TTL. The prefix is never empty, so
/// [`LocalCache::clear_all`] cannot reach keys it does not own.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    namespace: String,
    default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    /// Read overrides from the environment.
    ///
    /// # Optional env vars
    /// - `TRIPDESK_CACHE_NAMESPACE`: key prefix (default `tripdesk_cache_`)
    /// - `TRIPDESK_CACHE_TTL_MS`: default TTL in milliseconds (default 600000)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the namespace is blank or the TTL is not
    /// an integer.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(namespace) = std::env::var("TRIPDESK_CACHE_NAMESPACE") {
            config.namespace = parse_namespace(&namespace)?;
        }
        if let Ok(ttl) = std::env::var("TRIPDESK_CACHE_TTL_MS") {
            let ms: u64 = ttl
                .parse()
                .map_err(|e| Error::Config(format!("TRIPDESK_CACHE_TTL_MS: {e}")))?;
            config = config.with_default_ttl(Duration::from_millis(ms));
        }
        Ok(config)
    }

    /// Use `namespace` as the key prefix. A blank prefix is ignored and the
    /// current one kept.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        match parse_namespace(&namespace.into()) {
            Ok(namespace) => self.namespace = namespace,
            Err(e) => tracing::warn!(error = %e, namespace = %self.namespace, "Keeping cache namespace"),
        }
        self
    }

    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}

fn parse_namespace(value: &str) -> Result<String, Error> {
    if value.trim().is_empty() {
        Err(Error::Config("TRIPDESK_CACHE_NAMESPACE must not be blank".into()))
    } else {
        Ok(value.to_owned())
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    value: T,
    /// Unix milliseconds.
    expiry: i64,
}

/// Unix milliseconds, wall clock.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

pub struct LocalCache {
    storage: Arc<dyn Storage>,
    config: CacheConfig,
    clock: fn() -> i64,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocalCache {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, config: CacheConfig) -> Self {
        Self {
            storage,
            config,
            clock: now_millis,
        }
    }

    /// In-memory cache with default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), CacheConfig::default())
    }

    /// Replace the clock (unix milliseconds).
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.config.namespace)
    }

    /// Store `value` under `key` with the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.config.default_ttl);
    }

    /// Store `value` under `key` for `ttl`. Failures are ignored.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let envelope = Envelope {
            value,
            expiry: (self.clock)().saturating_add(ttl_ms),
        };
        let result = serde_json::to_string(&envelope)
            .map_err(Error::from)
            .and_then(|json| self.storage.set_item(&self.namespaced(key), &json));
        if let Err(e) = result {
            tracing::debug!(key, error = %e, "Cache write dropped");
        }
    }

    /// Read `key`. Expired, missing and unreadable entries are all `None`.
    ///
    /// An expired entry is removed from storage on the way out.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.namespaced(key);
        let raw = self.storage.get_item(&full_key).ok().flatten()?;
        let envelope: Envelope<T> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(key, error = %e, "Unreadable cache entry");
                return None;
            }
        };
        if (self.clock)() > envelope.expiry {
            tracing::debug!(key, "Cache entry expired");
            let _ = self.storage.remove_item(&full_key);
            return None;
        }
        Some(envelope.value)
    }

    pub fn remove(&self, key: &str) {
        let _ = self.storage.remove_item(&self.namespaced(key));
    }

    /// Remove every entry under this cache's namespace.
    pub fn clear_all(&self) {
        let Ok(keys) = self.storage.keys() else {
            return;
        };
        for key in keys
            .iter()
            .filter(|k| k.starts_with(&self.config.namespace))
        {
            let _ = self.storage.remove_item(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    static NOW: AtomicI64 = AtomicI64::new(1_000);

    fn fake_now() -> i64 {
        NOW.load(Ordering::SeqCst)
    }

    struct FullStorage;

    impl Storage for FullStorage {
        fn get_item(&self, _: &str) -> Result<Option<String>, Error> {
            Ok(None)
        }
        fn set_item(&self, _: &str, _: &str) -> Result<(), Error> {
            Err(Error::Storage("quota exceeded".into()))
        }
        fn remove_item(&self, _: &str) -> Result<(), Error> {
            Ok(())
        }
        fn keys(&self) -> Result<Vec<String>, Error> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn set_then_get() {
        let cache = LocalCache::in_memory();
        cache.set("flights:LHR-JFK", &vec![1, 2, 3]);
        assert_eq!(cache.get::<Vec<i32>>("flights:LHR-JFK"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("missing"), None);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = LocalCache::new(storage.clone(), CacheConfig::default());
        cache.set_with_ttl("k", &"v", Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(cache.get::<String>("k"), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    // Only this test drives NOW, so it is safe to share.
    #[test]
    fn expiry_follows_injected_clock() {
        let cache = LocalCache::in_memory().with_clock(fake_now);
        NOW.store(1_000, Ordering::SeqCst);
        cache.set_with_ttl("k", &42, Duration::from_millis(500));

        NOW.store(1_500, Ordering::SeqCst);
        assert_eq!(cache.get::<i32>("k"), Some(42));
        NOW.store(1_501, Ordering::SeqCst);
        assert_eq!(cache.get::<i32>("k"), None);
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("tripdesk_cache_bad", "{not json").unwrap();
        let cache = LocalCache::new(storage, CacheConfig::default());
        assert_eq!(cache.get::<i32>("bad"), None);
    }

    #[test]
    fn wrong_type_reads_as_miss() {
        let cache = LocalCache::in_memory();
        cache.set("k", &"text");
        assert_eq!(cache.get::<i32>("k"), None);
    }

    #[test]
    fn write_failure_is_silent() {
        let cache = LocalCache::new(Arc::new(FullStorage), CacheConfig::default());
        cache.set("k", &1);
        assert_eq!(cache.get::<i32>("k"), None);
    }

    #[test]
    fn clear_all_leaves_foreign_keys() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("theme", "dark").unwrap();
        let cache = LocalCache::new(storage.clone(), CacheConfig::default());
        cache.set("a", &1);
        cache.set("b", &2);

        cache.clear_all();

        assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);
        assert_eq!(cache.get::<i32>("a"), None);
    }

    #[test]
    fn blank_namespace_never_reaches_foreign_keys() {
        assert!(matches!(parse_namespace("  "), Err(Error::Config(_))));
        assert_eq!(parse_namespace("app_").unwrap(), "app_");

        let config = CacheConfig::default().with_namespace("");
        assert_eq!(config.namespace(), DEFAULT_NAMESPACE);

        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("theme", "dark").unwrap();
        let cache = LocalCache::new(storage.clone(), config);
        cache.set("a", &1);
        cache.clear_all();
        assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);
    }

    #[test]
    fn custom_namespace_prefixes_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = LocalCache::new(storage.clone(), CacheConfig::default().with_namespace("agency_"));
        cache.set("a", &1);
        assert_eq!(storage.keys().unwrap(), vec!["agency_a".to_string()]);
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        {
            let cache = LocalCache::new(
                Arc::new(FileStorage::open(&path).unwrap()),
                CacheConfig::default(),
            );
            cache.set("plans", &vec!["free", "pro"]);
        }
        let cache = LocalCache::new(
            Arc::new(FileStorage::open(&path).unwrap()),
            CacheConfig::default(),
        );
        assert_eq!(cache.get::<Vec<String>>("plans"), Some(vec!["free".into(), "pro".into()]));
    }

    #[test]
    fn failed_file_write_is_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("missing").join("cache.json")).unwrap();

        assert!(matches!(storage.set_item("k", "v"), Err(Error::Storage(_))));
        assert_eq!(storage.get_item("k").unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn file_storage_rejects_garbage() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not json").unwrap();
        assert!(matches!(FileStorage::open(file.path()), Err(Error::Storage(_))));
    }

    #[test]
    fn custom_namespace() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = LocalCache::new(
            storage.clone(),
            CacheConfig::default().with_namespace("app_"),
        );
        cache.set("x", &true);
        assert_eq!(storage.keys().unwrap(), vec!["app_x".to_string()]);
    }
}
