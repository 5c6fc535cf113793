//! Durable store facade over the secure and fallback backends.
//!
//! Callers read and write opaque JSON blobs; the facade decides which
//! backend holds them, migrates legacy plaintext values into the secure
//! backend once, and contains every backend failure (reported at most once
//! per operation/key pair, then degraded rather than propagated).

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use pl_core::report::{ErrorReporter, OnceReporter};

use crate::backend::StorageBackend;

/// Capability-checked durable key-value store.
pub struct DurableStore {
    secure: Arc<dyn StorageBackend>,
    fallback: Arc<dyn StorageBackend>,
    /// Cached secure-capability probe; concurrent first callers await the
    /// same in-flight probe.
    available: OnceCell<bool>,
    /// Memoized one-shot migration; concurrent callers await one attempt.
    migration: OnceCell<()>,
    reporter: OnceReporter<Arc<dyn ErrorReporter>>,
}

impl DurableStore {
    /// Create a store over the given backends.
    pub fn new(
        secure: Arc<dyn StorageBackend>,
        fallback: Arc<dyn StorageBackend>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            secure,
            fallback,
            available: OnceCell::new(),
            migration: OnceCell::new(),
            reporter: OnceReporter::new(reporter),
        }
    }

    /// Whether the secure backend is usable on this device.
    ///
    /// The probe runs once per process lifetime; the result is cached.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                let secure = Arc::clone(&self.secure);
                let ok = tokio::task::spawn_blocking(move || secure.probe())
                    .await
                    .unwrap_or(false);
                info!("secure storage {}", if ok { "available" } else { "unavailable" });
                ok
            })
            .await
    }

    /// Read and decode the JSON blob stored under `key`.
    ///
    /// Failures are reported and collapse to `None` so callers proceed in
    /// a degraded mode instead of crashing.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = if self.is_available().await {
            self.secure.get(key)
        } else {
            self.fallback.get(key)
        };

        match raw {
            Ok(Some(s)) => match serde_json::from_str(&s) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.report("decode", key, &e.to_string());
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.report("get", key, &e.to_string());
                None
            }
        }
    }

    /// Encode and persist a JSON blob under `key`.
    ///
    /// Returns false on failure. A failed secure write is never silently
    /// redirected to the fallback: the two backends carry different
    /// durability/secrecy guarantees and callers decide what a failed
    /// write means for them.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                self.report("encode", key, &e.to_string());
                return false;
            }
        };

        let result = if self.is_available().await {
            self.secure.set(key, &encoded)
        } else {
            self.fallback.set(key, &encoded)
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.report("set", key, &e.to_string());
                false
            }
        }
    }

    /// Delete `key` from both backends. Idempotent.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.secure.remove(key) {
            self.report("remove-secure", key, &e.to_string());
        }
        if let Err(e) = self.fallback.remove(key) {
            self.report("remove-fallback", key, &e.to_string());
        }
    }

    /// Migrate legacy plaintext values into the secure backend.
    ///
    /// Per key: a plaintext value with no secure counterpart is copied
    /// securely and then deleted from the fallback; if a secure value
    /// already exists it wins and only the plaintext copy is deleted.
    /// Runs at most once per process; concurrent callers await the first
    /// attempt instead of racing duplicates.
    pub async fn migrate(&self, keys: &[&str]) {
        self.migration
            .get_or_init(|| async {
                if !self.is_available().await {
                    debug!("secure storage unavailable, skipping migration");
                    return;
                }
                for key in keys {
                    self.migrate_key(key);
                }
            })
            .await;
    }

    fn migrate_key(&self, key: &str) {
        let legacy = match self.fallback.get(key) {
            Ok(Some(v)) => v,
            Ok(None) => return,
            Err(e) => {
                self.report("migrate-read", key, &e.to_string());
                return;
            }
        };

        match self.secure.get(key) {
            Ok(Some(_)) => {
                // Secure value wins; just clear the plaintext copy.
                if let Err(e) = self.fallback.remove(key) {
                    self.report("migrate-cleanup", key, &e.to_string());
                }
                debug!("migration: secure value already present for {key}");
            }
            Ok(None) => match self.secure.set(key, &legacy) {
                Ok(()) => {
                    if let Err(e) = self.fallback.remove(key) {
                        self.report("migrate-cleanup", key, &e.to_string());
                    }
                    info!("migrated {key} to secure storage");
                }
                Err(e) => {
                    // Keep the plaintext copy; losing the data is worse
                    // than leaving it unmigrated.
                    self.report("migrate-write", key, &e.to_string());
                    warn!("migration of {key} failed, plaintext retained");
                }
            },
            Err(e) => {
                self.report("migrate-probe", key, &e.to_string());
            }
        }
    }

    fn report(&self, operation: &str, key: &str, message: &str) {
        self.reporter
            .report("storage", &format!("{operation}:{key}"), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use pl_core::error::{PlError, PlResult};
    use pl_core::report::RecordingReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend whose writes always fail; probe and reads succeed.
    #[derive(Default)]
    struct BrokenWrites {
        inner: MemoryBackend,
        failures: AtomicUsize,
    }

    impl StorageBackend for BrokenWrites {
        fn get(&self, key: &str) -> PlResult<Option<String>> {
            self.inner.get(key)
        }
        fn set(&self, _key: &str, _value: &str) -> PlResult<()> {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(PlError::SecureStore("write refused".into()))
        }
        fn remove(&self, key: &str) -> PlResult<()> {
            self.inner.remove(key)
        }
    }

    /// Backend that counts capability probes.
    #[derive(Default)]
    struct CountingProbe {
        inner: MemoryBackend,
        probes: AtomicUsize,
    }

    impl StorageBackend for CountingProbe {
        fn get(&self, key: &str) -> PlResult<Option<String>> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> PlResult<()> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> PlResult<()> {
            self.inner.remove(key)
        }
        fn probe(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn store_with(
        secure: Arc<dyn StorageBackend>,
        fallback: Arc<dyn StorageBackend>,
    ) -> (DurableStore, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        let store = DurableStore::new(
            secure,
            fallback,
            reporter.clone() as Arc<dyn ErrorReporter>,
        );
        (store, reporter)
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_secure() {
        let secure = Arc::new(MemoryBackend::new());
        let (store, _) = store_with(secure.clone(), Arc::new(MemoryBackend::new()));

        assert!(store.set_json("k", &serde_json::json!({"a": 1})).await);
        let value: Option<serde_json::Value> = store.get_json("k").await;
        assert_eq!(value.unwrap()["a"], 1);
        // It landed in the secure backend.
        assert_eq!(secure.len(), 1);
    }

    #[tokio::test]
    async fn test_capability_probe_runs_once() {
        let secure = Arc::new(CountingProbe::default());
        let (store, _) = store_with(secure.clone(), Arc::new(MemoryBackend::new()));

        assert!(store.is_available().await);
        assert!(store.is_available().await);
        store.set_json("k", &1).await;
        assert_eq!(secure.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_secure_write_returns_false_not_fallback() {
        let fallback = Arc::new(MemoryBackend::new());
        let (store, reporter) = store_with(Arc::new(BrokenWrites::default()), fallback.clone());

        assert!(!store.set_json("pending_completions", &vec![1, 2]).await);
        // The fallback must not have been written silently.
        assert!(fallback.is_empty());
        assert_eq!(reporter.count(), 1);
    }

    #[tokio::test]
    async fn test_failures_reported_once_per_operation_and_key() {
        let (store, reporter) = store_with(
            Arc::new(BrokenWrites::default()),
            Arc::new(MemoryBackend::new()),
        );

        store.set_json("a", &1).await;
        store.set_json("a", &2).await;
        store.set_json("a", &3).await;
        store.set_json("b", &1).await;

        // One report per (set, key) despite repeated failures.
        assert_eq!(reporter.count(), 2);
    }

    #[tokio::test]
    async fn test_remove_clears_both_backends() {
        let secure = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        secure.set("k", "1").unwrap();
        fallback.set("k", "2").unwrap();

        let (store, _) = store_with(secure.clone(), fallback.clone());
        store.remove("k").await;

        assert!(secure.is_empty());
        assert!(fallback.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_moves_legacy_value() {
        let secure = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        fallback.set("legacy-key", r#"[{"id":"123"}]"#).unwrap();

        let (store, _) = store_with(secure.clone(), fallback.clone());
        store.migrate(&["legacy-key"]).await;

        assert_eq!(
            secure.get("legacy-key").unwrap(),
            Some(r#"[{"id":"123"}]"#.to_string())
        );
        assert_eq!(fallback.get("legacy-key").unwrap(), None);
    }

    #[tokio::test]
    async fn test_migrate_never_overwrites_secure_value() {
        let secure = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        secure.set("k", "secure-wins").unwrap();
        fallback.set("k", "stale-plaintext").unwrap();

        let (store, _) = store_with(secure.clone(), fallback.clone());
        store.migrate(&["k"]).await;

        assert_eq!(secure.get("k").unwrap(), Some("secure-wins".to_string()));
        assert_eq!(fallback.get("k").unwrap(), None);
    }

    #[tokio::test]
    async fn test_migrate_runs_once() {
        let secure = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        fallback.set("k", "v1").unwrap();

        let (store, _) = store_with(secure.clone(), fallback.clone());
        store.migrate(&["k"]).await;

        // A value that reappears in the fallback later must not be
        // re-migrated by a second call.
        fallback.set("k", "v2").unwrap();
        store.migrate(&["k"]).await;
        assert_eq!(secure.get("k").unwrap(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_migration_keeps_plaintext() {
        let fallback = Arc::new(MemoryBackend::new());
        fallback.set("k", "precious").unwrap();

        let (store, reporter) =
            store_with(Arc::new(BrokenWrites::default()), fallback.clone());
        store.migrate(&["k"]).await;

        assert_eq!(fallback.get("k").unwrap(), Some("precious".to_string()));
        assert!(reporter.count() >= 1);
    }
}
