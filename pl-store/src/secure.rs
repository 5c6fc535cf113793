//! Keyring-backed secure storage backend.
//!
//! Each key becomes an entry in the OS credential store (Keychain,
//! Credential Manager, Secret Service), filed under a single service name.

use keyring::Entry;
use pl_core::error::{PlError, PlResult};
use tracing::debug;

use crate::backend::StorageBackend;

/// Secure backend over the platform credential store.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Create a backend filing entries under the given service name.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> PlResult<Entry> {
        Entry::new(&self.service, key).map_err(|e| PlError::SecureStore(e.to_string()))
    }
}

impl StorageBackend for KeyringBackend {
    fn get(&self, key: &str) -> PlResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(PlError::SecureStore(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> PlResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| PlError::SecureStore(e.to_string()))
    }

    fn remove(&self, key: &str) -> PlResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(PlError::SecureStore(e.to_string())),
        }
    }

    /// Round-trip a probe entry to find out whether a credential store is
    /// actually reachable (headless machines and some CI images have none).
    fn probe(&self) -> bool {
        let probe_key = "__capability_probe";
        let ok = self
            .entry(probe_key)
            .and_then(|e| {
                e.set_password("1")
                    .map_err(|e| PlError::SecureStore(e.to_string()))
            })
            .is_ok();
        if ok {
            let _ = self.remove(probe_key);
        } else {
            debug!("secure store probe failed for service {}", self.service);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_construction() {
        let backend = KeyringBackend::new("app.praylock.test");
        assert_eq!(backend.service, "app.praylock.test");
    }

    // Round-trip tests against the real credential store only make sense
    // on a machine with one; the probe result gates them.
    #[test]
    fn test_probe_then_roundtrip() {
        let backend = KeyringBackend::new("app.praylock.test");
        if !backend.probe() {
            return;
        }

        backend.set("probe-key", "probe-value").unwrap();
        assert_eq!(
            backend.get("probe-key").unwrap(),
            Some("probe-value".to_string())
        );
        backend.remove("probe-key").unwrap();
        assert_eq!(backend.get("probe-key").unwrap(), None);
    }
}
