//! Command handlers.

pub mod enforce;
pub mod queues;
pub mod settings;
pub mod status;
pub mod watch;

use std::sync::Arc;

use pl_api::ApiClient;
use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;
use pl_core::report::LogReporter;
use pl_services::{select_blocker, ServiceRegistry};
use pl_store::{DurableStore, FileBackend, KeyringBackend};

/// Build the full engine from configuration.
pub async fn build_registry(config: ConfigHandle) -> PlResult<ServiceRegistry> {
    let (server, storage, fallback_dir) = {
        let cfg = config.read().await;
        (
            cfg.server.clone(),
            cfg.storage.clone(),
            cfg.effective_fallback_dir()?,
        )
    };

    let api = Arc::new(ApiClient::new(&server)?);
    let store = Arc::new(DurableStore::new(
        Arc::new(KeyringBackend::new(storage.keyring_service)),
        Arc::new(FileBackend::new(fallback_dir)),
        Arc::new(LogReporter),
    ));
    let blocker = select_blocker();

    Ok(ServiceRegistry::build(config, store, api, blocker, Arc::new(LogReporter)).await)
}
