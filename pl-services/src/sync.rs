//! Realtime sync manager.
//!
//! Consumes change-feed events and keeps the local cache approximately
//! consistent with server state without polling. Every change takes two
//! paths on purpose: an optimistic patch applied directly to the cache
//! (latency, no refetch flicker) and an invalidation event on the bus
//! (correctness when the patch misses). Neither path alone is load-bearing.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pl_api::PrayerEntry;
use pl_core::constants::tables;
use pl_core::error::PlResult;
use pl_core::report::ErrorReporter;
use pl_realtime::{ChangeAction, ChangeEvent, RealtimeManager};

use crate::cache::StateCache;
use crate::event_bus::{AppEvent, EventBus};
use crate::service::{Service, ServiceState, StateCell};

/// Applies change notifications to the local cache.
pub struct SyncManager {
    cache: Arc<StateCache>,
    bus: EventBus,
    realtime: Arc<RealtimeManager>,
    reporter: Arc<dyn ErrorReporter>,
    state: StateCell,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Create a manager over the cache and the realtime subscription.
    pub fn new(
        cache: Arc<StateCache>,
        bus: EventBus,
        realtime: Arc<RealtimeManager>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            cache,
            bus,
            realtime,
            reporter,
            state: StateCell::new(),
            consumer: Mutex::new(None),
        }
    }

    /// Spawn the consumer task feeding change events into `handle_change`.
    pub fn start_consuming(self: &Arc<Self>) {
        let mut rx = self.realtime.dispatcher().subscribe();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => this.handle_change(&event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // Missed events are repaired by invalidation-driven
                        // refetches; just resubscribe to the live stream.
                        warn!("change consumer lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.consumer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the consumer task.
    pub fn stop_consuming(&self) {
        if let Some(handle) = self.consumer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    /// Apply one change notification: classify, patch, invalidate.
    ///
    /// Never propagates an error to the caller; failures are logged and
    /// reported, and the invalidation event still goes out so the cache
    /// self-heals on the next refetch.
    pub async fn handle_change(&self, event: &ChangeEvent) {
        match event.table.as_str() {
            t if t == tables::PRAYERS => self.handle_prayer_change(event).await,
            t if t == tables::SETTINGS => self.handle_settings_change(event).await,
            other => {
                debug!("change on untracked table {other}, ignoring");
                return;
            }
        }

        // Durable fallback: any cache the patch missed refetches.
        self.bus.emit(AppEvent::CacheInvalidated {
            table: event.table.clone(),
        });
    }

    async fn handle_prayer_change(&self, event: &ChangeEvent) {
        match event.action {
            ChangeAction::Insert => {
                if let Some(entry) = self.parse_entry(event) {
                    self.cache.upsert_prayer(entry).await;
                }
            }
            ChangeAction::Update => {
                // A completion is an update whose completedAt flips from
                // null to a value; everything else is a plain row refresh.
                if event.field_became_set("completedAt") {
                    let prayer_id = event.row_id().unwrap_or_default().to_string();
                    let completed_at = event
                        .new_field("completedAt")
                        .and_then(|v| v.as_i64())
                        .unwrap_or_default();
                    let patched = self
                        .cache
                        .patch_prayer_completion(&prayer_id, completed_at)
                        .await;
                    debug!(
                        "completion for {prayer_id} ({})",
                        if patched { "patched" } else { "cache miss" }
                    );

                    let user_id = event
                        .new_field("userId")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    self.bus.emit(AppEvent::PrayerCompleted {
                        user_id,
                        prayer_id,
                    });
                } else if let Some(entry) = self.parse_entry(event) {
                    self.cache.upsert_prayer(entry).await;
                }
            }
            ChangeAction::Delete => {
                if let Some(id) = event.row_id() {
                    self.cache.remove_prayer(id).await;
                }
            }
            ChangeAction::Unknown(ref action) => {
                debug!("unknown prayer change action {action}, invalidating only");
            }
        }
    }

    async fn handle_settings_change(&self, event: &ChangeEvent) {
        if event.action == ChangeAction::Delete {
            self.cache.invalidate(tables::SETTINGS).await;
        } else if let Some(row) = event.new.as_ref() {
            let patched = self.cache.patch_settings(row).await;
            if !patched {
                debug!("settings patch missed cache, relying on invalidation");
            }
        }

        let user_id = event
            .new_field("userId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.bus.emit(AppEvent::SettingsUpdated { user_id });
    }

    fn parse_entry(&self, event: &ChangeEvent) -> Option<PrayerEntry> {
        let row = event.new.clone()?;
        match serde_json::from_value::<PrayerEntry>(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.reporter.report(
                    "sync",
                    &format!("parse:{}", event.table),
                    &e.to_string(),
                );
                None
            }
        }
    }

    /// Check the subscription on an ambiguous signal (app resume).
    pub async fn verify_connection(&self) {
        self.realtime.verify_connection().await;
    }

    /// Rotate the subscription token (no-op when unchanged).
    pub async fn update_token(&self, token: &str) -> PlResult<()> {
        self.realtime.update_token(token).await
    }
}

impl Service for SyncManager {
    fn name(&self) -> &str {
        "sync"
    }

    fn state(&self) -> ServiceState {
        self.state.get()
    }

    fn start(&self) -> PlResult<()> {
        self.state.set(ServiceState::Running);
        Ok(())
    }

    fn stop(&self) -> PlResult<()> {
        self.stop_consuming();
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_api::{PrayerPair, PrayerState};
    use pl_core::config::RealtimeConfig;
    use pl_core::report::{LogReporter, RecordingReporter};
    use pl_core::PrayerPeriod;
    use pl_realtime::ChangeDispatcher;
    use pl_store::{DurableStore, MemoryBackend};

    fn fixture() -> (Arc<SyncManager>, Arc<StateCache>, EventBus) {
        let store = Arc::new(DurableStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            Arc::new(LogReporter),
        ));
        let cache = Arc::new(StateCache::new(store));
        let bus = EventBus::new(64);
        let realtime = Arc::new(RealtimeManager::new(
            RealtimeConfig::default(),
            ChangeDispatcher::new(64),
            Arc::new(RecordingReporter::new()),
        ));
        let sync = Arc::new(SyncManager::new(
            cache.clone(),
            bus.clone(),
            realtime,
            Arc::new(LogReporter),
        ));
        (sync, cache, bus)
    }

    fn cached_state(prayer_id: &str) -> PrayerState {
        PrayerState {
            current_period: PrayerPeriod::Morning,
            current_window_available: true,
            prayers: PrayerPair {
                morning: Some(PrayerEntry {
                    id: prayer_id.into(),
                    text: None,
                    prayer_time_of_day: PrayerPeriod::Morning,
                    completed_at: None,
                    engaged_at: None,
                }),
                evening: None,
            },
        }
    }

    fn completion_event(prayer_id: &str) -> ChangeEvent {
        ChangeEvent {
            action: ChangeAction::Update,
            table: tables::PRAYERS.into(),
            new: Some(serde_json::json!({
                "id": prayer_id,
                "userId": "u1",
                "prayerTimeOfDay": "morning",
                "completedAt": 1_750_000_000_000i64
            })),
            old: Some(serde_json::json!({
                "id": prayer_id,
                "completedAt": null
            })),
        }
    }

    #[tokio::test]
    async fn test_completion_patches_cache_and_invalidates() {
        let (sync, cache, bus) = fixture();
        cache.set_prayer_state(cached_state("p1")).await;
        let mut rx = bus.subscribe();

        sync.handle_change(&completion_event("p1")).await;

        // Patch path: the cached row flipped to completed.
        let state = cache.prayer_state().await.unwrap();
        assert!(state.prayers.morning.unwrap().is_completed());

        // Both the domain event and the invalidation fallback fired.
        let mut saw_completed = false;
        let mut saw_invalidated = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::PrayerCompleted { prayer_id, user_id } => {
                    assert_eq!(prayer_id, "p1");
                    assert_eq!(user_id, "u1");
                    saw_completed = true;
                }
                AppEvent::CacheInvalidated { table } => {
                    assert_eq!(table, tables::PRAYERS);
                    saw_invalidated = true;
                }
                _ => {}
            }
        }
        assert!(saw_completed && saw_invalidated);
    }

    #[tokio::test]
    async fn test_invalidation_fires_even_when_patch_misses() {
        // Empty cache: the patch has nothing to hit.
        let (sync, cache, bus) = fixture();
        let mut rx = bus.subscribe();

        sync.handle_change(&completion_event("p1")).await;

        assert!(cache.prayer_state().await.is_none());
        let mut saw_invalidated = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::CacheInvalidated { .. }) {
                saw_invalidated = true;
            }
        }
        assert!(saw_invalidated, "patch path must not be load-bearing");
    }

    #[tokio::test]
    async fn test_insert_upserts_row() {
        let (sync, cache, _bus) = fixture();
        cache.set_prayer_state(cached_state("p0")).await;

        sync.handle_change(&ChangeEvent {
            action: ChangeAction::Insert,
            table: tables::PRAYERS.into(),
            new: Some(serde_json::json!({
                "id": "p-new",
                "prayerTimeOfDay": "evening",
                "completedAt": null
            })),
            old: None,
        })
        .await;

        let state = cache.prayer_state().await.unwrap();
        assert_eq!(state.prayers.evening.unwrap().id, "p-new");
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let (sync, cache, _bus) = fixture();
        cache.set_prayer_state(cached_state("p1")).await;

        sync.handle_change(&ChangeEvent {
            action: ChangeAction::Delete,
            table: tables::PRAYERS.into(),
            new: None,
            old: Some(serde_json::json!({"id": "p1"})),
        })
        .await;

        assert!(cache.prayer_state().await.unwrap().prayers.morning.is_none());
    }

    #[tokio::test]
    async fn test_settings_update_patches_and_announces() {
        let (sync, cache, bus) = fixture();
        cache
            .set_settings(pl_api::PraylockSettings {
                id: "s1".into(),
                user_id: "u1".into(),
                enabled: true,
                schedule: pl_api::BlockSchedule::Both,
                morning_completed: false,
                evening_completed: false,
                family_activity_selection: None,
                blocked_apps: vec![],
                created_at: 0,
                updated_at: 0,
            })
            .await;
        let mut rx = bus.subscribe();

        sync.handle_change(&ChangeEvent {
            action: ChangeAction::Update,
            table: tables::SETTINGS.into(),
            new: Some(serde_json::json!({
                "userId": "u1",
                "morningCompleted": true
            })),
            old: None,
        })
        .await;

        assert!(cache.settings().await.unwrap().morning_completed);
        let mut saw_settings = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::SettingsUpdated { .. }) {
                saw_settings = true;
            }
        }
        assert!(saw_settings);
    }

    #[tokio::test]
    async fn test_malformed_row_never_panics() {
        let (sync, _cache, bus) = fixture();
        let mut rx = bus.subscribe();

        sync.handle_change(&ChangeEvent {
            action: ChangeAction::Insert,
            table: tables::PRAYERS.into(),
            new: Some(serde_json::json!({"this": "is not a prayer row"})),
            old: None,
        })
        .await;

        // Invalidation still goes out.
        let mut saw_invalidated = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::CacheInvalidated { .. }) {
                saw_invalidated = true;
            }
        }
        assert!(saw_invalidated);
    }

    #[tokio::test]
    async fn test_untracked_table_is_ignored() {
        let (sync, _cache, bus) = fixture();
        let mut rx = bus.subscribe();

        sync.handle_change(&ChangeEvent {
            action: ChangeAction::Insert,
            table: "audit_log".into(),
            new: None,
            old: None,
        })
        .await;

        assert!(rx.try_recv().is_err());
    }
}
