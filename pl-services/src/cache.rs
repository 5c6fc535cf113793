//! Local cache of prayer state and the PRAYLOCK settings row.
//!
//! The cache is patched optimistically by the realtime sync manager (to
//! avoid refetch flicker) and cleared by invalidation events (so a missed
//! patch is corrected by the next refetch). The settings row is also
//! persisted through the durable store so enforcement can reason about the
//! last-known configuration before the first fetch completes.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use pl_api::{PrayerEntry, PrayerState, PraylockSettings};
use pl_core::constants::{keys, tables};
use pl_core::PrayerPeriod;
use pl_store::DurableStore;

/// In-memory cache with a persisted settings row.
pub struct StateCache {
    store: Arc<DurableStore>,
    prayer_state: RwLock<Option<PrayerState>>,
    settings: RwLock<Option<PraylockSettings>>,
}

impl StateCache {
    /// Create an empty cache over the durable store.
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self {
            store,
            prayer_state: RwLock::new(None),
            settings: RwLock::new(None),
        }
    }

    /// Load the persisted settings row into memory (startup).
    pub async fn load(&self) {
        if let Some(settings) = self.store.get_json::<PraylockSettings>(keys::SETTINGS_CACHE).await {
            debug!("loaded cached settings row for {}", settings.user_id);
            *self.settings.write().await = Some(settings);
        }
    }

    // ─── Prayer state ───────────────────────────────────────────────────

    /// The cached prayer state, if fresh.
    pub async fn prayer_state(&self) -> Option<PrayerState> {
        self.prayer_state.read().await.clone()
    }

    /// Replace the cached prayer state (after a refetch).
    pub async fn set_prayer_state(&self, state: PrayerState) {
        *self.prayer_state.write().await = Some(state);
    }

    /// Insert or replace one prayer row in its period slot.
    pub async fn upsert_prayer(&self, entry: PrayerEntry) {
        let mut guard = self.prayer_state.write().await;
        if let Some(state) = guard.as_mut() {
            let period = entry.prayer_time_of_day;
            *state.prayers.for_period_mut(period) = Some(entry);
        }
    }

    /// Patch a prayer's completion timestamp in place.
    ///
    /// Returns true when a cached row with that id was found and patched;
    /// false means the patch missed and only the invalidation path will
    /// correct the cache.
    pub async fn patch_prayer_completion(&self, prayer_id: &str, completed_at: i64) -> bool {
        let mut guard = self.prayer_state.write().await;
        let Some(state) = guard.as_mut() else {
            return false;
        };
        for period in [PrayerPeriod::Morning, PrayerPeriod::Evening] {
            let slot = state.prayers.for_period_mut(period);
            if let Some(entry) = slot.as_mut() {
                if entry.id == prayer_id {
                    entry.completed_at = Some(completed_at);
                    return true;
                }
            }
        }
        false
    }

    /// Remove a prayer row from the cache.
    pub async fn remove_prayer(&self, prayer_id: &str) {
        let mut guard = self.prayer_state.write().await;
        if let Some(state) = guard.as_mut() {
            for period in [PrayerPeriod::Morning, PrayerPeriod::Evening] {
                let slot = state.prayers.for_period_mut(period);
                if slot.as_ref().map(|e| e.id == prayer_id).unwrap_or(false) {
                    *slot = None;
                }
            }
        }
    }

    // ─── Settings row ───────────────────────────────────────────────────

    /// The cached settings row.
    pub async fn settings(&self) -> Option<PraylockSettings> {
        self.settings.read().await.clone()
    }

    /// Replace the cached settings row and persist it.
    pub async fn set_settings(&self, settings: PraylockSettings) {
        self.store.set_json(keys::SETTINGS_CACHE, &settings).await;
        *self.settings.write().await = Some(settings);
    }

    /// Apply an optimistic partial update from a change-feed row image.
    ///
    /// Unknown fields are ignored; a missing cached row makes this a no-op
    /// (the invalidation fallback refetches instead).
    pub async fn patch_settings(&self, row: &serde_json::Value) -> bool {
        let mut guard = self.settings.write().await;
        let Some(settings) = guard.as_mut() else {
            return false;
        };
        let mut patched = false;
        if let Some(enabled) = row.get("enabled").and_then(|v| v.as_bool()) {
            settings.enabled = enabled;
            patched = true;
        }
        if let Some(v) = row.get("morningCompleted").and_then(|v| v.as_bool()) {
            settings.morning_completed = v;
            patched = true;
        }
        if let Some(v) = row.get("eveningCompleted").and_then(|v| v.as_bool()) {
            settings.evening_completed = v;
            patched = true;
        }
        if let Some(v) = row.get("updatedAt").and_then(|v| v.as_i64()) {
            settings.updated_at = v;
        }
        patched
    }

    // ─── Invalidation ───────────────────────────────────────────────────

    /// Drop the cached copy of a table so the next read refetches.
    pub async fn invalidate(&self, table: &str) {
        match table {
            t if t == tables::PRAYERS => {
                *self.prayer_state.write().await = None;
            }
            t if t == tables::SETTINGS => {
                *self.settings.write().await = None;
            }
            other => debug!("invalidate for unknown table {other}, ignoring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_api::PrayerPair;
    use pl_core::report::LogReporter;
    use pl_store::MemoryBackend;

    fn cache() -> StateCache {
        let store = Arc::new(DurableStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            Arc::new(LogReporter),
        ));
        StateCache::new(store)
    }

    fn state_with_morning(prayer_id: &str) -> PrayerState {
        PrayerState {
            current_period: PrayerPeriod::Morning,
            current_window_available: true,
            prayers: PrayerPair {
                morning: Some(PrayerEntry {
                    id: prayer_id.into(),
                    text: Some("text".into()),
                    prayer_time_of_day: PrayerPeriod::Morning,
                    completed_at: None,
                    engaged_at: None,
                }),
                evening: None,
            },
        }
    }

    fn settings_row() -> PraylockSettings {
        PraylockSettings {
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
        }
    }

    #[tokio::test]
    async fn test_patch_completion_hits_cached_row() {
        let cache = cache();
        cache.set_prayer_state(state_with_morning("p1")).await;

        assert!(cache.patch_prayer_completion("p1", 123).await);
        let state = cache.prayer_state().await.unwrap();
        assert_eq!(state.prayers.morning.unwrap().completed_at, Some(123));
    }

    #[tokio::test]
    async fn test_patch_completion_misses_unknown_row() {
        let cache = cache();
        cache.set_prayer_state(state_with_morning("p1")).await;
        assert!(!cache.patch_prayer_completion("p-other", 123).await);
    }

    #[tokio::test]
    async fn test_patch_on_empty_cache_is_noop() {
        let cache = cache();
        assert!(!cache.patch_prayer_completion("p1", 123).await);
    }

    #[tokio::test]
    async fn test_invalidate_clears_prayers() {
        let cache = cache();
        cache.set_prayer_state(state_with_morning("p1")).await;
        cache.invalidate(tables::PRAYERS).await;
        assert!(cache.prayer_state().await.is_none());
    }

    #[tokio::test]
    async fn test_settings_persist_and_reload() {
        let store = Arc::new(DurableStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            Arc::new(LogReporter),
        ));

        let cache = StateCache::new(store.clone());
        cache.set_settings(settings_row()).await;

        // A fresh cache over the same store sees the persisted row.
        let fresh = StateCache::new(store);
        fresh.load().await;
        assert_eq!(fresh.settings().await.unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_patch_settings_partial_update() {
        let cache = cache();
        cache.set_settings(settings_row()).await;

        let patched = cache
            .patch_settings(&serde_json::json!({
                "morningCompleted": true,
                "updatedAt": 42
            }))
            .await;
        assert!(patched);

        let settings = cache.settings().await.unwrap();
        assert!(settings.morning_completed);
        assert!(!settings.evening_completed);
        assert_eq!(settings.updated_at, 42);
    }

    #[tokio::test]
    async fn test_remove_prayer() {
        let cache = cache();
        cache.set_prayer_state(state_with_morning("p1")).await;
        cache.remove_prayer("p1").await;
        assert!(cache.prayer_state().await.unwrap().prayers.morning.is_none());
    }
}
