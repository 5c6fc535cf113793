//! Shared test utilities for integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pl_api::{
    BlockSchedule, CompletePrayerParams, CompletePrayerResult, GeneratePrayerParams,
    GeneratePrayerResult, PrayerEndpoints, PrayerEntry, PrayerPair, PrayerState,
    PraylockSettings,
};
use pl_core::clock::ClockAnchor;
use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::error::{PlError, PlResult};
use pl_core::report::LogReporter;
use pl_core::PrayerPeriod;
use pl_services::blocker::{AppBlocker, MonitorEvent, MonitorInterval};
use pl_services::ServiceRegistry;
use pl_store::{DurableStore, MemoryBackend};

/// Remote boundary mock with a switchable online flag and call counters.
pub struct MockEndpoints {
    pub online: AtomicBool,
    pub complete_calls: AtomicUsize,
    pub completed: Mutex<Vec<(String, String)>>,
    pub settings: Mutex<Option<PraylockSettings>>,
    pub state: Mutex<Option<PrayerState>>,
    pub state_fetches: AtomicUsize,
}

impl MockEndpoints {
    pub fn new() -> Self {
        Self {
            online: AtomicBool::new(true),
            complete_calls: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
            settings: Mutex::new(None),
            state: Mutex::new(None),
            state_fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> PlResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlError::Http("offline".into()))
        }
    }
}

#[async_trait]
impl PrayerEndpoints for MockEndpoints {
    async fn complete_prayer(
        &self,
        params: &CompletePrayerParams,
    ) -> PlResult<CompletePrayerResult> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.completed
            .lock()
            .unwrap()
            .push((params.user_id.clone(), params.prayer_id.clone()));
        Ok(CompletePrayerResult {
            prayer_time_of_day: PrayerPeriod::Morning,
        })
    }

    async fn generate_prayer(
        &self,
        _params: &GeneratePrayerParams,
    ) -> PlResult<GeneratePrayerResult> {
        self.check_online()?;
        Ok(GeneratePrayerResult {
            prayer: "generated text".into(),
            prayer_id: "p-gen".into(),
        })
    }

    async fn mark_engaged(&self, _prayer_id: &str) -> PlResult<()> {
        self.check_online()
    }

    async fn current_prayer_state(&self, _user_id: &str) -> PlResult<PrayerState> {
        self.state_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        self.state
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlError::Http("no state".into()))
    }

    async fn praylock_settings(&self, _user_id: &str) -> PlResult<Option<PraylockSettings>> {
        self.check_online()?;
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn save_praylock_settings(
        &self,
        settings: &PraylockSettings,
    ) -> PlResult<PraylockSettings> {
        self.check_online()?;
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(settings.clone())
    }

    async fn clock_anchor(&self) -> PlResult<ClockAnchor> {
        self.check_online()?;
        Ok(ClockAnchor {
            server_now_epoch_ms: chrono::Utc::now().timestamp_millis(),
            timezone: Some("UTC".into()),
        })
    }
}

/// Blocker that counts every native command.
#[derive(Default)]
pub struct CountingBlocker {
    pub block_calls: AtomicUsize,
    pub unblock_calls: AtomicUsize,
    pub monitors: Mutex<Vec<String>>,
    pub blocked: AtomicBool,
}

#[async_trait]
impl AppBlocker for CountingBlocker {
    fn is_available(&self) -> bool {
        true
    }

    async fn set_selection(&self, _selection_id: &str, _token: &str) -> PlResult<()> {
        Ok(())
    }

    async fn block_selection(&self, _selection_id: &str) -> PlResult<()> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        self.blocked.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unblock_selection(&self, _selection_id: &str) -> PlResult<()> {
        self.unblock_calls.fetch_add(1, Ordering::SeqCst);
        self.blocked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start_monitoring(
        &self,
        activity_name: &str,
        _interval: &MonitorInterval,
        _events: &[MonitorEvent],
    ) -> PlResult<()> {
        self.monitors.lock().unwrap().push(activity_name.to_string());
        Ok(())
    }

    async fn stop_monitoring(&self, _activity_names: Option<&[String]>) -> PlResult<()> {
        self.monitors.lock().unwrap().clear();
        Ok(())
    }
}

/// Default settings row used across scenarios.
pub fn settings_row(enabled: bool, schedule: BlockSchedule) -> PraylockSettings {
    PraylockSettings {
        id: "sel-1".into(),
        user_id: "u1".into(),
        enabled,
        schedule,
        morning_completed: false,
        evening_completed: false,
        family_activity_selection: Some("selection-token".into()),
        blocked_apps: vec!["com.example.social".into()],
        created_at: 0,
        updated_at: 0,
    }
}

/// A prayer state with one morning prayer.
pub fn morning_state(completed: bool) -> PrayerState {
    PrayerState {
        current_period: PrayerPeriod::Morning,
        current_window_available: true,
        prayers: PrayerPair {
            morning: Some(PrayerEntry {
                id: "p1".into(),
                text: Some("morning prayer".into()),
                prayer_time_of_day: PrayerPeriod::Morning,
                completed_at: if completed { Some(1) } else { None },
                engaged_at: None,
            }),
            evening: None,
        },
    }
}

/// Test configuration: configured server, user u1, fast tunings.
pub fn test_config() -> ConfigHandle {
    let mut config = AppConfig::default();
    config.server.address = "https://api.test.invalid".into();
    config.server.auth_token = "test-token".into();
    config.account.user_id = "u1".into();
    config.account.timezone = "UTC".into();
    config.enforcement.debounce_secs = 0;
    ConfigHandle::new(config)
}

/// Build a full registry over mocks.
pub async fn build_registry(
    api: Arc<MockEndpoints>,
    blocker: Arc<CountingBlocker>,
) -> ServiceRegistry {
    let store = Arc::new(DurableStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        Arc::new(LogReporter),
    ));
    ServiceRegistry::build(test_config(), store, api, blocker, Arc::new(LogReporter)).await
}

/// Pin a clock to 10:00 UTC (mid-morning window) on a fixed date so
/// period-dependent assertions do not depend on when the test runs.
pub fn pin_morning(clock: &pl_core::clock::CanonicalClock) {
    use chrono::TimeZone;
    clock.resync(ClockAnchor {
        server_now_epoch_ms: chrono::Utc
            .with_ymd_and_hms(2025, 6, 15, 10, 0, 0)
            .unwrap()
            .timestamp_millis(),
        timezone: Some("UTC".into()),
    });
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_until<F>(mut check: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    check()
}
