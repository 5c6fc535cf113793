//! PRAYLOCK background enforcement manager.
//!
//! Keeps the device's native app-blocking state consistent with "is the
//! active window's prayer completed", even while the app is backgrounded
//! or killed. The primary mechanism is the native recurring schedule (one
//! monitored interval per enabled period, with an explicit timezone); the
//! foreground check here is a secondary reconciliation pass for drift and
//! races.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use pl_api::{PraylockSettings, PrayerEndpoints};
use pl_core::clock::CanonicalClock;
use pl_core::config::EnforcementConfig;
use pl_core::constants::{EVENING_START_HOUR, MORNING_START_HOUR};
use pl_core::error::{PlError, PlResult};
use pl_core::PrayerPeriod;

use crate::blocker::{AppBlocker, MonitorEvent, MonitorInterval};
use crate::cache::StateCache;
use crate::event_bus::{AppEvent, EventBus};
use crate::service::{Service, ServiceState, StateCell};

/// Reconciles native blocking with server-known completion state.
pub struct EnforcementManager {
    blocker: Arc<dyn AppBlocker>,
    api: Arc<dyn PrayerEndpoints>,
    cache: Arc<StateCache>,
    clock: Arc<CanonicalClock>,
    bus: EventBus,
    config: EnforcementConfig,
    user_id: String,
    state: StateCell,
    /// Last reconciliation, for the debounce window.
    last_check: Mutex<Option<Instant>>,
    /// Whether we believe blocking is currently applied.
    blocking_active: AtomicBool,
}

impl EnforcementManager {
    /// Create a manager. The blocker is selected once by the composition
    /// root (real or no-op), so nothing here checks for capability.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blocker: Arc<dyn AppBlocker>,
        api: Arc<dyn PrayerEndpoints>,
        cache: Arc<StateCache>,
        clock: Arc<CanonicalClock>,
        bus: EventBus,
        config: EnforcementConfig,
        user_id: String,
    ) -> Self {
        Self {
            blocker,
            api,
            cache,
            clock,
            bus,
            config,
            user_id,
            state: StateCell::new(),
            last_check: Mutex::new(None),
            blocking_active: AtomicBool::new(false),
        }
    }

    /// Whether blocking is believed active right now.
    pub fn is_blocking_active(&self) -> bool {
        self.blocking_active.load(Ordering::SeqCst)
    }

    /// Initialize enforcement: reconcile the cached settings row against
    /// the server and install the native schedule.
    pub async fn init(&self) {
        if !self.blocker.is_available() {
            debug!("blocking capability absent; enforcement runs as no-ops");
        }

        let settings = self.refresh_settings().await;
        match settings {
            Some(settings) if settings.enabled => {
                if let Some(token) = settings.family_activity_selection.as_deref() {
                    self.native_call(
                        "set_selection",
                        &settings.id,
                        self.blocker.set_selection(&settings.id, token),
                    )
                    .await;
                }
                self.apply_schedule(&settings).await;
            }
            Some(settings) => {
                // enabled=false must leave no native blocking behind.
                self.ensure_unblocked(&settings.id).await;
                self.native_call("stop_monitoring", "all", self.blocker.stop_monitoring(None))
                    .await;
            }
            None => debug!("no settings row yet; enforcement idle"),
        }
    }

    /// Fetch the authoritative settings row, falling back to the cached
    /// copy when the fetch fails.
    pub async fn refresh_settings(&self) -> Option<PraylockSettings> {
        match self.api.praylock_settings(&self.user_id).await {
            Ok(Some(settings)) => {
                self.cache.set_settings(settings.clone()).await;
                Some(settings)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("settings fetch failed, using cached row: {e}");
                self.cache.settings().await
            }
        }
    }

    /// Reconcile blocking with completion state.
    ///
    /// Debounced: repeated foreground events within the configured window
    /// collapse into one pass. Safe to call redundantly.
    pub async fn check_and_enforce(&self) {
        {
            let mut last = self.last_check.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = *last {
                if at.elapsed() < self.config.debounce() {
                    debug!("enforcement check within debounce window, skipping");
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        let settings = match self.cache.settings().await {
            Some(settings) => Some(settings),
            None => self.refresh_settings().await,
        };
        let Some(settings) = settings else {
            debug!("no settings row; nothing to enforce");
            return;
        };

        if !settings.enabled {
            self.ensure_unblocked(&settings.id).await;
            return;
        }

        let period = self.clock.current_period(None);
        if !settings.schedule.covers(period) {
            // Outside the scheduled windows nothing should stay blocked.
            self.ensure_unblocked(&settings.id).await;
            return;
        }

        let completed = self.current_completed(period, &settings).await;
        if completed {
            // Heal a prior over-block from a lost race.
            self.ensure_unblocked(&settings.id).await;
            return;
        }

        if self
            .native_call(
                "block_selection",
                &settings.id,
                self.blocker.block_selection(&settings.id),
            )
            .await
        {
            if !self.blocking_active.swap(true, Ordering::SeqCst) {
                info!("blocking enforced for {period} window");
                self.bus.emit(AppEvent::BlockingChanged { active: true });
            }
        }
    }

    /// Completion state for the period, preferring the remote source of
    /// truth and degrading to the settings row flags when offline.
    async fn current_completed(&self, period: PrayerPeriod, settings: &PraylockSettings) -> bool {
        match self.api.current_prayer_state(&self.user_id).await {
            Ok(state) => {
                self.cache.set_prayer_state(state.clone()).await;
                state
                    .prayers
                    .for_period(period)
                    .map(|p| p.is_completed())
                    .unwrap_or(false)
            }
            Err(e) => {
                warn!("prayer state fetch failed, using settings flags: {e}");
                settings.completed_for(period)
            }
        }
    }

    /// Lift blocking if we believe it is applied.
    async fn ensure_unblocked(&self, selection_id: &str) {
        if !self.blocking_active.load(Ordering::SeqCst) {
            return;
        }
        if self
            .native_call(
                "unblock_selection",
                selection_id,
                self.blocker.unblock_selection(selection_id),
            )
            .await
        {
            self.blocking_active.store(false, Ordering::SeqCst);
            info!("blocking lifted");
            self.bus.emit(AppEvent::BlockingChanged { active: false });
        }
    }

    /// Install one recurring native interval per enabled period.
    ///
    /// This is the primary enforcement mechanism: it fires at interval
    /// start even while the app process is not running.
    pub async fn apply_schedule(&self, settings: &PraylockSettings) {
        self.native_call("stop_monitoring", "all", self.blocker.stop_monitoring(None))
            .await;

        if !settings.enabled {
            return;
        }

        let timezone = self
            .clock
            .timezone()
            .unwrap_or_else(|| "UTC".to_string());

        for period in settings.schedule.periods() {
            let (start_hour, end_hour) = match period {
                PrayerPeriod::Morning => (MORNING_START_HOUR, EVENING_START_HOUR),
                PrayerPeriod::Evening => (EVENING_START_HOUR, MORNING_START_HOUR),
            };
            let interval = MonitorInterval {
                start_hour,
                end_hour,
                timezone: timezone.clone(),
                repeats: true,
            };
            let activity = self.activity_name(*period);
            self.native_call(
                "start_monitoring",
                &activity,
                self.blocker.start_monitoring(
                    &activity,
                    &interval,
                    &[MonitorEvent::IntervalStart, MonitorEvent::IntervalEnd],
                ),
            )
            .await;
        }
    }

    /// Manual entry point for the app-level background-refresh hook.
    ///
    /// Called when the hook detects the active period changed; redundant
    /// calls are absorbed by the debounce.
    pub async fn trigger_background_check(&self) {
        debug!("background enforcement check requested");
        self.bus.emit(AppEvent::PeriodChanged {
            period: self.clock.current_period(None),
        });
        self.check_and_enforce().await;
    }

    /// Lift blocking and remove the native schedule.
    pub async fn deactivate(&self) {
        let selection_id = self
            .cache
            .settings()
            .await
            .map(|s| s.id)
            .unwrap_or_else(|| "selection".to_string());
        // Each step proceeds even when the previous one failed.
        self.ensure_unblocked(&selection_id).await;
        self.native_call("stop_monitoring", "all", self.blocker.stop_monitoring(None))
            .await;
    }

    fn activity_name(&self, period: PrayerPeriod) -> String {
        format!("{}-{}", self.config.activity_prefix, period)
    }

    /// Run one native call raced against the configured timeout, logging
    /// failure with enough context to diagnose. Returns success. A single
    /// failure never aborts the caller's remaining independent calls.
    async fn native_call(
        &self,
        what: &str,
        context: &str,
        fut: impl std::future::Future<Output = PlResult<()>>,
    ) -> bool {
        let result = match tokio::time::timeout(self.config.native_call_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(PlError::Timeout(format!(
                "native call exceeded {:?}",
                self.config.native_call_timeout()
            ))),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("native {what} failed ({context}): {e}");
                false
            }
        }
    }
}

impl Service for EnforcementManager {
    fn name(&self) -> &str {
        "enforcement"
    }

    fn state(&self) -> ServiceState {
        self.state.get()
    }

    fn start(&self) -> PlResult<()> {
        self.state.set(ServiceState::Running);
        Ok(())
    }

    fn stop(&self) -> PlResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}
