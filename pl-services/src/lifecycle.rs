//! Application lifecycle management.
//!
//! Owns the phase machine for startup, shutdown, and foreground/background
//! transitions, and translates those transitions into bus events the rest
//! of the engine reacts to (queue passes, enforcement checks, subscription
//! verification).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use pl_api::PrayerEndpoints;
use pl_core::clock::{CanonicalClock, ClockTicker};
use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;

use crate::event_bus::{AppEvent, EventBus};
use crate::service::{Service, ServiceState, StateCell};

/// Application lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Application has not started yet.
    NotStarted,
    /// Application is initializing.
    Starting,
    /// Application is running in the foreground.
    Foreground,
    /// Application is running in the background.
    Background,
    /// Application is shutting down.
    ShuttingDown,
    /// Application has stopped.
    Stopped,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Starting => write!(f, "starting"),
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
            Self::ShuttingDown => write!(f, "shutting_down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Service responsible for application lifecycle transitions.
pub struct LifecycleService {
    state: StateCell,
    config: ConfigHandle,
    bus: EventBus,
    ticker: ClockTicker,
    phase: Mutex<LifecyclePhase>,
    /// Last known connectivity; transitions drive queue passes.
    online: AtomicBool,
}

impl LifecycleService {
    /// Create a new LifecycleService.
    pub fn new(config: ConfigHandle, bus: EventBus, ticker: ClockTicker) -> Self {
        Self {
            state: StateCell::new(),
            config,
            bus,
            ticker,
            phase: Mutex::new(LifecyclePhase::NotStarted),
            online: AtomicBool::new(true),
        }
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Whether the application is in the foreground.
    pub fn is_foreground(&self) -> bool {
        self.phase() == LifecyclePhase::Foreground
    }

    /// Whether the device is believed online.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Run the startup sequence.
    ///
    /// Validates configuration, resyncs the canonical clock from a fresh
    /// server anchor, and transitions to the foreground phase. A failed
    /// anchor fetch is tolerated; the clock keeps its device seed until
    /// the next resync.
    pub async fn startup(
        &self,
        api: &dyn PrayerEndpoints,
        clock: &CanonicalClock,
    ) -> PlResult<()> {
        info!("starting application lifecycle");
        self.set_phase(LifecyclePhase::Starting);

        {
            let config = self.config.read().await;
            if !config.is_server_configured() {
                warn!("server not configured - entering setup mode");
                self.set_phase(LifecyclePhase::Foreground);
                return Ok(());
            }
        }

        match api.clock_anchor().await {
            Ok(anchor) => {
                clock.resync(anchor);
                debug!("clock resynced from server anchor");
            }
            Err(e) => warn!("clock anchor fetch failed, keeping local seed: {e}"),
        }

        self.set_phase(LifecyclePhase::Foreground);
        self.bus.emit(AppEvent::AppForegrounded);
        info!("startup complete (phase: foreground)");
        Ok(())
    }

    /// Transition to the background phase.
    pub fn enter_background(&self) {
        if self.phase() != LifecyclePhase::Foreground {
            debug!("ignoring enter_background in phase: {}", self.phase());
            return;
        }
        self.set_phase(LifecyclePhase::Background);
        self.bus.emit(AppEvent::AppBackgrounded);
        info!("entered background mode");
    }

    /// Transition back to the foreground phase.
    ///
    /// Emits the foreground event that drives queue passes, enforcement
    /// reconciliation, and subscription verification, and injects the
    /// foreground tick for clock listeners.
    pub fn enter_foreground(&self) {
        if self.phase() != LifecyclePhase::Background {
            debug!("ignoring enter_foreground in phase: {}", self.phase());
            return;
        }
        self.set_phase(LifecyclePhase::Foreground);
        self.ticker.notify_foreground();
        self.bus.emit(AppEvent::AppForegrounded);
        info!("entered foreground mode");
    }

    /// Record a connectivity change; the offline→online edge triggers
    /// queue processing via the bus.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!("connectivity changed: online={online}");
            self.bus.emit(AppEvent::ConnectivityChanged { online });
        }
    }

    /// Run the shutdown sequence: persist configuration and stop.
    pub async fn shutdown_sequence(&self) -> PlResult<()> {
        info!("starting shutdown sequence");
        self.set_phase(LifecyclePhase::ShuttingDown);

        match self.config.save().await {
            Ok(()) => debug!("configuration saved"),
            Err(e) => warn!("failed to save configuration during shutdown: {e}"),
        }

        self.set_phase(LifecyclePhase::Stopped);
        info!("shutdown sequence complete");
        Ok(())
    }
}

impl Service for LifecycleService {
    fn name(&self) -> &str {
        "lifecycle"
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
        self.set_phase(LifecyclePhase::Stopped);
        Ok(())
    }
}
