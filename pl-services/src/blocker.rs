//! Native app-blocking strategy interface.
//!
//! The platform's blocking capability (screen-time style app restriction)
//! is behind one trait with two implementations chosen once at startup: a
//! real bridge on capable devices and a no-op everywhere else (simulator,
//! unsupported OS). Call sites never check for presence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use pl_core::error::{PlError, PlResult};

/// A recurring device-local enforcement interval.
///
/// Carries an explicit timezone identifier because the native scheduler
/// defaults to UTC otherwise, which silently shifts the window for every
/// user not living at Greenwich.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInterval {
    /// Local hour the interval starts (inclusive).
    pub start_hour: u32,
    /// Local hour the interval ends (exclusive).
    pub end_hour: u32,
    /// IANA timezone identifier the hours are interpreted in.
    pub timezone: String,
    /// Whether the interval repeats daily.
    pub repeats: bool,
}

/// Events the native monitor reports back at interval boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The interval began: apply blocking.
    IntervalStart,
    /// The interval ended: lift blocking.
    IntervalEnd,
}

/// The native blocking primitive.
///
/// Every method is failable and callers wrap each call individually: one
/// failed command must not abort the independent commands after it.
#[async_trait]
pub trait AppBlocker: Send + Sync {
    /// Whether a real blocking capability backs this implementation.
    fn is_available(&self) -> bool;

    /// Register the user's picked app selection under an id.
    async fn set_selection(&self, selection_id: &str, token: &str) -> PlResult<()>;

    /// Apply blocking for a registered selection.
    async fn block_selection(&self, selection_id: &str) -> PlResult<()>;

    /// Lift blocking for a registered selection.
    async fn unblock_selection(&self, selection_id: &str) -> PlResult<()>;

    /// Schedule a recurring monitored interval that applies blocking at
    /// interval start even while the app process is not running.
    async fn start_monitoring(
        &self,
        activity_name: &str,
        interval: &MonitorInterval,
        events: &[MonitorEvent],
    ) -> PlResult<()>;

    /// Stop the named monitors, or all of them when `None`.
    async fn stop_monitoring(&self, activity_names: Option<&[String]>) -> PlResult<()>;
}

/// Real bridge to the device blocking capability.
///
/// Tracks registered selections, active blocks, and scheduled monitors so
/// reconciliation can ask "what is the device actually doing" cheaply.
#[derive(Debug, Default)]
pub struct DeviceBlocker {
    selections: Mutex<HashMap<String, String>>,
    blocked: Mutex<HashSet<String>>,
    monitors: Mutex<HashMap<String, MonitorInterval>>,
}

impl DeviceBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a selection is currently blocked.
    pub fn is_blocked(&self, selection_id: &str) -> bool {
        self.blocked.lock().unwrap_or_else(|e| e.into_inner()).contains(selection_id)
    }

    /// Names of the currently scheduled monitors.
    pub fn active_monitors(&self) -> Vec<String> {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AppBlocker for DeviceBlocker {
    fn is_available(&self) -> bool {
        true
    }

    async fn set_selection(&self, selection_id: &str, token: &str) -> PlResult<()> {
        // In a full build this hands the opaque selection token to the
        // OS screen-time bridge; the engine only tracks the registration.
        self.selections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(selection_id.to_string(), token.to_string());
        debug!("selection {selection_id} registered");
        Ok(())
    }

    async fn block_selection(&self, selection_id: &str) -> PlResult<()> {
        let known = self
            .selections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(selection_id);
        if !known {
            return Err(PlError::Blocking(format!(
                "unknown selection {selection_id}"
            )));
        }
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(selection_id.to_string());
        info!("blocking applied for selection {selection_id}");
        Ok(())
    }

    async fn unblock_selection(&self, selection_id: &str) -> PlResult<()> {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(selection_id);
        info!("blocking lifted for selection {selection_id}");
        Ok(())
    }

    async fn start_monitoring(
        &self,
        activity_name: &str,
        interval: &MonitorInterval,
        _events: &[MonitorEvent],
    ) -> PlResult<()> {
        if interval.timezone.is_empty() {
            return Err(PlError::Blocking(format!(
                "monitor {activity_name} has no timezone; refusing UTC default"
            )));
        }
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(activity_name.to_string(), interval.clone());
        info!(
            "monitoring {activity_name}: {:02}:00-{:02}:00 {}",
            interval.start_hour, interval.end_hour, interval.timezone
        );
        Ok(())
    }

    async fn stop_monitoring(&self, activity_names: Option<&[String]>) -> PlResult<()> {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        match activity_names {
            Some(names) => {
                for name in names {
                    monitors.remove(name);
                }
            }
            None => monitors.clear(),
        }
        Ok(())
    }
}

/// No-op implementation for platforms without the blocking capability.
///
/// Installed once at startup; every call succeeds and does nothing, so
/// the rest of the engine never branches on capability.
#[derive(Debug, Default)]
pub struct NoopBlocker;

#[async_trait]
impl AppBlocker for NoopBlocker {
    fn is_available(&self) -> bool {
        false
    }

    async fn set_selection(&self, _selection_id: &str, _token: &str) -> PlResult<()> {
        Ok(())
    }

    async fn block_selection(&self, _selection_id: &str) -> PlResult<()> {
        Ok(())
    }

    async fn unblock_selection(&self, _selection_id: &str) -> PlResult<()> {
        Ok(())
    }

    async fn start_monitoring(
        &self,
        _activity_name: &str,
        _interval: &MonitorInterval,
        _events: &[MonitorEvent],
    ) -> PlResult<()> {
        Ok(())
    }

    async fn stop_monitoring(&self, _activity_names: Option<&[String]>) -> PlResult<()> {
        Ok(())
    }
}

/// Probe the platform and pick the blocker implementation once.
pub fn select_blocker() -> std::sync::Arc<dyn AppBlocker> {
    if capability_present() {
        info!("device blocking capability present");
        std::sync::Arc::new(DeviceBlocker::new())
    } else {
        info!("device blocking capability absent, installing no-op blocker");
        std::sync::Arc::new(NoopBlocker)
    }
}

/// Whether this build/platform carries the native blocking capability.
fn capability_present() -> bool {
    cfg!(any(target_os = "ios", target_os = "android", target_os = "macos"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval() -> MonitorInterval {
        MonitorInterval {
            start_hour: 4,
            end_hour: 16,
            timezone: "America/Chicago".into(),
            repeats: true,
        }
    }

    #[tokio::test]
    async fn test_device_blocker_block_unblock() {
        let blocker = DeviceBlocker::new();
        blocker.set_selection("sel-1", "token").await.unwrap();

        blocker.block_selection("sel-1").await.unwrap();
        assert!(blocker.is_blocked("sel-1"));

        blocker.unblock_selection("sel-1").await.unwrap();
        assert!(!blocker.is_blocked("sel-1"));
    }

    #[tokio::test]
    async fn test_block_unknown_selection_fails() {
        let blocker = DeviceBlocker::new();
        assert!(blocker.block_selection("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_unblock_is_idempotent() {
        let blocker = DeviceBlocker::new();
        blocker.unblock_selection("never-blocked").await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_requires_timezone() {
        let blocker = DeviceBlocker::new();
        let mut bad = interval();
        bad.timezone = String::new();
        assert!(blocker
            .start_monitoring("praylock-morning", &bad, &[MonitorEvent::IntervalStart])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let blocker = DeviceBlocker::new();
        blocker
            .start_monitoring("praylock-morning", &interval(), &[MonitorEvent::IntervalStart])
            .await
            .unwrap();
        blocker
            .start_monitoring("praylock-evening", &interval(), &[MonitorEvent::IntervalStart])
            .await
            .unwrap();
        assert_eq!(blocker.active_monitors().len(), 2);

        blocker
            .stop_monitoring(Some(&["praylock-morning".to_string()]))
            .await
            .unwrap();
        assert_eq!(blocker.active_monitors(), vec!["praylock-evening".to_string()]);

        blocker.stop_monitoring(None).await.unwrap();
        assert!(blocker.active_monitors().is_empty());
    }

    #[tokio::test]
    async fn test_noop_blocker_accepts_everything() {
        let blocker = NoopBlocker;
        assert!(!blocker.is_available());
        blocker.set_selection("s", "t").await.unwrap();
        blocker.block_selection("s").await.unwrap();
        blocker.unblock_selection("s").await.unwrap();
        blocker
            .start_monitoring("a", &interval(), &[MonitorEvent::IntervalStart])
            .await
            .unwrap();
        blocker.stop_monitoring(None).await.unwrap();
    }
}
