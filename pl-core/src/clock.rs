//! Canonical clock and prayer-window arithmetic.
//!
//! Single source of truth for "now" and for window math. Time is anchored
//! to a server-supplied epoch and advanced with a monotonic counter, so the
//! result never depends solely on the device wall clock (which may be wrong
//! or deliberately changed). Window arithmetic uses explicit IANA timezone
//! conversion so it stays correct when the device timezone differs from the
//! user's configured one.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::constants::{EVENING_START_HOUR, MORNING_START_HOUR};

/// One of the two daily prayer windows.
///
/// Hours [4, 16) in the canonical timezone belong to the morning window,
/// everything else to the evening window. The two partition all 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerPeriod {
    Morning,
    Evening,
}

impl PrayerPeriod {
    /// Derive the period from a local hour of day.
    pub fn from_hour(hour: u32) -> Self {
        if (MORNING_START_HOUR..EVENING_START_HOUR).contains(&hour) {
            PrayerPeriod::Morning
        } else {
            PrayerPeriod::Evening
        }
    }

    /// Wire/storage string for this period.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerPeriod::Morning => "morning",
            PrayerPeriod::Evening => "evening",
        }
    }
}

impl std::fmt::Display for PrayerPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Server-supplied time anchor used to correct local clock drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockAnchor {
    /// Server epoch time in milliseconds at the moment the anchor was issued.
    #[serde(rename = "serverNowEpochMs")]
    pub server_now_epoch_ms: i64,

    /// Canonical IANA timezone for the user, if the server knows it.
    #[serde(default)]
    pub timezone: Option<String>,
}

struct ClockState {
    anchor_ms: i64,
    anchored_at: Instant,
    timezone: Option<String>,
}

/// Drift-corrected clock anchored to server time.
///
/// Between resyncs, `now_ms` is the stored anchor plus the elapsed reading
/// of a monotonic counter, so it keeps advancing correctly even if the
/// user changes the device wall clock.
pub struct CanonicalClock {
    inner: RwLock<ClockState>,
}

impl CanonicalClock {
    /// Create a clock seeded from the device wall clock.
    ///
    /// Until the first `resync`, the device clock is the best anchor
    /// available; every later anchor replaces it.
    pub fn new(default_timezone: Option<String>) -> Self {
        let timezone = default_timezone.filter(|tz| !tz.is_empty());
        Self {
            inner: RwLock::new(ClockState {
                anchor_ms: Utc::now().timestamp_millis(),
                anchored_at: Instant::now(),
                timezone,
            }),
        }
    }

    /// Re-anchor the clock to a fresh server timestamp.
    ///
    /// Stores the timezone only when the anchor carries a non-empty one.
    pub fn resync(&self, anchor: ClockAnchor) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.anchor_ms = anchor.server_now_epoch_ms;
        state.anchored_at = Instant::now();
        if let Some(tz) = anchor.timezone.filter(|tz| !tz.is_empty()) {
            state.timezone = Some(tz);
        }
        debug!("clock resynced to anchor {}", state.anchor_ms);
    }

    /// Drift-corrected "now" in epoch milliseconds.
    ///
    /// Monotonic between resyncs regardless of wall-clock changes.
    pub fn now_ms(&self) -> i64 {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        state.anchor_ms + state.anchored_at.elapsed().as_millis() as i64
    }

    /// Drift-corrected "now" as a UTC datetime.
    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// The canonical timezone, if one has been configured or synced.
    pub fn timezone(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .timezone
            .clone()
    }

    /// The currently active prayer period.
    ///
    /// Uses the given timezone if provided, else the canonical one; an
    /// invalid IANA name falls back to device-local time with a warning.
    /// Never fails.
    pub fn current_period(&self, timezone: Option<&str>) -> PrayerPeriod {
        Self::period_for(self.now_ms(), self.resolve_tz(timezone))
    }

    /// Whether "now" falls inside a prayer window.
    ///
    /// Always true today: every hour belongs to exactly one window. Kept
    /// as the single predicate to edit if gaps between windows are ever
    /// introduced.
    pub fn is_in_window(&self, timezone: Option<&str>) -> bool {
        let _ = self.current_period(timezone);
        true
    }

    /// The most recent morning-window boundary (hour 4 local) not after
    /// "now", in epoch milliseconds. Buckets "today's" prayers.
    pub fn day_start_ms(&self, timezone: Option<&str>) -> i64 {
        Self::day_start_for(self.now_ms(), self.resolve_tz(timezone))
    }

    /// Pure period derivation for a timestamp, used directly by tests.
    pub fn period_for(ts_ms: i64, tz: Option<Tz>) -> PrayerPeriod {
        let utc = Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now);
        let hour = match tz {
            Some(tz) => utc.with_timezone(&tz).hour(),
            None => utc.with_timezone(&chrono::Local).hour(),
        };
        PrayerPeriod::from_hour(hour)
    }

    /// Pure day-start derivation for a timestamp.
    pub fn day_start_for(ts_ms: i64, tz: Option<Tz>) -> i64 {
        let utc = Utc.timestamp_millis_opt(ts_ms).single().unwrap_or_else(Utc::now);
        let start = match tz {
            Some(tz) => day_start_in(&utc, &tz),
            None => day_start_in(&utc, &chrono::Local),
        };
        // A DST gap can make 04:00 nonexistent; degrade to "now" so the
        // boundary never lands in the future.
        start.unwrap_or(ts_ms)
    }

    fn resolve_tz(&self, timezone: Option<&str>) -> Option<Tz> {
        let name = timezone
            .map(str::to_owned)
            .filter(|tz| !tz.is_empty())
            .or_else(|| self.timezone());
        let name = name?;
        match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!("invalid timezone {name:?}, falling back to device-local time");
                None
            }
        }
    }
}

/// The most recent local 04:00 at or before `utc` in the given timezone.
fn day_start_in<T: TimeZone>(utc: &DateTime<Utc>, tz: &T) -> Option<i64> {
    let local = utc.with_timezone(tz);
    let date = if local.hour() < MORNING_START_HOUR {
        local.date_naive().pred_opt()?
    } else {
        local.date_naive()
    };
    tz.with_ymd_and_hms(date.year(), date.month(), date.day(), MORNING_START_HOUR, 0, 0)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Ticks delivered to clock listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// Minute-granularity timer tick.
    Minute,
    /// The app transitioned to the foreground.
    Foreground,
}

struct TickerInner {
    tx: broadcast::Sender<ClockTick>,
    subscribers: Mutex<usize>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    interval_secs: u64,
}

/// Reference-counted tick source.
///
/// The underlying interval task starts when the first listener subscribes
/// and is torn down when the last subscription drops. Foreground ticks are
/// injected by the lifecycle layer via `notify_foreground`.
#[derive(Clone)]
pub struct ClockTicker {
    inner: Arc<TickerInner>,
}

impl ClockTicker {
    /// Create a ticker with the given interval between `Minute` ticks.
    pub fn new(interval_secs: u64) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(TickerInner {
                tx,
                subscribers: Mutex::new(0),
                task: Mutex::new(None),
                interval_secs,
            }),
        }
    }

    /// Subscribe to ticks, starting the timer task if this is the first
    /// listener. Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> TickSubscription {
        let rx = self.inner.tx.subscribe();
        {
            let mut count = self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            *count += 1;
            if *count == 1 {
                let tx = self.inner.tx.clone();
                let secs = self.inner.interval_secs;
                let handle = tokio::spawn(async move {
                    let mut interval =
                        tokio::time::interval(std::time::Duration::from_secs(secs.max(1)));
                    // The first tick fires immediately; skip it.
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        let _ = tx.send(ClockTick::Minute);
                    }
                });
                *self.inner.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
            }
        }
        TickSubscription {
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Inject a foreground tick for all current listeners.
    pub fn notify_foreground(&self) {
        let _ = self.inner.tx.send(ClockTick::Foreground);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        *self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A live tick subscription. Dropping it releases the listener slot and
/// stops the timer task when no listeners remain.
pub struct TickSubscription {
    rx: broadcast::Receiver<ClockTick>,
    inner: Arc<TickerInner>,
}

impl TickSubscription {
    /// Receive the next tick.
    pub async fn recv(&mut self) -> Result<ClockTick, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        let mut count = self.inner.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            if let Some(handle) = self.inner.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
                handle.abort();
            }
        }
    }
}
