//! Typed event bus for intra-service communication.
//!
//! Uses tokio broadcast channels to decouple components from one another.
//! Any component can emit events without knowing who is listening, and any
//! number of subscribers can independently consume them. Cache
//! invalidation rides the same bus as the domain notifications so the
//! invalidation path works even when a direct cache patch was missed.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use pl_core::clock::PrayerPeriod;

/// All application-level events that flow through the event bus.
///
/// These are processed, application-meaningful state changes, distinct
/// from raw change-feed notifications.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// A prayer was confirmed completed (queue success or remote change).
    PrayerCompleted {
        user_id: String,
        prayer_id: String,
    },
    /// A prayer was generated and is ready to display.
    PrayerGenerated {
        user_id: String,
        prayer_id: String,
    },
    /// A prayer was marked engaged.
    PrayerEngaged {
        prayer_id: String,
    },
    /// The PRAYLOCK settings row changed.
    SettingsUpdated {
        user_id: String,
    },
    /// A cached table should be refetched on next read.
    CacheInvalidated {
        table: String,
    },
    /// The active prayer period rolled over.
    PeriodChanged {
        period: PrayerPeriod,
    },
    /// Network connectivity changed.
    ConnectivityChanged {
        online: bool,
    },
    /// The app moved to the foreground.
    AppForegrounded,
    /// The app moved to the background.
    AppBackgrounded,
    /// Native blocking was activated or lifted.
    BlockingChanged {
        active: bool,
    },
}

/// Application-wide event bus backed by a tokio broadcast channel.
///
/// Designed for fan-out delivery: every subscriber gets every event. Slow
/// subscribers that fall behind receive a `Lagged` error and may miss
/// events, which is acceptable for consumers that reconcile on their next
/// trigger anyway.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<AppEvent>>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to receive application events.
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: AppEvent) {
        let label = event_label(&event);
        match self.sender.send(event) {
            Ok(count) => {
                debug!("event_bus: emitted {label} to {count} subscriber(s)");
            }
            Err(_) => {
                debug!("event_bus: no subscribers for {label}");
            }
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Human-readable label for an event (for logging).
fn event_label(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::PrayerCompleted { .. } => "PrayerCompleted",
        AppEvent::PrayerGenerated { .. } => "PrayerGenerated",
        AppEvent::PrayerEngaged { .. } => "PrayerEngaged",
        AppEvent::SettingsUpdated { .. } => "SettingsUpdated",
        AppEvent::CacheInvalidated { .. } => "CacheInvalidated",
        AppEvent::PeriodChanged { .. } => "PeriodChanged",
        AppEvent::ConnectivityChanged { .. } => "ConnectivityChanged",
        AppEvent::AppForegrounded => "AppForegrounded",
        AppEvent::AppBackgrounded => "AppBackgrounded",
        AppEvent::BlockingChanged { .. } => "BlockingChanged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(AppEvent::PrayerCompleted {
            user_id: "u1".into(),
            prayer_id: "p1".into(),
        });

        let event = rx.recv().await.unwrap();
        match event {
            AppEvent::PrayerCompleted { user_id, prayer_id } => {
                assert_eq!(user_id, "u1");
                assert_eq!(prayer_id, "p1");
            }
            _ => panic!("unexpected event type"),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(AppEvent::ConnectivityChanged { online: true });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                AppEvent::ConnectivityChanged { online } => assert!(online),
                _ => panic!("unexpected event type"),
            }
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(AppEvent::AppForegrounded);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_labels() {
        assert_eq!(
            event_label(&AppEvent::CacheInvalidated { table: "prayers".into() }),
            "CacheInvalidated"
        );
        assert_eq!(event_label(&AppEvent::AppBackgrounded), "AppBackgrounded");
    }
}
