//! Change-feed event types and dispatcher.
//!
//! Each notification from the backend describes one row change: the table,
//! the action, and the new/old row images. Events are ephemeral; they drive
//! cache patches and invalidation, never persistence.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Row-change action carried on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    /// A row was inserted (`INSERT`).
    Insert,
    /// A row was updated (`UPDATE`).
    Update,
    /// A row was deleted (`DELETE`).
    Delete,
    /// Unknown/unhandled action.
    Unknown(String),
}

impl ChangeAction {
    /// Parse the wire action string.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Convert to the wire action string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

/// One row-change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The change action.
    #[serde(rename = "eventType")]
    pub action: ChangeAction,
    /// Table the change happened on.
    pub table: String,
    /// New row image (inserts and updates).
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    /// Old row image (updates and deletes).
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Field value from the new row image.
    pub fn new_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.new.as_ref().and_then(|row| row.get(name))
    }

    /// Field value from the old row image.
    pub fn old_field(&self, name: &str) -> Option<&serde_json::Value> {
        self.old.as_ref().and_then(|row| row.get(name))
    }

    /// Whether this update set a previously-null field to a value.
    ///
    /// The completion detector: an UPDATE where `completed_at` transitions
    /// null -> non-null is a prayer completion, not a plain edit.
    pub fn field_became_set(&self, name: &str) -> bool {
        if self.action != ChangeAction::Update {
            return false;
        }
        let was_null = self
            .old_field(name)
            .map(|v| v.is_null())
            .unwrap_or(true);
        let now_set = self
            .new_field(name)
            .map(|v| !v.is_null())
            .unwrap_or(false);
        was_null && now_set
    }

    /// Row id from the new image, falling back to the old image.
    pub fn row_id(&self) -> Option<&str> {
        self.new_field("id")
            .or_else(|| self.old_field("id"))
            .and_then(|v| v.as_str())
    }
}

/// Broadcast-based dispatcher for change events.
///
/// Fan-out delivery: every subscriber gets every event. Slow subscribers
/// that fall behind receive a `Lagged` error and miss events, which is
/// acceptable because the invalidation fallback refetches on the next
/// consumer-side miss.
#[derive(Clone)]
pub struct ChangeDispatcher {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeDispatcher {
    /// Create a dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Dispatch an event to all active subscribers.
    pub fn dispatch(&self, event: ChangeEvent) {
        let label = format!("{} {}", event.action.as_str(), event.table);
        match self.sender.send(event) {
            Ok(count) => debug!("dispatched {label} to {count} subscriber(s)"),
            Err(_) => debug!("no subscribers for {label}"),
        }
    }

    /// Get the current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Connection state for the realtime subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Attempting to establish the subscription.
    Connecting,
    /// Subscribed and receiving notifications.
    Connected,
    /// Subscription lost, attempting to resubscribe.
    Reconnecting,
    /// Fatal error, will not auto-reconnect.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
