//! Realtime change-feed subscription for the PrayLock client core.
//!
//! Maintains one live subscription to remote row-change notifications,
//! filtered to the signed-in user, and fans the resulting change events
//! out to in-process consumers.

pub mod events;
pub mod manager;

pub use events::{ChangeAction, ChangeDispatcher, ChangeEvent, ConnectionState};
pub use manager::RealtimeManager;
