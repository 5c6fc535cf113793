//! Realtime subscription manager.
//!
//! Owns the single change-feed subscription for the signed-in user:
//! coalesced setup, token rotation, liveness verification on ambiguous
//! signals (app resume), and automatic resubscription with exponential
//! backoff and jitter.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use pl_core::config::RealtimeConfig;
use pl_core::error::{PlError, PlResult};
use pl_core::report::ErrorReporter;

use crate::events::{ChangeAction, ChangeDispatcher, ChangeEvent, ConnectionState};

/// The active subscription target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubscriptionTarget {
    user_id: String,
    token: String,
}

/// Manages the lifecycle of the one live change-feed subscription.
///
/// Guarantees:
/// - At most one subscription exists at a time, filtered to one user.
/// - Concurrent `setup` calls for the same user coalesce into the single
///   in-flight attempt rather than opening duplicates.
/// - Setting up for a different user (or cleaning up) tears down the prior
///   subscription first.
/// - Connectivity status is queryable synchronously.
pub struct RealtimeManager {
    config: RealtimeConfig,
    dispatcher: ChangeDispatcher,
    /// Current connection state; std mutex so `status()` stays sync.
    state: Mutex<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    target: Mutex<Option<SubscriptionTarget>>,
    /// Serializes setup/teardown so concurrent callers coalesce.
    setup_lock: tokio::sync::Mutex<()>,
    reconnect_attempts: Mutex<u32>,
    disconnect_notify: Arc<Notify>,
    reporter: Arc<dyn ErrorReporter>,
}

impl RealtimeManager {
    /// Create a new manager.
    pub fn new(
        config: RealtimeConfig,
        dispatcher: ChangeDispatcher,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            dispatcher,
            state: Mutex::new(ConnectionState::Disconnected),
            state_tx,
            target: Mutex::new(None),
            setup_lock: tokio::sync::Mutex::new(()),
            reconnect_attempts: Mutex::new(0),
            disconnect_notify: Arc::new(Notify::new()),
            reporter,
        }
    }

    /// Current connection state, queryable synchronously.
    pub fn status(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Get the event dispatcher (for subscribing to change events).
    pub fn dispatcher(&self) -> &ChangeDispatcher {
        &self.dispatcher
    }

    /// The user the live subscription is filtered to, if any.
    pub fn subscribed_user(&self) -> Option<String> {
        self.target
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| t.user_id.clone())
    }

    fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != new_state {
            info!("realtime state: {} -> {}", *state, new_state);
            *state = new_state;
            let _ = self.state_tx.send(new_state);
        }
    }

    /// Open the subscription for a user.
    ///
    /// A second call for the same user while connected (or while the first
    /// call is still connecting) is a no-op; the setup lock makes the
    /// concurrent case wait for the in-flight attempt instead of racing a
    /// duplicate. A call for a different user tears the old subscription
    /// down first.
    pub async fn setup(&self, user_id: &str, token: &str) -> PlResult<()> {
        let _guard = self.setup_lock.lock().await;

        let same_target = {
            let target = self.target.lock().unwrap_or_else(|e| e.into_inner());
            target
                .as_ref()
                .map(|t| t.user_id == user_id && t.token == token)
                .unwrap_or(false)
        };
        if same_target
            && matches!(
                self.status(),
                ConnectionState::Connected | ConnectionState::Connecting
            )
        {
            debug!("subscription for {user_id} already live, coalescing");
            return Ok(());
        }

        if self.subscribed_user().is_some() {
            self.teardown_locked().await;
        }

        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = Some(SubscriptionTarget {
            user_id: user_id.to_string(),
            token: token.to_string(),
        });
        *self.reconnect_attempts.lock().unwrap_or_else(|e| e.into_inner()) = 0;

        self.connect_current().await
    }

    /// Establish the channel for the current target.
    async fn connect_current(&self) -> PlResult<()> {
        let target = self
            .target
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(PlError::Realtime("no subscription target".into()))?;

        self.set_state(ConnectionState::Connecting);
        info!("realtime subscribing for user {}", target.user_id);

        // In a full implementation, this would open the websocket channel:
        // 1. Connect with the access token
        // 2. Subscribe to row changes on `prayers` and `praylock_settings`
        //    filtered by user_id
        // 3. Route each notification through process_change()
        // 4. Route transport errors into the reconnect loop

        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Tear down the subscription and stop reconnection attempts.
    pub async fn cleanup(&self) {
        let _guard = self.setup_lock.lock().await;
        self.teardown_locked().await;
    }

    async fn teardown_locked(&self) {
        self.disconnect_notify.notify_waiters();
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.set_state(ConnectionState::Disconnected);
        info!("realtime subscription closed");
    }

    /// Check liveness on an ambiguous signal (app resume) and restart the
    /// subscription if it is not in a connected state.
    pub async fn verify_connection(&self) {
        if self.subscribed_user().is_none() {
            return;
        }
        if self.status() == ConnectionState::Connected {
            debug!("realtime connection verified");
            return;
        }

        warn!("realtime connection not live, restarting");
        if let Err(e) = self.connect_current().await {
            self.report("verify", &e);
        }
    }

    /// Rotate the access token.
    ///
    /// No-op when the token is unchanged; otherwise restarts the
    /// subscription with the new token.
    pub async fn update_token(&self, token: &str) -> PlResult<()> {
        let _guard = self.setup_lock.lock().await;

        let current = self.target.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(mut target) = current else {
            return Ok(());
        };
        if target.token == token {
            debug!("token unchanged, skipping resubscribe");
            return Ok(());
        }

        target.token = token.to_string();
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = Some(target);
        self.connect_current().await
    }

    /// Process one raw change notification.
    ///
    /// Parsing or dispatch failures are contained: logged, reported, and
    /// never propagated to the transport.
    pub fn process_change(&self, table: &str, action: &str, payload: &serde_json::Value) {
        let event = ChangeEvent {
            action: ChangeAction::from_wire(action),
            table: table.to_string(),
            new: payload.get("new").filter(|v| !v.is_null()).cloned(),
            old: payload.get("old").filter(|v| !v.is_null()).cloned(),
        };
        debug!("realtime change: {} {}", event.action.as_str(), table);
        self.dispatcher.dispatch(event);
    }

    /// Calculate the resubscribe delay using exponential backoff with jitter.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_secs as f64;
        let max = self.config.reconnect_max_secs as f64;

        let exponential = (base * 2.0_f64.powi(attempt as i32)).min(max);
        let jitter_range = exponential * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let delay = (exponential + jitter).max(0.5);

        Duration::from_secs_f64(delay)
    }

    /// Resubscribe with exponential backoff until connected or torn down.
    pub async fn reconnect_loop(&self) {
        self.set_state(ConnectionState::Reconnecting);

        loop {
            let attempt = {
                let mut attempts =
                    self.reconnect_attempts.lock().unwrap_or_else(|e| e.into_inner());
                *attempts += 1;
                *attempts
            };

            let delay = self.reconnect_delay(attempt - 1);
            warn!("realtime reconnect attempt {attempt} in {:.1}s", delay.as_secs_f64());

            tokio::select! {
                _ = sleep(delay) => {},
                _ = self.disconnect_notify.notified() => {
                    info!("reconnection cancelled by teardown");
                    return;
                }
            }

            if self.status() == ConnectionState::Disconnected {
                info!("reconnection aborted: subscription was torn down");
                return;
            }

            match self.connect_current().await {
                Ok(()) => {
                    info!("realtime resubscribed after {attempt} attempt(s)");
                    *self.reconnect_attempts.lock().unwrap_or_else(|e| e.into_inner()) = 0;
                    return;
                }
                Err(e) => {
                    error!("reconnect attempt {attempt} failed: {e}");
                    self.report("reconnect", &e);
                }
            }
        }
    }

    fn report(&self, context: &str, error: &PlError) {
        self.reporter.report("realtime", context, &error.to_string());
    }
}
