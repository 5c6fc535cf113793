//! Durable retry queue for offline-tolerant remote mutations.
//!
//! One generic engine instantiated per mutation kind (completion,
//! generation, engagement). Each queue owns a persisted list of pending
//! operations and retries them with exponential backoff until success,
//! exhaustion, or staleness.
//!
//! Retry scheduling is an explicit per-operation decision function driven
//! by event triggers plus a scheduler tick, not nested timers: every pass
//! classifies each entry as attempt / wait / expire, which keeps ordering
//! and reentrancy provable and testable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use pl_core::clock::CanonicalClock;
use pl_core::config::QueueTuning;
use pl_core::error::PlResult;
use pl_store::DurableStore;

use crate::event_bus::EventBus;
use crate::service::{Service, ServiceState, StateCell};

/// A queued, not-yet-confirmed remote mutation.
///
/// Owned exclusively by its queue; never shared across queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation<P> {
    /// Unique identifier for this queue entry.
    pub id: String,
    /// The user the mutation belongs to.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Mutation payload, opaque to the engine.
    pub payload: P,
    /// Enqueue time in epoch ms (canonical clock).
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    /// Failed attempts so far.
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
    /// Time of the last attempt in epoch ms; 0 before the first attempt.
    #[serde(rename = "lastAttempt")]
    pub last_attempt: i64,
}

/// Why an operation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireReason {
    /// Exceeded the retry budget.
    MaxRetries,
    /// Older than the queue's maximum age.
    MaxAge,
}

impl std::fmt::Display for ExpireReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxRetries => write!(f, "max retries"),
            Self::MaxAge => write!(f, "max age"),
        }
    }
}

/// Outcome of classifying one pending operation at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Eligible now: run the remote call.
    Attempt,
    /// Backoff has not elapsed yet: keep waiting.
    Wait,
    /// Past its budget: drop with a log entry.
    Expire(ExpireReason),
}

/// What caused a processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTrigger {
    /// Network came back online.
    Connectivity,
    /// The app moved to the foreground.
    Foreground,
    /// Explicit user-driven trigger (pull-to-refresh equivalent).
    Manual,
    /// Right after an enqueue while online.
    PostEnqueue,
    /// Periodic scheduler tick.
    Tick,
}

impl ProcessTrigger {
    /// Auto triggers are rate-limited by the queue cooldown; manual and
    /// post-enqueue triggers always run.
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Connectivity | Self::Foreground | Self::Tick)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Foreground => "foreground",
            Self::Manual => "manual",
            Self::PostEnqueue => "post-enqueue",
            Self::Tick => "tick",
        }
    }
}

/// Summary of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Remote calls attempted.
    pub attempted: usize,
    /// Operations confirmed and removed.
    pub succeeded: usize,
    /// Operations dropped as expired/abandoned.
    pub expired: usize,
    /// Operations still pending after the pass.
    pub remaining: usize,
}

/// The mutation a queue wraps, plus its domain glue.
///
/// The wrapped remote call must be idempotent per natural key: a crash
/// between remote success and the persisted removal re-runs the call on
/// the next pass.
#[async_trait]
pub trait QueueExecutor: Send + Sync + 'static {
    /// Payload carried by this queue's operations.
    type Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Queue name for logs and service health.
    fn queue_name(&self) -> &'static str;

    /// Durable-store key holding this queue's pending list.
    fn storage_key(&self) -> &'static str;

    /// Deduplication key: a later enqueue with the same key replaces the
    /// earlier entry instead of stacking.
    fn natural_key(&self, payload: &Self::Payload) -> String;

    /// Run the remote mutation.
    async fn execute(&self, op: &PendingOperation<Self::Payload>) -> PlResult<()>;

    /// Emit the domain event for a confirmed operation.
    fn announce_success(&self, bus: &EventBus, op: &PendingOperation<Self::Payload>);
}

/// Durable, reentrancy-safe retry queue.
pub struct RetryQueue<E: QueueExecutor> {
    executor: E,
    store: Arc<DurableStore>,
    bus: EventBus,
    clock: Arc<CanonicalClock>,
    tuning: QueueTuning,
    state: StateCell,
    /// Serializes read-modify-write on the persisted list so a concurrent
    /// enqueue and a pass's final write-back cannot lose updates.
    list_lock: tokio::sync::Mutex<()>,
    /// At most one pass in flight per queue instance.
    processing: AtomicBool,
    /// Last auto-triggered pass, for the cooldown.
    last_auto_run: Mutex<Option<Instant>>,
}

impl<E: QueueExecutor> RetryQueue<E> {
    /// Create a queue over the given executor and tuning.
    pub fn new(
        executor: E,
        store: Arc<DurableStore>,
        bus: EventBus,
        clock: Arc<CanonicalClock>,
        tuning: QueueTuning,
    ) -> Self {
        Self {
            executor,
            store,
            bus,
            clock,
            tuning,
            state: StateCell::new(),
            list_lock: tokio::sync::Mutex::new(()),
            processing: AtomicBool::new(false),
            last_auto_run: Mutex::new(None),
        }
    }

    /// Append an operation to the persisted list.
    ///
    /// Deduplicates on the executor's natural key (replace, not stack) and
    /// persists the whole list in one write. Fire-and-forget: persistence
    /// failure is logged, never surfaced to the caller.
    pub async fn enqueue(&self, user_id: &str, payload: E::Payload) -> String {
        let key = self.executor.natural_key(&payload);
        let op = PendingOperation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            payload,
            created_at: self.clock.now_ms(),
            retry_count: 0,
            last_attempt: 0,
        };
        let id = op.id.clone();

        {
            let _guard = self.list_lock.lock().await;
            let mut list = self.load_list().await;
            let before = list.len();
            list.retain(|existing| self.executor.natural_key(&existing.payload) != key);
            if list.len() < before {
                debug!(
                    "{}: replaced pending entry for key {key}",
                    self.executor.queue_name()
                );
            }
            list.push(op);
            self.persist(&list).await;
        }

        info!("{}: queued {id} (key {key})", self.executor.queue_name());
        id
    }

    /// Number of pending operations.
    pub async fn pending_count(&self) -> usize {
        self.load_list().await.len()
    }

    /// Snapshot of pending operations, in enqueue order.
    pub async fn pending(&self) -> Vec<PendingOperation<E::Payload>> {
        self.load_list().await
    }

    /// Drop every pending operation.
    pub async fn clear(&self) {
        let _guard = self.list_lock.lock().await;
        let count = self.load_list().await.len();
        self.persist(&Vec::new()).await;
        if count > 0 {
            info!("{}: cleared {count} pending operation(s)", self.executor.queue_name());
        }
    }

    /// Classify one operation at `now_ms`.
    pub fn decision(&self, op: &PendingOperation<E::Payload>, now_ms: i64) -> RetryDecision {
        if op.retry_count >= self.tuning.max_retries {
            return RetryDecision::Expire(ExpireReason::MaxRetries);
        }
        if now_ms.saturating_sub(op.created_at) > self.tuning.max_age().as_millis() as i64 {
            return RetryDecision::Expire(ExpireReason::MaxAge);
        }
        if op.last_attempt == 0 {
            return RetryDecision::Attempt;
        }
        let wait = self.tuning.backoff(op.retry_count).as_millis() as i64;
        if now_ms.saturating_sub(op.last_attempt) >= wait {
            RetryDecision::Attempt
        } else {
            RetryDecision::Wait
        }
    }

    /// Run one processing pass.
    ///
    /// Reentrancy-safe: overlapping calls return immediately, so each
    /// entry is attempted at most once per pass. Auto triggers are
    /// additionally rate-limited by the configured cooldown.
    pub async fn process(&self, trigger: ProcessTrigger) -> PassSummary {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(
                "{}: pass already in flight, skipping {} trigger",
                self.executor.queue_name(),
                trigger.label()
            );
            return PassSummary::default();
        }

        let summary = self.process_guarded(trigger).await;
        self.processing.store(false, Ordering::SeqCst);
        summary
    }

    async fn process_guarded(&self, trigger: ProcessTrigger) -> PassSummary {
        if trigger.is_auto() {
            let mut last = self.last_auto_run.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = *last {
                if at.elapsed() < self.tuning.trigger_cooldown() {
                    debug!(
                        "{}: {} trigger within cooldown, skipping",
                        self.executor.queue_name(),
                        trigger.label()
                    );
                    return PassSummary::default();
                }
            }
            *last = Some(Instant::now());
        }

        // Snapshot under the list lock, then release it for the duration
        // of the remote calls so enqueues stay unblocked.
        let snapshot = {
            let _guard = self.list_lock.lock().await;
            self.load_list().await
        };

        if snapshot.is_empty() {
            return PassSummary::default();
        }

        debug!(
            "{}: processing {} pending ({} trigger)",
            self.executor.queue_name(),
            snapshot.len(),
            trigger.label()
        );

        let mut summary = PassSummary::default();
        let mut remove: Vec<String> = Vec::new();
        let mut reschedule: Vec<(String, u32, i64)> = Vec::new();

        for op in &snapshot {
            let now = self.clock.now_ms();
            match self.decision(op, now) {
                RetryDecision::Wait => {}
                RetryDecision::Expire(reason) => {
                    warn!(
                        "{}: abandoning {} after {} attempt(s) ({reason})",
                        self.executor.queue_name(),
                        op.id,
                        op.retry_count
                    );
                    summary.expired += 1;
                    remove.push(op.id.clone());
                }
                RetryDecision::Attempt => {
                    summary.attempted += 1;
                    match self.executor.execute(op).await {
                        Ok(()) => {
                            debug!("{}: {} confirmed", self.executor.queue_name(), op.id);
                            summary.succeeded += 1;
                            remove.push(op.id.clone());
                            self.executor.announce_success(&self.bus, op);
                        }
                        Err(e) => {
                            let mut updated = op.clone();
                            updated.retry_count += 1;
                            updated.last_attempt = self.clock.now_ms();
                            warn!(
                                "{}: attempt {} for {} failed: {e}",
                                self.executor.queue_name(),
                                updated.retry_count,
                                op.id
                            );
                            // A failure can push the entry past its budget;
                            // drop it now instead of parking it forever.
                            match self.decision(&updated, updated.last_attempt) {
                                RetryDecision::Expire(reason) => {
                                    warn!(
                                        "{}: abandoning {} after {} attempt(s) ({reason})",
                                        self.executor.queue_name(),
                                        op.id,
                                        updated.retry_count
                                    );
                                    summary.expired += 1;
                                    remove.push(op.id.clone());
                                }
                                _ => {
                                    reschedule.push((
                                        op.id.clone(),
                                        updated.retry_count,
                                        updated.last_attempt,
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }

        // Merge-and-persist: reload under the lock so operations enqueued
        // during the pass survive the write-back.
        let _guard = self.list_lock.lock().await;
        let mut current = self.load_list().await;
        current.retain(|op| !remove.contains(&op.id));
        for (id, retry_count, last_attempt) in reschedule {
            if let Some(op) = current.iter_mut().find(|o| o.id == id) {
                op.retry_count = retry_count;
                op.last_attempt = last_attempt;
            }
        }
        summary.remaining = current.len();
        self.persist(&current).await;

        if summary.attempted > 0 {
            info!(
                "{}: pass complete ({} attempted, {} confirmed, {} abandoned, {} remaining)",
                self.executor.queue_name(),
                summary.attempted,
                summary.succeeded,
                summary.expired,
                summary.remaining
            );
        }
        summary
    }

    async fn load_list(&self) -> Vec<PendingOperation<E::Payload>> {
        self.store
            .get_json(self.executor.storage_key())
            .await
            .unwrap_or_default()
    }

    async fn persist(&self, list: &Vec<PendingOperation<E::Payload>>) {
        if !self.store.set_json(self.executor.storage_key(), list).await {
            warn!(
                "{}: failed to persist pending list ({} entries)",
                self.executor.queue_name(),
                list.len()
            );
        }
    }
}

impl<E: QueueExecutor> Service for RetryQueue<E> {
    fn name(&self) -> &str {
        self.executor.queue_name()
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
