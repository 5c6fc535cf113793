//! The three queue executors: completion, generation, engagement.
//!
//! Each wraps one idempotent remote mutation and announces the matching
//! domain event on success. Natural keys keep repeated taps from stacking
//! duplicate pending entries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pl_api::{CompletePrayerParams, GeneratePrayerParams, PrayerEndpoints};
use pl_core::constants::keys;
use pl_core::error::PlResult;

use crate::event_bus::{AppEvent, EventBus};
use crate::queue::{PendingOperation, QueueExecutor, RetryQueue};

/// Payload of a pending prayer completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPayload {
    #[serde(rename = "prayerId")]
    pub prayer_id: String,
}

/// Payload of a pending prayer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationPayload {
    /// Caller-supplied dedup key (user + window + day bucket), so
    /// repeated taps collapse into one pending generation.
    #[serde(rename = "requestKey")]
    pub request_key: String,
    /// Opaque generation inputs passed through to the endpoint.
    pub request: serde_json::Value,
}

/// Payload of a pending engagement mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementPayload {
    #[serde(rename = "prayerId")]
    pub prayer_id: String,
}

/// Executor for the completion queue.
pub struct CompletionExecutor {
    api: Arc<dyn PrayerEndpoints>,
}

impl CompletionExecutor {
    pub fn new(api: Arc<dyn PrayerEndpoints>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl QueueExecutor for CompletionExecutor {
    type Payload = CompletionPayload;

    fn queue_name(&self) -> &'static str {
        "completion-queue"
    }

    fn storage_key(&self) -> &'static str {
        keys::COMPLETION_QUEUE
    }

    fn natural_key(&self, payload: &CompletionPayload) -> String {
        payload.prayer_id.clone()
    }

    async fn execute(&self, op: &PendingOperation<CompletionPayload>) -> PlResult<()> {
        self.api
            .complete_prayer(&CompletePrayerParams {
                prayer_id: op.payload.prayer_id.clone(),
                user_id: op.user_id.clone(),
            })
            .await?;
        Ok(())
    }

    fn announce_success(&self, bus: &EventBus, op: &PendingOperation<CompletionPayload>) {
        bus.emit(AppEvent::PrayerCompleted {
            user_id: op.user_id.clone(),
            prayer_id: op.payload.prayer_id.clone(),
        });
    }
}

/// Executor for the generation queue.
pub struct GenerationExecutor {
    api: Arc<dyn PrayerEndpoints>,
}

impl GenerationExecutor {
    pub fn new(api: Arc<dyn PrayerEndpoints>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl QueueExecutor for GenerationExecutor {
    type Payload = GenerationPayload;

    fn queue_name(&self) -> &'static str {
        "generation-queue"
    }

    fn storage_key(&self) -> &'static str {
        keys::GENERATION_QUEUE
    }

    fn natural_key(&self, payload: &GenerationPayload) -> String {
        payload.request_key.clone()
    }

    async fn execute(&self, op: &PendingOperation<GenerationPayload>) -> PlResult<()> {
        self.api
            .generate_prayer(&GeneratePrayerParams {
                user_id: op.user_id.clone(),
                payload: op.payload.request.clone(),
            })
            .await?;
        Ok(())
    }

    fn announce_success(&self, bus: &EventBus, op: &PendingOperation<GenerationPayload>) {
        bus.emit(AppEvent::PrayerGenerated {
            user_id: op.user_id.clone(),
            prayer_id: op.payload.request_key.clone(),
        });
    }
}

/// Executor for the engagement queue.
pub struct EngagementExecutor {
    api: Arc<dyn PrayerEndpoints>,
}

impl EngagementExecutor {
    pub fn new(api: Arc<dyn PrayerEndpoints>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl QueueExecutor for EngagementExecutor {
    type Payload = EngagementPayload;

    fn queue_name(&self) -> &'static str {
        "engagement-queue"
    }

    fn storage_key(&self) -> &'static str {
        keys::ENGAGEMENT_QUEUE
    }

    fn natural_key(&self, payload: &EngagementPayload) -> String {
        payload.prayer_id.clone()
    }

    async fn execute(&self, op: &PendingOperation<EngagementPayload>) -> PlResult<()> {
        self.api.mark_engaged(&op.payload.prayer_id).await
    }

    fn announce_success(&self, bus: &EventBus, op: &PendingOperation<EngagementPayload>) {
        bus.emit(AppEvent::PrayerEngaged {
            prayer_id: op.payload.prayer_id.clone(),
        });
    }
}

/// The completion queue type as wired by the composition root.
pub type CompletionQueue = RetryQueue<CompletionExecutor>;
/// The generation queue type as wired by the composition root.
pub type GenerationQueue = RetryQueue<GenerationExecutor>;
/// The engagement queue type as wired by the composition root.
pub type EngagementQueue = RetryQueue<EngagementExecutor>;
