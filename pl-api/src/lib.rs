//! HTTP API client for the PrayLock backend.
//!
//! The `PrayerEndpoints` trait is the seam the engine depends on; the
//! concrete `ApiClient` implements it over REST, and tests substitute
//! mocks. Every mutation endpoint here is idempotent per its natural key
//! (the retry queues depend on that).

pub mod client;
pub mod endpoints;
pub mod response;

use async_trait::async_trait;

use pl_core::clock::ClockAnchor;
use pl_core::error::PlResult;

pub use client::{ApiClient, RetryConfig};
pub use endpoints::prayers::{
    CompletePrayerParams, CompletePrayerResult, GeneratePrayerParams, GeneratePrayerResult,
    PrayerEntry, PrayerPair, PrayerState,
};
pub use endpoints::settings::{BlockSchedule, PraylockSettings};
pub use response::ServerResponse;

/// The remote boundary the engine is written against.
#[async_trait]
pub trait PrayerEndpoints: Send + Sync {
    /// Mark a prayer completed. Idempotent per prayer id.
    async fn complete_prayer(
        &self,
        params: &CompletePrayerParams,
    ) -> PlResult<CompletePrayerResult>;

    /// Generate a prayer. Idempotent per the caller's request key.
    async fn generate_prayer(
        &self,
        params: &GeneratePrayerParams,
    ) -> PlResult<GeneratePrayerResult>;

    /// Mark a prayer engaged. Idempotent per prayer id.
    async fn mark_engaged(&self, prayer_id: &str) -> PlResult<()>;

    /// Fetch the authoritative prayer state for a user.
    async fn current_prayer_state(&self, user_id: &str) -> PlResult<PrayerState>;

    /// Fetch the PRAYLOCK settings row for a user.
    async fn praylock_settings(&self, user_id: &str) -> PlResult<Option<PraylockSettings>>;

    /// Create or update the PRAYLOCK settings row.
    async fn save_praylock_settings(
        &self,
        settings: &PraylockSettings,
    ) -> PlResult<PraylockSettings>;

    /// Fetch a fresh server time anchor.
    async fn clock_anchor(&self) -> PlResult<ClockAnchor>;
}

#[async_trait]
impl PrayerEndpoints for ApiClient {
    async fn complete_prayer(
        &self,
        params: &CompletePrayerParams,
    ) -> PlResult<CompletePrayerResult> {
        ApiClient::complete_prayer(self, params).await
    }

    async fn generate_prayer(
        &self,
        params: &GeneratePrayerParams,
    ) -> PlResult<GeneratePrayerResult> {
        ApiClient::generate_prayer(self, params).await
    }

    async fn mark_engaged(&self, prayer_id: &str) -> PlResult<()> {
        ApiClient::mark_engaged(self, prayer_id).await
    }

    async fn current_prayer_state(&self, user_id: &str) -> PlResult<PrayerState> {
        ApiClient::current_prayer_state(self, user_id).await
    }

    async fn praylock_settings(&self, user_id: &str) -> PlResult<Option<PraylockSettings>> {
        ApiClient::praylock_settings(self, user_id).await
    }

    async fn save_praylock_settings(
        &self,
        settings: &PraylockSettings,
    ) -> PlResult<PraylockSettings> {
        ApiClient::save_praylock_settings(self, settings).await
    }

    async fn clock_anchor(&self) -> PlResult<ClockAnchor> {
        ApiClient::clock_anchor(self).await
    }
}
