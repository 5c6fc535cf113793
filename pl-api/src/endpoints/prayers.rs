//! Prayer endpoints: generation, completion, engagement, and state query.

use serde::{Deserialize, Serialize};

use pl_core::clock::{ClockAnchor, PrayerPeriod};
use pl_core::error::PlResult;

use crate::client::ApiClient;

/// Parameters for completing a prayer.
///
/// The endpoint is idempotent per prayer id: completing an
/// already-completed prayer is a no-op, not an error, so queued retries
/// after an unconfirmed success are safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePrayerParams {
    #[serde(rename = "prayerId")]
    pub prayer_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Result of completing a prayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletePrayerResult {
    #[serde(rename = "prayerTimeOfDay")]
    pub prayer_time_of_day: PrayerPeriod,
}

/// Parameters for generating a prayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePrayerParams {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Opaque generation inputs collected by the app (intentions,
    /// prompts); passed through untouched.
    pub payload: serde_json::Value,
}

/// Result of generating a prayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePrayerResult {
    pub prayer: String,
    #[serde(rename = "prayerId")]
    pub prayer_id: String,
}

/// One prayer row as known to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrayerEntry {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(rename = "prayerTimeOfDay")]
    pub prayer_time_of_day: PrayerPeriod,
    /// Completion timestamp in epoch ms; null while incomplete.
    #[serde(rename = "completedAt", default)]
    pub completed_at: Option<i64>,
    #[serde(rename = "engagedAt", default)]
    pub engaged_at: Option<i64>,
}

impl PrayerEntry {
    /// Whether this prayer has been completed.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Today's prayers, one slot per window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrayerPair {
    #[serde(default)]
    pub morning: Option<PrayerEntry>,
    #[serde(default)]
    pub evening: Option<PrayerEntry>,
}

impl PrayerPair {
    /// The slot for a given period.
    pub fn for_period(&self, period: PrayerPeriod) -> Option<&PrayerEntry> {
        match period {
            PrayerPeriod::Morning => self.morning.as_ref(),
            PrayerPeriod::Evening => self.evening.as_ref(),
        }
    }

    /// Mutable slot for a given period.
    pub fn for_period_mut(&mut self, period: PrayerPeriod) -> &mut Option<PrayerEntry> {
        match period {
            PrayerPeriod::Morning => &mut self.morning,
            PrayerPeriod::Evening => &mut self.evening,
        }
    }
}

/// Authoritative per-user prayer state for the current day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrayerState {
    #[serde(rename = "currentPeriod")]
    pub current_period: PrayerPeriod,
    #[serde(rename = "currentWindowAvailable")]
    pub current_window_available: bool,
    pub prayers: PrayerPair,
}

impl PrayerState {
    /// Whether the active window's prayer is already completed.
    pub fn current_completed(&self) -> bool {
        self.prayers
            .for_period(self.current_period)
            .map(PrayerEntry::is_completed)
            .unwrap_or(false)
    }
}

impl ApiClient {
    /// Mark a prayer completed.
    pub async fn complete_prayer(
        &self,
        params: &CompletePrayerParams,
    ) -> PlResult<CompletePrayerResult> {
        self.post_data("/prayers/complete", params).await
    }

    /// Generate a prayer for the current window.
    pub async fn generate_prayer(
        &self,
        params: &GeneratePrayerParams,
    ) -> PlResult<GeneratePrayerResult> {
        self.post_data("/prayers/generate", params).await
    }

    /// Mark a prayer as engaged with (opened/read).
    pub async fn mark_engaged(&self, prayer_id: &str) -> PlResult<()> {
        self.post_empty(
            &format!("/prayers/{prayer_id}/engage"),
            &serde_json::json!({}),
        )
        .await
    }

    /// Fetch the authoritative prayer state for a user.
    pub async fn current_prayer_state(&self, user_id: &str) -> PlResult<PrayerState> {
        self.get_data(&format!("/prayers/state?userId={user_id}")).await
    }

    /// Fetch a fresh server time anchor for clock resync.
    pub async fn clock_anchor(&self) -> PlResult<ClockAnchor> {
        self.get_data("/time").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prayer_state_deserialization() {
        let json = serde_json::json!({
            "currentPeriod": "morning",
            "currentWindowAvailable": true,
            "prayers": {
                "morning": {
                    "id": "p1",
                    "prayerTimeOfDay": "morning",
                    "completedAt": null
                },
                "evening": null
            }
        });
        let state: PrayerState = serde_json::from_value(json).unwrap();
        assert_eq!(state.current_period, PrayerPeriod::Morning);
        assert!(!state.current_completed());
        assert!(state.prayers.evening.is_none());
    }

    #[test]
    fn test_current_completed() {
        let mut state = PrayerState {
            current_period: PrayerPeriod::Evening,
            current_window_available: true,
            prayers: PrayerPair::default(),
        };
        // No prayer row yet: not completed.
        assert!(!state.current_completed());

        state.prayers.evening = Some(PrayerEntry {
            id: "p2".into(),
            text: None,
            prayer_time_of_day: PrayerPeriod::Evening,
            completed_at: Some(1_750_000_000_000),
            engaged_at: None,
        });
        assert!(state.current_completed());
    }

    #[test]
    fn test_params_wire_names() {
        let params = CompletePrayerParams {
            prayer_id: "p1".into(),
            user_id: "u1".into(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["prayerId"], "p1");
        assert_eq!(json["userId"], "u1");
    }
}
