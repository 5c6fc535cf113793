//! PRAYLOCK settings endpoints.
//!
//! One settings row per user; the server is the source of truth and the
//! client keeps an optimistically-patched local cache of it.

use serde::{Deserialize, Serialize};

use pl_core::clock::PrayerPeriod;
use pl_core::error::PlResult;

use crate::client::ApiClient;

/// Which windows enforcement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSchedule {
    Morning,
    Evening,
    Both,
}

impl BlockSchedule {
    /// Whether this schedule covers the given period.
    pub fn covers(&self, period: PrayerPeriod) -> bool {
        match self {
            BlockSchedule::Both => true,
            BlockSchedule::Morning => period == PrayerPeriod::Morning,
            BlockSchedule::Evening => period == PrayerPeriod::Evening,
        }
    }

    /// The periods this schedule covers, in day order.
    pub fn periods(&self) -> &'static [PrayerPeriod] {
        match self {
            BlockSchedule::Morning => &[PrayerPeriod::Morning],
            BlockSchedule::Evening => &[PrayerPeriod::Evening],
            BlockSchedule::Both => &[PrayerPeriod::Morning, PrayerPeriod::Evening],
        }
    }
}

/// The per-user PRAYLOCK settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PraylockSettings {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub enabled: bool,
    pub schedule: BlockSchedule,
    #[serde(rename = "morningCompleted")]
    pub morning_completed: bool,
    #[serde(rename = "eveningCompleted")]
    pub evening_completed: bool,
    /// Opaque token identifying the user's picked app selection on the
    /// device; round-tripped to the native blocking layer untouched.
    #[serde(rename = "familyActivitySelection", default)]
    pub family_activity_selection: Option<String>,
    #[serde(rename = "blockedApps", default)]
    pub blocked_apps: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

impl PraylockSettings {
    /// Whether the given period's prayer is marked completed on this row.
    pub fn completed_for(&self, period: PrayerPeriod) -> bool {
        match period {
            PrayerPeriod::Morning => self.morning_completed,
            PrayerPeriod::Evening => self.evening_completed,
        }
    }
}

impl ApiClient {
    /// Fetch the settings row for a user, `None` if never configured.
    pub async fn praylock_settings(&self, user_id: &str) -> PlResult<Option<PraylockSettings>> {
        self.get_optional(&format!("/praylock/settings?userId={user_id}"))
            .await
    }

    /// Create or update the settings row.
    pub async fn save_praylock_settings(
        &self,
        settings: &PraylockSettings,
    ) -> PlResult<PraylockSettings> {
        self.post_data("/praylock/settings", settings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(schedule: BlockSchedule) -> PraylockSettings {
        PraylockSettings {
            id: "s1".into(),
            user_id: "u1".into(),
            enabled: true,
            schedule,
            morning_completed: false,
            evening_completed: true,
            family_activity_selection: Some("token".into()),
            blocked_apps: vec!["com.example.social".into()],
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_schedule_coverage() {
        assert!(BlockSchedule::Both.covers(PrayerPeriod::Morning));
        assert!(BlockSchedule::Both.covers(PrayerPeriod::Evening));
        assert!(BlockSchedule::Morning.covers(PrayerPeriod::Morning));
        assert!(!BlockSchedule::Morning.covers(PrayerPeriod::Evening));
        assert_eq!(BlockSchedule::Both.periods().len(), 2);
    }

    #[test]
    fn test_completed_for_period() {
        let s = settings(BlockSchedule::Both);
        assert!(!s.completed_for(PrayerPeriod::Morning));
        assert!(s.completed_for(PrayerPeriod::Evening));
    }

    #[test]
    fn test_settings_wire_roundtrip() {
        let s = settings(BlockSchedule::Evening);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["schedule"], "evening");
        assert_eq!(json["familyActivitySelection"], "token");

        let back: PraylockSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back.schedule, BlockSchedule::Evening);
        assert_eq!(back.blocked_apps, s.blocked_apps);
    }
}
