//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "PrayLock";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// REST API version prefix.
pub const API_VERSION: &str = "v1";

/// Default server API timeout in milliseconds.
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Hour of day (canonical timezone) at which the morning window opens.
pub const MORNING_START_HOUR: u32 = 4;

/// Hour of day (canonical timezone) at which the evening window opens.
pub const EVENING_START_HOUR: u32 = 16;

/// Debounce window for foreground enforcement checks, in seconds.
pub const DEFAULT_ENFORCE_DEBOUNCE_SECS: u64 = 5;

/// Timeout raced against every native blocking call, in seconds.
pub const DEFAULT_NATIVE_CALL_TIMEOUT_SECS: u64 = 5;

/// Cooldown between automatically triggered queue passes, in seconds.
pub const DEFAULT_QUEUE_COOLDOWN_SECS: u64 = 10;

/// Interval of the queue scheduler tick, in seconds.
pub const DEFAULT_QUEUE_TICK_SECS: u64 = 60;

/// Durable-store keys owned by this core.
///
/// One list-of-pending-operations blob per queue kind plus the cached
/// settings row; nothing else is part of the on-disk contract.
pub mod keys {
    /// Pending prayer-completion operations.
    pub const COMPLETION_QUEUE: &str = "pending_completions";
    /// Pending prayer-generation operations.
    pub const GENERATION_QUEUE: &str = "pending_generations";
    /// Pending engagement-marking operations.
    pub const ENGAGEMENT_QUEUE: &str = "pending_engagements";
    /// Locally cached PRAYLOCK settings row.
    pub const SETTINGS_CACHE: &str = "praylock_settings";

    /// Keys migrated from the legacy plaintext store on first run.
    pub const MIGRATED: &[&str] = &[
        COMPLETION_QUEUE,
        GENERATION_QUEUE,
        ENGAGEMENT_QUEUE,
        SETTINGS_CACHE,
    ];
}

/// Remote table names carried on realtime change events.
pub mod tables {
    pub const PRAYERS: &str = "prayers";
    pub const SETTINGS: &str = "praylock_settings";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_hours_partition_the_day() {
        assert!(MORNING_START_HOUR < EVENING_START_HOUR);
        assert!(EVENING_START_HOUR < 24);
    }

    #[test]
    fn test_migrated_keys_cover_all_blobs() {
        assert_eq!(keys::MIGRATED.len(), 4);
        assert!(keys::MIGRATED.contains(&keys::SETTINGS_CACHE));
    }
}
