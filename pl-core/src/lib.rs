//! Shared foundation for the PrayLock client core.
//!
//! Holds the pieces every other crate leans on: the unified error type,
//! application configuration, structured logging setup, platform paths,
//! the canonical clock, and the error-reporting seam.

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;
pub mod report;

pub use clock::{CanonicalClock, ClockAnchor, PrayerPeriod};
pub use config::{AppConfig, ConfigHandle};
pub use error::{PlError, PlResult};
pub use report::ErrorReporter;
