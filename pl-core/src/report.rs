//! Error-tracking collaborator seam.
//!
//! Components that must surface failures without crashing their callers
//! (durable store, realtime sync, enforcement) report through this trait.
//! Production wires the tracing-backed reporter; a crash-reporting SDK can
//! be slotted in behind the same interface.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::error;

/// Destination for caught-and-contained failures.
pub trait ErrorReporter: Send + Sync {
    /// Report a failure with an area tag (e.g. "storage", "realtime") and
    /// a context string identifying what failed.
    fn report(&self, area: &str, context: &str, message: &str);
}

impl<T: ErrorReporter + ?Sized> ErrorReporter for std::sync::Arc<T> {
    fn report(&self, area: &str, context: &str, message: &str) {
        (**self).report(area, context, message);
    }
}

/// Reporter that writes to the tracing error log.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, area: &str, context: &str, message: &str) {
        error!(area, context, "{message}");
    }
}

/// Reporter that records every report, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far as (area, context, message).
    pub fn reports(&self) -> Vec<(String, String, String)> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of reports received so far.
    pub fn count(&self) -> usize {
        self.reports.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, area: &str, context: &str, message: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((area.to_string(), context.to_string(), message.to_string()));
    }
}

/// Wrapper that forwards each distinct (area, context) pair at most once
/// per process lifetime, to keep a persistently broken collaborator from
/// storming the error tracker.
pub struct OnceReporter<R: ErrorReporter> {
    inner: R,
    seen: Mutex<HashSet<String>>,
}

impl<R: ErrorReporter> OnceReporter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl<R: ErrorReporter> ErrorReporter for OnceReporter<R> {
    fn report(&self, area: &str, context: &str, message: &str) {
        let key = format!("{area}:{context}");
        let fresh = self.seen.lock().unwrap_or_else(|e| e.into_inner()).insert(key);
        if fresh {
            self.inner.report(area, context, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingReporter::new();
        reporter.report("storage", "set:queue", "boom");
        assert_eq!(reporter.count(), 1);
        assert_eq!(reporter.reports()[0].0, "storage");
    }

    #[test]
    fn test_once_reporter_dedups_by_area_and_context() {
        let reporter = OnceReporter::new(RecordingReporter::new());
        reporter.report("storage", "set:queue", "boom");
        reporter.report("storage", "set:queue", "boom again");
        reporter.report("storage", "get:queue", "different context");
        assert_eq!(reporter.inner.count(), 2);
    }
}
