//! Service trait and lifecycle states.
//!
//! Every engine component implements `Service` for uniform startup,
//! shutdown, and health reporting. Components are constructed explicitly
//! by the composition root and shared behind `Arc`, so the trait takes
//! `&self` and implementations keep their state interior.

use std::sync::Mutex;

use pl_core::error::PlResult;

/// Lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Service has been created but not started.
    Created,
    /// Service is running and ready.
    Running,
    /// Service has been stopped.
    Stopped,
    /// Service encountered a fatal error.
    Failed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Shared interior holder for a service's lifecycle state.
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<ServiceState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::Created),
        }
    }

    pub fn get(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait all engine services implement.
///
/// Services are started in dependency order by the registry and stopped
/// in reverse order.
pub trait Service: Send + Sync {
    /// Human-readable name of this service.
    fn name(&self) -> &str;

    /// Current state of this service.
    fn state(&self) -> ServiceState;

    /// Start the service. Called once during application startup.
    fn start(&self) -> PlResult<()>;

    /// Gracefully stop the service. Called during application teardown.
    fn stop(&self) -> PlResult<()>;

    /// Health check. Returns true if the service is operational.
    fn is_healthy(&self) -> bool {
        self.state() == ServiceState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestService {
        state: StateCell,
    }

    impl Service for TestService {
        fn name(&self) -> &str {
            "test"
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

    #[test]
    fn test_service_lifecycle() {
        let svc = TestService {
            state: StateCell::new(),
        };
        assert!(!svc.is_healthy());
        svc.start().unwrap();
        assert!(svc.is_healthy());
        svc.stop().unwrap();
        assert!(!svc.is_healthy());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Running.to_string(), "running");
        assert_eq!(ServiceState::Failed.to_string(), "failed");
    }
}
