//! The PrayLock engine: offline-resilient prayer-state synchronization and
//! time-window enforcement.
//!
//! Components:
//! - Durable retry queues for the three remote mutations (completion,
//!   generation, engagement)
//! - Background enforcement manager reconciling native app blocking with
//!   prayer completion (PRAYLOCK)
//! - Realtime sync manager applying optimistic patches with an
//!   invalidation fallback
//! - Typed event bus, local cache, lifecycle phases, and the composition
//!   root wiring it all together

pub mod blocker;
pub mod cache;
pub mod enforcement;
pub mod event_bus;
pub mod lifecycle;
pub mod queue;
pub mod queues;
pub mod registry;
pub mod service;
pub mod sync;

pub use blocker::{select_blocker, AppBlocker, DeviceBlocker, MonitorEvent, MonitorInterval, NoopBlocker};
pub use cache::StateCache;
pub use enforcement::EnforcementManager;
pub use event_bus::{AppEvent, EventBus};
pub use lifecycle::{LifecyclePhase, LifecycleService};
pub use queue::{PendingOperation, ProcessTrigger, QueueExecutor, RetryQueue};
pub use queues::{
    CompletionPayload, CompletionQueue, EngagementPayload, EngagementQueue, GenerationPayload,
    GenerationQueue,
};
pub use registry::ServiceRegistry;
pub use service::{Service, ServiceState};
pub use sync::SyncManager;
