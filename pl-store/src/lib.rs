//! Durable key-value storage for the PrayLock client core.
//!
//! Abstracts over a hardware-backed secure store and a plaintext file
//! fallback, with a one-time migration path between the two. All persisted
//! state in the core (pending-operation lists, the cached settings row)
//! lives behind this crate as opaque JSON blobs.

pub mod backend;
pub mod fallback;
pub mod secure;
pub mod store;

pub use backend::{MemoryBackend, StorageBackend};
pub use fallback::FileBackend;
pub use secure::KeyringBackend;
pub use store::DurableStore;
