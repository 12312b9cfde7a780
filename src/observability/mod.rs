//! # Observability
//!
//! In-memory, best-effort traffic metrics for the bridge. Nothing here is
//! persisted; the debug endpoints read and reset it.

pub mod ring;
pub mod store;

pub use ring::DEFAULT_RING_CAPACITY;
pub use store::ObservabilityStore;
