//! Metagate local metadata gateway
//!
//! Keeps a node's on-disk copy of cluster metadata in step with the cluster
//! and resolves index data the cluster no longer knows about.

pub mod dangling;
pub mod gateway;
pub mod import;
pub mod loader;
pub mod persist;

pub use dangling::{
    scan_dangling, DanglingCandidate, DanglingEntry, DanglingFate, DanglingIndexRegistry,
    DanglingInfo, DanglingReport, DanglingStatus,
};
pub use gateway::{ClusterStateListener, GatewayMetaState};
pub use import::{DanglingImporter, ImportCallback};
pub use loader::{LoadedMetaState, StartupLoader};
pub use persist::{
    MetadataPersistenceCoordinator, PersistOutcome, PersistedView, ViewOrigin, WriteReason,
};
