//! Metagate Storage - Local state persistence
//!
//! This crate implements the node-local durability layer:
//! - Versioned, checksummed state files with atomic replace
//! - Highest-valid-version recovery across data paths
//! - Data-path layout, index directory enumeration and deletion
//! - One-shot upgrade of the legacy single-file layout

pub mod legacy;
pub mod node;
pub mod state;

// Re-exports
pub use legacy::{
    find_legacy_files, upgrade_legacy_layout, LegacyFile, LegacyUpgrade, LEGACY_INDEX_VERSION,
};
pub use node::{is_valid_index_dir_name, NodeEnvironment, INDICES_DIR};
pub use state::{
    read_state_file, StateFileRef, StateHeader, StateStoreStats, StateStores, Versioned,
    VersionedStateStore, GLOBAL_STATE_PREFIX, INDEX_STATE_PREFIX, STATE_DIR,
};
