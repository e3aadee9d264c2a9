//! Node data-path environment
//!
//! Layout of each data path:
//!
//! ```text
//! <data_path>/
//!   _state/                  global-<v>.st, legacy metadata-<v>
//!   indices/
//!     <index>/
//!       _state/              state-<v>.st
//!       ...                  shard data (not managed here)
//! ```

use crate::state::STATE_DIR;
use metagate_common::{ClusterSnapshot, Error, IndexRecord, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the directory holding per-index directories
pub const INDICES_DIR: &str = "indices";

/// The local data paths of this node
#[derive(Clone, Debug)]
pub struct NodeEnvironment {
    data_paths: Vec<PathBuf>,
}

impl NodeEnvironment {
    /// Open the environment, creating the data paths if needed
    pub fn open(data_paths: Vec<PathBuf>) -> Result<Self> {
        for path in &data_paths {
            std::fs::create_dir_all(path.join(INDICES_DIR))
                .map_err(|e| Error::persistence_io(path, e))?;
        }
        info!("Node environment opened with {} data path(s)", data_paths.len());
        Ok(Self { data_paths })
    }

    /// Environment over data paths as they are, creating nothing
    #[must_use]
    pub const fn existing(data_paths: Vec<PathBuf>) -> Self {
        Self { data_paths }
    }

    /// Environment for a node without local storage
    #[must_use]
    pub const fn without_data() -> Self {
        Self {
            data_paths: Vec::new(),
        }
    }

    /// Whether this node has local data directories
    #[must_use]
    pub fn has_node_file(&self) -> bool {
        !self.data_paths.is_empty()
    }

    /// Configured data paths
    #[must_use]
    pub fn data_paths(&self) -> &[PathBuf] {
        &self.data_paths
    }

    /// `_state` directories for node-level (global) state
    #[must_use]
    pub fn node_state_locations(&self) -> Vec<PathBuf> {
        self.data_paths.iter().map(|p| p.join(STATE_DIR)).collect()
    }

    /// Index directories on every data path, existing or not
    #[must_use]
    pub fn index_locations(&self, index: &str) -> Vec<PathBuf> {
        self.data_paths
            .iter()
            .map(|p| p.join(INDICES_DIR).join(index))
            .collect()
    }

    /// `_state` directories an index record is written to
    #[must_use]
    pub fn index_state_locations(&self, index: &str) -> Vec<PathBuf> {
        self.index_locations(index)
            .into_iter()
            .map(|p| p.join(STATE_DIR))
            .collect()
    }

    /// `_state` directories of index directories that actually exist
    #[must_use]
    pub fn find_local_index_locations(&self, index: &str) -> Vec<PathBuf> {
        self.index_locations(index)
            .into_iter()
            .filter(|p| p.is_dir())
            .map(|p| p.join(STATE_DIR))
            .collect()
    }

    /// Every index name with a data directory on any data path
    pub fn list_local_index_ids(&self) -> Result<BTreeSet<String>> {
        let mut ids = BTreeSet::new();

        for path in &self.data_paths {
            let indices_dir = path.join(INDICES_DIR);
            if !indices_dir.exists() {
                continue;
            }
            let entries =
                std::fs::read_dir(&indices_dir).map_err(|e| Error::persistence_io(&indices_dir, e))?;

            for entry in entries {
                let entry = entry.map_err(|e| Error::persistence_io(&indices_dir, e))?;
                if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_valid_index_dir_name(&name) {
                    ids.insert(name);
                } else {
                    debug!("ignoring non-index directory {:?}", entry.path());
                }
            }
        }

        Ok(ids)
    }

    /// Physically remove an index's data from every data path
    ///
    /// On failure whatever could not be removed stays in place so a later
    /// attempt can finish the job.
    pub fn delete_index_data(
        &self,
        reason: &str,
        record: &IndexRecord,
        context: Option<&ClusterSnapshot>,
    ) -> Result<()> {
        if !is_valid_index_dir_name(&record.name) {
            return Err(Error::internal(format!(
                "refusing to delete data for invalid index name {:?}",
                record.name
            )));
        }

        match context {
            Some(state) => info!(
                "[{}] deleting index data ({}), cluster state version {}, node {}",
                record.name, reason, state.state_version, state.local_node.id
            ),
            None => info!("[{}] deleting index data ({})", record.name, reason),
        }

        let mut first_error = None;
        for location in self.index_locations(&record.name) {
            if !location.exists() {
                continue;
            }
            if let Err(e) = std::fs::remove_dir_all(&location) {
                warn!("[{}] failed to delete {:?}: {}", record.name, location, e);
                first_error.get_or_insert_with(|| Error::persistence_io(&location, e));
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Index directories are plain names: no separators, no hidden or internal entries
#[must_use]
pub fn is_valid_index_dir_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('_')
        && !name.contains(['/', '\\'])
        && Path::new(name).components().count() == 1
}
