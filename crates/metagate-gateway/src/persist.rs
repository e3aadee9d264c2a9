//! Metadata persistence coordinator
//!
//! Keeps the node's `_state` files eventually consistent with the cluster
//! metadata it observes. Each cluster state is compared against the
//! [`PersistedView`], the record of what was last written successfully, and
//! only records whose version moved are written. The view for a record is
//! advanced only when that record's own write succeeds, so a failed write is
//! retried by the next cluster state.

use crate::loader::LoadedMetaState;
use metagate_common::{ClusterSnapshot, GlobalRecord, IndexRecord};
use metagate_storage::{NodeEnvironment, StateStores};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Reason passed to the data deletion primitive for cluster-side deletes
pub const DELETED_NOT_IN_CLUSTER_STATE: &str = "deleted (not in cluster state)";

/// Where the current view came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewOrigin {
    /// Nothing is known about the disk contents
    Unknown,
    /// Seeded from the state loaded at startup
    Disk,
    /// Derived from an observed cluster state
    Cluster,
}

/// What this node last wrote to disk
#[derive(Clone, Debug)]
pub struct PersistedView {
    /// Cluster-level record without indices; `None` means unknown
    global: Option<GlobalRecord>,
    /// Last index record written per index
    indices: HashMap<String, Arc<IndexRecord>>,
    origin: ViewOrigin,
}

impl PersistedView {
    /// A view that trusts nothing
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            global: None,
            indices: HashMap::new(),
            origin: ViewOrigin::Unknown,
        }
    }

    /// Seed from state loaded off disk
    #[must_use]
    pub fn from_disk(loaded: &LoadedMetaState) -> Self {
        Self {
            global: loaded
                .global_found
                .then(|| loaded.metadata.without_indices()),
            indices: loaded
                .metadata
                .indices
                .iter()
                .map(|(name, index)| (name.clone(), Arc::clone(index)))
                .collect(),
            origin: ViewOrigin::Disk,
        }
    }

    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        self.global.is_none()
    }

    #[must_use]
    pub const fn origin(&self) -> ViewOrigin {
        self.origin
    }

    #[must_use]
    pub fn global_version(&self) -> Option<u64> {
        self.global.as_ref().map(|g| g.version)
    }

    #[must_use]
    pub fn index_version(&self, name: &str) -> Option<u64> {
        self.indices.get(name).map(|i| i.version)
    }

    /// Names of indices with a remembered record, sorted
    #[must_use]
    pub fn index_names(&self) -> BTreeSet<String> {
        self.indices.keys().cloned().collect()
    }

    /// Why `index` must be written, if at all
    #[must_use]
    pub fn index_write_reason(&self, index: &IndexRecord) -> Option<WriteReason> {
        match self.index_version(&index.name) {
            None => Some(WriteReason::FreshlyCreated),
            Some(from) if from != index.version => Some(WriteReason::VersionChanged {
                from,
                to: index.version,
            }),
            Some(_) => None,
        }
    }
}

impl Default for PersistedView {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Why an index record is written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteReason {
    FreshlyCreated,
    VersionChanged { from: u64, to: u64 },
}

impl fmt::Display for WriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreshlyCreated => write!(f, "freshly created"),
            Self::VersionChanged { from, to } => {
                write!(f, "version changed from [{from}] to [{to}]")
            }
        }
    }
}

/// What one pass did
#[derive(Clone, Debug, Default)]
pub struct PersistOutcome {
    /// Global record written
    pub global_written: bool,
    /// Index records written
    pub indices_written: Vec<String>,
    /// Records whose write failed (`_global` for the global record)
    pub failed: Vec<String>,
    /// Indices removed because the cluster deleted them
    pub deleted: BTreeSet<String>,
    /// Indices deleted by the cluster whose local data could not be removed yet
    pub pending_deletes: BTreeSet<String>,
}

impl PersistOutcome {
    /// Nothing was written or deleted
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.global_written
            && self.indices_written.is_empty()
            && self.failed.is_empty()
            && self.deleted.is_empty()
    }
}

/// Persists global and per-index metadata as cluster states arrive
pub struct MetadataPersistenceCoordinator {
    env: Arc<NodeEnvironment>,
    stores: Arc<StateStores>,
    view: Mutex<PersistedView>,
}

impl MetadataPersistenceCoordinator {
    /// Create a coordinator with an unknown view
    #[must_use]
    pub fn new(env: Arc<NodeEnvironment>, stores: Arc<StateStores>) -> Self {
        Self {
            env,
            stores,
            view: Mutex::new(PersistedView::unknown()),
        }
    }

    /// Trust what startup loaded so it is not immediately rewritten
    pub fn seed(&self, loaded: &LoadedMetaState) {
        let view = PersistedView::from_disk(loaded);
        debug!(
            "seeded persisted view: global version {:?}, {} index(es)",
            view.global_version(),
            view.indices.len()
        );
        *self.view.lock() = view;
    }

    /// Copy of the current view
    #[must_use]
    pub fn persisted_view(&self) -> PersistedView {
        self.view.lock().clone()
    }

    /// Reconcile local state files with a new cluster state
    ///
    /// Never fails: errors are logged and leave the affected record stale in
    /// the view so the next cluster state retries it.
    pub fn on_cluster_state_change(&self, state: &ClusterSnapshot) -> PersistOutcome {
        let mut view = self.view.lock();
        let mut outcome = PersistOutcome::default();

        if state.blocks.disable_state_persistence {
            if !view.is_unknown() || !view.indices.is_empty() {
                debug!(
                    "state persistence disabled at cluster state version {}, resetting persisted view",
                    state.state_version
                );
            }
            *view = PersistedView::unknown();
            return outcome;
        }

        if !state.local_node.persists_metadata() {
            trace!("node is neither master-eligible nor data, skipping metadata persistence");
            return outcome;
        }

        if !self.env.has_node_file() {
            trace!("node has no data paths, skipping metadata persistence");
            return outcome;
        }

        let metadata = &state.metadata;

        // Global record
        if view
            .global
            .as_ref()
            .is_none_or(|g| g.version != metadata.version)
        {
            let global = metadata.without_indices();
            let locations = self.env.node_state_locations();
            debug!(
                "writing global state, version [{:?}] -> [{}]",
                view.global_version(),
                global.version
            );
            match self.stores.global.write(&global, global.version, &locations) {
                Ok(()) => {
                    self.stores.global.cleanup_stale(&locations, global.version);
                    view.global = Some(global);
                    outcome.global_written = true;
                }
                Err(e) => {
                    warn!("failed to write global state, will retry on next cluster state: {}", e);
                    outcome.failed.push("_global".to_string());
                }
            }
        }

        // Index records, each on its own
        for (name, index) in &metadata.indices {
            let Some(reason) = view.index_write_reason(index) else {
                continue;
            };
            debug!("[{}] writing index state, reason [{}]", name, reason);

            let locations = self.env.index_state_locations(name);
            match self.stores.index.write(index.as_ref(), index.version, &locations) {
                Ok(()) => {
                    self.stores.index.cleanup_stale(&locations, index.version);
                    view.indices.insert(name.clone(), Arc::clone(index));
                    outcome.indices_written.push(name.clone());
                }
                Err(e) => {
                    warn!(
                        "[{}] failed to write index state, will retry on next cluster state: {}",
                        name, e
                    );
                    outcome.failed.push(name.clone());
                }
            }
        }

        // Indices that left the metadata
        let gone: Vec<String> = view
            .indices
            .keys()
            .filter(|name| !metadata.has_index(name))
            .cloned()
            .collect();
        for name in gone {
            if view.origin != ViewOrigin::Cluster {
                // Seeded from disk: absence is for dangling detection to judge
                view.indices.remove(&name);
                continue;
            }
            let Some(record) = view.indices.get(&name).cloned() else {
                continue;
            };
            match self
                .env
                .delete_index_data(DELETED_NOT_IN_CLUSTER_STATE, &record, Some(state))
            {
                Ok(()) => {
                    info!("[{}] deleted index that is no longer part of the metadata", name);
                    view.indices.remove(&name);
                    outcome.deleted.insert(name);
                }
                Err(e) => {
                    warn!("[{}] failed to delete index data, will retry: {}", name, e);
                    outcome.pending_deletes.insert(name);
                }
            }
        }

        view.origin = ViewOrigin::Cluster;
        outcome
    }
}
