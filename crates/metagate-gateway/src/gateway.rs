//! Per-node metadata gateway
//!
//! Wires the startup loader, persistence coordinator and dangling registry
//! behind one cluster-state listener. Cluster states are applied one at a
//! time: persistence first, then dangling handling.

use crate::dangling::{DanglingIndexRegistry, DanglingInfo, DanglingReport};
use crate::import::DanglingImporter;
use crate::loader::{LoadedMetaState, StartupLoader};
use crate::persist::{MetadataPersistenceCoordinator, PersistOutcome};
use metagate_common::{ClusterSnapshot, Config, GatewayConfig, GlobalRecord, Result};
use metagate_storage::{NodeEnvironment, StateStores};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Receives every cluster state the node applies
pub trait ClusterStateListener: Send + Sync {
    fn cluster_changed(&self, state: &ClusterSnapshot);
}

/// Local metadata gateway of a node
pub struct GatewayMetaState {
    config: GatewayConfig,
    env: Arc<NodeEnvironment>,
    stores: Arc<StateStores>,
    coordinator: MetadataPersistenceCoordinator,
    dangling: DanglingIndexRegistry,
    recovered: LoadedMetaState,
    apply_lock: Mutex<()>,
}

impl GatewayMetaState {
    /// Build a gateway over an opened environment without loading anything
    pub fn new(
        config: GatewayConfig,
        env: Arc<NodeEnvironment>,
        importer: Arc<dyn DanglingImporter>,
        runtime: Handle,
    ) -> Self {
        let stores = Arc::new(StateStores::new(config.format));
        let coordinator = MetadataPersistenceCoordinator::new(Arc::clone(&env), Arc::clone(&stores));
        let dangling = DanglingIndexRegistry::new(
            Arc::clone(&env),
            Arc::clone(&stores),
            &config,
            importer,
            runtime,
        );

        Self {
            config,
            env,
            stores,
            coordinator,
            dangling,
            recovered: LoadedMetaState::default(),
            apply_lock: Mutex::new(()),
        }
    }

    /// Open the node's data paths and recover persisted metadata
    ///
    /// Only master-eligible and data nodes load state. Fails if global state
    /// files exist but none can be read.
    pub fn start(
        config: &Config,
        importer: Arc<dyn DanglingImporter>,
        runtime: Handle,
    ) -> Result<Self> {
        let env = if config.node.data_paths.is_empty() {
            NodeEnvironment::without_data()
        } else {
            NodeEnvironment::open(config.node.data_paths.clone())?
        };

        let mut gateway = Self::new(config.gateway.clone(), Arc::new(env), importer, runtime);

        if (config.node.master || config.node.data) && gateway.env.has_node_file() {
            let loaded = gateway.loader().load()?;
            gateway.coordinator.seed(&loaded);
            gateway.recovered = loaded;
        }

        info!(
            "gateway started for node [{}]: metadata version {}, {} index(es), auto import [{}]",
            config.node.name,
            gateway.recovered.metadata.version,
            gateway.recovered.metadata.indices.len(),
            gateway.config.auto_import_dangled
        );
        Ok(gateway)
    }

    fn loader(&self) -> StartupLoader {
        StartupLoader::new(
            Arc::clone(&self.env),
            Arc::clone(&self.stores),
            self.config.startup_read_attempts,
        )
    }

    /// Read the local metadata from disk again
    pub fn load_meta_state(&self) -> Result<GlobalRecord> {
        self.loader().load().map(|loaded| loaded.metadata)
    }

    /// What was recovered at start
    #[must_use]
    pub const fn recovered(&self) -> &LoadedMetaState {
        &self.recovered
    }

    /// Apply one cluster state: persist, then reconcile dangling indices
    pub fn apply(&self, state: &ClusterSnapshot) -> (PersistOutcome, DanglingReport) {
        let _guard = self.apply_lock.lock();

        let outcome = self.coordinator.on_cluster_state_change(state);
        let report = self.dangling.reconcile(state, &outcome.pending_deletes);

        debug!(
            "applied cluster state version {}: {} index write(s), {} failure(s), {} dangling detected",
            state.state_version,
            outcome.indices_written.len(),
            outcome.failed.len(),
            report.detected.len()
        );
        (outcome, report)
    }

    #[must_use]
    pub const fn coordinator(&self) -> &MetadataPersistenceCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn dangling(&self) -> &DanglingIndexRegistry {
        &self.dangling
    }

    /// Tracked dangling indices, sorted by name
    #[must_use]
    pub fn dangling_indices(&self) -> Vec<DanglingInfo> {
        self.dangling.dangling_indices()
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub fn env(&self) -> &NodeEnvironment {
        &self.env
    }

    #[must_use]
    pub fn stores(&self) -> &StateStores {
        &self.stores
    }

    /// Bound for callers waiting on a delete acknowledgement
    #[must_use]
    pub const fn delete_timeout(&self) -> Duration {
        self.config.delete_timeout()
    }
}

impl ClusterStateListener for GatewayMetaState {
    fn cluster_changed(&self, state: &ClusterSnapshot) {
        self.apply(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportCallback;
    use metagate_common::{AutoImportPolicy, IndexRecord, LocalNode};
    use std::path::Path;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    struct AcceptAll;

    impl DanglingImporter for AcceptAll {
        fn submit_dangling_import(&self, _records: Vec<IndexRecord>, on_result: ImportCallback) {
            on_result(Ok(()));
        }
    }

    fn config(root: &Path, policy: AutoImportPolicy) -> Config {
        let mut config = Config::default();
        config.node.data_paths = vec![root.join("d0"), root.join("d1")];
        config.gateway.auto_import_dangled = policy;
        config
    }

    fn snapshot(state_version: u64, metadata: GlobalRecord) -> ClusterSnapshot {
        ClusterSnapshot::new(state_version, metadata, LocalNode::new("node-1", true, true))
    }

    #[tokio::test]
    async fn test_restart_recovers_without_rewrite() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), AutoImportPolicy::Yes);
        let metadata = GlobalRecord::new(5)
            .with_cluster_uuid("c-1")
            .with_index(IndexRecord::new("a").with_version(2));

        {
            let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();
            assert!(!gateway.recovered().global_found);
            gateway.cluster_changed(&snapshot(1, metadata.clone()));
        }

        let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();
        let recovered = gateway.recovered();
        assert!(recovered.global_found);
        assert_eq!(recovered.metadata.version, 5);
        assert_eq!(recovered.metadata.cluster_uuid, "c-1");
        assert_eq!(recovered.metadata.index("a").unwrap().version, 2);

        let (outcome, report) = gateway.apply(&snapshot(2, metadata));
        assert!(outcome.is_noop());
        assert!(report.detected.is_empty());
        assert_eq!(gateway.stores().global.stats().writes.load(Ordering::Relaxed), 0);

        assert_eq!(gateway.load_meta_state().unwrap().version, 5);
    }

    #[tokio::test]
    async fn test_index_missing_after_restart_is_imported() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), AutoImportPolicy::Yes);
        let both = GlobalRecord::new(3)
            .with_index(IndexRecord::new("a"))
            .with_index(IndexRecord::new("b"));

        {
            let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();
            gateway.cluster_changed(&snapshot(1, both));
        }

        // The cluster lost b while this node was away
        let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();
        let only_a = GlobalRecord::new(4).with_index(IndexRecord::new("a"));
        let (outcome, report) = gateway.apply(&snapshot(2, only_a));

        assert!(outcome.deleted.is_empty());
        assert!(report.submitted.contains("b"));
        assert!(dir.path().join("d0/indices/b").exists());
    }

    #[tokio::test]
    async fn test_cluster_delete_not_reimported() {
        let dir = tempdir().unwrap();
        let config = config(dir.path(), AutoImportPolicy::Yes);
        let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();

        let both = GlobalRecord::new(1)
            .with_index(IndexRecord::new("a"))
            .with_index(IndexRecord::new("b"));
        gateway.apply(&snapshot(1, both));

        let only_a = GlobalRecord::new(2).with_index(IndexRecord::new("a"));
        let (outcome, report) = gateway.apply(&snapshot(2, only_a));

        assert!(outcome.deleted.contains("b"));
        assert!(report.detected.is_empty());
        assert!(gateway.dangling().is_empty());
        assert!(gateway.dangling_indices().is_empty());
        assert!(!dir.path().join("d1/indices/b").exists());
    }

    #[tokio::test]
    async fn test_node_without_data_paths() {
        let mut config = Config::default();
        config.node.data_paths.clear();

        let gateway = GatewayMetaState::start(&config, Arc::new(AcceptAll), Handle::current()).unwrap();
        assert!(!gateway.env().has_node_file());

        let (outcome, report) = gateway.apply(&snapshot(1, GlobalRecord::new(1)));
        assert!(outcome.is_noop());
        assert!(report.detected.is_empty());
        assert_eq!(gateway.delete_timeout(), Duration::from_secs(30));
    }
}
