//! Dangling index registry
//!
//! A dangling index has data on this node's disk but is absent from the
//! cluster's metadata. Each cluster state:
//!
//! 1. drops tracked entries the cluster knows again, cancelling their timers
//! 2. detects new dangling directories and loads their index records
//! 3. decides a fate: import, delete now, or delete after a grace period
//! 4. submits pending imports as one batch, resubmitting accepted imports
//!    the cluster has not confirmed within the retry interval
//!
//! Entries live in a [`DashMap`]. Every mutation is a single atomic map
//! operation so a deletion timer racing with a cluster state is harmless:
//! the timer only removes an entry whose id still matches the one it was
//! scheduled for.

use crate::import::DanglingImporter;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metagate_common::{
    AutoImportPolicy, ClusterSnapshot, GatewayConfig, IndexRecord, IndexUuid, Result,
};
use metagate_storage::{NodeEnvironment, StateStores};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Deletion reason for a grace period that ran out
pub const DANGLING_TIMED_OUT: &str = "dangling index, timed out";
/// Deletion reason when no grace period is configured
pub const DANGLING_NO_TIMEOUT: &str = "dangling index, no timeout";

/// What will happen to a dangling index
#[derive(Debug)]
pub enum DanglingFate {
    /// Waiting to be submitted for import
    PendingImport,
    /// Submitted at `since`; waiting for a cluster state that contains it
    Importing { since: Instant },
    /// Data is deleted when the timer fires
    ScheduledDelete(AbortHandle),
}

impl DanglingFate {
    #[must_use]
    pub const fn status(&self) -> DanglingStatus {
        match self {
            Self::PendingImport => DanglingStatus::PendingImport,
            Self::Importing { .. } => DanglingStatus::Importing,
            Self::ScheduledDelete(_) => DanglingStatus::ScheduledDelete,
        }
    }
}

/// Fate without the timer handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DanglingStatus {
    PendingImport,
    Importing,
    ScheduledDelete,
}

impl std::fmt::Display for DanglingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingImport => write!(f, "pending-import"),
            Self::Importing => write!(f, "importing"),
            Self::ScheduledDelete => write!(f, "scheduled-delete"),
        }
    }
}

/// A tracked dangling index
#[derive(Debug)]
pub struct DanglingEntry {
    /// Directory name of the index
    pub index: String,
    /// Record loaded from the index's own state files
    pub record: IndexRecord,
    /// Distinguishes successive entries for the same index
    pub entry_id: u64,
    pub fate: DanglingFate,
    pub detected_at: Instant,
}

impl DanglingEntry {
    /// Abort the deletion timer, if any
    fn cancel(&self) {
        if let DanglingFate::ScheduledDelete(handle) = &self.fate {
            handle.abort();
        }
    }
}

/// Operator view of a dangling index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DanglingInfo {
    pub index: String,
    pub uuid: IndexUuid,
    pub version: u64,
    pub status: DanglingStatus,
    pub age: Duration,
}

/// An index directory with a readable record that the cluster does not know
#[derive(Clone, Debug)]
pub struct DanglingCandidate {
    /// Directory name
    pub index: String,
    /// Record as stored on disk; its name may differ from the directory
    pub record: IndexRecord,
}

impl DanglingCandidate {
    /// Record prepared for import: named after the directory, with the
    /// policy's state override applied
    #[must_use]
    pub fn import_record(&self, policy: AutoImportPolicy) -> IndexRecord {
        let mut record = if self.record.name == self.index {
            self.record.clone()
        } else {
            warn!(
                "[{}] dangling index state names [{}], importing under the directory name",
                self.index, self.record.name
            );
            self.record.renamed(&self.index)
        };
        if let Some(state) = policy.import_state_override() {
            record.state = state;
        }
        record
    }
}

/// Find local index directories unknown to the cluster
///
/// `is_known` decides which names are accounted for. Directories without a
/// readable index record are logged and skipped.
pub fn scan_dangling(
    env: &NodeEnvironment,
    stores: &StateStores,
    is_known: impl Fn(&str) -> bool,
) -> Result<Vec<DanglingCandidate>> {
    let mut found = Vec::new();
    for index in env.list_local_index_ids()? {
        if is_known(&index) {
            continue;
        }
        let locations = env.find_local_index_locations(&index);
        match stores.index.load_latest::<IndexRecord>(&locations) {
            Some(loaded) => found.push(DanglingCandidate {
                index,
                record: loaded.record,
            }),
            None => warn!(
                "[{}] index directory is not in the cluster state but has no readable state, ignoring",
                index
            ),
        }
    }
    Ok(found)
}

/// What one reconcile pass did
#[derive(Clone, Debug, Default)]
pub struct DanglingReport {
    /// Entries dropped because the cluster contains them again
    pub undangled: BTreeSet<String>,
    /// Newly tracked dangling indices
    pub detected: BTreeSet<String>,
    /// Deleted synchronously in this pass
    pub deleted: BTreeSet<String>,
    /// Submitted for import in this pass
    pub submitted: BTreeSet<String>,
}

/// State shared with timer tasks and import callbacks
struct RegistryShared {
    env: Arc<NodeEnvironment>,
    entries: DashMap<String, DanglingEntry>,
}

impl RegistryShared {
    /// Timer body: delete only if the entry is still the one scheduled
    fn expire(&self, index: &str, entry_id: u64) {
        let Some((_, entry)) = self
            .entries
            .remove_if(index, |_, entry| entry.entry_id == entry_id)
        else {
            debug!("[{}] dangling timer fired for a removed entry, ignoring", index);
            return;
        };

        info!(
            "[{}] dangling index was not reclaimed within the grace period, deleting",
            index
        );
        if let Err(e) = self.env.delete_index_data(DANGLING_TIMED_OUT, &entry.record, None) {
            // Re-detected on the next cluster state
            warn!("[{}] failed to delete dangling index: {}", index, e);
        }
    }

    /// Import callback failure path
    fn import_failed(&self, submitted: &[(String, u64)]) {
        for (index, entry_id) in submitted {
            if let Some(mut entry) = self.entries.get_mut(index)
                && entry.entry_id == *entry_id
                && matches!(entry.fate, DanglingFate::Importing { .. })
            {
                entry.fate = DanglingFate::PendingImport;
            }
        }
    }
}

/// Tracks dangling indices and resolves them by policy
pub struct DanglingIndexRegistry {
    shared: Arc<RegistryShared>,
    stores: Arc<StateStores>,
    policy: AutoImportPolicy,
    grace: Duration,
    import_retry: Duration,
    importer: Arc<dyn DanglingImporter>,
    runtime: Handle,
    next_entry_id: AtomicU64,
}

impl DanglingIndexRegistry {
    /// Create a registry; deletion timers are spawned on `runtime`
    pub fn new(
        env: Arc<NodeEnvironment>,
        stores: Arc<StateStores>,
        config: &GatewayConfig,
        importer: Arc<dyn DanglingImporter>,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                env,
                entries: DashMap::new(),
            }),
            stores,
            policy: config.auto_import_dangled,
            grace: config.dangling_timeout(),
            import_retry: config.dangling_import_retry,
            importer,
            runtime,
            next_entry_id: AtomicU64::new(1),
        }
    }

    /// Reconcile with a cluster state
    pub fn on_cluster_state_change(&self, state: &ClusterSnapshot) -> DanglingReport {
        self.reconcile(state, &BTreeSet::new())
    }

    /// Reconcile with a cluster state, treating `excluded` as accounted for
    ///
    /// `excluded` carries indices the cluster deleted but whose local data is
    /// still awaiting removal; they must not be re-imported.
    pub fn reconcile(&self, state: &ClusterSnapshot, excluded: &BTreeSet<String>) -> DanglingReport {
        let mut report = DanglingReport::default();

        if !self.shared.env.has_node_file() {
            return report;
        }
        if state.blocks.disable_state_persistence {
            debug!("state persistence disabled, skipping dangling index detection");
            return report;
        }

        self.undangle(state, &mut report);

        let candidates = match scan_dangling(&self.shared.env, &self.stores, |index| {
            state.has_index(index) || excluded.contains(index) || self.shared.entries.contains_key(index)
        }) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("failed to list local indices for dangling detection: {}", e);
                Vec::new()
            }
        };

        for candidate in candidates {
            self.decide_fate(candidate, &mut report);
        }

        if self.policy.should_import() {
            self.submit_pending_imports(&mut report);
        }

        report
    }

    fn undangle(&self, state: &ClusterSnapshot, report: &mut DanglingReport) {
        let reclaimed: Vec<String> = self
            .shared
            .entries
            .iter()
            .filter(|entry| state.has_index(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        for index in reclaimed {
            // The timer may have removed it meanwhile
            if let Some((_, entry)) = self.shared.entries.remove(&index) {
                entry.cancel();
                debug!("[{}] index is part of the cluster state again, no longer dangling", index);
                report.undangled.insert(index);
            }
        }
    }

    fn decide_fate(&self, candidate: DanglingCandidate, report: &mut DanglingReport) {
        let DanglingCandidate { index, record } = candidate;

        if !self.policy.should_import() && self.grace.is_zero() {
            info!("[{}] deleting dangling index, no grace period configured", index);
            match self.shared.env.delete_index_data(DANGLING_NO_TIMEOUT, &record, None) {
                Ok(()) => {
                    report.deleted.insert(index);
                }
                Err(e) => warn!("[{}] failed to delete dangling index: {}", index, e),
            }
            return;
        }

        let Entry::Vacant(vacant) = self.shared.entries.entry(index.clone()) else {
            return;
        };
        let entry_id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);

        let fate = if self.policy.should_import() {
            info!(
                "[{}] dangling index found on disk, will be imported (policy [{}])",
                index, self.policy
            );
            DanglingFate::PendingImport
        } else {
            info!(
                "[{}] dangling index found on disk, deleting in {:?} unless the cluster reclaims it",
                index, self.grace
            );
            let shared = Arc::clone(&self.shared);
            let grace = self.grace;
            let timer_index = index.clone();
            let task = self.runtime.spawn(async move {
                tokio::time::sleep(grace).await;
                // Deletion is blocking filesystem work
                let expired =
                    tokio::task::spawn_blocking(move || shared.expire(&timer_index, entry_id)).await;
                if let Err(e) = expired {
                    warn!("dangling deletion task failed: {}", e);
                }
            });
            DanglingFate::ScheduledDelete(task.abort_handle())
        };

        vacant.insert(DanglingEntry {
            index: index.clone(),
            record,
            entry_id,
            fate,
            detected_at: Instant::now(),
        });
        report.detected.insert(index);
    }

    fn submit_pending_imports(&self, report: &mut DanglingReport) {
        let now = Instant::now();
        let mut records = Vec::new();
        let mut submitted = Vec::new();

        for mut entry in self.shared.entries.iter_mut() {
            match entry.fate {
                DanglingFate::PendingImport => {}
                DanglingFate::Importing { since }
                    if now.saturating_duration_since(since) >= self.import_retry =>
                {
                    info!(
                        "[{}] import accepted {:?} ago but not in the cluster state yet, resubmitting",
                        entry.index,
                        now.saturating_duration_since(since)
                    );
                }
                _ => continue,
            }
            entry.fate = DanglingFate::Importing { since: now };
            let candidate = DanglingCandidate {
                index: entry.index.clone(),
                record: entry.record.clone(),
            };
            records.push(candidate.import_record(self.policy));
            submitted.push((entry.index.clone(), entry.entry_id));
        }

        if records.is_empty() {
            return;
        }

        info!("submitting {} dangling index(es) for import", records.len());
        report
            .submitted
            .extend(submitted.iter().map(|(index, _)| index.clone()));

        let shared = Arc::clone(&self.shared);
        self.importer.submit_dangling_import(
            records,
            Box::new(move |result| match result {
                Ok(()) => debug!("dangling index import accepted for {} index(es)", submitted.len()),
                Err(e) => {
                    warn!("failed to import dangling indices, will retry: {}", e);
                    shared.import_failed(&submitted);
                }
            }),
        );
    }

    /// Tracked dangling indices, sorted by name
    #[must_use]
    pub fn dangling_indices(&self) -> Vec<DanglingInfo> {
        let now = Instant::now();
        let mut infos: Vec<DanglingInfo> = self
            .shared
            .entries
            .iter()
            .map(|entry| DanglingInfo {
                index: entry.index.clone(),
                uuid: entry.record.uuid,
                version: entry.record.version,
                status: entry.fate.status(),
                age: now.saturating_duration_since(entry.detected_at),
            })
            .collect();
        infos.sort_by(|a, b| a.index.cmp(&b.index));
        infos
    }

    #[must_use]
    pub fn is_dangling(&self, index: &str) -> bool {
        self.shared.entries.contains_key(index)
    }

    #[must_use]
    pub fn status(&self, index: &str) -> Option<DanglingStatus> {
        self.shared.entries.get(index).map(|entry| entry.fate.status())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Abort every pending deletion timer
    pub fn shutdown(&self) {
        for entry in self.shared.entries.iter() {
            entry.cancel();
        }
    }
}

impl Drop for DanglingIndexRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metagate_common::{Error, GlobalRecord, IndexState, LocalNode, StateFormat};
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingImporter {
        batches: Mutex<Vec<Vec<IndexRecord>>>,
        fail: AtomicBool,
    }

    impl DanglingImporter for RecordingImporter {
        fn submit_dangling_import(
            &self,
            records: Vec<IndexRecord>,
            on_result: crate::import::ImportCallback,
        ) {
            self.batches.lock().push(records);
            if self.fail.load(Ordering::SeqCst) {
                on_result(Err(Error::ImportSubmission("rejected".into())));
            } else {
                on_result(Ok(()));
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        env: Arc<NodeEnvironment>,
        stores: Arc<StateStores>,
        importer: Arc<RecordingImporter>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let root = dir.path().join("d0");
            let env = Arc::new(NodeEnvironment::open(vec![root.clone()]).unwrap());
            Self {
                _dir: dir,
                root,
                env,
                stores: Arc::new(StateStores::new(StateFormat::Binary)),
                importer: Arc::new(RecordingImporter::default()),
            }
        }

        fn registry(&self, policy: AutoImportPolicy, grace_secs: u64) -> DanglingIndexRegistry {
            let config = GatewayConfig {
                auto_import_dangled: policy,
                dangling_timeout: Duration::from_secs(grace_secs),
                dangling_import_retry: Duration::from_secs(30),
                ..GatewayConfig::default()
            };
            DanglingIndexRegistry::new(
                Arc::clone(&self.env),
                Arc::clone(&self.stores),
                &config,
                Arc::clone(&self.importer) as Arc<dyn DanglingImporter>,
                Handle::current(),
            )
        }

        /// Put an index on disk under `dir_name` with the given record
        fn put_index(&self, dir_name: &str, record: &IndexRecord) {
            self.stores
                .index
                .write(record, record.version, &self.env.index_state_locations(dir_name))
                .unwrap();
        }

        fn index_dir(&self, name: &str) -> PathBuf {
            self.root.join("indices").join(name)
        }
    }

    fn snapshot(indices: &[&str]) -> ClusterSnapshot {
        let metadata = indices
            .iter()
            .fold(GlobalRecord::new(1), |m, name| m.with_index(IndexRecord::new(*name)));
        ClusterSnapshot::new(1, metadata, LocalNode::new("node-1", true, true))
    }

    fn exists(path: &Path) -> bool {
        path.exists()
    }

    #[tokio::test]
    async fn test_detects_dangling_once() {
        let f = Fixture::new();
        f.put_index("a", &IndexRecord::new("a"));
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 3600);

        let report = registry.on_cluster_state_change(&snapshot(&["a"]));
        assert_eq!(report.detected.into_iter().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.status("b"), Some(DanglingStatus::ScheduledDelete));

        let report = registry.on_cluster_state_change(&snapshot(&["a"]));
        assert!(report.detected.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undangle_cancels_timer() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 60);

        registry.on_cluster_state_change(&snapshot(&[]));
        assert!(registry.is_dangling("b"));

        let report = registry.on_cluster_state_change(&snapshot(&["b"]));
        assert!(report.undangled.contains("b"));
        assert!(registry.is_empty());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(exists(&f.index_dir("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_deletes_after_grace() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 60);

        registry.on_cluster_state_change(&snapshot(&[]));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(exists(&f.index_dir("b")));

        // The delete itself runs on the blocking pool
        tokio::time::sleep(Duration::from_secs(31)).await;
        for _ in 0..50 {
            if !exists(&f.index_dir("b")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!exists(&f.index_dir("b")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_timer_is_noop() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 3600);

        registry.on_cluster_state_change(&snapshot(&[]));
        let entry_id = registry.shared.entries.get("b").unwrap().entry_id;

        // A timer from an earlier entry for the same index
        registry.shared.expire("b", entry_id + 100);
        assert!(registry.is_dangling("b"));
        assert!(exists(&f.index_dir("b")));

        // Timer for an entry that is already gone
        registry.shared.expire("missing", 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_deletes_synchronously() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 0);

        let report = registry.on_cluster_state_change(&snapshot(&[]));
        assert!(report.deleted.contains("b"));
        assert!(report.detected.is_empty());
        assert!(registry.is_empty());
        assert!(!exists(&f.index_dir("b")));
    }

    #[tokio::test]
    async fn test_import_uses_directory_name() {
        let f = Fixture::new();
        f.put_index("dir-name", &IndexRecord::new("stored-name").with_version(6));
        let registry = f.registry(AutoImportPolicy::Yes, 3600);

        let report = registry.on_cluster_state_change(&snapshot(&[]));
        assert!(report.submitted.contains("dir-name"));

        let batches = f.importer.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].name, "dir-name");
        assert_eq!(batches[0][0].version, 6);
        assert_eq!(batches[0][0].state, IndexState::Open);
        drop(batches);

        assert_eq!(registry.status("dir-name"), Some(DanglingStatus::Importing));

        // Not resubmitted while the import is in flight
        registry.on_cluster_state_change(&snapshot(&[]));
        assert_eq!(f.importer.batches.lock().len(), 1);

        // Imported: the cluster now contains it
        let report = registry.on_cluster_state_change(&snapshot(&["dir-name"]));
        assert!(report.undangled.contains("dir-name"));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_import_resubmitted_when_unconfirmed() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::Yes, 3600);

        // Accepted, but the cluster state never gains b
        registry.on_cluster_state_change(&snapshot(&[]));
        for _ in 0..4 {
            registry.on_cluster_state_change(&snapshot(&[]));
        }
        assert_eq!(f.importer.batches.lock().len(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let report = registry.on_cluster_state_change(&snapshot(&[]));
        assert!(report.submitted.contains("b"));
        assert_eq!(f.importer.batches.lock().len(), 2);
        assert_eq!(registry.status("b"), Some(DanglingStatus::Importing));

        // The retry interval restarts from the resubmission
        registry.on_cluster_state_change(&snapshot(&[]));
        assert_eq!(f.importer.batches.lock().len(), 2);

        let report = registry.on_cluster_state_change(&snapshot(&["b"]));
        assert!(report.undangled.contains("b"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_closed_policy_imports_closed() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b").with_state(IndexState::Open));
        let registry = f.registry(AutoImportPolicy::Closed, 3600);

        registry.on_cluster_state_change(&snapshot(&[]));

        let batches = f.importer.batches.lock();
        assert_eq!(batches[0][0].state, IndexState::Close);
    }

    #[tokio::test]
    async fn test_failed_import_resubmitted() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        f.importer.fail.store(true, Ordering::SeqCst);
        let registry = f.registry(AutoImportPolicy::Yes, 3600);

        registry.on_cluster_state_change(&snapshot(&[]));
        assert_eq!(registry.status("b"), Some(DanglingStatus::PendingImport));

        f.importer.fail.store(false, Ordering::SeqCst);
        let report = registry.on_cluster_state_change(&snapshot(&[]));
        assert!(report.submitted.contains("b"));
        assert_eq!(f.importer.batches.lock().len(), 2);
        assert_eq!(registry.status("b"), Some(DanglingStatus::Importing));
    }

    #[tokio::test]
    async fn test_excluded_and_unreadable_indices_ignored() {
        let f = Fixture::new();
        f.put_index("pending-delete", &IndexRecord::new("pending-delete"));
        std::fs::create_dir_all(f.index_dir("no-state").join("0")).unwrap();
        let registry = f.registry(AutoImportPolicy::Yes, 3600);

        let excluded: BTreeSet<String> = ["pending-delete".to_string()].into();
        let report = registry.reconcile(&snapshot(&[]), &excluded);

        assert!(report.detected.is_empty());
        assert!(registry.is_empty());
        assert!(f.importer.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_disabled_skips_detection() {
        let f = Fixture::new();
        f.put_index("b", &IndexRecord::new("b"));
        let registry = f.registry(AutoImportPolicy::No, 0);

        let blocked = snapshot(&[]).with_blocks(metagate_common::ClusterBlocks {
            disable_state_persistence: true,
        });
        let report = registry.on_cluster_state_change(&blocked);
        assert!(report.deleted.is_empty());
        assert!(exists(&f.index_dir("b")));
    }

    #[tokio::test]
    async fn test_dangling_indices_listing() {
        let f = Fixture::new();
        f.put_index("x", &IndexRecord::new("x").with_version(3));
        f.put_index("y", &IndexRecord::new("y"));
        let registry = f.registry(AutoImportPolicy::No, 3600);

        registry.on_cluster_state_change(&snapshot(&[]));
        let infos = registry.dangling_indices();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].index, "x");
        assert_eq!(infos[0].version, 3);
        assert_eq!(infos[1].status, DanglingStatus::ScheduledDelete);

        registry.shutdown();
    }
}
