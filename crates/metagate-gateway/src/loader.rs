//! Startup metadata loading
//!
//! Reads the newest valid global record and every local index record, after
//! first upgrading any legacy single-file layout.

use metagate_common::{Error, GlobalRecord, IndexRecord, Result};
use metagate_storage::{upgrade_legacy_layout, NodeEnvironment, StateStores, Versioned};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backoff unit between failed read attempts
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Metadata recovered from local disk
#[derive(Clone, Debug, Default)]
pub struct LoadedMetaState {
    /// Global record with the local indices attached
    pub metadata: GlobalRecord,
    /// Whether a global state file was actually found
    pub global_found: bool,
    /// Whether a legacy layout was upgraded during this load
    pub upgraded_legacy: bool,
}

/// Loads persisted metadata when the node starts
pub struct StartupLoader {
    env: Arc<NodeEnvironment>,
    stores: Arc<StateStores>,
    read_attempts: u32,
    legacy_upgrade: bool,
}

impl StartupLoader {
    #[must_use]
    pub fn new(env: Arc<NodeEnvironment>, stores: Arc<StateStores>, read_attempts: u32) -> Self {
        Self {
            env,
            stores,
            read_attempts: read_attempts.max(1),
            legacy_upgrade: true,
        }
    }

    /// Leave a legacy layout on disk untouched
    #[must_use]
    pub const fn without_legacy_upgrade(mut self) -> Self {
        self.legacy_upgrade = false;
        self
    }

    /// Load the local metadata
    ///
    /// A legacy upgrade failure is logged and does not block the load. With
    /// the upgrade disabled, a legacy-only node loads as empty. If
    /// global state files exist but none of them is readable after every
    /// attempt, the error is returned.
    pub fn load(&self) -> Result<LoadedMetaState> {
        let upgrade = if self.legacy_upgrade {
            upgrade_legacy_layout(&self.env, &self.stores)
        } else {
            Ok(None)
        };
        let upgraded_legacy = match upgrade {
            Ok(Some(upgrade)) => {
                info!(
                    "upgraded legacy metadata from {:?}, {} file(s) moved aside",
                    upgrade.source,
                    upgrade.backups.len()
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("failed to upgrade legacy metadata layout: {}", e);
                false
            }
        };

        let mut attempt = 1;
        loop {
            match self.try_load() {
                Ok(mut loaded) => {
                    loaded.upgraded_legacy = upgraded_legacy;
                    info!(
                        "loaded metadata version {} with {} index(es)",
                        loaded.metadata.version,
                        loaded.metadata.indices.len()
                    );
                    return Ok(loaded);
                }
                Err(e) if e.is_retryable() && attempt < self.read_attempts => {
                    warn!(
                        "failed to read local metadata (attempt {}/{}): {}",
                        attempt, self.read_attempts, e
                    );
                    std::thread::sleep(READ_RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "failed to read local metadata after {} attempt(s): {}",
                        attempt, e
                    );
                    return Err(e);
                }
            }
        }
    }

    fn try_load(&self) -> Result<LoadedMetaState> {
        let locations = self.env.node_state_locations();

        let latest = self.stores.global.load_latest::<GlobalRecord>(&locations);
        let (mut metadata, global_found) = match latest {
            Some(Versioned { record, version, .. }) => {
                debug!("found global state version {}", version);
                (record, true)
            }
            None => {
                let candidates = self.stores.global.scan(&locations);
                if let Some(newest) = candidates.first() {
                    return Err(Error::persistence_io(
                        &newest.path,
                        format!("none of {} global state file(s) is readable", candidates.len()),
                    ));
                }
                debug!("no global state found, starting from empty metadata");
                (GlobalRecord::default(), false)
            }
        };

        for name in self.env.list_local_index_ids()? {
            let index_locations = self.env.find_local_index_locations(&name);
            let Some(loaded) = self.stores.index.load_latest::<IndexRecord>(&index_locations) else {
                debug!("[{}] no readable index state, skipping", name);
                continue;
            };

            let record = if loaded.record.name == name {
                loaded.record
            } else {
                warn!(
                    "[{}] index state names [{}], using the directory name",
                    name, loaded.record.name
                );
                loaded.record.renamed(&name)
            };
            metadata.put_index(record);
        }

        Ok(LoadedMetaState {
            metadata,
            global_found,
            upgraded_legacy: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metagate_common::{IndexState, StateFormat};
    use metagate_storage::STATE_DIR;
    use tempfile::tempdir;

    fn setup(root: &std::path::Path) -> (Arc<NodeEnvironment>, Arc<StateStores>) {
        let env = Arc::new(NodeEnvironment::open(vec![root.join("d0"), root.join("d1")]).unwrap());
        let stores = Arc::new(StateStores::new(StateFormat::Binary));
        (env, stores)
    }

    #[test]
    fn test_empty_node_loads_default() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let loaded = StartupLoader::new(env, stores, 3).load().unwrap();
        assert!(!loaded.global_found);
        assert!(!loaded.upgraded_legacy);
        assert_eq!(loaded.metadata.version, 0);
        assert!(loaded.metadata.indices.is_empty());
    }

    #[test]
    fn test_loads_global_and_indices() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let global = GlobalRecord::new(12).with_cluster_uuid("c-1");
        stores
            .global
            .write(&global, 12, &env.node_state_locations())
            .unwrap();
        let a = IndexRecord::new("a").with_version(4);
        stores.index.write(&a, 4, &env.index_state_locations("a")).unwrap();

        let loaded = StartupLoader::new(env, stores, 1).load().unwrap();
        assert!(loaded.global_found);
        assert_eq!(loaded.metadata.version, 12);
        assert_eq!(loaded.metadata.cluster_uuid, "c-1");
        assert_eq!(loaded.metadata.index("a").unwrap().version, 4);
    }

    #[test]
    fn test_index_renamed_to_directory() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let record = IndexRecord::new("old-name").with_version(2);
        stores
            .index
            .write(&record, 2, &env.index_state_locations("new-name"))
            .unwrap();

        let loaded = StartupLoader::new(env, stores, 1).load().unwrap();
        assert!(loaded.metadata.has_index("new-name"));
        assert!(!loaded.metadata.has_index("old-name"));
        assert_eq!(loaded.metadata.index("new-name").unwrap().name, "new-name");
    }

    #[test]
    fn test_unreadable_global_state_is_fatal() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let state_dir = dir.path().join("d0").join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::write(state_dir.join("global-5.st"), b"garbage").unwrap();

        let err = StartupLoader::new(env, stores, 2).load().unwrap_err();
        assert!(matches!(err, Error::PersistenceIo { .. }));
    }

    #[test]
    fn test_corrupt_index_skipped() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let bad_dir = dir.path().join("d0/indices/bad").join(STATE_DIR);
        std::fs::create_dir_all(&bad_dir).unwrap();
        std::fs::write(bad_dir.join("state-1.st"), b"garbage").unwrap();
        let good = IndexRecord::new("good").with_state(IndexState::Close);
        stores
            .index
            .write(&good, 1, &env.index_state_locations("good"))
            .unwrap();

        let loaded = StartupLoader::new(env, stores, 1).load().unwrap();
        assert!(!loaded.metadata.has_index("bad"));
        assert_eq!(loaded.metadata.index("good").unwrap().state, IndexState::Close);
    }

    #[test]
    fn test_legacy_layout_upgraded_on_load() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let state_dir = dir.path().join("d1").join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::write(
            state_dir.join("metadata-9"),
            r#"{"version": 9, "indices": [{"name": "logs"}]}"#,
        )
        .unwrap();

        let loaded = StartupLoader::new(env, stores, 1).load().unwrap();
        assert!(loaded.upgraded_legacy);
        assert!(loaded.global_found);
        assert_eq!(loaded.metadata.version, 9);
        assert!(loaded.metadata.has_index("logs"));
        assert!(state_dir.join("metadata-9.orig").exists());
    }

    #[test]
    fn test_legacy_layout_left_alone_when_upgrade_disabled() {
        let dir = tempdir().unwrap();
        let (env, stores) = setup(dir.path());

        let state_dir = dir.path().join("d0").join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).unwrap();
        let legacy = state_dir.join("metadata-9");
        std::fs::write(&legacy, r#"{"version": 9, "indices": [{"name": "logs"}]}"#).unwrap();

        let loaded = StartupLoader::new(env, stores, 1)
            .without_legacy_upgrade()
            .load()
            .unwrap();
        assert!(!loaded.upgraded_legacy);
        assert!(!loaded.global_found);
        assert!(legacy.exists());
        assert!(!state_dir.join("metadata-9.orig").exists());
        assert_eq!(std::fs::read_dir(&state_dir).unwrap().count(), 1);
    }
}
