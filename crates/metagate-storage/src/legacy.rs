//! One-shot upgrade of the legacy single-file metadata layout
//!
//! Older nodes kept the whole metadata, indices included, in one JSON file
//! `_state/metadata-<version>` per data path. The upgrade translates the
//! newest such file into the current global/index state files and renames
//! every legacy file to `<name>.orig`. Legacy files are never deleted.

use crate::node::{is_valid_index_dir_name, NodeEnvironment};
use crate::state::StateStores;
use metagate_common::{
    Error, GlobalRecord, IndexRecord, IndexState, IndexTemplate, IndexUuid, Result,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Prefix of legacy combined metadata files
pub const LEGACY_STATE_PREFIX: &str = "metadata-";
/// Suffix appended to legacy files once upgraded
pub const LEGACY_BACKUP_SUFFIX: &str = ".orig";
/// Version stamped on index records reconstructed from the legacy layout
pub const LEGACY_INDEX_VERSION: u64 = 0;

#[derive(Debug, Deserialize)]
struct LegacyMetaData {
    version: u64,
    #[serde(default)]
    cluster_uuid: String,
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    templates: BTreeMap<String, LegacyTemplate>,
    #[serde(default)]
    indices: Vec<LegacyIndex>,
}

#[derive(Debug, Deserialize)]
struct LegacyTemplate {
    template: String,
    #[serde(default)]
    order: i32,
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    mappings: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct LegacyIndex {
    name: String,
    #[serde(default)]
    uuid: Option<Uuid>,
    #[serde(default)]
    state: IndexState,
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    mappings: BTreeMap<String, String>,
    #[serde(default)]
    aliases: Vec<String>,
}

/// A legacy file found on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyFile {
    pub path: PathBuf,
    pub version: u64,
}

/// Result of a completed upgrade
#[derive(Debug)]
pub struct LegacyUpgrade {
    /// Metadata reconstructed from the legacy file, indices included
    pub metadata: GlobalRecord,
    /// The file the metadata was read from
    pub source: PathBuf,
    /// Where each legacy file was moved
    pub backups: Vec<PathBuf>,
}

/// Find legacy files on every data path, newest first
#[must_use]
pub fn find_legacy_files(env: &NodeEnvironment) -> Vec<LegacyFile> {
    let mut found: Vec<LegacyFile> = env
        .node_state_locations()
        .iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flat_map(|entries| entries.filter_map(|entry| entry.ok()))
        .filter_map(|entry| {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            name_str
                .strip_prefix(LEGACY_STATE_PREFIX)
                .and_then(|s| s.parse::<u64>().ok())
                .map(|version| LegacyFile {
                    path: entry.path(),
                    version,
                })
        })
        .collect();

    found.sort_by(|a, b| b.version.cmp(&a.version));
    found
}

/// Parse a legacy file into current record shapes
///
/// Indices whose name cannot be a data directory are skipped.
pub fn parse_legacy_file(path: &Path) -> Result<GlobalRecord> {
    let raw = std::fs::read(path).map_err(|e| Error::legacy_upgrade(path, e))?;
    let legacy: LegacyMetaData =
        serde_json::from_slice(&raw).map_err(|e| Error::legacy_upgrade(path, e))?;

    let mut metadata = GlobalRecord {
        version: legacy.version,
        cluster_uuid: legacy.cluster_uuid,
        settings: legacy.settings,
        templates: legacy
            .templates
            .into_iter()
            .map(|(name, t)| {
                let template = IndexTemplate {
                    pattern: t.template,
                    order: t.order,
                    settings: t.settings,
                    mappings: t.mappings,
                };
                (name, template)
            })
            .collect(),
        indices: BTreeMap::new(),
    };

    for index in legacy.indices {
        if !is_valid_index_dir_name(&index.name) {
            warn!(
                "skipping legacy index with invalid name {:?} in {:?}",
                index.name, path
            );
            continue;
        }
        metadata.put_index(IndexRecord {
            name: index.name,
            uuid: index.uuid.map_or_else(IndexUuid::new, IndexUuid::from_uuid),
            version: LEGACY_INDEX_VERSION,
            state: index.state,
            settings: index.settings,
            mappings: index.mappings,
            aliases: index.aliases.into_iter().collect::<BTreeSet<_>>(),
        });
    }

    Ok(metadata)
}

/// Upgrade the legacy layout if one is present
///
/// Returns `Ok(None)` when there is nothing to upgrade. On a parse failure
/// the legacy files are left untouched.
pub fn upgrade_legacy_layout(
    env: &NodeEnvironment,
    stores: &StateStores,
) -> Result<Option<LegacyUpgrade>> {
    let files = find_legacy_files(env);
    let Some(newest) = files.first() else {
        return Ok(None);
    };

    info!(
        "found {} legacy metadata file(s), upgrading from {:?}",
        files.len(),
        newest.path
    );
    let metadata = parse_legacy_file(&newest.path)?;

    stores
        .global
        .write(&metadata.without_indices(), metadata.version, &env.node_state_locations())
        .map_err(|e| Error::legacy_upgrade(&newest.path, e))?;

    for (name, index) in &metadata.indices {
        stores
            .index
            .write(index.as_ref(), index.version, &env.index_state_locations(name))
            .map_err(|e| Error::legacy_upgrade(&newest.path, e))?;
    }

    let mut backups = Vec::with_capacity(files.len());
    for file in &files {
        let mut backup = file.path.clone().into_os_string();
        backup.push(LEGACY_BACKUP_SUFFIX);
        let backup = PathBuf::from(backup);
        match std::fs::rename(&file.path, &backup) {
            Ok(()) => backups.push(backup),
            Err(e) => warn!("failed to move legacy file {:?} aside: {}", file.path, e),
        }
    }

    info!(
        "upgraded legacy metadata version {} with {} index(es)",
        metadata.version,
        metadata.indices.len()
    );

    Ok(Some(LegacyUpgrade {
        metadata,
        source: newest.path.clone(),
        backups,
    }))
}
