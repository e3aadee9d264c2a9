//! Core type definitions for metagate
//!
//! This module defines the metadata records a node persists locally: the
//! cluster-wide [`GlobalRecord`] and the per-index [`IndexRecord`].

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for an index incarnation
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into, Display)]
#[display("{_0}")]
pub struct IndexUuid(Uuid);

impl IndexUuid {
    /// Generate a new random index UUID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for IndexUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IndexUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexUuid({})", self.0)
    }
}

/// Whether an index is served
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    #[default]
    #[display("open")]
    Open,
    #[display("close")]
    Close,
}

/// Metadata for a single index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Index name (also the name of its data directory)
    pub name: String,
    /// Incarnation identifier
    pub uuid: IndexUuid,
    /// Per-index version, bumped on every change to this index's metadata
    pub version: u64,
    /// Open or closed
    pub state: IndexState,
    /// Index settings
    pub settings: BTreeMap<String, String>,
    /// Mapping type -> mapping source (JSON text)
    pub mappings: BTreeMap<String, String>,
    /// Aliases pointing at this index
    pub aliases: BTreeSet<String>,
}

impl IndexRecord {
    /// Create an open index record at version 1
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: IndexUuid::new(),
            version: 1,
            state: IndexState::Open,
            settings: BTreeMap::new(),
            mappings: BTreeMap::new(),
            aliases: BTreeSet::new(),
        }
    }

    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub const fn with_state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping_type: impl Into<String>, source: impl Into<String>) -> Self {
        self.mappings.insert(mapping_type.into(), source.into());
        self
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Copy of this record under another name
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Check if the index is open
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == IndexState::Open
    }
}

/// Index template applied to newly created indices
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTemplate {
    /// Index name pattern (e.g., "logs-*")
    pub pattern: String,
    /// Lower orders are applied first
    pub order: i32,
    /// Settings merged into matching indices
    pub settings: BTreeMap<String, String>,
    /// Mappings merged into matching indices
    pub mappings: BTreeMap<String, String>,
}

impl IndexTemplate {
    #[must_use]
    pub fn new(pattern: impl Into<String>, order: i32) -> Self {
        Self {
            pattern: pattern.into(),
            order,
            settings: BTreeMap::new(),
            mappings: BTreeMap::new(),
        }
    }
}

/// Cluster-wide metadata
///
/// The `indices` map travels with cluster state but is never part of the
/// global state file: each index is persisted as its own [`IndexRecord`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRecord {
    /// Metadata version, bumped on every cluster-level metadata change
    pub version: u64,
    /// Cluster identity
    pub cluster_uuid: String,
    /// Persistent cluster settings
    pub settings: BTreeMap<String, String>,
    /// Index templates by name
    pub templates: BTreeMap<String, IndexTemplate>,
    /// Index name -> index metadata
    #[serde(skip)]
    pub indices: BTreeMap<String, Arc<IndexRecord>>,
}

impl GlobalRecord {
    /// Create an empty record at the given version
    #[must_use]
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cluster_uuid(mut self, cluster_uuid: impl Into<String>) -> Self {
        self.cluster_uuid = cluster_uuid.into();
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, template: IndexTemplate) -> Self {
        self.templates.insert(name.into(), template);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexRecord) -> Self {
        self.put_index(index);
        self
    }

    /// Insert or replace an index
    pub fn put_index(&mut self, index: IndexRecord) {
        self.indices.insert(index.name.clone(), Arc::new(index));
    }

    /// Look up an index by name
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Arc<IndexRecord>> {
        self.indices.get(name)
    }

    /// Check if an index is part of this metadata
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Index names in sorted order
    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    /// Copy of the cluster-level fields only
    #[must_use]
    pub fn without_indices(&self) -> Self {
        Self {
            version: self.version,
            cluster_uuid: self.cluster_uuid.clone(),
            settings: self.settings.clone(),
            templates: self.templates.clone(),
            indices: BTreeMap::new(),
        }
    }
}
