//! Cluster state snapshot as delivered to a node
//!
//! Snapshots are produced upstream by the elected coordinator and handed to
//! this node in order; everything here is immutable input.

use crate::types::GlobalRecord;
use std::sync::Arc;

/// The receiving node's identity and roles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalNode {
    /// Node identifier
    pub id: String,
    /// Node may be elected coordinator
    pub master_eligible: bool,
    /// Node holds index data
    pub data: bool,
}

impl LocalNode {
    #[must_use]
    pub fn new(id: impl Into<String>, master_eligible: bool, data: bool) -> Self {
        Self {
            id: id.into(),
            master_eligible,
            data,
        }
    }

    /// Master-eligible and data nodes keep a durable copy of the metadata
    #[must_use]
    pub const fn persists_metadata(&self) -> bool {
        self.master_eligible || self.data
    }
}

/// Cluster-level blocks relevant to local persistence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClusterBlocks {
    /// The node must not persist (or trust) metadata while this is set
    pub disable_state_persistence: bool,
}

/// One immutable cluster state as seen by this node
#[derive(Clone, Debug)]
pub struct ClusterSnapshot {
    /// Cluster state version, for logging context
    pub state_version: u64,
    /// Authoritative metadata
    pub metadata: Arc<GlobalRecord>,
    /// This node
    pub local_node: LocalNode,
    /// Active blocks
    pub blocks: ClusterBlocks,
}

impl ClusterSnapshot {
    #[must_use]
    pub fn new(state_version: u64, metadata: GlobalRecord, local_node: LocalNode) -> Self {
        Self {
            state_version,
            metadata: Arc::new(metadata),
            local_node,
            blocks: ClusterBlocks::default(),
        }
    }

    #[must_use]
    pub const fn with_blocks(mut self, blocks: ClusterBlocks) -> Self {
        self.blocks = blocks;
        self
    }

    /// Check if the cluster currently knows an index
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.metadata.has_index(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexRecord;

    #[test]
    fn test_persists_metadata_roles() {
        assert!(LocalNode::new("n1", true, false).persists_metadata());
        assert!(LocalNode::new("n1", false, true).persists_metadata());
        assert!(!LocalNode::new("n1", false, false).persists_metadata());
    }

    #[test]
    fn test_snapshot_has_index() {
        let snapshot = ClusterSnapshot::new(
            3,
            GlobalRecord::new(1).with_index(IndexRecord::new("a")),
            LocalNode::new("n1", true, true),
        );
        assert!(snapshot.has_index("a"));
        assert!(!snapshot.has_index("b"));
        assert!(!snapshot.blocks.disable_state_persistence);
    }
}
