//! Cluster-import seam for dangling indices
//!
//! The cluster side of an import (validating the records and publishing a
//! new cluster state that contains them) lives outside this crate. A
//! successful import shows up later as a snapshot containing the indices.

use metagate_common::{IndexRecord, Result};

/// Completion callback for an import batch
pub type ImportCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Submits dangling index records to the elected coordinator
pub trait DanglingImporter: Send + Sync {
    /// Submit a batch asynchronously; `on_result` is invoked exactly once
    ///
    /// The callback may run on any thread, including the caller's.
    fn submit_dangling_import(&self, records: Vec<IndexRecord>, on_result: ImportCallback);
}
