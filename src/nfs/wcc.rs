// Weak Cache Consistency
//
// Mutating procedures snapshot the affected object before and after the
// change so clients can tell whether their cached view is still valid.

use std::path::Path;
use tracing::debug;

use crate::fsal::{Backend, FileAttributes};
use crate::protocol::v3::nfs::{fattr3, wcc_data, NfsMessage};

/// Capture attributes; a failed stat is simply an absent snapshot
pub fn snapshot(backend: &Backend, path: &Path) -> Option<FileAttributes> {
    match backend.stat(path) {
        Ok(attrs) => Some(attrs),
        Err(e) => {
            debug!("Snapshot of {:?} unavailable: {}", path, e);
            None
        }
    }
}

/// Assemble a WCC record from a pre- and a post-operation snapshot
pub fn build_wcc(pre: Option<&FileAttributes>, post: Option<&FileAttributes>) -> wcc_data {
    wcc_data {
        before: pre.map(NfsMessage::fsal_to_wcc_attr),
        after: post_op(post),
    }
}

/// post_op_attr payload
pub fn post_op(attrs: Option<&FileAttributes>) -> Option<fattr3> {
    attrs.map(NfsMessage::fsal_to_fattr3)
}
