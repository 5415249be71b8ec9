// NFS Protocol Implementation (NFSv3)
//
// This module implements the NFSv3 protocol procedures.
// See RFC 1813 for the complete specification.

pub mod dispatcher;
pub mod error;
pub mod wcc;

mod access;
mod getattr;
mod lookup;
mod null;
mod read;
mod readlink;
mod remove;
mod rename;
mod write;

#[cfg(test)]
mod testing;

use bytes::BytesMut;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use xdr_codec::Pack;

use crate::fsal::{FileAttributes, HandleRegistry};
use crate::protocol::v3::nfs::{nfsstat3, pack_post_op_attr, wcc_data};

pub use dispatcher::dispatch;
pub use error::NfsError;

/// Longest file name accepted in a directory operation
pub const NFS_MAXNAMLEN: usize = 255;

/// Shared state every procedure handler runs against
pub struct NfsContext {
    pub handles: Arc<HandleRegistry>,
    /// Server instance id, returned as the WRITE verifier
    pub instance_id: [u8; 8],
}

impl NfsContext {
    pub fn new(handles: Arc<HandleRegistry>, instance_id: u64) -> Self {
        Self {
            handles,
            instance_id: instance_id.to_be_bytes(),
        }
    }
}

/// Check a single file name supplied by a client for a directory operation
fn check_name(name: &OsStr) -> Result<(), NfsError> {
    let bytes = name.as_bytes();
    if bytes.len() > NFS_MAXNAMLEN {
        return Err(NfsError::new(nfsstat3::NFS3ERR_NAMETOOLONG));
    }
    let reserved = bytes.is_empty() || bytes == b"." || bytes == b"..";
    if reserved || bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(NfsError::new(nfsstat3::NFS3ERR_INVAL));
    }
    Ok(())
}

/// Replace a failure's body with the object's post_op_attr
fn fail_with_attrs(err: NfsError, attrs: Option<&FileAttributes>) -> NfsError {
    let mut buf = Vec::new();
    match pack_post_op_attr(wcc::post_op(attrs).as_ref(), &mut buf) {
        Ok(_) => err.with_body(BytesMut::from(&buf[..])),
        Err(_) => err,
    }
}

/// Replace a failure's body with the WCC records gathered so far
fn fail_with_wcc(err: NfsError, records: &[wcc_data]) -> NfsError {
    let mut buf = Vec::new();
    for record in records {
        if record.pack(&mut buf).is_err() {
            return err;
        }
    }
    err.with_body(BytesMut::from(&buf[..]))
}
