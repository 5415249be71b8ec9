// NFS RENAME Procedure (14)
//
// Rename a file or directory

use bytes::BytesMut;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use xdr_codec::Pack;

use super::{check_name, fail_with_wcc, wcc, NfsContext, NfsError};
use crate::fsal::{Backend, FileAttributes, FileType};
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{nfsstat3, wcc_data, NfsMessage, RENAME3args};

/// RENAME3resfail: two empty wcc_data records
pub const ERROR_BODY: [u8; 16] = [0; 16];

/// Handle NFS RENAME request
///
/// Renames or moves a file/directory from one location to another. Both
/// directories must live on the same backend.
///
/// # Arguments
/// * `args_data` - Serialized RENAME3args
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized RENAME3resok with WCC data for both directories
pub fn handle_rename(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: RENAME3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;
    let from_name = args.from.name.as_os_str();
    let to_name = args.to.name.as_os_str();

    debug!("NFS RENAME: {:?} -> {:?}", from_name, to_name);

    let (backend, from_dir) = ctx.handles.resolve(&args.from.dir.0)?;
    let (to_backend, to_dir) = ctx.handles.resolve(&args.to.dir.0)?;

    if !backend.same_as(&to_backend) {
        debug!(
            "RENAME across backends {} -> {}",
            backend.name(),
            to_backend.name()
        );
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTSUPP));
    }

    if !backend.is_writable() {
        return Err(NfsError::new(nfsstat3::NFS3ERR_ROFS));
    }

    check_name(from_name)?;
    check_name(to_name)?;

    // Pre-operation snapshots of both parents
    let from_pre = parent_snapshot(&backend, &from_dir)?;
    let to_pre = parent_snapshot(&backend, &to_dir)?;

    let Some(rename) = backend.capabilities().rename.clone() else {
        debug!("RENAME: backend {} cannot rename", backend.name());
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTSUPP));
    };

    let from_path = from_dir.join(from_name);
    let to_path = to_dir.join(to_name);

    let result = rename.rename(&from_path, &to_path);

    // Post-operation snapshots, taken whether or not the rename succeeded
    let from_wcc = wcc::build_wcc(Some(&from_pre), wcc::snapshot(&backend, &from_dir).as_ref());
    let to_wcc = wcc::build_wcc(Some(&to_pre), wcc::snapshot(&backend, &to_dir).as_ref());

    if let Err(e) = result {
        warn!("RENAME failed for '{}': {}", from_name.display(), e);
        let err = match e.kind() {
            io::ErrorKind::NotFound => NfsError::with_cause(nfsstat3::NFS3ERR_NOENT, e),
            io::ErrorKind::PermissionDenied => NfsError::with_cause(nfsstat3::NFS3ERR_ACCES, e),
            _ => NfsError::from_io(e),
        };
        return Err(fail_with_wcc(err, &[from_wcc, to_wcc]));
    }

    // Neither name may keep pointing at what used to live there
    ctx.handles.invalidate_path(&backend, &from_path);
    ctx.handles.invalidate_path(&backend, &to_path);

    debug!("RENAME OK: {:?} -> {:?}", from_path, to_path);

    encode_reply(&from_wcc, &to_wcc).map_err(NfsError::server_fault)
}

/// Stat a parent directory before the rename
fn parent_snapshot(backend: &Backend, dir: &Path) -> Result<FileAttributes, NfsError> {
    let attrs = backend.stat(dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => NfsError::with_cause(nfsstat3::NFS3ERR_NOENT, e),
        _ => NfsError::with_cause(nfsstat3::NFS3ERR_IO, e),
    })?;
    if attrs.ftype != FileType::Directory {
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTDIR));
    }
    Ok(attrs)
}

fn encode_reply(from_wcc: &wcc_data, to_wcc: &wcc_data) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    from_wcc.pack(&mut buf)?;
    to_wcc.pack(&mut buf)?;

    debug!("RENAME response: {} bytes", buf.len());
    Ok(BytesMut::from(&buf[..]))
}
