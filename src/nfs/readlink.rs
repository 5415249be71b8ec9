// NFS READLINK Procedure (5) Handler
//
// Reads the content of a symbolic link

use bytes::BytesMut;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::debug;

use super::{fail_with_attrs, wcc, NfsContext, NfsError};
use crate::fsal::FileType;
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{fattr3, nfsstat3, pack_post_op_attr, NfsMessage, READLINK3args};

/// READLINK3resfail: symlink_attributes absent
pub const ERROR_BODY: [u8; 4] = [0; 4];

/// Handle READLINK procedure
///
/// # Arguments
/// * `args_data` - Serialized READLINK3args
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized READLINK3resok (attributes + target path)
pub fn handle_readlink(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: READLINK3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;
    let (backend, path) = ctx.handles.resolve(&args.symlink.0)?;

    let Some(readlink) = backend.capabilities().readlink.clone() else {
        debug!("READLINK: backend {} cannot read links", backend.name());
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTSUPP));
    };

    let attrs = backend.stat(&path)?;
    if attrs.ftype != FileType::SymbolicLink {
        return Err(fail_with_attrs(NfsError::new(nfsstat3::NFS3ERR_INVAL), Some(&attrs)));
    }

    let target = readlink
        .readlink(&path)
        .map_err(|e| fail_with_attrs(NfsError::from_io(e), Some(&attrs)))?;
    debug!("READLINK OK: {:?} -> {:?}", path, target);

    encode_reply(wcc::post_op(Some(&attrs)).as_ref(), &target).map_err(NfsError::server_fault)
}

fn encode_reply(attrs: Option<&fattr3>, target: &Path) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    pack_post_op_attr(attrs, &mut buf)?;
    xdr_codec::pack_opaque_flex(target.as_os_str().as_bytes(), None, &mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}
