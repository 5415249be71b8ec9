// NFS ACCESS Procedure (Procedure 4)
//
// Checks file access permissions

use bytes::BytesMut;
use tracing::debug;
use xdr_codec::Pack;

use super::{wcc, NfsContext, NfsError};
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{fattr3, nfsstat3, pack_post_op_attr, ACCESS3args, NfsMessage};

/// ACCESS3resfail: obj_attributes absent
pub const ERROR_BODY: [u8; 4] = [0; 4];

/// Handle NFS ACCESS procedure (procedure 4)
///
/// Determines the access rights that a user has for a file system object.
/// Per-file permission bits are not evaluated; the requested mask is only
/// narrowed by what the backend can do at all, so a backend without the
/// generic write capability never grants MODIFY, EXTEND or DELETE.
///
/// # Arguments
/// * `args_data` - Serialized ACCESS3args (file handle + access bits)
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized ACCESS3resok with the granted access rights
pub fn handle_access(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: ACCESS3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;

    debug!(
        "ACCESS: file_handle={} bytes, requested_access={:#06x}",
        args.object.0.len(),
        args.access
    );

    let (backend, path) = ctx.handles.resolve(&args.object.0)?;

    // Attributes are best effort; a failed stat still yields a grant
    let attrs = wcc::snapshot(&backend, &path);
    let granted = backend.access_mask(args.access);

    debug!(
        "ACCESS success: requested={:#06x}, granted={:#06x}",
        args.access, granted
    );

    encode_reply(wcc::post_op(attrs.as_ref()).as_ref(), granted).map_err(NfsError::server_fault)
}

fn encode_reply(attrs: Option<&fattr3>, granted: u32) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    pack_post_op_attr(attrs, &mut buf)?;
    granted.pack(&mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}
