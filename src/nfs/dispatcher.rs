// NFS Procedure Dispatcher
//
// Routes incoming NFS RPC calls to the appropriate procedure handler and
// turns every handler outcome into an RPC reply.

use anyhow::Result;
use bytes::BytesMut;
use std::error::Error as _;
use tracing::{debug, warn};

use crate::protocol::v3::nfs::{nfsstat3, NfsMessage, NFS_V3};
use crate::protocol::v3::rpc::{rpc_call_msg, RpcMessage};

use super::{access, getattr, lookup, null, read, readlink, remove, rename, write};
use super::{NfsContext, NfsError};

type Handler = fn(&[u8], &NfsContext) -> Result<BytesMut, NfsError>;

/// Dispatch NFS procedure call to appropriate handler
///
/// # Arguments
/// * `call` - Parsed RPC call message
/// * `args_data` - Procedure arguments following the RPC header
/// * `ctx` - Handler context
///
/// # Returns
/// Serialized RPC reply message. An error here means the reply itself could
/// not be encoded; handler failures are always answered on the wire.
pub fn dispatch(call: &rpc_call_msg, args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut> {
    let procedure = call.proc_;
    let xid = call.xid;

    debug!(
        "NFS dispatcher: procedure={}, xid={}, version={}",
        procedure, xid, call.vers
    );

    // Verify NFS version
    if call.vers != NFS_V3 {
        warn!("Unsupported NFS version: {}", call.vers);
        return Ok(RpcMessage::create_prog_mismatch_reply(xid, NFS_V3, NFS_V3)?);
    }

    let (name, handler, error_body): (&str, Handler, &[u8]) = match procedure {
        0 => ("NULL", null::handle_null as Handler, &null::ERROR_BODY as &[u8]),
        1 => ("GETATTR", getattr::handle_getattr as Handler, &getattr::ERROR_BODY as &[u8]),
        3 => ("LOOKUP", lookup::handle_lookup as Handler, &lookup::ERROR_BODY as &[u8]),
        4 => ("ACCESS", access::handle_access as Handler, &access::ERROR_BODY as &[u8]),
        5 => ("READLINK", readlink::handle_readlink as Handler, &readlink::ERROR_BODY as &[u8]),
        6 => ("READ", read::handle_read as Handler, &read::ERROR_BODY as &[u8]),
        7 => ("WRITE", write::handle_write as Handler, &write::ERROR_BODY as &[u8]),
        12 => ("REMOVE", remove::handle_remove as Handler, &remove::ERROR_BODY as &[u8]),
        14 => ("RENAME", rename::handle_rename as Handler, &rename::ERROR_BODY as &[u8]),
        _ => {
            warn!("Unknown NFS procedure: {}", procedure);
            return Ok(RpcMessage::create_proc_unavail_reply(xid)?);
        }
    };

    let res_data = match handler(args_data, ctx) {
        Ok(res_data) => res_data,
        Err(e) => {
            log_failure(name, xid, &e);
            NfsMessage::create_error_response(e.status(), e.body().unwrap_or(error_body))
        }
    };

    Ok(RpcMessage::create_success_reply_with_data(xid, res_data)?)
}

fn log_failure(name: &str, xid: u32, err: &NfsError) {
    let cause = err
        .source()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    match err.status() {
        // Routine outcomes for a client probing the namespace
        nfsstat3::NFS3ERR_NOENT | nfsstat3::NFS3ERR_STALE => {
            debug!("NFS {} (xid={}) -> {} cause={}", name, xid, err, cause)
        }
        _ => warn!("NFS {} (xid={}) -> {} cause={}", name, xid, err, cause),
    }
}
