// NFS GETATTR Procedure (Procedure 1)
//
// Gets file attributes

use bytes::BytesMut;
use tracing::debug;
use xdr_codec::Pack;

use super::{NfsContext, NfsError};
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{fattr3, nfsstat3, GETATTR3args, NfsMessage};

/// GETATTR3resfail is the bare status
pub const ERROR_BODY: [u8; 0] = [];

/// Handle NFS GETATTR procedure (procedure 1)
///
/// # Arguments
/// * `args_data` - Serialized GETATTR3args (file handle)
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized GETATTR3resok
pub fn handle_getattr(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: GETATTR3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;
    let (backend, path) = ctx.handles.resolve(&args.object.0)?;

    let attrs = backend.stat(&path)?;
    debug!("GETATTR: {:?} -> size={}, mode={:o}", path, attrs.size, attrs.mode);

    encode_reply(&NfsMessage::fsal_to_fattr3(&attrs)).map_err(NfsError::server_fault)
}

fn encode_reply(attrs: &fattr3) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    attrs.pack(&mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::testing::{pack, Fixture, ReplyReader};
    use crate::protocol::v3::nfs::{fhandle3, ftype3};

    #[test]
    fn test_getattr_file() {
        let fx = Fixture::new();
        std::fs::write(fx.path("test.txt"), b"Hello, World!").unwrap();

        let args = pack(&GETATTR3args {
            object: fhandle3(fx.handle("test.txt")),
        });
        let body = handle_getattr(&args, &fx.ctx).unwrap();

        let mut reply = ReplyReader::new(&body);
        assert_eq!(reply.u32(), nfsstat3::NFS3_OK as u32);
        assert_eq!(reply.fattr3(), (ftype3::NF3REG as u32, 13));
        assert_eq!(reply.remaining(), 0);
    }

    #[test]
    fn test_getattr_root_directory() {
        let fx = Fixture::new();
        let args = pack(&GETATTR3args {
            object: fhandle3(fx.handle("")),
        });
        let body = handle_getattr(&args, &fx.ctx).unwrap();

        let mut reply = ReplyReader::new(&body);
        reply.u32();
        assert_eq!(reply.fattr3().0, ftype3::NF3DIR as u32);
    }

    #[test]
    fn test_getattr_unknown_handle() {
        let fx = Fixture::new();
        let args = pack(&GETATTR3args {
            object: fhandle3(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        });
        let err = handle_getattr(&args, &fx.ctx).unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_STALE);
    }

    #[test]
    fn test_getattr_garbage_args() {
        let fx = Fixture::new();
        let err = handle_getattr(&[0, 0, 1], &fx.ctx).unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_INVAL);
    }
}
