// NFS READ Procedure (Procedure 6)
//
// Reads data from a file

use bytes::BytesMut;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;
use xdr_codec::Pack;

use super::{fail_with_attrs, wcc, NfsContext, NfsError};
use crate::fsal::{Backend, FileType};
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{fattr3, nfsstat3, pack_post_op_attr, NfsMessage, READ3args};

/// READ3resfail: file_attributes absent
pub const ERROR_BODY: [u8; 4] = [0; 4];

/// Largest read served in one call
pub const MAX_READ: u32 = 1024 * 1024;

/// Handle NFS READ procedure (procedure 6)
///
/// Reads data from a file at a specified offset. Only the base `open`
/// operation is used, so every backend can serve reads.
///
/// # Arguments
/// * `args_data` - Serialized READ3args (file handle + offset + count)
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized READ3resok with file data
pub fn handle_read(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: READ3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;

    debug!(
        "READ: file_handle={} bytes, offset={}, count={}",
        args.file.0.len(),
        args.offset,
        args.count
    );

    let (backend, path) = ctx.handles.resolve(&args.file.0)?;

    let attrs = backend.stat(&path)?;
    match attrs.ftype {
        FileType::RegularFile => {}
        FileType::Directory => {
            return Err(fail_with_attrs(NfsError::new(nfsstat3::NFS3ERR_ISDIR), Some(&attrs)));
        }
        _ => {
            return Err(fail_with_attrs(NfsError::new(nfsstat3::NFS3ERR_INVAL), Some(&attrs)));
        }
    }

    let count = args.count.min(MAX_READ);
    let data = read_at(&backend, &path, args.offset, count)
        .map_err(|e| fail_with_attrs(NfsError::from_io(e), Some(&attrs)))?;
    let eof = args.offset.saturating_add(data.len() as u64) >= attrs.size;

    debug!("READ success: {} bytes, eof={}", data.len(), eof);

    encode_reply(wcc::post_op(Some(&attrs)).as_ref(), &data, eof).map_err(NfsError::server_fault)
}

fn read_at(backend: &Backend, path: &Path, offset: u64, count: u32) -> io::Result<Vec<u8>> {
    let mut file = backend.open(path)?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))?;
    }
    let mut data = Vec::with_capacity(count as usize);
    file.take(count as u64).read_to_end(&mut data)?;
    Ok(data)
}

fn encode_reply(attrs: Option<&fattr3>, data: &[u8], eof: bool) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    pack_post_op_attr(attrs, &mut buf)?;
    (data.len() as u32).pack(&mut buf)?;
    eof.pack(&mut buf)?;
    xdr_codec::pack_opaque_flex(data, None, &mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::testing::{pack, Fixture, ReplyReader};
    use crate::protocol::v3::nfs::fhandle3;

    fn read(fx: &Fixture, rel: &str, offset: u64, count: u32) -> Result<BytesMut, NfsError> {
        let args = pack(&READ3args {
            file: fhandle3(fx.handle(rel)),
            offset,
            count,
        });
        handle_read(&args, &fx.ctx)
    }

    #[test]
    fn test_read_whole_file() {
        let fx = Fixture::new();
        std::fs::write(fx.path("test.txt"), b"Hello, NFS World!").unwrap();

        let body = read(&fx, "test.txt", 0, 1024).unwrap();
        let mut reply = ReplyReader::new(&body);
        assert_eq!(reply.u32(), nfsstat3::NFS3_OK as u32);
        assert_eq!(reply.post_op_attr(), Some(17));
        assert_eq!(reply.u32(), 17);
        assert_eq!(reply.u32(), 1, "eof");
        assert_eq!(reply.opaque(), b"Hello, NFS World!");
        assert_eq!(reply.remaining(), 0);
    }

    #[test]
    fn test_read_with_offset_not_eof() {
        let fx = Fixture::new();
        std::fs::write(fx.path("digits"), b"0123456789").unwrap();

        let body = read(&fx, "digits", 2, 3).unwrap();
        let mut reply = ReplyReader::new(&body);
        reply.u32();
        reply.post_op_attr();
        assert_eq!(reply.u32(), 3);
        assert_eq!(reply.u32(), 0, "not eof");
        assert_eq!(reply.opaque(), b"234");
    }

    #[test]
    fn test_read_past_end() {
        let fx = Fixture::new();
        std::fs::write(fx.path("short"), b"abc").unwrap();

        let body = read(&fx, "short", 100, 10).unwrap();
        let mut reply = ReplyReader::new(&body);
        reply.u32();
        reply.post_op_attr();
        assert_eq!(reply.u32(), 0);
        assert_eq!(reply.u32(), 1);
    }

    #[test]
    fn test_read_directory_is_isdir() {
        let fx = Fixture::new();
        let err = read(&fx, "", 0, 10).unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_ISDIR);
        assert!(ReplyReader::new(err.body().unwrap()).post_op_attr().is_some());
    }

    #[test]
    fn test_read_count_is_capped() {
        let fx = Fixture::new();
        std::fs::write(fx.path("big"), vec![7u8; MAX_READ as usize + 10]).unwrap();

        let body = read(&fx, "big", 0, u32::MAX).unwrap();
        let mut reply = ReplyReader::new(&body);
        reply.u32();
        reply.post_op_attr();
        assert_eq!(reply.u32(), MAX_READ);
        assert_eq!(reply.u32(), 0);
    }
}
