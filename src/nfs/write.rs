// NFS WRITE Procedure (Procedure 7)
//
// Writes data to a file

use bytes::BytesMut;
use std::io::{self, Seek, SeekFrom, Write};
use tracing::{debug, warn};
use xdr_codec::Pack;

use super::{fail_with_wcc, wcc, NfsContext, NfsError};
use crate::fsal::{FileAttributes, FileType, OpenFlags};
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{nfsstat3, stable_how, wcc_data, NfsMessage, WRITE3args};

/// WRITE3resfail: empty file_wcc
pub const ERROR_BODY: [u8; 8] = [0; 8];

/// Handle NFS WRITE procedure (procedure 7)
///
/// Writes data to a file at a specified offset. Whatever stability the
/// client asked for, the data is flushed to stable storage before replying
/// and the reply always reports FILE_SYNC.
///
/// # Arguments
/// * `args_data` - Serialized WRITE3args (file handle + offset + count + stable + data)
/// * `ctx` - Handler context (handle registry, write verifier)
///
/// # Returns
/// Serialized WRITE3resok with file WCC data, byte count and verifier
pub fn handle_write(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: WRITE3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;

    debug!(
        "WRITE: file_handle={} bytes, offset={}, count={}, stable={}",
        args.file.0.len(),
        args.offset,
        args.count,
        args.stable
    );

    let (backend, path) = ctx.handles.resolve(&args.file.0)?;

    if !backend.is_writable() {
        return Err(NfsError::new(nfsstat3::NFS3ERR_ROFS));
    }

    if args.data.len() > i32::MAX as usize || args.count > i32::MAX as u32 {
        return Err(NfsError::new(nfsstat3::NFS3ERR_FBIG));
    }

    if let Err(level) = stable_how::try_from(args.stable) {
        debug!("WRITE: unknown stability level {}", level);
        return Err(NfsError::new(nfsstat3::NFS3ERR_INVAL));
    }

    // Pre-operation snapshot
    let pre = match backend.stat(&path) {
        Ok(attrs) => attrs,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(NfsError::with_cause(nfsstat3::NFS3ERR_NOENT, e));
        }
        Err(e) => return Err(NfsError::with_cause(nfsstat3::NFS3ERR_ACCES, e)),
    };

    if pre.ftype != FileType::RegularFile {
        return Err(NfsError::new(nfsstat3::NFS3ERR_INVAL));
    }

    let Some(open_file) = backend.capabilities().open_file.clone() else {
        debug!("WRITE: backend {} cannot open files for writing", backend.name());
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTSUPP));
    };

    // Failures from here on still report what the file looks like now
    let fail = |err: NfsError, pre: &FileAttributes| {
        let post = wcc::snapshot(&backend, &path);
        warn!("WRITE to {:?} failed: {}", path, err);
        fail_with_wcc(err, &[wcc::build_wcc(Some(pre), post.as_ref())])
    };

    let mut file = open_file
        .open_file(&path, OpenFlags::READ_WRITE, 0)
        .map_err(|e| fail(NfsError::from_io(e), &pre))?;

    if args.offset > 0 {
        file.seek(SeekFrom::Start(args.offset))
            .map_err(|e| fail(NfsError::with_cause(nfsstat3::NFS3ERR_IO, e), &pre))?;
    }

    let count = (args.count as usize).min(args.data.len());
    file.write_all(&args.data[..count])
        .map_err(|e| fail(NfsError::from_io(e), &pre))?;

    file.flush()
        .and_then(|_| file.sync_all())
        .map_err(|e| fail(NfsError::with_cause(nfsstat3::NFS3ERR_IO, e), &pre))?;
    drop(file);

    // Post-operation snapshot
    let post = wcc::snapshot(&backend, &path);

    debug!(
        "WRITE success: wrote {} bytes (requested {})",
        count, args.count
    );

    encode_reply(
        &wcc::build_wcc(Some(&pre), post.as_ref()),
        count as u32,
        &ctx.instance_id,
    )
    .map_err(NfsError::server_fault)
}

fn encode_reply(file_wcc: &wcc_data, count: u32, verf: &[u8; 8]) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    file_wcc.pack(&mut buf)?;
    count.pack(&mut buf)?;
    (stable_how::FILE_SYNC as u32).pack(&mut buf)?;
    // writeverf3 is fixed-length opaque: no length prefix
    buf.extend_from_slice(verf);
    Ok(BytesMut::from(&buf[..]))
}
