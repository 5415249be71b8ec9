// NFS REMOVE Procedure (12)
//
// Remove a file (not a directory)

use bytes::BytesMut;
use tracing::{debug, warn};
use xdr_codec::Pack;

use super::{check_name, fail_with_wcc, wcc, NfsContext, NfsError};
use crate::fsal::FileType;
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{nfsstat3, wcc_data, NfsMessage, REMOVE3args};

/// REMOVE3resfail: empty dir_wcc
pub const ERROR_BODY: [u8; 8] = [0; 8];

/// Handle NFS REMOVE request
///
/// # Arguments
/// * `args_data` - Serialized REMOVE3args
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized REMOVE3resok with directory WCC data
pub fn handle_remove(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: REMOVE3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;
    let name = args.object.name.as_os_str();

    debug!("NFS REMOVE: dir {} bytes, name {:?}", args.object.dir.0.len(), name);

    let (backend, dir_path) = ctx.handles.resolve(&args.object.dir.0)?;

    if !backend.is_writable() {
        return Err(NfsError::new(nfsstat3::NFS3ERR_ROFS));
    }
    check_name(name)?;

    let pre = backend.stat(&dir_path)?;
    if pre.ftype != FileType::Directory {
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTDIR));
    }

    let fail = |err: NfsError| {
        let post = wcc::snapshot(&backend, &dir_path);
        fail_with_wcc(err, &[wcc::build_wcc(Some(&pre), post.as_ref())])
    };

    let target = dir_path.join(name);
    let target_attrs = backend.stat(&target).map_err(|e| fail(NfsError::from_io(e)))?;
    if target_attrs.ftype == FileType::Directory {
        return Err(fail(NfsError::new(nfsstat3::NFS3ERR_ISDIR)));
    }

    let Some(remove) = backend.capabilities().remove.clone() else {
        debug!("REMOVE: backend {} cannot remove", backend.name());
        return Err(NfsError::new(nfsstat3::NFS3ERR_NOTSUPP));
    };

    if let Err(e) = remove.remove(&target) {
        warn!("REMOVE failed for '{}': {}", name.display(), e);
        return Err(fail(NfsError::from_io(e)));
    }
    ctx.handles.invalidate_path(&backend, &target);

    let post = wcc::snapshot(&backend, &dir_path);
    debug!("REMOVE OK: {:?}", target);

    encode_reply(&wcc::build_wcc(Some(&pre), post.as_ref())).map_err(NfsError::server_fault)
}

fn encode_reply(dir_wcc: &wcc_data) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    dir_wcc.pack(&mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::testing::{pack, Fixture, ReplyReader};
    use crate::protocol::v3::nfs::{diropargs3, fhandle3, filename3};

    fn remove(fx: &Fixture, dir: &str, name: impl AsRef<[u8]>) -> Result<BytesMut, NfsError> {
        let args = pack(&REMOVE3args {
            object: diropargs3 {
                dir: fhandle3(fx.handle(dir)),
                name: filename3(name.as_ref().to_vec()),
            },
        });
        handle_remove(&args, &fx.ctx)
    }

    #[test]
    fn test_remove_file() {
        let fx = Fixture::new();
        std::fs::write(fx.path("doomed.txt"), b"bye").unwrap();
        let old_handle = fx.handle("doomed.txt");

        let body = remove(&fx, "", "doomed.txt").unwrap();
        let mut reply = ReplyReader::new(&body);
        assert_eq!(reply.u32(), nfsstat3::NFS3_OK as u32);
        let (pre, post) = reply.wcc();
        assert!(pre.is_some() && post.is_some());
        assert_eq!(reply.remaining(), 0);

        assert!(!fx.path("doomed.txt").exists());
        let err = fx.ctx.handles.resolve(&old_handle).unwrap_err();
        assert!(matches!(err, crate::fsal::HandleError::Unknown));
    }

    #[test]
    fn test_remove_missing_reports_wcc() {
        let fx = Fixture::new();
        let err = remove(&fx, "", "ghost").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NOENT);
        let (pre, post) = ReplyReader::new(err.body().unwrap()).wcc();
        assert!(pre.is_some() && post.is_some());
    }

    #[test]
    fn test_remove_directory_is_isdir() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.path("sub")).unwrap();
        let err = remove(&fx, "", "sub").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_ISDIR);
        assert!(fx.path("sub").exists());
    }

    #[test]
    fn test_remove_read_only() {
        let fx = Fixture::read_only();
        std::fs::write(fx.path("keep"), b"").unwrap();
        let err = remove(&fx, "", "keep").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_ROFS);
        assert!(fx.path("keep").exists());
    }

    #[test]
    fn test_remove_without_capability() {
        let fx = Fixture::write_only();
        std::fs::write(fx.path("keep"), b"").unwrap();
        let err = remove(&fx, "", "keep").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NOTSUPP);
        assert!(fx.path("keep").exists());
    }

    #[test]
    fn test_remove_name_too_long() {
        let fx = Fixture::new();
        let err = remove(&fx, "", &"n".repeat(300)).unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NAMETOOLONG);
    }

    #[test]
    fn test_remove_non_utf8_name() {
        use std::os::unix::ffi::OsStrExt;
        let name = std::ffi::OsStr::from_bytes(b"r\xe9sum\xe9");
        let fx = Fixture::new();
        std::fs::write(fx.path(name), b"").unwrap();

        remove(&fx, "", name.as_bytes()).unwrap();
        assert!(!fx.path(name).exists());
    }
}
