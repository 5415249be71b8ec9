// NFS LOOKUP Procedure (Procedure 3)
//
// Looks up a filename in a directory and returns its file handle

use bytes::BytesMut;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use xdr_codec::Pack;

use super::{check_name, fail_with_attrs, wcc, NfsContext, NfsError};
use crate::fsal::FileType;
use crate::protocol::XdrResult;
use crate::protocol::v3::nfs::{
    fattr3, fhandle3, nfsstat3, pack_post_op_attr, LOOKUP3args, NfsMessage,
};

/// LOOKUP3resfail: dir_attributes absent
pub const ERROR_BODY: [u8; 4] = [0; 4];

/// Handle NFS LOOKUP procedure (procedure 3)
///
/// Looks up a filename in a directory and returns the file handle and
/// attributes for the named entry. "." and ".." are resolved lexically and
/// never leave the export root.
///
/// # Arguments
/// * `args_data` - Serialized LOOKUP3args (directory handle + filename)
/// * `ctx` - Handler context (handle registry)
///
/// # Returns
/// Serialized LOOKUP3resok with the object handle and attributes
pub fn handle_lookup(args_data: &[u8], ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    let args: LOOKUP3args = NfsMessage::deserialize(args_data).map_err(NfsError::inval)?;
    let name = args.what.name.as_os_str();

    debug!(
        "LOOKUP: dir_handle={} bytes, name={:?}",
        args.what.dir.0.len(),
        name
    );

    let (backend, dir_path) = ctx.handles.resolve(&args.what.dir.0)?;

    let dir_attrs = backend.stat(&dir_path)?;
    if dir_attrs.ftype != FileType::Directory {
        return Err(fail_with_attrs(
            NfsError::new(nfsstat3::NFS3ERR_NOTDIR),
            Some(&dir_attrs),
        ));
    }

    let obj_path = match name.as_bytes() {
        b"." => dir_path.clone(),
        b".." => parent_of(&dir_path),
        _ => {
            check_name(name).map_err(|e| fail_with_attrs(e, Some(&dir_attrs)))?;
            dir_path.join(name)
        }
    };

    let obj_attrs = match backend.stat(&obj_path) {
        Ok(attrs) => attrs,
        Err(e) => {
            debug!("LOOKUP failed: {:?}: {}", obj_path, e);
            return Err(fail_with_attrs(NfsError::from_io(e), Some(&dir_attrs)));
        }
    };

    let handle = ctx.handles.issue(&backend, &obj_path);
    debug!("LOOKUP success: {:?} -> {} byte handle", obj_path, handle.len());

    encode_reply(
        &fhandle3(handle),
        &NfsMessage::fsal_to_fattr3(&obj_attrs),
        wcc::post_op(Some(&dir_attrs)).as_ref(),
    )
    .map_err(NfsError::server_fault)
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn encode_reply(object: &fhandle3, obj_attrs: &fattr3, dir_attrs: Option<&fattr3>) -> XdrResult<BytesMut> {
    let mut buf = NfsMessage::begin_reply(nfsstat3::NFS3_OK)?;
    object.pack(&mut buf)?;
    pack_post_op_attr(Some(obj_attrs), &mut buf)?;
    pack_post_op_attr(dir_attrs, &mut buf)?;
    Ok(BytesMut::from(&buf[..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nfs::testing::{pack, Fixture, ReplyReader};
    use crate::protocol::v3::nfs::{diropargs3, filename3, ftype3};

    fn lookup(fx: &Fixture, dir: &str, name: impl AsRef<[u8]>) -> Result<BytesMut, NfsError> {
        let args = pack(&LOOKUP3args {
            what: diropargs3 {
                dir: fhandle3(fx.handle(dir)),
                name: filename3(name.as_ref().to_vec()),
            },
        });
        handle_lookup(&args, &fx.ctx)
    }

    #[test]
    fn test_lookup_existing_file() {
        let fx = Fixture::new();
        std::fs::write(fx.path("test.txt"), b"test content").unwrap();

        let body = lookup(&fx, "", "test.txt").unwrap();
        let mut reply = ReplyReader::new(&body);
        assert_eq!(reply.u32(), nfsstat3::NFS3_OK as u32);
        let handle = reply.opaque().to_vec();
        assert_eq!(reply.u32(), 1);
        assert_eq!(reply.fattr3(), (ftype3::NF3REG as u32, 12));
        assert!(reply.post_op_attr().is_some());
        assert_eq!(reply.remaining(), 0);

        // The issued handle is the registry's handle for that path
        assert_eq!(handle, fx.handle("test.txt"));
        let (_, path) = fx.ctx.handles.resolve(&handle).unwrap();
        assert_eq!(path, PathBuf::from("test.txt"));
    }

    #[test]
    fn test_lookup_is_stable() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.path("sub")).unwrap();

        let first = lookup(&fx, "", "sub").unwrap();
        let second = lookup(&fx, "", "sub").unwrap();
        let a = ReplyReader::new(&first).bytes(4 + 4 + 32).to_vec();
        let b = ReplyReader::new(&second).bytes(4 + 4 + 32).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_nonexistent_file() {
        let fx = Fixture::new();
        let err = lookup(&fx, "", "nonexistent.txt").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NOENT);
        // dir_attributes follow
        let mut body = ReplyReader::new(err.body().unwrap());
        assert!(body.post_op_attr().is_some());
    }

    #[test]
    fn test_lookup_in_file_is_notdir() {
        let fx = Fixture::new();
        std::fs::write(fx.path("plain"), b"").unwrap();
        let err = lookup(&fx, "plain", "child").unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NOTDIR);
    }

    #[test]
    fn test_lookup_dot_entries() {
        let fx = Fixture::new();
        std::fs::create_dir(fx.path("sub")).unwrap();

        let body = lookup(&fx, "sub", "..").unwrap();
        let handle = ReplyReader::new(&body[4..]).opaque().to_vec();
        assert_eq!(handle, fx.handle(""));

        // ".." of the root stays at the root
        let body = lookup(&fx, "", "..").unwrap();
        let handle = ReplyReader::new(&body[4..]).opaque().to_vec();
        assert_eq!(handle, fx.handle(""));

        let body = lookup(&fx, "sub", ".").unwrap();
        let handle = ReplyReader::new(&body[4..]).opaque().to_vec();
        assert_eq!(handle, fx.handle("sub"));
    }

    #[test]
    fn test_lookup_rejects_bad_names() {
        let fx = Fixture::new();
        let long = "x".repeat(256);
        assert_eq!(lookup(&fx, "", &long).unwrap_err().status(), nfsstat3::NFS3ERR_NAMETOOLONG);
        assert_eq!(lookup(&fx, "", "a/b").unwrap_err().status(), nfsstat3::NFS3ERR_INVAL);
    }

    #[test]
    fn test_lookup_non_utf8_name() {
        let fx = Fixture::new();
        let name = std::ffi::OsStr::from_bytes(b"caf\xe9");
        std::fs::write(fx.path(name), b"x").unwrap();

        let body = lookup(&fx, "", name.as_bytes()).unwrap();
        let handle = ReplyReader::new(&body[4..]).opaque().to_vec();
        let (_, path) = fx.ctx.handles.resolve(&handle).unwrap();
        assert_eq!(path, PathBuf::from(name));

        let err = lookup(&fx, "", [0xffu8; 300]).unwrap_err();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_NAMETOOLONG);
    }
}
