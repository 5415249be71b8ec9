// NFS Handler Errors
//
// Every handler failure carries the nfsstat3 that goes on the wire. The
// dispatcher turns it into a reply, so a failed request never drops the
// connection.

use bytes::BytesMut;
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

use crate::fsal::HandleError;
use crate::protocol::XdrError;
use crate::protocol::v3::nfs::nfsstat3;

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
#[error("{status}")]
pub struct NfsError {
    status: nfsstat3,
    #[source]
    cause: Option<BoxError>,
    /// Replaces the procedure's zero-filled failure body
    body: Option<BytesMut>,
}

impl NfsError {
    pub fn new(status: nfsstat3) -> Self {
        Self {
            status,
            cause: None,
            body: None,
        }
    }

    pub fn with_cause(status: nfsstat3, cause: impl Into<BoxError>) -> Self {
        Self {
            status,
            cause: Some(cause.into()),
            body: None,
        }
    }

    /// Attach the real failure body (e.g. WCC data gathered before failing)
    pub fn with_body(mut self, body: BytesMut) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(&self) -> nfsstat3 {
        self.status
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Arguments that failed to decode
    pub fn inval(err: XdrError) -> Self {
        Self::with_cause(nfsstat3::NFS3ERR_INVAL, err)
    }

    /// A reply that failed to encode
    pub fn server_fault(err: XdrError) -> Self {
        Self::with_cause(nfsstat3::NFS3ERR_SERVERFAULT, err)
    }

    /// Classify a backend error
    pub fn from_io(err: io::Error) -> Self {
        Self::with_cause(io_status(&err), err)
    }
}

impl From<io::Error> for NfsError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err)
    }
}

impl From<HandleError> for NfsError {
    fn from(err: HandleError) -> Self {
        Self::with_cause(nfsstat3::NFS3ERR_STALE, err)
    }
}

/// Status for a backend error kind; anything unrecognised is NFS3ERR_IO
pub fn io_status(err: &io::Error) -> nfsstat3 {
    match err.kind() {
        io::ErrorKind::NotFound => nfsstat3::NFS3ERR_NOENT,
        io::ErrorKind::PermissionDenied => nfsstat3::NFS3ERR_ACCES,
        io::ErrorKind::NotADirectory => nfsstat3::NFS3ERR_NOTDIR,
        io::ErrorKind::IsADirectory => nfsstat3::NFS3ERR_ISDIR,
        io::ErrorKind::AlreadyExists => nfsstat3::NFS3ERR_EXIST,
        io::ErrorKind::DirectoryNotEmpty => nfsstat3::NFS3ERR_NOTEMPTY,
        io::ErrorKind::ReadOnlyFilesystem => nfsstat3::NFS3ERR_ROFS,
        io::ErrorKind::FileTooLarge => nfsstat3::NFS3ERR_FBIG,
        io::ErrorKind::StorageFull => nfsstat3::NFS3ERR_NOSPC,
        io::ErrorKind::CrossesDevices => nfsstat3::NFS3ERR_XDEV,
        io::ErrorKind::InvalidFilename => nfsstat3::NFS3ERR_NAMETOOLONG,
        io::ErrorKind::Unsupported => nfsstat3::NFS3ERR_NOTSUPP,
        _ => nfsstat3::NFS3ERR_IO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_io_error_classification() {
        let cases = [
            (io::ErrorKind::NotFound, nfsstat3::NFS3ERR_NOENT),
            (io::ErrorKind::PermissionDenied, nfsstat3::NFS3ERR_ACCES),
            (io::ErrorKind::AlreadyExists, nfsstat3::NFS3ERR_EXIST),
            (io::ErrorKind::Unsupported, nfsstat3::NFS3ERR_NOTSUPP),
            (io::ErrorKind::TimedOut, nfsstat3::NFS3ERR_IO),
            (io::ErrorKind::Other, nfsstat3::NFS3ERR_IO),
        ];
        for (kind, expected) in cases {
            assert_eq!(NfsError::from_io(io::Error::from(kind)).status(), expected, "{:?}", kind);
        }
    }

    #[test]
    fn test_raw_os_errors_classified() {
        let err = io::Error::from_raw_os_error(20); // ENOTDIR
        assert_eq!(io_status(&err), nfsstat3::NFS3ERR_NOTDIR);
        let err = io::Error::from_raw_os_error(39); // ENOTEMPTY
        assert_eq!(io_status(&err), nfsstat3::NFS3ERR_NOTEMPTY);
    }

    #[test]
    fn test_stale_handle_maps_to_stale() {
        let err: NfsError = HandleError::Gone(PathBuf::from("x")).into();
        assert_eq!(err.status(), nfsstat3::NFS3ERR_STALE);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_codec_errors() {
        assert_eq!(NfsError::inval(XdrError::new("short")).status(), nfsstat3::NFS3ERR_INVAL);
        assert_eq!(
            NfsError::server_fault(XdrError::new("pack")).status(),
            nfsstat3::NFS3ERR_SERVERFAULT
        );
    }

    #[test]
    fn test_body_override() {
        let err = NfsError::new(nfsstat3::NFS3ERR_IO);
        assert!(err.body().is_none());
        let err = err.with_body(BytesMut::from(&[1u8, 2][..]));
        assert_eq!(err.body(), Some(&[1u8, 2][..]));
    }
}
