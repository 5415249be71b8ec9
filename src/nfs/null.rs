// NFS NULL Procedure (Procedure 0)
//
// This is the simplest NFS procedure - it does nothing but return success.
// Used to test connectivity and verify the NFS service is responding.

use bytes::BytesMut;
use tracing::debug;

use super::{NfsContext, NfsError};

/// NULL has no failure result
pub const ERROR_BODY: [u8; 0] = [];

/// Handle NFS NULL procedure (procedure 0)
///
/// This procedure does no work. It is used for server response testing
/// and timing.
pub fn handle_null(_args_data: &[u8], _ctx: &NfsContext) -> Result<BytesMut, NfsError> {
    debug!("NFS NULL called");
    Ok(BytesMut::new())
}
