// Protocol middleware layer
//
// Wire types for ONC RPC and NFSv3, with hand-written XDR packing on top of
// xdr-codec primitives.

pub mod v3;

use thiserror::Error;

pub use v3::{NfsMessage, RpcMessage};

/// XDR encode/decode failure
///
/// `xdr_codec::Error` is not `Sync`, so it is flattened to its message here
/// before crossing into handler or transport errors.
#[derive(Debug, Error)]
#[error("xdr: {0}")]
pub struct XdrError(String);

impl XdrError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<xdr_codec::Error> for XdrError {
    fn from(e: xdr_codec::Error) -> Self {
        Self(e.to_string())
    }
}

pub type XdrResult<T> = std::result::Result<T, XdrError>;
