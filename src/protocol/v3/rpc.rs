// ONC RPC v2 Message Framing (RFC 5531)
//
// Only the pieces the server side needs: decoding a CALL header and building
// accepted/denied REPLY headers.

#![allow(non_camel_case_types)]

use bytes::BytesMut;
use std::io::Cursor;
use xdr_codec::{Pack, Unpack};

use crate::protocol::{XdrError, XdrResult};

/// RPC protocol version this server speaks
pub const RPC_VERSION: u32 = 2;

/// Upper bound on an opaque_auth body (RFC 5531)
pub const MAX_AUTH_BYTES: usize = 400;

const MSG_CALL: u32 = 0;
const MSG_REPLY: u32 = 1;
const MSG_ACCEPTED: u32 = 0;
const MSG_DENIED: u32 = 1;
const AUTH_NONE: u32 = 0;
const RPC_MISMATCH: u32 = 0;

/// accept_stat values for accepted replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum accept_stat {
    SUCCESS = 0,
    PROG_UNAVAIL = 1,
    PROG_MISMATCH = 2,
    PROC_UNAVAIL = 3,
    GARBAGE_ARGS = 4,
    SYSTEM_ERR = 5,
}

/// Credential or verifier attached to a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct opaque_auth {
    pub flavor: u32,
    pub body: Vec<u8>,
}

/// Decoded RPC CALL header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct rpc_call_msg {
    pub xid: u32,
    pub rpcvers: u32,
    pub prog: u32,
    pub vers: u32,
    pub proc_: u32,
    pub cred: opaque_auth,
    pub verf: opaque_auth,
}

impl<In: std::io::Read> Unpack<In> for opaque_auth {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (flavor, fsz) = u32::unpack(input)?;
        let (body, bsz) = xdr_codec::unpack_opaque_flex(input, Some(MAX_AUTH_BYTES))?;
        Ok((opaque_auth { flavor, body }, fsz + bsz))
    }
}

impl<Out: std::io::Write> Pack<Out> for opaque_auth {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.flavor.pack(out)? + xdr_codec::pack_opaque_flex(&self.body, Some(MAX_AUTH_BYTES), out)?)
    }
}

impl<Out: std::io::Write> Pack<Out> for rpc_call_msg {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.xid.pack(out)?
            + MSG_CALL.pack(out)?
            + self.rpcvers.pack(out)?
            + self.prog.pack(out)?
            + self.vers.pack(out)?
            + self.proc_.pack(out)?
            + self.cred.pack(out)?
            + self.verf.pack(out)?)
    }
}

/// Wrapper for RPC messages providing serialization helpers
pub struct RpcMessage;

impl RpcMessage {
    /// Deserialize an RPC CALL header
    ///
    /// Returns the header and the number of bytes it occupied, so the caller
    /// can slice out the procedure arguments that follow.
    pub fn deserialize_call(data: &[u8]) -> XdrResult<(rpc_call_msg, usize)> {
        let mut cursor = Cursor::new(data);

        let (xid, _) = u32::unpack(&mut cursor)?;
        let (mtype, _) = u32::unpack(&mut cursor)?;
        if mtype != MSG_CALL {
            return Err(XdrError::new(format!("expected CALL message, got type {}", mtype)));
        }
        let (rpcvers, _) = u32::unpack(&mut cursor)?;
        let (prog, _) = u32::unpack(&mut cursor)?;
        let (vers, _) = u32::unpack(&mut cursor)?;
        let (proc_, _) = u32::unpack(&mut cursor)?;
        let (cred, _) = opaque_auth::unpack(&mut cursor)?;
        let (verf, _) = opaque_auth::unpack(&mut cursor)?;

        let call = rpc_call_msg {
            xid,
            rpcvers,
            prog,
            vers,
            proc_,
            cred,
            verf,
        };
        Ok((call, cursor.position() as usize))
    }

    /// Accepted reply header with an AUTH_NONE verifier
    fn accepted_header(xid: u32, stat: accept_stat) -> XdrResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(24);
        xid.pack(&mut buf)?;
        MSG_REPLY.pack(&mut buf)?;
        MSG_ACCEPTED.pack(&mut buf)?;
        AUTH_NONE.pack(&mut buf)?;
        0u32.pack(&mut buf)?; // verifier body length
        (stat as u32).pack(&mut buf)?;
        Ok(buf)
    }

    /// SUCCESS reply carrying a procedure result body
    pub fn create_success_reply_with_data(xid: u32, data: BytesMut) -> XdrResult<BytesMut> {
        let header = Self::accepted_header(xid, accept_stat::SUCCESS)?;
        let mut reply = BytesMut::with_capacity(header.len() + data.len());
        reply.extend_from_slice(&header);
        reply.extend_from_slice(&data);
        Ok(reply)
    }

    pub fn create_prog_unavail_reply(xid: u32) -> XdrResult<BytesMut> {
        Ok(BytesMut::from(&Self::accepted_header(xid, accept_stat::PROG_UNAVAIL)?[..]))
    }

    pub fn create_proc_unavail_reply(xid: u32) -> XdrResult<BytesMut> {
        Ok(BytesMut::from(&Self::accepted_header(xid, accept_stat::PROC_UNAVAIL)?[..]))
    }

    pub fn create_garbage_args_reply(xid: u32) -> XdrResult<BytesMut> {
        Ok(BytesMut::from(&Self::accepted_header(xid, accept_stat::GARBAGE_ARGS)?[..]))
    }

    /// PROG_MISMATCH reply advertising the supported version range
    pub fn create_prog_mismatch_reply(xid: u32, low: u32, high: u32) -> XdrResult<BytesMut> {
        let mut buf = Self::accepted_header(xid, accept_stat::PROG_MISMATCH)?;
        low.pack(&mut buf)?;
        high.pack(&mut buf)?;
        Ok(BytesMut::from(&buf[..]))
    }

    /// MSG_DENIED / RPC_MISMATCH reply for callers not speaking RPC v2
    pub fn create_rpc_mismatch_reply(xid: u32) -> XdrResult<BytesMut> {
        let mut buf = Vec::new();
        xid.pack(&mut buf)?;
        MSG_REPLY.pack(&mut buf)?;
        MSG_DENIED.pack(&mut buf)?;
        RPC_MISMATCH.pack(&mut buf)?;
        RPC_VERSION.pack(&mut buf)?;
        RPC_VERSION.pack(&mut buf)?;
        Ok(BytesMut::from(&buf[..]))
    }
}
