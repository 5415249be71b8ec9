// RPC TCP Server with Record Marking
//
// Implements Sun RPC over TCP with record marking protocol (RFC 5531)

use anyhow::{anyhow, Context, Result};
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::nfs::NfsContext;
use crate::protocol::v3::nfs::NFS_PROGRAM;
use crate::protocol::v3::rpc::{RpcMessage, RPC_VERSION};

/// Largest RPC record accepted; anything bigger drops the connection
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

const LAST_FRAGMENT: u32 = 0x8000_0000;

/// Replies queued per connection before request tasks wait for the writer
const REPLY_QUEUE_DEPTH: usize = 64;

/// Requests one connection may have in flight before reading pauses
pub const MAX_IN_FLIGHT: usize = 32;

/// RPC server handling TCP connections with record marking
pub struct RpcServer {
    listener: TcpListener,
    ctx: Arc<NfsContext>,
}

impl RpcServer {
    pub async fn bind(addr: &str, ctx: Arc<NfsContext>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        info!("RPC server listening on {}", self.local_addr()?);

        loop {
            let (socket, peer_addr) = self.listener.accept().await?;
            info!("New connection from {}", peer_addr);

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, ctx).await {
                    error!("Connection error from {}: {:#}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle a single TCP connection
///
/// Records are read here; each complete record is served on the blocking
/// pool and its reply handed to the connection's writer task, so replies
/// may leave in a different order than the calls arrived. At most
/// `MAX_IN_FLIGHT` records are being served at once; past that the socket
/// is not read until one finishes.
async fn handle_connection(socket: TcpStream, ctx: Arc<NfsContext>) -> Result<()> {
    let (mut reader, writer) = socket.into_split();
    let (tx, rx) = mpsc::channel::<BytesMut>(REPLY_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_replies(writer, rx));
    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    let mut buffer = BytesMut::with_capacity(8192);
    let read_result: Result<()> = async {
        loop {
            // Read record marking fragment header (4 bytes)
            let mut header = [0u8; 4];
            if reader.read_exact(&mut header).await.is_err() {
                debug!("Connection closed by peer");
                return Ok(());
            }

            // Bit 31: last fragment, bits 0-30: fragment length
            let header_u32 = u32::from_be_bytes(header);
            let is_last = (header_u32 & LAST_FRAGMENT) != 0;
            let fragment_len = (header_u32 & !LAST_FRAGMENT) as usize;

            debug!("Record marking: last={}, length={}", is_last, fragment_len);

            if buffer.len() + fragment_len > MAX_RECORD_SIZE {
                return Err(anyhow!(
                    "RPC record exceeds {} bytes, closing connection",
                    MAX_RECORD_SIZE
                ));
            }

            let start = buffer.len();
            buffer.resize(start + fragment_len, 0);
            reader.read_exact(&mut buffer[start..]).await?;

            if is_last {
                debug!("Complete RPC message received ({} bytes)", buffer.len());
                let record = buffer.split().freeze();
                let permit = in_flight.clone().acquire_owned().await?;
                spawn_request(record, ctx.clone(), tx.clone(), permit);
            }
        }
    }
    .await;

    // The writer finishes once every in-flight request has replied
    drop(tx);
    writer_task.await??;
    read_result
}

async fn write_replies(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<BytesMut>,
) -> std::io::Result<()> {
    while let Some(response) = rx.recv().await {
        // Record mark and payload go out in a single write
        let record_header = response.len() as u32 | LAST_FRAGMENT;
        let mut full_response = Vec::with_capacity(4 + response.len());
        full_response.extend_from_slice(&record_header.to_be_bytes());
        full_response.extend_from_slice(&response);

        writer.write_all(&full_response).await?;
        writer.flush().await?;

        debug!("Sent response ({} bytes)", response.len());
    }
    Ok(())
}

fn spawn_request(
    record: Bytes,
    ctx: Arc<NfsContext>,
    tx: mpsc::Sender<BytesMut>,
    permit: OwnedSemaphorePermit,
) {
    tokio::spawn(async move {
        let outcome = tokio::task::spawn_blocking(move || handle_rpc_message(&record, &ctx)).await;
        match outcome {
            Ok(Ok(Some(response))) => {
                if tx.send(response).await.is_err() {
                    debug!("Connection gone before reply could be sent");
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => error!("Failed to handle RPC message: {:#}", e),
            Err(e) => error!("RPC request task failed: {}", e),
        }
        drop(permit);
    });
}

/// Handle a complete RPC message
///
/// Returns `None` when the record is not worth answering.
fn handle_rpc_message(data: &[u8], ctx: &NfsContext) -> Result<Option<BytesMut>> {
    let (call, header_len) = match RpcMessage::deserialize_call(data) {
        Ok(decoded) => decoded,
        Err(e) => {
            // Try to parse XID from buffer to send proper error response
            if data.len() < 4 {
                warn!("Undecodable RPC record too short for an xid");
                return Ok(None);
            }
            let xid = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            warn!("Undecodable RPC call xid={}: {}", xid, e);
            return Ok(Some(RpcMessage::create_garbage_args_reply(xid)?));
        }
    };

    debug!(
        "RPC call: xid={}, prog={}, vers={}, proc={}",
        call.xid, call.prog, call.vers, call.proc_
    );

    if call.rpcvers != RPC_VERSION {
        warn!("Unsupported RPC version {} (xid={})", call.rpcvers, call.xid);
        return Ok(Some(RpcMessage::create_rpc_mismatch_reply(call.xid)?));
    }

    let args_data = &data[header_len..];

    match call.prog {
        NFS_PROGRAM => crate::nfs::dispatch(&call, args_data, ctx).map(Some),
        _ => {
            warn!("Unknown program number: {}", call.prog);
            Ok(Some(RpcMessage::create_prog_unavail_reply(call.xid)?))
        }
    }
}
