// NFSv3 Protocol Types and Middleware
//
// - rpc: ONC RPC v2 call/reply framing
// - nfs: NFSv3 arguments, attributes and reply helpers

pub mod nfs;
pub mod rpc;

pub use nfs::NfsMessage;
pub use rpc::RpcMessage;
