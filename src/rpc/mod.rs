// ONC RPC transport

pub mod server;

pub use server::RpcServer;
