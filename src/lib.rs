// Tundra NFS Server - Library
//
// This library provides the core components for building an NFSv3 server
// over pluggable storage backends

pub mod config;
pub mod fsal;
pub mod nfs;
pub mod protocol;
pub mod rpc;

// Re-export commonly used types
pub use fsal::{Backend, BackendConfig, FileHandle, Filesystem, HandleRegistry, LocalFilesystem};
pub use nfs::NfsContext;
