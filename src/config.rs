// Server Configuration
//
// Command line options for the server binary.

use clap::Parser;
use std::path::PathBuf;

use crate::fsal::BackendConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "tundra", version, about = "NFSv3 server over pluggable storage backends")]
pub struct ServerConfig {
    /// Address to accept RPC connections on.
    #[arg(long, default_value = "0.0.0.0:2049")]
    pub listen: String,

    /// Directory to export; repeat to export several.
    #[arg(long = "export", value_name = "DIR", required = true)]
    pub exports: Vec<PathBuf>,

    /// Export without any write capability.
    #[arg(long)]
    pub read_only: bool,

    /// Maximum number of live file handles.
    #[arg(long, default_value_t = 1024)]
    pub handle_cache: usize,
}

impl ServerConfig {
    /// One backend configuration per exported directory
    pub fn backend_configs(&self) -> Vec<BackendConfig> {
        self.exports
            .iter()
            .map(|dir| BackendConfig::local(dir).read_only(self.read_only))
            .collect()
    }
}
