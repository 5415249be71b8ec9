use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tundra::config::ServerConfig;
use tundra::rpc::RpcServer;
use tundra::{HandleRegistry, NfsContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::parse();
    info!("Tundra NFS server starting: {:?}", config);

    // Distinguishes this run's handles and write verifier from earlier runs
    let instance_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("System clock is before the Unix epoch")?
        .as_nanos() as u64;

    let handles = Arc::new(HandleRegistry::new(config.handle_cache, instance_id));

    for backend_config in config.backend_configs() {
        let backend = backend_config.create_backend()?;
        let root_handle = handles.pin_root(&backend);
        info!(
            "Export {} root handle: {}",
            backend.name(),
            root_handle.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        );
    }

    let ctx = Arc::new(NfsContext::new(handles, instance_id));
    let server = RpcServer::bind(&config.listen, ctx).await?;
    server.run().await
}
