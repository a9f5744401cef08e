// worker/src/main.rs
use std::sync::Arc;

use log::{error, info, warn};

use optimizer_worker::{OptimizeService, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::from_env();
    info!(
        "Starting optimizer worker (temp dir {:?}, timeout {}s, max {} concurrent jobs)",
        config.transcoder.temp_dir,
        config.transcoder.timeout.as_secs(),
        config.transcoder.max_jobs
    );

    let service = Arc::new(OptimizeService::from_config(&config));

    // Resolve eagerly so a missing encoder shows up in the startup log; requests
    // will retry resolution on their own.
    match service.transcoder().resolve_binary().await {
        Ok(path) => info!("Encoder binary ready: {:?}", path),
        Err(e) => warn!("Encoder binary not available yet: {}", e),
    }

    if let Err(e) = optimizer_worker::server::serve(&config, service).await {
        error!("HTTP server failed: {}", e);
        return Err(Box::new(e) as Box<dyn std::error::Error>);
    }

    info!("Optimizer worker finished.");
    Ok(())
}
