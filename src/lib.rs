pub mod constants;
pub mod error;
pub mod proxy;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn run() {
    init_logger();

    let config = proxy::config::GatewayConfig::from_env();
    info!(
        "Gateway starting on port {} | upstream: {} | credentials: {}",
        config.port, config.upstream_url, config.credential_count
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("[E-RUNTIME-INIT] failed_to_create_tokio_runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        if let Err(e) = proxy::server::serve(config).await {
            error!("[E-RUNTIME-STARTUP] {}", e);
            std::process::exit(1);
        }
        info!("Gateway shut down");
    });
}
