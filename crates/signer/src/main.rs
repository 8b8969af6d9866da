use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use hbird_signer::config::load_env_file;
use hbird_signer::{build_router, limiter_from_config, AppState, SignerConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_env_file();

    let config = SignerConfig::from_env().map_err(|e| anyhow!("configuration error: {}", e))?;

    let level = config
        .tracing_level()
        .map_err(|e| anyhow!("configuration error: {}", e))?;
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Some(path) = env_file {
        info!(env_file = %path, "environment file loaded");
    }

    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    info!(config = ?config, "signer starting");

    let state = AppState::from_config(&config).map_err(|e| anyhow!(e))?;
    let limiter = Arc::new(limiter_from_config(&config));
    let app = build_router(state, limiter);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(
        listen_addr = %config.listen_addr,
        trust_forwarded_headers = config.trust_forwarded_headers,
        "signer listening"
    );

    // peer address feeds the per-IP limit when forwarding headers are not trusted
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("signer shutdown complete");
    Ok(())
}
