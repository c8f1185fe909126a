//! Serve command: run the browser-facing streaming proxy

use crate::config::Config;
use crate::error::{ChatRelayError, Result};
use crate::proxy::{self, UpstreamMode};

/// Run the proxy server until interrupted
///
/// # Arguments
///
/// * `config` - Application configuration
/// * `bind` - Listen address override from the command line
/// * `header_mode` - Force header-based upstream resolution
///
/// # Errors
///
/// Returns error if the listener cannot bind or the server fails
pub async fn run(config: &Config, bind: Option<String>, header_mode: bool) -> Result<()> {
    let mode = if header_mode || config.upstream.resolve_from_header {
        UpstreamMode::Header
    } else {
        UpstreamMode::Fixed(config.upstream.url.clone())
    };

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let app = proxy::router(mode.clone())?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| ChatRelayError::Proxy(format!("Failed to bind {}: {}", bind, e)))?;

    match &mode {
        UpstreamMode::Header => {
            tracing::info!("Proxy listening on {} (upstream from request header)", bind);
        }
        UpstreamMode::Fixed(url) => {
            tracing::info!("Proxy listening on {} (upstream {})", bind, url);
        }
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| ChatRelayError::Proxy(format!("Server error: {}", e)))?;

    Ok(())
}
