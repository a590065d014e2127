//! Uplink Proxy - upload relay between browsers, object storage and an
//! upstream file-upload API

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uplink_proxy::api::{build_router, AppState, CorsSettings, RelayOptions};
use uplink_proxy::config::{AuthMode, BackendConfig, Config, IdExtraction};
use uplink_proxy::storage::{MemoryBackend, ObjectStore, S3Backend};
use uplink_proxy::upstream::{HttpUpstream, RelayScope};

/// Uplink Proxy - browser upload relay for multipart object storage
#[derive(Parser, Debug)]
#[command(name = "uplink_proxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose {
        "uplink_proxy=trace,tower_http=trace"
    } else {
        "uplink_proxy=debug,tower_http=debug"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from file if specified, otherwise use default loading
    let mut config = if let Some(ref path) = cli.config {
        Config::from_file(path)?
    } else {
        Config::load()
    };

    // CLI overrides
    if let Some(ref addr) = cli.listen {
        config.listen_addr = addr.parse()?;
    }
    config.validate()?;

    info!("Starting Uplink Proxy server");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Upstream API: {}", config.upstream.api_base);
    info!(
        "  Relay scope: company={} project={}",
        config.upstream.company_id, config.upstream.project_id
    );
    info!("  CORS origin: {}", config.cors.origin);
    match config.cors.auth_mode {
        AuthMode::Header => info!("  Auth forwarding: header ({})", config.cors.user_header),
        AuthMode::Cookie => info!(
            "  Auth forwarding: header ({}) + session cookie",
            config.cors.user_header
        ),
    }
    match config.id_extraction {
        IdExtraction::Query => info!("  Relay ids: query parameters"),
        IdExtraction::Path => info!("  Relay ids: path segments"),
    }

    let store: Arc<dyn ObjectStore> = match &config.backend {
        BackendConfig::Memory => {
            warn!("  Backend: in-memory (objects are lost on restart)");
            Arc::new(MemoryBackend::new())
        }
        BackendConfig::S3 {
            endpoint,
            bucket,
            region,
            ..
        } => {
            info!("  Backend: S3");
            info!("  Bucket: {}", bucket);
            info!("  Region: {}", region);
            if let Some(ep) = endpoint {
                info!("  Endpoint: {}", ep);
            }
            Arc::new(S3Backend::new(&config.backend).await?)
        }
    };

    let upstream = Arc::new(HttpUpstream::new(
        &config.upstream,
        &config.cors.user_header,
    )?);
    let cors = Arc::new(CorsSettings::from_config(&config.cors)?);

    let state = Arc::new(AppState {
        store,
        upstream,
        options: RelayOptions {
            scope: RelayScope {
                company_id: config.upstream.company_id.clone(),
                project_id: config.upstream.project_id.clone(),
            },
            auth_mode: config.cors.auth_mode,
            user_header: config.cors.user_header.clone(),
        },
    });

    let app = build_router(
        state,
        cors,
        config.id_extraction,
        config.max_body_size as usize,
    );

    // Start server with graceful shutdown
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Uplink Proxy listening on http://{}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle shutdown signals (SIGINT, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
