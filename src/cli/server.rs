//! Server mode CLI logic
//!
//! Contains the core logic for running the HTTP server mode.

use crate::{
    Settings,
    cli::{env_filter, init_logging},
    config::ConfigLoader,
    server::app,
    service::ResolverService,
    utils::version,
};
use anyhow::Result;
use std::sync::Arc;

/// Arguments for server mode
#[derive(Debug)]
pub struct ServerArgs {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub config: Option<String>,
    pub verbose: bool,
}

/// Run server mode with the given arguments
pub async fn run_server_mode(args: ServerArgs) -> Result<()> {
    // Configuration is loaded before logging so that logging.level applies.
    // Precedence: CLI > environment > file (--config, RESOLVER_CONFIG or the
    // default location) > defaults.
    let config_loader = ConfigLoader::new();
    let config_path = match &args.config {
        Some(config) => Some(std::path::PathBuf::from(config)),
        None => ConfigLoader::discover(),
    };

    let mut settings = config_loader
        .load(config_path.as_deref())
        .unwrap_or_else(|e| {
            // Can't use tracing here since it's not initialized yet
            eprintln!(
                "Warning: Failed to load configuration: {}. Using defaults.",
                e
            );
            Settings::default()
        });

    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    settings.logging.verbose = args.verbose || settings.logging.verbose;

    init_logging(
        env_filter(settings.logging.verbose, &settings.logging.level),
        &settings.logging,
        false,
    );
    tracing::info!(
        "Starting stream resolver v{}",
        version::get_detailed_version()
    );

    let service = Arc::new(ResolverService::new(settings.clone())?);
    let sweeper = service.spawn_sweeper();
    let app = app::create_app(service.clone());

    let addr = parse_and_bind_address(&settings.server.host, settings.server.port).await?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "Stream resolver v{} listening on {}",
        version::get_version(),
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    if let Err(e) = sweeper.await {
        tracing::debug!("Cache sweeper ended abnormally: {}", e);
    }
    tracing::info!("Stream resolver stopped");

    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Parse host string and attempt to bind to the address
///
/// `::` falls back to `0.0.0.0` when the host has no IPv6 stack.
pub async fn parse_and_bind_address(host: &str, port: u16) -> Result<std::net::SocketAddr> {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

    if let Ok(ip) = host.parse::<IpAddr>() {
        let addr = SocketAddr::new(ip, port);
        if ip != IpAddr::V6(Ipv6Addr::UNSPECIFIED) {
            tracing::debug!("Parsed address: {}", addr);
            return Ok(addr);
        }
    }

    match host {
        "::" => {
            let addr = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
            match tokio::net::TcpListener::bind(addr).await {
                Ok(_) => {
                    tracing::debug!("IPv6 any address available: {}", addr);
                    Ok(addr)
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not listen on [::]:{} (Caused by {}), falling back to 0.0.0.0",
                        port,
                        e
                    );
                    Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
                }
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid host address: {}. Use '::' for IPv6 or '0.0.0.0' for IPv4",
                host
            );
        }
    }
}
