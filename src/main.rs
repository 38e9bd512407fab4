//! sdserve server binary.
//!
//! Exposes a mounted storage volume over HTTP: directory browsing, chunked
//! file downloads, deletion, and streamed multipart uploads. The main entry
//! point builds the Axum router under the configured URL prefix and starts
//! the listener.

mod config;
mod error;
mod files;
mod http;
mod logging;
mod multipart;
mod paths;
mod upload;
mod volume;

use axum::Router;
use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::middleware;
use axum::routing::get;
use axum_server::Handle;
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::config::{Args, ServerConfig};
use crate::volume::{LocalVolume, Volume};

/// Starts the file server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let local = LocalVolume::new(PathBuf::from(&args.storage_dir));
    local.ensure_mount().await?;
    info!(mount = %local.mount_path().display(), "storage volume ready");
    let volume: Arc<dyn Volume> = Arc::new(local);
    let config = Arc::new(ServerConfig::from_args(&args));

    let prefix = paths::build_prefix(&config.url_prefix);
    let handlers = get(files::handle_get)
        .delete(files::handle_delete)
        .post(upload::handle_upload);
    let routes = if prefix == "/" {
        Router::new()
            .route("/", handlers.clone())
            .route("/{*path}", handlers)
    } else {
        Router::new()
            .route(&prefix, handlers.clone())
            .route(&format!("{prefix}/"), handlers.clone())
            .route(&format!("{prefix}/{{*path}}"), handlers)
    };

    let mut app = routes
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(config))
        .layer(Extension(volume));

    if let Some(cors_layer) = http::build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("listening at http://{}{}", addr, prefix);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
