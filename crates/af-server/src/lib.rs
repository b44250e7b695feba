//! af-server: HTTP server for streaming audio conversion.
//!
//! This crate ties the other af-* crates into a running service:
//!
//! - Axum-based HTTP API with multipart upload and streamed responses
//! - Health gate sampler that sheds load under scheduler delay or memory
//!   pressure
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod health;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use af_av::FfmpegTranscoder;
use af_core::config::Config;

use crate::context::AppContext;

/// Start the audioforge server.
///
/// This is the main entry point. It resolves the ffmpeg binary, constructs
/// the [`AppContext`], spawns the health sampler, and serves HTTP until a
/// shutdown signal is received.
pub async fn start(config: Config) -> af_core::Result<()> {
    // Validate configuration.
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Resolve the external transcoder binary up front so a missing ffmpeg
    // fails at startup rather than on the first request.
    let ffmpeg = af_av::resolve_ffmpeg(&config.tools)?;
    match af_av::ffmpeg_version(&ffmpeg) {
        Some(version) => tracing::info!("Using {} ({version})", ffmpeg.display()),
        None => tracing::warn!("Could not read ffmpeg version from {}", ffmpeg.display()),
    }
    let transcoder = Arc::new(FfmpegTranscoder::new(ffmpeg, config.transcode.threads));

    let ctx = AppContext::new(config.clone(), transcoder);

    // Cancellation token for graceful shutdown.
    let cancel = CancellationToken::new();

    // Spawn the pressure sampler feeding the admission gate.
    let sampler_monitor = ctx.health.clone();
    let sampler_cancel = cancel.clone();
    let sampler_handle = tokio::spawn(async move {
        health::run_sampler(sampler_monitor, sampler_cancel).await;
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| af_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let app = router::build_router(ctx);

    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| af_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .map_err(|e| af_core::Error::Internal(format!("Server error: {e}")))?;

    // Stop the sampler and wait for it.
    cancel.cancel();
    let _ = sampler_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
