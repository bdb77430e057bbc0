use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    media_store::MediaStore,
    transcode::{FfmpegEncoder, TranscodeRunner},
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting course-media with config: {:?}", cfg);

    // --- Initialize media store, per-kind directories created if absent ---
    let store = MediaStore::new(&cfg.media_dir);
    store.ensure_dirs().await?;

    // --- Transcode runner: one semaphore for the whole process ---
    let encoder = Arc::new(FfmpegEncoder::new(&cfg.ffmpeg, &cfg.ffprobe));
    let runner = TranscodeRunner::new(
        encoder,
        cfg.max_transcodes,
        Duration::from_secs(cfg.transcode_timeout_secs),
    );
    tracing::info!(
        max_transcodes = cfg.max_transcodes,
        timeout_secs = cfg.transcode_timeout_secs,
        "transcode runner ready"
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState { store, runner });

    // --- Start server ---
    // Upload requests stay open for the whole transcode batch, so no
    // request timeout is configured here; very large files are expected
    // to hold their connection for a long time.
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
