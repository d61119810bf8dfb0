//! # WhisperX Server - Main Application Entry Point
//!
//! HTTP front end for WhisperX speech transcription with speaker diarization, built to
//! run as a GPU pod or a serverless worker.
//!
//! ## Application Architecture:
//! - **config**: Configuration (TOML file + environment variables, incl. the legacy
//!   `WHISPER_*` / `HF_TOKEN` variables)
//! - **request**: Submission contract and validation
//! - **audio**: Acquiring audio into scratch files (base64, URL download, upload)
//! - **transcription**: The `Transcriber` trait, results, and the WhisperX CLI adapter
//! - **delivery**: Inline results vs. presigned-URL upload
//! - **pipeline**: The one path every transcription runs through
//! - **jobs**: Background jobs, their registry and lifecycle
//! - **handlers / health / middleware**: HTTP surface, liveness, metrics
//! - **error**: Error taxonomy and HTTP error responses
//!
//! ## Startup order:
//! The transcriber is initialized before the listener binds. Until `/health` answers,
//! the model is not ready and orchestrators should not route traffic here.

mod audio;
mod config;
mod delivery;
mod error;
mod handlers;
mod health;
mod jobs;
mod middleware;
mod pipeline;
mod redact;
mod request;
mod state;
mod transcription;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::WhisperxCli;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.logging.level)?;
    config.validate()?;

    info!("Starting whisperx-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        model = %config.transcriber.model,
        compute_type = %config.transcriber.compute_type,
        batch_size = config.transcriber.batch_size,
        device = %config.transcriber.device,
        max_concurrent_jobs = config.jobs.max_concurrent_jobs,
        retention_seconds = config.jobs.retention_seconds,
        "Configuration loaded"
    );

    // Probing the CLI blocks; do it before the server exists rather than on a worker
    let transcriber_config = config.transcriber.clone();
    let scratch_root = config.temp_dir();
    let transcriber =
        tokio::task::spawn_blocking(move || WhisperxCli::initialize(transcriber_config, scratch_root))
            .await??;
    info!(version = transcriber.version().unwrap_or("unknown"), "WhisperX CLI detected");

    let app_state = AppState::new(config.clone(), Arc::new(transcriber))?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let max_request_bytes = config.max_request_bytes();

    // Install signal handlers before serving so an early SIGTERM is not missed
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .configure(|cfg| handlers::configure_routes(cfg, max_request_bytes))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, stopping server...");
            server_handle.stop(true).await;
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Initialize structured logging.
///
/// `RUST_LOG` wins when set; otherwise `logging.level` from the configuration applies to
/// this crate and actix stays at `info`.
fn init_tracing(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("whisperx_server={},actix_web=info", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
