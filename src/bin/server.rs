//! Binary entry point: loads configuration, connects to Postgres, runs
//! migrations and crash recovery, starts the worker pool, and serves
//! the HTTP API.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use transcribe_core::config::AppConfig;
use transcribe_core::context;
use transcribe_core::telemetry;
use transcribe_core::transcriber::Transcriber;

/// Placeholder backend: the scheduler and lifecycle engine this crate
/// builds are backend-agnostic (spec's external `Transcriber`
/// contract). Wire a real speech-recognition backend here in
/// deployment; this default keeps the binary runnable standalone.
struct UnconfiguredTranscriber;

#[async_trait::async_trait]
impl Transcriber for UnconfiguredTranscriber {
    async fn transcribe_simple(
        &self,
        _path: &std::path::Path,
        _language: &str,
        _model_size: transcribe_core::models::ModelSize,
    ) -> Result<
        transcribe_core::transcriber::TranscriptResult,
        transcribe_core::transcriber::TranscriberError,
    > {
        Err(transcribe_core::transcriber::TranscriberError::Backend(
            "no transcription backend configured".to_string(),
        ))
    }

    async fn transcribe_with_diarization(
        &self,
        path: &std::path::Path,
        language: &str,
        model_size: transcribe_core::models::ModelSize,
    ) -> Result<
        transcribe_core::transcriber::TranscriptResult,
        transcribe_core::transcriber::TranscriberError,
    > {
        self.transcribe_simple(path, language, model_size).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = AppConfig::load()?;
    tracing::info!(bind_addr = %config.bind_addr, "starting transcribe-core");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let (ctx, worker_pool) = context::build(&config, pool, Arc::new(UnconfiguredTranscriber)).await?;

    let app = transcribe_core::http::router(ctx);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    worker_pool.shutdown().await;
    Ok(())
}
