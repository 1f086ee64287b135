//! `durabletask-echo-worker`: a smoke-test host for the work-item protocol.
//!
//! Completes every orchestration with its start input and returns every
//! activity's input as its result. SIGINT or SIGTERM disposes the protocol
//! handler; in-flight items are finished or abandoned before exit.

use clap::Parser;
use durabletask_worker::{
    HandlerError,
    client::GrpcSidecarClient,
    config::{CliArgs, WorkerConfig},
    proto::{
        ActivityRequest, ActivityResponse, OrchestrationStatus, OrchestratorRequest,
        OrchestratorResponse,
    },
    protocol::ProtocolHandler,
    telemetry::init_telemetry,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = WorkerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let result = run(&config).await;

    providers.shutdown();
    result
}

async fn run(config: &WorkerConfig) -> anyhow::Result<()> {
    let client = GrpcSidecarClient::connect(config).await?;
    let handler = Arc::new(ProtocolHandler::with_hints(client, config.hints));

    let signals = tokio::spawn({
        let handler = Arc::clone(&handler);
        async move {
            shutdown_signal().await;
            handler.dispose().await;
        }
    });

    let result = handler
        .start(echo_orchestration, echo_activity, CancellationToken::new())
        .await;

    // The stream may have ended on its own; the signal task has nothing left
    // to stop.
    signals.abort();

    result?;
    tracing::info!("Worker shut down successfully");
    Ok(())
}

fn log_startup_info(config: &WorkerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting echo worker against {} with full config: {:#?}",
            config.sidecar_address,
            config
        );
    } else {
        tracing::info!(
            "Starting echo worker against {}",
            config.sidecar_address
        );
    }
}

async fn echo_orchestration(
    request: OrchestratorRequest,
    _cancellation: CancellationToken,
) -> Result<OrchestratorResponse, HandlerError> {
    let input = request
        .execution_started()
        .and_then(|started| started.input.clone());
    tracing::debug!(instance_id = %request.instance_id, "Completing orchestration");
    Ok(OrchestratorResponse::complete(
        request.instance_id,
        OrchestrationStatus::Completed,
        input,
        None,
    ))
}

async fn echo_activity(
    request: ActivityRequest,
    _cancellation: CancellationToken,
) -> Result<ActivityResponse, HandlerError> {
    tracing::debug!(activity = %request.name, task_id = request.task_id, "Echoing activity");
    Ok(ActivityResponse {
        instance_id: request.instance_id().to_owned(),
        task_id: request.task_id,
        result: request.input,
        ..Default::default()
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, stopping work item stream...");
}
