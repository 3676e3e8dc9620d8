// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `orchestrator` binary: parses and validates its CLI (via
//! `orchestrator-bootstrap`), wires the Redis-backed `StateStore` and
//! `MessageQueueAdapter`, and dispatches to one of `submit` / `cancel` /
//! `status` / `resume` / `worker` / `serve`.
//!
//! `serve` runs the scheduler's result consumer and the metrics endpoint
//! until a termination signal arrives; `worker` runs the actor worker
//! pool for a fixed set of actor types. Both shut down cooperatively on
//! `SIGTERM`/`SIGINT`/`SIGHUP`.

use std::process::ExitCode as StdExitCode;
use std::sync::Arc;

use orchestrator::application::commands;
use orchestrator::application::OrchestratorService;
use orchestrator::infrastructure::config::Settings;
use orchestrator::infrastructure::redis::{RedisConnection, RedisMessageQueue, RedisStateStore};
use orchestrator::infrastructure::runtime::ActorWorkerRuntime;
use orchestrator::infrastructure::{init_tracing, MetricsEndpoint, MetricsService};
use orchestrator::presentation::adapters;
use orchestrator::{MessageQueueAdapter, StateStore};
use orchestrator_bootstrap::shutdown::ShutdownCoordinator;
use orchestrator_bootstrap::signals::wait_for_shutdown_signal;
use orchestrator_bootstrap::{bootstrap_cli, result_to_exit_code, ValidatedCli, ValidatedCommand};

/// Subscribers consuming the shared results queue inside `serve`. Not
/// user-configurable: it bounds how many worker results the scheduler
/// folds into pipeline state concurrently, which is an implementation
/// detail of this process, not a deployment knob.
const RESULT_CONSUMER_CONCURRENCY: usize = 8;

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Setup(#[from] anyhow::Error),

    #[error(transparent)]
    Orchestrator(#[from] orchestrator_domain::OrchestratorError),

    #[error("worker task panicked: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> StdExitCode {
    let cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            return StdExitCode::from(orchestrator_bootstrap::ExitCode::from(&e));
        }
    };

    init_tracing(if cli.verbose { "debug" } else { "info" });
    result_to_exit_code(run(cli).await)
}

async fn run(cli: ValidatedCli) -> Result<(), MainError> {
    let config_path = cli.config.as_deref().and_then(|p| p.to_str());
    let settings = Settings::load(config_path)?;

    let connection = RedisConnection::connect(&settings.redis.url).await?;
    let redis_queue = Arc::new(RedisMessageQueue::new(connection.clone()));
    let store: Arc<dyn StateStore> = Arc::new(RedisStateStore::new(connection));
    let queue: Arc<dyn MessageQueueAdapter> = Arc::clone(&redis_queue) as Arc<dyn MessageQueueAdapter>;

    match cli.command {
        ValidatedCommand::Submit { definition, trigger } => {
            let service = OrchestratorService::new(Arc::clone(&store), Arc::clone(&queue), settings.orchestrator.clone());
            let pipeline_id = commands::submit(&service, &definition, trigger.as_deref()).await?;
            adapters::present_submitted(pipeline_id);
        }
        ValidatedCommand::Cancel { pipeline_id, reason } => {
            let service = OrchestratorService::new(Arc::clone(&store), Arc::clone(&queue), settings.orchestrator.clone());
            commands::cancel(&service, &pipeline_id, reason).await?;
            adapters::present_cancelled(&pipeline_id);
        }
        ValidatedCommand::Status { pipeline_id } => {
            let report = commands::status(&store, &pipeline_id).await?;
            adapters::present_status(&report);
        }
        ValidatedCommand::Resume => {
            let service = OrchestratorService::new(Arc::clone(&store), Arc::clone(&queue), settings.orchestrator.clone());
            commands::resume(&service).await?;
            adapters::present_resumed();
        }
        ValidatedCommand::Worker { actor_types, concurrency } => {
            run_worker(store, queue, actor_types, concurrency).await?;
        }
        ValidatedCommand::Serve => {
            run_serve(store, queue, redis_queue, settings).await?;
        }
    }

    Ok(())
}

/// Hosts the actor worker pool: one `start_worker` loop per `--actor`
/// type, all racing the shutdown signal. No actor factories are
/// registered here — concrete actor business logic is supplied by
/// whatever embeds this runtime; this binary hosts the scheduling and
/// delivery contract, not any particular actor's behavior.
async fn run_worker(
    store: Arc<dyn StateStore>,
    queue: Arc<dyn MessageQueueAdapter>,
    actor_types: Vec<String>,
    concurrency: usize,
) -> Result<(), MainError> {
    let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
    let runtime = Arc::new(ActorWorkerRuntime::new(worker_id, store, queue));

    let shutdown = ShutdownCoordinator::default();
    let mut workers = Vec::with_capacity(actor_types.len());
    for actor_type in actor_types {
        let runtime = Arc::clone(&runtime);
        workers.push(tokio::spawn(async move { runtime.start_worker(&actor_type, concurrency).await }));
    }

    wait_for_shutdown_signal(&shutdown).await;
    tracing::info!("stopping actor worker pool");

    for worker in workers {
        worker.await??;
    }
    Ok(())
}

/// Runs the scheduler's result consumer and the metrics endpoint until a
/// termination signal arrives. `resume_on_startup` pipelines are resumed
/// before the consumer starts accepting new results.
async fn run_serve(
    store: Arc<dyn StateStore>,
    queue: Arc<dyn MessageQueueAdapter>,
    redis_queue: Arc<RedisMessageQueue>,
    settings: Settings,
) -> Result<(), MainError> {
    let service = Arc::new(OrchestratorService::new(Arc::clone(&store), Arc::clone(&queue), settings.orchestrator.clone()));
    service.resume_running_pipelines().await?;

    let metrics_service = Arc::new(MetricsService::new()?);
    let metrics_endpoint = MetricsEndpoint::new(Arc::clone(&metrics_service), settings.observability.metrics_port);

    let consumer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run_result_consumer(RESULT_CONSUMER_CONCURRENCY).await })
    };
    let metrics = tokio::spawn(async move { metrics_endpoint.start().await });

    let shutdown = ShutdownCoordinator::default();
    wait_for_shutdown_signal(&shutdown).await;
    tracing::info!("stopping scheduler and metrics endpoint");

    redis_queue.shutdown();
    metrics.abort();
    consumer.await??;
    Ok(())
}
