// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The actor worker runtime: registers actor factories by type and runs
//! the per-message processing contract against the shared state store and
//! message queue ports. Knows nothing about Redis specifically — only the
//! [`StateStore`] / [`MessageQueueAdapter`] traits, so it runs unmodified
//! against any future adapter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use orchestrator_domain::entities::{TaskAttemptRecord, TaskLease};
use orchestrator_domain::repositories::{Actor, ActorFactory, MessageHandler, MessageQueueAdapter, Priority, StateStore};
use orchestrator_domain::value_objects::{LeaseId, Value};
use orchestrator_domain::{MessagePayload, MessageType, OrchestratorError, PipelineMessage};

use super::lease_manager::LeaseManager;
use crate::infrastructure::redis::keys;

/// Registers actor factories and spawns the consumer loops that invoke
/// them. One instance is shared across every `startWorker` call in a
/// process.
pub struct ActorWorkerRuntime {
    worker_id: String,
    store: Arc<dyn StateStore>,
    queue: Arc<dyn MessageQueueAdapter>,
    leases: Arc<LeaseManager>,
    actors: RwLock<HashMap<String, Arc<dyn ActorFactory>>>,
}

impl ActorWorkerRuntime {
    pub fn new(worker_id: impl Into<String>, store: Arc<dyn StateStore>, queue: Arc<dyn MessageQueueAdapter>) -> Self {
        let leases = Arc::new(LeaseManager::new(Arc::clone(&store)));
        Self { worker_id: worker_id.into(), store, queue, leases, actors: RwLock::new(HashMap::new()) }
    }

    pub fn register_actor(&self, actor_type: impl Into<String>, factory: Arc<dyn ActorFactory>) {
        self.actors.write().expect("actor registry lock poisoned").insert(actor_type.into(), factory);
    }

    fn factory_for(&self, actor_type: &str) -> Option<Arc<dyn ActorFactory>> {
        self.actors.read().expect("actor registry lock poisoned").get(actor_type).cloned()
    }

    /// Subscribes `concurrency` consumers to `actor-<actor_type>`. Returns
    /// once every consumer has stopped, which happens only when the queue
    /// adapter's own shutdown signal fires.
    #[instrument(skip(self))]
    pub async fn start_worker(self: Arc<Self>, actor_type: &str, concurrency: usize) -> orchestrator_domain::error::Result<()> {
        let queue_name = keys::actor_queue(actor_type);
        let this = Arc::clone(&self);
        let actor_type = actor_type.to_string();

        let handler: MessageHandler = Box::new(move |message| {
            let this = Arc::clone(&this);
            let actor_type = actor_type.clone();
            Box::pin(async move { this.handle_execute(actor_type, message).await })
        });

        let join = Arc::clone(&self.queue).register_worker(&queue_name, concurrency, handler).await?;
        join.await;
        Ok(())
    }

    async fn handle_execute(&self, actor_type: String, message: PipelineMessage) -> orchestrator_domain::error::Result<()> {
        if message.message_type != MessageType::Execute {
            return Ok(());
        }
        let payload = message.payload;

        let Some(lease_id) = payload.lease_id else {
            warn!(stage = %payload.stage_name, task = %payload.task_index, "execute message carried no lease id, dropping");
            return Ok(());
        };
        let ttl_ms = payload.lease_ttl_ms.unwrap_or(30_000);

        // Claiming re-presents the lease id the orchestrator already
        // acquired; it only fails if another worker has since taken it.
        let lease = TaskLease {
            lease_id,
            stage_name: payload.stage_name.clone(),
            task_index: payload.task_index,
            worker_id: self.worker_id.clone(),
            acquired_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::milliseconds(ttl_ms as i64),
        };
        let claimed = self.leases.claim(payload.pipeline_id, lease).await.unwrap_or(false);
        if !claimed {
            info!(stage = %payload.stage_name, task = %payload.task_index, "lease already held elsewhere, dropping");
            return Ok(());
        }

        if self.store.is_pipeline_cancelled(payload.pipeline_id).await.unwrap_or(false) {
            info!(pipeline = %payload.pipeline_id, "pipeline cancelled, suppressing task result");
            let _ = self.leases.release(lease_id).await;
            return Ok(());
        }

        let mut attempt = TaskAttemptRecord::new(payload.stage_name.as_str(), payload.task_index.value(), payload.input.clone().unwrap_or(Value::Null));
        attempt.attempt = payload.attempt;
        attempt.mark_leased();
        let _ = self.store.record_task_attempt(payload.pipeline_id, attempt.clone()).await;

        let Some(factory) = self.factory_for(&actor_type) else {
            return self.emit_failure(payload, format!("no actor registered for type '{actor_type}'"), lease_id).await;
        };

        let context = payload.input.clone().unwrap_or(Value::Null);
        let actor = match factory.create(&context).await {
            Ok(actor) => actor,
            Err(e) => return self.emit_failure(payload, e.to_string(), lease_id).await,
        };

        let stop = Arc::new(Notify::new());
        let lost = self.leases.spawn_heartbeat(lease_id, ttl_ms, Arc::clone(&stop));

        let input = payload.input.clone().unwrap_or(Value::Null);
        let outcome = tokio::select! {
            result = self.invoke(&actor, input) => Some(result),
            _ = lost.wait() => None,
        };
        stop.notify_waiters();

        let Some(result) = outcome else {
            warn!(stage = %payload.stage_name, task = %payload.task_index, "lease lost mid-execution, aborting without publishing");
            return Err(OrchestratorError::LeaseLost { stage: payload.stage_name.clone(), task_index: payload.task_index.value() });
        };

        match result {
            Ok(output) => self.emit_success(payload, output, lease_id).await,
            Err(e) => self.emit_failure(payload, e.to_string(), lease_id).await,
        }
    }

    async fn invoke(&self, actor: &Arc<dyn Actor>, input: Value) -> orchestrator_domain::error::Result<Value> {
        actor.execute(input).await
    }

    async fn emit_success(&self, payload: MessagePayload, output: Value, lease_id: LeaseId) -> orchestrator_domain::error::Result<()> {
        let pipeline_id = payload.pipeline_id;
        let mut attempt = TaskAttemptRecord::new(payload.stage_name.as_str(), payload.task_index.value(), payload.input.clone().unwrap_or(Value::Null));
        attempt.attempt = payload.attempt;
        attempt.mark_succeeded(output.clone());
        let _ = self.store.record_task_attempt(pipeline_id, attempt).await;
        let _ = self.leases.release(lease_id).await;

        let result_payload = MessagePayload { output: Some(output), ..payload };
        let message = PipelineMessage::result(self.worker_id.clone(), "orchestrator", result_payload);
        self.queue.enqueue(keys::RESULTS_QUEUE, message, Priority::Normal).await
    }

    async fn emit_failure(&self, payload: MessagePayload, error: String, lease_id: LeaseId) -> orchestrator_domain::error::Result<()> {
        let pipeline_id = payload.pipeline_id;
        let mut attempt = TaskAttemptRecord::new(payload.stage_name.as_str(), payload.task_index.value(), payload.input.clone().unwrap_or(Value::Null));
        attempt.attempt = payload.attempt;
        // Terminal by default; the orchestrator flips this back to
        // Retrying/Queued if the stage's retry policy admits another
        // attempt (it alone knows the policy).
        attempt.record_failure(error.clone(), true, false);
        let _ = self.store.record_task_attempt(pipeline_id, attempt).await;
        let _ = self.leases.release(lease_id).await;

        let failure_payload = MessagePayload { error: Some(error), ..payload };
        let message = PipelineMessage::failure(self.worker_id.clone(), "orchestrator", failure_payload);
        self.queue.enqueue(keys::RESULTS_QUEUE, message, Priority::Normal).await
    }
}
