// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator Scheduler
//!
//! [`OrchestratorService`] is the scheduler loop described in §4.5: it
//! compiles a pipeline's DAG, drives its frontier through
//! [`PipelineAggregate`], dispatches ready stages' tasks to actor queues,
//! and folds worker results back into the aggregate — persisting every
//! domain event through [`StateStore`] before acting on it, so a crash
//! between two ticks loses no committed progress.
//!
//! It never talks to Redis directly; it only knows the [`StateStore`] and
//! [`MessageQueueAdapter`] ports, the same discipline the worker runtime
//! in [`crate::infrastructure::runtime`] follows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use orchestrator_domain::entities::{
    PipelineDefinition, StageDefinition, StageRecord, StageStatus, TaskAttemptRecord, TaskLease,
};
use orchestrator_domain::error::Result;
use orchestrator_domain::events::PipelineEvent;
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::services::compile_dependencies;
use orchestrator_domain::value_objects::{PipelineId, StageName, TaskIndex, Value};
use orchestrator_domain::{
    MessageHandler, MessagePayload, MessageQueueAdapter, MessageType, OrchestratorError, PipelineAggregate,
    PipelineMessage, PipelineStatusPatch, Priority, StagePatch, StageExecutor, StateStore,
};

use crate::application::CircuitBreakerRegistry;
use crate::infrastructure::config::OrchestratorSettings;
use crate::infrastructure::executors::{executor_for, resolve_actor};
use crate::infrastructure::redis::keys;
use crate::infrastructure::runtime::LeaseManager;

/// Drives every submitted pipeline's frontier to completion. One instance
/// per process; shared behind an `Arc` between the submit/cancel command
/// handlers and the result-consumer loop.
pub struct OrchestratorService {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn MessageQueueAdapter>,
    leases: LeaseManager,
    circuit_breakers: CircuitBreakerRegistry,
    cache: ExpressionCache,
    settings: OrchestratorSettings,
}

impl OrchestratorService {
    pub fn new(store: Arc<dyn StateStore>, queue: Arc<dyn MessageQueueAdapter>, settings: OrchestratorSettings) -> Self {
        let leases = LeaseManager::new(Arc::clone(&store));
        Self { store, queue, leases, circuit_breakers: CircuitBreakerRegistry::new(), cache: ExpressionCache::new(), settings }
    }

    /// Validates and registers a new pipeline run, then drives its
    /// frontier as far as it will go without waiting on any task result.
    #[instrument(skip(self, definition, trigger))]
    pub async fn submit(&self, definition: PipelineDefinition, trigger: Value) -> Result<PipelineId> {
        let deps = compile_dependencies(&definition)?;
        let id = PipelineId::new();
        self.store.create_pipeline(id, definition.clone(), trigger.clone()).await?;

        let mut aggregate = PipelineAggregate::new(id, definition, trigger);
        // `create_pipeline` already persisted the initial record; the
        // `PipelineCreated` event it raised has no further ledger write.
        aggregate.mark_events_as_committed();

        self.schedule(&mut aggregate, &deps).await?;
        info!(pipeline = %id, "pipeline submitted");
        Ok(id)
    }

    #[instrument(skip(self, reason))]
    pub async fn cancel(&self, id: PipelineId, reason: impl Into<String> + std::fmt::Debug) -> Result<()> {
        let mut aggregate = self.load_aggregate(id).await?;
        aggregate.cancel(reason);
        self.persist_events(&mut aggregate).await
    }

    /// Routes one worker result or failure message into the aggregate and
    /// re-drives the frontier.
    pub async fn handle_result(&self, message: PipelineMessage) -> Result<()> {
        match message.message_type {
            MessageType::Result => self.handle_success(message.payload).await,
            MessageType::Failure => self.handle_failure(message.payload).await,
            MessageType::Execute | MessageType::DeadLetter => Ok(()),
        }
    }

    /// Subscribes to the shared results queue and folds every message into
    /// the scheduler. Runs until the queue adapter's shutdown signal
    /// stops every consumer.
    pub async fn run_result_consumer(self: Arc<Self>, concurrency: usize) -> Result<()> {
        let this = Arc::clone(&self);
        let handler: MessageHandler = Box::new(move |message| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.handle_result(message).await })
        });
        let queue_name = self.settings.results_queue.clone();
        let join = Arc::clone(&self.queue).register_worker(&queue_name, concurrency, handler).await?;
        join.await;
        Ok(())
    }

    /// Startup resume: re-drives the frontier of every pipeline the store
    /// still considers running, and re-dispatches any in-flight task whose
    /// lease has lapsed (the worker holding it is presumed dead).
    #[instrument(skip(self))]
    pub async fn resume_running_pipelines(&self) -> Result<()> {
        if !self.settings.resume_on_startup {
            return Ok(());
        }
        let running = self.store.list_running_pipelines().await?;
        info!(count = running.len(), "resuming running pipelines");
        for id in running {
            if let Err(error) = self.resume_pipeline(id).await {
                warn!(pipeline = %id, %error, "failed to resume pipeline, leaving for the next resume pass");
            }
        }
        Ok(())
    }

    async fn resume_pipeline(&self, id: PipelineId) -> Result<()> {
        let mut aggregate = self.load_aggregate(id).await?;
        if aggregate.is_cancelled() || aggregate.record().status.is_terminal() {
            return Ok(());
        }
        let deps = compile_dependencies(&aggregate.record().definition)?;

        for stage_name in aggregate.record().active_stages.clone() {
            let Some(stage_def) = aggregate.record().definition.stage(&stage_name).cloned() else { continue };
            for attempt in self.store.get_pending_tasks(id, &stage_name).await? {
                let live_lease = self
                    .store
                    .get_task_lease(id, &stage_name, attempt.task_index)
                    .await?
                    .map(|lease| !lease.is_expired(Utc::now()))
                    .unwrap_or(false);
                if live_lease {
                    continue;
                }
                self.redispatch_attempt(id, &stage_name, &stage_def, attempt).await?;
            }
        }

        self.schedule(&mut aggregate, &deps).await
    }

    async fn redispatch_attempt(
        &self,
        pipeline_id: PipelineId,
        stage_name: &str,
        stage: &StageDefinition,
        attempt: TaskAttemptRecord,
    ) -> Result<()> {
        let actor_type = resolve_actor(&stage.actor, &attempt.input, &self.cache)?;
        let ttl_ms = stage.lease_ttl(self.settings.default_lease_ttl_ms).as_millis() as u64;
        let lease = TaskLease::new(
            StageName::from(stage_name),
            TaskIndex::new(attempt.task_index),
            "orchestrator",
            chrono::Duration::milliseconds(ttl_ms as i64),
        );
        let lease_id = lease.lease_id;
        self.leases.claim(pipeline_id, lease).await?;

        let payload = MessagePayload {
            pipeline_id,
            stage_name: StageName::from(stage_name),
            task_index: TaskIndex::new(attempt.task_index),
            actor_type: actor_type.clone(),
            attempt: attempt.attempt,
            retry_attempt: attempt.attempt.saturating_sub(1),
            input: Some(attempt.input),
            output: None,
            error: None,
            lease_id: Some(lease_id),
            lease_ttl_ms: Some(ttl_ms),
            retry_policy: stage.retry.clone(),
        };
        let message = PipelineMessage::execute("orchestrator", format!("actor-{actor_type}"), payload);
        info!(pipeline = %pipeline_id, stage = stage_name, task = attempt.task_index, "re-dispatching task after resume");
        self.queue.enqueue(&keys::actor_queue(&actor_type), message, Priority::High).await
    }

    async fn handle_success(&self, payload: MessagePayload) -> Result<()> {
        self.circuit_breakers.record_success(&payload.actor_type);

        let mut aggregate = self.load_aggregate(payload.pipeline_id).await?;
        if aggregate.is_cancelled() {
            return Ok(());
        }

        let stage_name = payload.stage_name.as_str();
        let output = payload.output.clone().unwrap_or(Value::Null);
        let finished = aggregate.record_task_output(stage_name, payload.task_index.value(), output);
        self.persist_events(&mut aggregate).await?;

        if finished {
            aggregate.complete_stage(stage_name);
            self.persist_events(&mut aggregate).await?;
        }

        let deps = compile_dependencies(&aggregate.record().definition)?;
        self.schedule(&mut aggregate, &deps).await
    }

    async fn handle_failure(&self, payload: MessagePayload) -> Result<()> {
        let mut aggregate = self.load_aggregate(payload.pipeline_id).await?;
        if aggregate.is_cancelled() {
            return Ok(());
        }

        let stage_name = payload.stage_name.as_str().to_string();
        let Some(stage_def) = aggregate.record().definition.stage(&stage_name).cloned() else {
            return Err(OrchestratorError::NotFound(format!("stage '{stage_name}'")));
        };

        if let Some(spec) = &stage_def.circuit_breaker {
            self.circuit_breakers.record_failure(&payload.actor_type, spec);
        }

        let retry_policy = payload.retry_policy.clone().or_else(|| stage_def.retry.clone());
        let admits_retry = retry_policy.as_ref().is_some_and(|policy| policy.admits_retry(payload.attempt));

        if admits_retry {
            return self.retry_task(&stage_name, &stage_def, payload, retry_policy.expect("checked above")).await;
        }

        warn!(stage = %stage_name, "task exhausted its retries, dead-lettering and failing the stage");
        let dlq = stage_def.dead_letter_queue_name(&payload.actor_type);
        let dead = PipelineMessage::failure("orchestrator", dlq.clone(), payload.clone()).into_dead_letter();
        self.queue.dead_letter(&dlq, dead).await?;

        self.run_compensations(&aggregate).await?;

        aggregate.fail_stage(&stage_name, payload.error.clone().unwrap_or_else(|| "task failed".to_string()));
        self.persist_events(&mut aggregate).await
    }

    async fn retry_task(
        &self,
        stage_name: &str,
        stage: &StageDefinition,
        payload: MessagePayload,
        policy: orchestrator_domain::RetryPolicy,
    ) -> Result<()> {
        let next_retry_attempt = payload.retry_attempt + 1;
        let next_attempt = payload.attempt + 1;
        let delay = policy.delay_for(next_retry_attempt);

        let mut record = TaskAttemptRecord::new(stage_name, payload.task_index.value(), payload.input.clone().unwrap_or(Value::Null));
        record.attempt = next_attempt;
        self.store.record_task_attempt(payload.pipeline_id, record).await?;

        let ttl_ms = payload.lease_ttl_ms.unwrap_or_else(|| stage.lease_ttl(self.settings.default_lease_ttl_ms).as_millis() as u64);
        let lease = TaskLease::new(
            StageName::from(stage_name),
            payload.task_index,
            "orchestrator",
            chrono::Duration::milliseconds(ttl_ms as i64),
        );
        let lease_id = lease.lease_id;
        self.leases.claim(payload.pipeline_id, lease).await?;

        let retry_payload = MessagePayload {
            attempt: next_attempt,
            retry_attempt: next_retry_attempt,
            output: None,
            error: None,
            lease_id: Some(lease_id),
            lease_ttl_ms: Some(ttl_ms),
            ..payload
        };
        let actor_type = retry_payload.actor_type.clone();
        let message = PipelineMessage::execute("orchestrator", format!("actor-{actor_type}"), retry_payload);
        warn!(stage = stage_name, attempt = next_attempt, delay_ms = delay.as_millis() as u64, "retrying task after backoff");
        self.queue.enqueue_delayed(&keys::actor_queue(&actor_type), message, delay.as_millis() as u64).await
    }

    /// Invokes every already-completed stage's compensation action, in
    /// reverse completion order, after a pipeline failure (§4.5
    /// responsibility 5). Fire-and-forget: the orchestrator does not wait
    /// on or retry a compensation's own result.
    async fn run_compensations(&self, aggregate: &PipelineAggregate) -> Result<()> {
        let context = self.build_context(aggregate);
        let pipeline_id = aggregate.record().id;

        let mut completed: Vec<(&String, chrono::DateTime<Utc>)> = aggregate
            .record()
            .stage_order
            .iter()
            .filter_map(|stage_name| {
                let stage_def = aggregate.record().definition.stage(stage_name)?;
                stage_def.compensation.as_ref()?;
                let stage_record = aggregate.stage(stage_name)?;
                if stage_record.status != StageStatus::Completed {
                    return None;
                }
                Some((stage_name, stage_record.completed_at.unwrap_or_else(Utc::now)))
            })
            .collect();
        completed.sort_by(|(_, a), (_, b)| b.cmp(a));

        for (stage_name, _) in completed {
            let stage_def = aggregate.record().definition.stage(stage_name).expect("checked above");
            let compensation = stage_def.compensation.as_ref().expect("checked above");

            let mut input = BTreeMap::new();
            for (key, expr_src) in &compensation.input {
                input.insert(key.clone(), self.cache.get_or_compile(expr_src)?.eval(&context));
            }

            let ttl_ms = self.settings.default_lease_ttl_ms;
            let lease = TaskLease::new(
                StageName::from(stage_name.as_str()),
                TaskIndex::new(0),
                "orchestrator",
                chrono::Duration::milliseconds(ttl_ms as i64),
            );
            let lease_id = lease.lease_id;
            self.leases.claim(pipeline_id, lease).await?;

            let payload = MessagePayload {
                pipeline_id,
                stage_name: StageName::from(stage_name.as_str()),
                task_index: TaskIndex::new(0),
                actor_type: compensation.actor.clone(),
                attempt: 1,
                retry_attempt: 0,
                input: Some(Value::Map(input)),
                output: None,
                error: None,
                lease_id: Some(lease_id),
                lease_ttl_ms: Some(ttl_ms),
                retry_policy: None,
            };
            let message = PipelineMessage::execute("orchestrator", format!("actor-{}", compensation.actor), payload);
            warn!(stage = %stage_name, actor = %compensation.actor, "running compensation after pipeline failure");
            self.queue.enqueue(&keys::actor_queue(&compensation.actor), message, Priority::High).await?;
        }
        Ok(())
    }

    /// Plans and dispatches every currently-ready stage, looping while a
    /// `when`-guard skip makes a further stage ready in the same tick.
    /// Stages whose executor returns no tasks (an unmet gather barrier)
    /// stay `pending` until the next result re-drives scheduling.
    async fn schedule(&self, aggregate: &mut PipelineAggregate, deps: &HashMap<String, Vec<String>>) -> Result<()> {
        loop {
            let ready: Vec<String> = aggregate.ready_stages(deps).into_iter().map(String::from).collect();
            if ready.is_empty() {
                break;
            }

            let mut any_skipped = false;
            for stage_name in ready {
                let stage_def = aggregate
                    .record()
                    .definition
                    .stage(&stage_name)
                    .cloned()
                    .expect("a ready stage must exist in its own pipeline's definition");

                let context = self.build_context(aggregate);
                if let Some(when) = &stage_def.when {
                    if !self.cache.get_or_compile(when)?.eval_bool(&context) {
                        aggregate.skip_stage(&stage_name);
                        self.persist_events(aggregate).await?;
                        any_skipped = true;
                        continue;
                    }
                }

                let executor = executor_for(stage_def.mode);
                let tasks = executor.plan(&stage_def, &context).await?;
                if tasks.is_empty() {
                    continue;
                }

                let pipeline_id = aggregate.record().id;
                aggregate.plan_stage(&stage_name, tasks.len());
                self.persist_events(aggregate).await?;

                let max_parallel = stage_def.scatter.as_ref().and_then(|s| s.executor_config.max_parallel);
                for task in tasks {
                    if let Some(limit) = max_parallel {
                        self.await_admission(pipeline_id, &stage_name, limit).await?;
                    }
                    self.dispatch_task(pipeline_id, &stage_name, &stage_def, task).await?;
                }
            }

            if !any_skipped {
                break;
            }
        }
        Ok(())
    }

    /// Blocks until fewer than `limit` of the stage's tasks are `queued` or
    /// `leased`, enforcing `scatter.executorConfig.maxParallel`. A crashed
    /// worker's task stays counted here until the next resume pass notices
    /// the lease expired and redispatches it; this gate has no wall-clock
    /// timeout of its own.
    async fn await_admission(&self, pipeline_id: PipelineId, stage: &str, limit: usize) -> Result<()> {
        loop {
            let pending = self.store.get_pending_tasks(pipeline_id, stage).await?.len();
            if pending < limit {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    async fn dispatch_task(
        &self,
        pipeline_id: PipelineId,
        stage_name: &str,
        stage: &StageDefinition,
        task: orchestrator_domain::repositories::PlannedTask,
    ) -> Result<()> {
        if let Some(spec) = &stage.circuit_breaker {
            if let Err(error) = self.circuit_breakers.admit(&task.actor_type, spec) {
                warn!(actor = %task.actor_type, "circuit open, dead-lettering task without dispatch");
                let dlq = stage.dead_letter_queue_name(&task.actor_type);
                let payload = MessagePayload {
                    pipeline_id,
                    stage_name: StageName::from(stage_name),
                    task_index: TaskIndex::new(task.task_index),
                    actor_type: task.actor_type.clone(),
                    attempt: 1,
                    retry_attempt: 0,
                    input: Some(task.input),
                    output: None,
                    error: Some(error.to_string()),
                    lease_id: None,
                    lease_ttl_ms: None,
                    retry_policy: stage.retry.clone(),
                };
                let mut record = TaskAttemptRecord::new(stage_name, task.task_index, payload.input.clone().unwrap_or(Value::Null));
                record.record_failure(error.to_string(), true, false);
                self.store.record_task_attempt(pipeline_id, record).await?;
                let message = PipelineMessage::failure("orchestrator", dlq.clone(), payload).into_dead_letter();
                return self.queue.dead_letter(&dlq, message).await;
            }
        }

        let ttl_ms = stage.lease_ttl(self.settings.default_lease_ttl_ms).as_millis() as u64;
        let lease = TaskLease::new(
            StageName::from(stage_name),
            TaskIndex::new(task.task_index),
            "orchestrator",
            chrono::Duration::milliseconds(ttl_ms as i64),
        );
        let lease_id = lease.lease_id;
        self.leases.claim(pipeline_id, lease).await?;

        let attempt = TaskAttemptRecord::new(stage_name, task.task_index, task.input.clone());
        self.store.record_task_attempt(pipeline_id, attempt).await?;

        let payload = MessagePayload {
            pipeline_id,
            stage_name: StageName::from(stage_name),
            task_index: TaskIndex::new(task.task_index),
            actor_type: task.actor_type.clone(),
            attempt: 1,
            retry_attempt: 0,
            input: Some(task.input),
            output: None,
            error: None,
            lease_id: Some(lease_id),
            lease_ttl_ms: Some(ttl_ms),
            retry_policy: stage.retry.clone(),
        };
        let message = PipelineMessage::execute("orchestrator", format!("actor-{}", task.actor_type), payload);
        self.queue.enqueue(&keys::actor_queue(&task.actor_type), message, Priority::Normal).await
    }

    /// The evaluation context every expression in a pipeline sees:
    /// `trigger` plus one `stages.<name>` list per stage that has started
    /// producing output.
    fn build_context(&self, aggregate: &PipelineAggregate) -> Value {
        let record = aggregate.record();
        let mut stages = BTreeMap::new();
        for name in &record.stage_order {
            if let Some(stage_record) = aggregate.stage(name) {
                if matches!(stage_record.status, StageStatus::Pending) {
                    continue;
                }
                let outputs: Vec<Value> = stage_record.outputs.iter().filter_map(Clone::clone).collect();
                stages.insert(name.clone(), Value::List(outputs));
            }
        }
        let mut root = BTreeMap::new();
        root.insert("trigger".to_string(), record.trigger.clone());
        root.insert("stages".to_string(), Value::Map(stages));
        Value::Map(root)
    }

    async fn load_aggregate(&self, id: PipelineId) -> Result<PipelineAggregate> {
        let record = self.store.get_pipeline(id).await?.ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        let mut stages = HashMap::new();
        for name in &record.stage_order {
            let stage_record = self.store.get_stage(id, name).await?.unwrap_or_else(|| StageRecord::pending(name.clone()));
            stages.insert(name.clone(), stage_record);
        }
        Ok(PipelineAggregate::hydrate(record, stages, 0))
    }

    /// Translates every uncommitted event into the corresponding ledger
    /// write(s), then marks them committed. Events are applied in order
    /// but each write is its own atomic `StateStore` call — see that
    /// trait's doc comment on cross-call atomicity.
    async fn persist_events(&self, aggregate: &mut PipelineAggregate) -> Result<()> {
        for event in aggregate.uncommitted_events().to_vec() {
            self.apply_event(&event).await?;
        }
        aggregate.mark_events_as_committed();
        Ok(())
    }

    async fn apply_event(&self, event: &PipelineEvent) -> Result<()> {
        match event {
            PipelineEvent::PipelineCreated { .. } => Ok(()),
            PipelineEvent::StagePlanned { pipeline_id, stage, task_count } => {
                let patch = StagePatch {
                    status: Some(StageStatus::Running),
                    task_count: Some(*task_count),
                    completed_count: Some(0),
                    completed_at: None,
                };
                self.store.upsert_stage(*pipeline_id, stage.as_str(), patch).await.map(drop)
            }
            PipelineEvent::StageSkipped { pipeline_id, stage } => {
                let patch =
                    StagePatch { status: Some(StageStatus::Skipped), completed_at: Some(Utc::now()), ..Default::default() };
                self.store.upsert_stage(*pipeline_id, stage.as_str(), patch).await.map(drop)
            }
            PipelineEvent::TaskOutputRecorded { pipeline_id, stage, task_index, output } => {
                self.store.append_stage_output(*pipeline_id, stage.as_str(), task_index.value(), output.clone()).await?;
                self.store.update_stage_progress(*pipeline_id, stage.as_str(), 1).await.map(drop)
            }
            PipelineEvent::StageCompleted { pipeline_id, stage } => {
                let patch =
                    StagePatch { status: Some(StageStatus::Completed), completed_at: Some(Utc::now()), ..Default::default() };
                self.store.upsert_stage(*pipeline_id, stage.as_str(), patch).await.map(drop)
            }
            PipelineEvent::StageFailed { pipeline_id, stage, .. } => {
                let patch =
                    StagePatch { status: Some(StageStatus::Failed), completed_at: Some(Utc::now()), ..Default::default() };
                self.store.upsert_stage(*pipeline_id, stage.as_str(), patch).await.map(drop)
            }
            PipelineEvent::PipelineStatusChanged { pipeline_id, status } => {
                self.store.set_pipeline_status(*pipeline_id, *status, PipelineStatusPatch::default()).await
            }
            PipelineEvent::PipelineCancelled { pipeline_id, reason } => {
                self.store.mark_pipeline_cancelled(*pipeline_id, reason).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use orchestrator_domain::entities::{ActorRef, ExecutionMode, PipelineRecord, PipelineStatus};
    use orchestrator_domain::value_objects::LeaseId;

    #[derive(Default)]
    struct FakeStore {
        pipelines: Mutex<StdHashMap<PipelineId, PipelineRecord>>,
        stages: Mutex<StdHashMap<(PipelineId, String), StageRecord>>,
        outputs: Mutex<StdHashMap<(PipelineId, String), Vec<Option<Value>>>>,
        leases: Mutex<StdHashMap<LeaseId, TaskLease>>,
        attempts: Mutex<StdHashMap<(PipelineId, String, usize), TaskAttemptRecord>>,
    }

    #[async_trait]
    impl StateStore for FakeStore {
        async fn create_pipeline(&self, id: PipelineId, definition: PipelineDefinition, trigger: Value) -> Result<PipelineRecord> {
            let record = PipelineRecord::new(id, definition, trigger);
            self.pipelines.lock().unwrap().insert(id, record.clone());
            Ok(record)
        }

        async fn set_pipeline_status(&self, id: PipelineId, status: PipelineStatus, _patch: PipelineStatusPatch) -> Result<()> {
            if let Some(record) = self.pipelines.lock().unwrap().get_mut(&id) {
                record.status = status;
            }
            Ok(())
        }

        async fn get_pipeline(&self, id: PipelineId) -> Result<Option<PipelineRecord>> {
            Ok(self.pipelines.lock().unwrap().get(&id).cloned())
        }

        async fn upsert_stage(&self, id: PipelineId, stage: &str, patch: StagePatch) -> Result<StageRecord> {
            let mut stages = self.stages.lock().unwrap();
            let record = stages.entry((id, stage.to_string())).or_insert_with(|| StageRecord::pending(stage));
            if let Some(status) = patch.status {
                record.status = status;
            }
            if let Some(task_count) = patch.task_count {
                record.task_count = task_count;
                record.outputs = vec![None; task_count];
            }
            if let Some(completed_count) = patch.completed_count {
                record.completed_count = completed_count;
            }
            if let Some(completed_at) = patch.completed_at {
                record.completed_at = Some(completed_at);
            }
            Ok(record.clone())
        }

        async fn get_stage(&self, id: PipelineId, stage: &str) -> Result<Option<StageRecord>> {
            Ok(self.stages.lock().unwrap().get(&(id, stage.to_string())).cloned())
        }

        async fn update_stage_progress(&self, id: PipelineId, stage: &str, completed_delta: usize) -> Result<usize> {
            let mut stages = self.stages.lock().unwrap();
            let record = stages.entry((id, stage.to_string())).or_insert_with(|| StageRecord::pending(stage));
            record.completed_count += completed_delta;
            Ok(record.completed_count)
        }

        async fn record_task_attempt(&self, id: PipelineId, attempt: TaskAttemptRecord) -> Result<()> {
            self.attempts.lock().unwrap().insert((id, attempt.stage_name.clone(), attempt.task_index), attempt);
            Ok(())
        }

        async fn append_stage_output(&self, id: PipelineId, stage: &str, task_index: usize, output: Value) -> Result<()> {
            let mut outputs = self.outputs.lock().unwrap();
            let mut stages = self.stages.lock().unwrap();
            let record = stages.entry((id, stage.to_string())).or_insert_with(|| StageRecord::pending(stage));
            record.record_output(task_index, output.clone());
            let slot = outputs.entry((id, stage.to_string())).or_default();
            if slot.len() <= task_index {
                slot.resize(task_index + 1, None);
            }
            slot[task_index] = Some(output);
            Ok(())
        }

        async fn get_stage_outputs(&self, id: PipelineId, stage: &str) -> Result<Vec<Option<Value>>> {
            Ok(self.outputs.lock().unwrap().get(&(id, stage.to_string())).cloned().unwrap_or_default())
        }

        async fn clear_stage_outputs(&self, id: PipelineId, stage: &str) -> Result<()> {
            self.outputs.lock().unwrap().remove(&(id, stage.to_string()));
            Ok(())
        }

        async fn acquire_task_lease(&self, _id: PipelineId, lease: TaskLease) -> Result<bool> {
            let mut leases = self.leases.lock().unwrap();
            leases.insert(lease.lease_id, lease);
            Ok(true)
        }

        async fn renew_task_lease(&self, lease_id: LeaseId, ttl_ms: u64) -> Result<bool> {
            let mut leases = self.leases.lock().unwrap();
            if let Some(lease) = leases.get_mut(&lease_id) {
                lease.renew(chrono::Duration::milliseconds(ttl_ms as i64));
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn release_task_lease(&self, lease_id: LeaseId) -> Result<()> {
            self.leases.lock().unwrap().remove(&lease_id);
            Ok(())
        }

        async fn get_task_lease(&self, _id: PipelineId, stage: &str, task_index: usize) -> Result<Option<TaskLease>> {
            Ok(self
                .leases
                .lock()
                .unwrap()
                .values()
                .find(|l| l.stage_name.as_str() == stage && l.task_index.value() == task_index)
                .cloned())
        }

        async fn mark_pipeline_cancelled(&self, id: PipelineId, reason: &str) -> Result<()> {
            if let Some(record) = self.pipelines.lock().unwrap().get_mut(&id) {
                record.cancellation = Some(orchestrator_domain::entities::CancellationInfo { reason: reason.to_string(), at: Utc::now() });
                record.status = PipelineStatus::Cancelled;
            }
            Ok(())
        }

        async fn is_pipeline_cancelled(&self, id: PipelineId) -> Result<bool> {
            Ok(self.pipelines.lock().unwrap().get(&id).map(|r| r.is_cancelled()).unwrap_or(false))
        }

        async fn snapshot_context(&self, _id: PipelineId, _context: Value) -> Result<()> {
            Ok(())
        }

        async fn load_context(&self, _id: PipelineId) -> Result<Option<Value>> {
            Ok(None)
        }

        async fn list_running_pipelines(&self) -> Result<Vec<PipelineId>> {
            Ok(self
                .pipelines
                .lock()
                .unwrap()
                .values()
                .filter(|r| !r.status.is_terminal())
                .map(|r| r.id)
                .collect())
        }

        async fn list_task_attempts(&self, _id: PipelineId, _stage: &str) -> Result<Vec<TaskAttemptRecord>> {
            Ok(Vec::new())
        }

        async fn get_pending_tasks(&self, id: PipelineId, stage: &str) -> Result<Vec<TaskAttemptRecord>> {
            Ok(self
                .attempts
                .lock()
                .unwrap()
                .iter()
                .filter(|((attempt_id, attempt_stage, _), a)| {
                    *attempt_id == id
                        && attempt_stage == stage
                        && matches!(a.status, orchestrator_domain::TaskStatus::Queued | orchestrator_domain::TaskStatus::Leased)
                })
                .map(|(_, a)| a.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        enqueued: Mutex<Vec<(String, PipelineMessage)>>,
    }

    #[async_trait]
    impl MessageQueueAdapter for FakeQueue {
        async fn enqueue(&self, queue_name: &str, message: PipelineMessage, _priority: Priority) -> Result<()> {
            self.enqueued.lock().unwrap().push((queue_name.to_string(), message));
            Ok(())
        }

        async fn enqueue_delayed(&self, queue_name: &str, message: PipelineMessage, _delay_ms: u64) -> Result<()> {
            self.enqueued.lock().unwrap().push((queue_name.to_string(), message));
            Ok(())
        }

        async fn register_worker(
            self: Arc<Self>,
            _queue_name: &str,
            _concurrency: usize,
            _handler: MessageHandler,
        ) -> Result<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>> {
            Ok(Box::pin(async {}))
        }

        async fn dead_letter(&self, queue_name: &str, message: PipelineMessage) -> Result<()> {
            self.enqueued.lock().unwrap().push((queue_name.to_string(), message));
            Ok(())
        }

        async fn list_dead_letter(&self, _queue_name: &str, _limit: usize) -> Result<Vec<PipelineMessage>> {
            Ok(Vec::new())
        }
    }

    fn stage(name: &str, mode: ExecutionMode, depends_on: Vec<&str>) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            mode,
            actor: ActorRef::Literal("Echo".to_string()),
            input: Default::default(),
            input_expr: None,
            scatter: None,
            gather: None,
            broadcast: None,
            fork_join: None,
            when: None,
            depends_on: depends_on.into_iter().map(String::from).collect(),
            retry: None,
            compensation: None,
            circuit_breaker: None,
            dead_letter_queue: None,
            lease_ttl_ms: None,
            concurrency: None,
        }
    }

    fn service() -> (OrchestratorService, Arc<FakeQueue>) {
        let store: Arc<dyn StateStore> = Arc::new(FakeStore::default());
        let queue = Arc::new(FakeQueue::default());
        let service = OrchestratorService::new(store, queue.clone() as Arc<dyn MessageQueueAdapter>, OrchestratorSettings::default());
        (service, queue)
    }

    #[tokio::test]
    async fn submit_dispatches_the_first_ready_stage() {
        let (service, queue) = service();
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("a", ExecutionMode::Single, vec![]), stage("b", ExecutionMode::Single, vec!["a"])],
        };
        service.submit(definition, Value::Null).await.unwrap();

        let enqueued = queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].1.payload.stage_name.as_str(), "a");
    }

    #[tokio::test]
    async fn when_guard_false_skips_the_stage_without_dispatch() {
        let (service, queue) = service();
        let mut guarded = stage("a", ExecutionMode::Single, vec![]);
        guarded.when = Some("`false`".to_string());
        let definition = PipelineDefinition { name: "demo".to_string(), description: None, version: None, stages: vec![guarded] };
        let id = service.submit(definition, Value::Null).await.unwrap();

        assert!(queue.enqueued.lock().unwrap().is_empty());
        let aggregate = service.load_aggregate(id).await.unwrap();
        assert_eq!(aggregate.stage("a").unwrap().status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn success_result_advances_the_frontier_to_the_next_stage() {
        let (service, queue) = service();
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("a", ExecutionMode::Single, vec![]), stage("b", ExecutionMode::Single, vec!["a"])],
        };
        let id = service.submit(definition, Value::Null).await.unwrap();

        let payload = {
            let enqueued = queue.enqueued.lock().unwrap();
            enqueued[0].1.payload.clone()
        };
        let result = PipelineMessage::result("worker-1", "orchestrator", MessagePayload { output: Some(Value::Bool(true)), ..payload });
        service.handle_result(result).await.unwrap();

        let enqueued = queue.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 2);
        assert_eq!(enqueued[1].1.payload.stage_name.as_str(), "b");
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_completes() {
        let (service, queue) = service();
        let mut retried = stage("a", ExecutionMode::Single, vec![]);
        retried.retry = Some(orchestrator_domain::RetryPolicy {
            max_attempts: 2,
            backoff: orchestrator_domain::value_objects::BackoffKind::Fixed,
            backoff_delay_ms: 10,
            max_backoff_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        });
        let definition = PipelineDefinition { name: "demo".to_string(), description: None, version: None, stages: vec![retried] };
        let id = service.submit(definition, Value::Null).await.unwrap();

        let first_attempt_payload = {
            let enqueued = queue.enqueued.lock().unwrap();
            assert_eq!(enqueued.len(), 1);
            enqueued[0].1.payload.clone()
        };
        assert_eq!(first_attempt_payload.attempt, 1);

        let failure = PipelineMessage::failure(
            "worker-1",
            "orchestrator",
            MessagePayload { error: Some("boom".to_string()), ..first_attempt_payload },
        );
        service.handle_result(failure).await.unwrap();

        let retry_payload = {
            let enqueued = queue.enqueued.lock().unwrap();
            assert_eq!(enqueued.len(), 2, "the retried attempt should be re-enqueued, not dead-lettered");
            enqueued[1].1.payload.clone()
        };
        assert_eq!(retry_payload.attempt, 2);

        let success = PipelineMessage::result(
            "worker-1",
            "orchestrator",
            MessagePayload { output: Some(Value::Bool(true)), ..retry_payload },
        );
        service.handle_result(success).await.unwrap();

        let aggregate = service.load_aggregate(id).await.unwrap();
        assert_eq!(aggregate.stage("a").unwrap().status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_and_run_compensation() {
        let (service, queue) = service();
        let mut upstream = stage("a", ExecutionMode::Single, vec![]);
        upstream.compensation = Some(orchestrator_domain::entities::CompensationSpec { actor: "Undo".to_string(), input: Default::default() });
        let mut fails_once = stage("b", ExecutionMode::Single, vec!["a"]);
        fails_once.retry = Some(orchestrator_domain::RetryPolicy {
            max_attempts: 1,
            backoff: orchestrator_domain::value_objects::BackoffKind::Fixed,
            backoff_delay_ms: 10,
            max_backoff_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        });
        let definition =
            PipelineDefinition { name: "demo".to_string(), description: None, version: None, stages: vec![upstream, fails_once] };
        let id = service.submit(definition, Value::Null).await.unwrap();

        let a_payload = {
            let enqueued = queue.enqueued.lock().unwrap();
            enqueued[0].1.payload.clone()
        };
        let a_success = PipelineMessage::result("worker-1", "orchestrator", MessagePayload { output: Some(Value::Bool(true)), ..a_payload });
        service.handle_result(a_success).await.unwrap();

        let b_payload = {
            let enqueued = queue.enqueued.lock().unwrap();
            enqueued.iter().find(|(_, m)| m.payload.stage_name.as_str() == "b").unwrap().1.payload.clone()
        };
        let b_failure = PipelineMessage::failure("worker-1", "orchestrator", MessagePayload { error: Some("fatal".to_string()), ..b_payload });
        service.handle_result(b_failure).await.unwrap();

        let enqueued = queue.enqueued.lock().unwrap();
        assert!(
            enqueued.iter().any(|(queue_name, _)| queue_name.contains("dead-letter") || queue_name.contains("dlq")),
            "a fatally failed task must produce a dead-letter entry"
        );
        assert!(
            enqueued.iter().any(|(_, m)| m.payload.actor_type == "Undo"),
            "the completed upstream stage's compensation actor must be invoked on pipeline failure"
        );

        let aggregate = service.load_aggregate(id).await.unwrap();
        assert_eq!(aggregate.stage("b").unwrap().status, StageStatus::Failed);
    }
}
