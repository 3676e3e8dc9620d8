// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Redis-backed [`StateStore`]. Every operation maps either onto one Redis
//! command or one of the Lua scripts in [`super::scripts`], so the "atomic
//! unit" contract holds without a client-side transaction.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use orchestrator_domain::{
    LeaseId, OrchestratorError, PipelineDefinition, PipelineId, PipelineRecord, PipelineStatus, PipelineStatusPatch,
    StageName, StagePatch, StageRecord, StageStatus, TaskAttemptRecord, TaskLease, Value,
};
use orchestrator_domain::repositories::StateStore;

use super::connection::RedisConnection;
use super::keys;
use super::scripts;

pub struct RedisStateStore {
    conn: RedisConnection,
}

impl RedisStateStore {
    pub fn new(conn: RedisConnection) -> Self {
        Self { conn }
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.conn.manager.clone()
    }
}

fn transient(e: redis::RedisError) -> OrchestratorError {
    OrchestratorError::StorageTransient(e.to_string())
}

fn serialize<T: Serialize>(value: &T) -> Result<String, OrchestratorError> {
    serde_json::to_string(value).map_err(OrchestratorError::from)
}

fn deserialize<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, OrchestratorError> {
    serde_json::from_str(raw).map_err(OrchestratorError::from)
}

/// The record stored under `lease:by-id:<id>` and at the stage/task
/// position key. Carries the pipeline id the domain's [`TaskLease`] does
/// not, so a renew/release by lease id alone (per the port contract) can
/// still reconstruct the positional key inside the Lua script.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    lease_id: LeaseId,
    pipeline_id: PipelineId,
    stage_name: String,
    task_index: usize,
    worker_id: String,
    acquired_at: chrono::DateTime<Utc>,
    expires_at_ms: i64,
}

impl LeaseRecord {
    fn from_domain(id: PipelineId, lease: &TaskLease) -> Self {
        Self {
            lease_id: lease.lease_id,
            pipeline_id: id,
            stage_name: lease.stage_name.as_str().to_string(),
            task_index: lease.task_index.value(),
            worker_id: lease.worker_id.clone(),
            acquired_at: lease.acquired_at,
            expires_at_ms: lease.expires_at.timestamp_millis(),
        }
    }

    fn into_domain(self) -> TaskLease {
        TaskLease {
            lease_id: self.lease_id,
            stage_name: StageName::new(self.stage_name),
            task_index: self.task_index.into(),
            worker_id: self.worker_id,
            acquired_at: self.acquired_at,
            expires_at: chrono::DateTime::from_timestamp_millis(self.expires_at_ms).unwrap_or_else(Utc::now),
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    #[instrument(skip(self, definition, trigger))]
    async fn create_pipeline(&self, id: PipelineId, definition: PipelineDefinition, trigger: Value) -> orchestrator_domain::error::Result<PipelineRecord> {
        let record = PipelineRecord::new(id, definition, trigger);
        let payload = serialize(&record)?;
        let created: bool = scripts::CREATE_PIPELINE
            .key(keys::pipeline_record(id))
            .arg(payload)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        if !created {
            return Err(OrchestratorError::InvalidPipeline(format!("pipeline {id} already exists")));
        }
        let _: () = self.conn().sadd(keys::RUNNING_PIPELINES, id.to_string()).await.map_err(transient)?;
        Ok(record)
    }

    #[instrument(skip(self, patch))]
    async fn set_pipeline_status(&self, id: PipelineId, status: PipelineStatus, patch: PipelineStatusPatch) -> orchestrator_domain::error::Result<()> {
        let status_str = serde_json::to_value(status).map_err(OrchestratorError::from)?;
        let status_str = status_str.as_str().unwrap_or_default().to_string();
        let cursor_arg = patch.resume_cursor.map(|c| c.to_string()).unwrap_or_default();

        let applied: bool = scripts::SET_PIPELINE_STATUS
            .key(keys::pipeline_record(id))
            .arg(status_str)
            .arg(cursor_arg)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;

        if applied && status.is_terminal() {
            let _: () = self.conn().srem(keys::RUNNING_PIPELINES, id.to_string()).await.map_err(transient)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_pipeline(&self, id: PipelineId) -> orchestrator_domain::error::Result<Option<PipelineRecord>> {
        let raw: Option<String> = self.conn().get(keys::pipeline_record(id)).await.map_err(transient)?;
        raw.as_deref().map(deserialize).transpose()
    }

    #[instrument(skip(self, patch))]
    async fn upsert_stage(&self, id: PipelineId, stage: &str, patch: StagePatch) -> orchestrator_domain::error::Result<StageRecord> {
        let status_arg = patch
            .status
            .map(|s| serde_json::to_value(s).map(|v| v.as_str().unwrap_or_default().to_string()))
            .transpose()
            .map_err(OrchestratorError::from)?
            .unwrap_or_default();
        let task_count_arg = patch.task_count.map(|c| c.to_string()).unwrap_or_default();
        let completed_count_arg = patch.completed_count.map(|c| c.to_string()).unwrap_or_default();
        let completed_at_arg = patch.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        let default_record = serialize(&StageRecord::pending(stage))?;

        let encoded: String = scripts::UPSERT_STAGE
            .key(keys::stage(id, stage))
            .arg(status_arg)
            .arg(task_count_arg)
            .arg(completed_count_arg)
            .arg(default_record)
            .arg(completed_at_arg)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;

        deserialize(&encoded)
    }

    #[instrument(skip(self))]
    async fn get_stage(&self, id: PipelineId, stage: &str) -> orchestrator_domain::error::Result<Option<StageRecord>> {
        let raw: Option<String> = self.conn().get(keys::stage(id, stage)).await.map_err(transient)?;
        raw.as_deref().map(deserialize).transpose()
    }

    #[instrument(skip(self))]
    async fn update_stage_progress(&self, id: PipelineId, stage: &str, completed_delta: usize) -> orchestrator_domain::error::Result<usize> {
        let total: usize = scripts::INCREMENT_STAGE_PROGRESS
            .key(keys::stage(id, stage))
            .arg(completed_delta)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        Ok(total)
    }

    #[instrument(skip(self, attempt))]
    async fn record_task_attempt(&self, id: PipelineId, attempt: TaskAttemptRecord) -> orchestrator_domain::error::Result<()> {
        let stage = attempt.stage_name.clone();
        let seen_key = keys::stage_attempts_seen(
            id,
            &stage,
            attempt.task_index,
            attempt.attempt,
            &serde_json::to_value(attempt.status).map_err(OrchestratorError::from)?.as_str().unwrap_or_default().to_string(),
        );
        let payload = serialize(&attempt)?;

        let _: i64 = scripts::RECORD_TASK_ATTEMPT
            .key(seen_key)
            .key(keys::stage_attempts(id, &stage))
            .arg(payload)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self, output))]
    async fn append_stage_output(&self, id: PipelineId, stage: &str, task_index: usize, output: Value) -> orchestrator_domain::error::Result<()> {
        let payload = serialize(&output)?;
        let _: () = self
            .conn()
            .hset(keys::stage_outputs(id, stage), task_index, payload)
            .await
            .map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_stage_outputs(&self, id: PipelineId, stage: &str) -> orchestrator_domain::error::Result<Vec<Option<Value>>> {
        let raw: std::collections::HashMap<usize, String> =
            self.conn().hgetall(keys::stage_outputs(id, stage)).await.map_err(transient)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let max_index = raw.keys().copied().max().unwrap_or(0);
        let mut outputs = vec![None; max_index + 1];
        for (index, payload) in raw {
            outputs[index] = Some(deserialize(&payload)?);
        }
        Ok(outputs)
    }

    #[instrument(skip(self))]
    async fn clear_stage_outputs(&self, id: PipelineId, stage: &str) -> orchestrator_domain::error::Result<()> {
        let _: () = self.conn().del(keys::stage_outputs(id, stage)).await.map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self, lease))]
    async fn acquire_task_lease(&self, id: PipelineId, lease: TaskLease) -> orchestrator_domain::error::Result<bool> {
        let record = LeaseRecord::from_domain(id, &lease);
        let position_key = keys::task_lease(id, lease.stage_name.as_str(), lease.task_index.value());
        let by_id_key = keys::lease_by_id(lease.lease_id);
        let payload = serialize(&record)?;
        let now_ms = Utc::now().timestamp_millis();
        let ttl_ms = (record.expires_at_ms - now_ms).max(1);

        let acquired: bool = scripts::ACQUIRE_LEASE
            .key(position_key)
            .key(by_id_key)
            .arg(payload)
            .arg(lease.lease_id.to_string())
            .arg(now_ms)
            .arg(ttl_ms)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        Ok(acquired)
    }

    #[instrument(skip(self))]
    async fn renew_task_lease(&self, lease_id: LeaseId, ttl_ms: u64) -> orchestrator_domain::error::Result<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let renewed: bool = scripts::RENEW_LEASE
            .key(keys::lease_by_id(lease_id))
            .arg(lease_id.to_string())
            .arg(now_ms)
            .arg(ttl_ms)
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        Ok(renewed)
    }

    #[instrument(skip(self))]
    async fn release_task_lease(&self, lease_id: LeaseId) -> orchestrator_domain::error::Result<()> {
        let _: bool = scripts::RELEASE_LEASE
            .key(keys::lease_by_id(lease_id))
            .arg(lease_id.to_string())
            .invoke_async(&mut self.conn())
            .await
            .map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_task_lease(&self, id: PipelineId, stage: &str, task_index: usize) -> orchestrator_domain::error::Result<Option<TaskLease>> {
        let raw: Option<String> = self.conn().get(keys::task_lease(id, stage, task_index)).await.map_err(transient)?;
        raw.as_deref().map(|s| deserialize::<LeaseRecord>(s).map(LeaseRecord::into_domain)).transpose()
    }

    #[instrument(skip(self))]
    async fn mark_pipeline_cancelled(&self, id: PipelineId, reason: &str) -> orchestrator_domain::error::Result<()> {
        let _: () = self.conn().set(keys::cancel(id), reason).await.map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_pipeline_cancelled(&self, id: PipelineId) -> orchestrator_domain::error::Result<bool> {
        let exists: bool = self.conn().exists(keys::cancel(id)).await.map_err(transient)?;
        Ok(exists)
    }

    #[instrument(skip(self, context))]
    async fn snapshot_context(&self, id: PipelineId, context: Value) -> orchestrator_domain::error::Result<()> {
        let payload = serialize(&context)?;
        let _: () = self.conn().set(keys::context(id), payload).await.map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_context(&self, id: PipelineId) -> orchestrator_domain::error::Result<Option<Value>> {
        let raw: Option<String> = self.conn().get(keys::context(id)).await.map_err(transient)?;
        raw.as_deref().map(deserialize).transpose()
    }

    #[instrument(skip(self))]
    async fn list_running_pipelines(&self) -> orchestrator_domain::error::Result<Vec<PipelineId>> {
        let raw: Vec<String> = self.conn().smembers(keys::RUNNING_PIPELINES).await.map_err(transient)?;
        raw.into_iter()
            .map(|s| s.parse().map_err(|_| OrchestratorError::StorageTransient(format!("corrupt pipeline id: {s}"))))
            .collect()
    }

    #[instrument(skip(self))]
    async fn list_task_attempts(&self, id: PipelineId, stage: &str) -> orchestrator_domain::error::Result<Vec<TaskAttemptRecord>> {
        let raw: Vec<String> = self.conn().lrange(keys::stage_attempts(id, stage), 0, -1).await.map_err(transient)?;
        raw.iter().map(|s| deserialize(s)).collect()
    }

    #[instrument(skip(self))]
    async fn get_pending_tasks(&self, id: PipelineId, stage: &str) -> orchestrator_domain::error::Result<Vec<TaskAttemptRecord>> {
        let all = self.list_task_attempts(id, stage).await?;
        let mut latest_by_index: std::collections::BTreeMap<usize, TaskAttemptRecord> = std::collections::BTreeMap::new();
        for attempt in all {
            latest_by_index.insert(attempt.task_index, attempt);
        }
        Ok(latest_by_index
            .into_values()
            .filter(|a| matches!(a.status, orchestrator_domain::TaskStatus::Queued | orchestrator_domain::TaskStatus::Leased))
            .collect())
    }
}
