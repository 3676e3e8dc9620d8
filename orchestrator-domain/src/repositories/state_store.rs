// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The durable ledger port. Every operation here is a single atomic unit on
//! the underlying store — the orchestrator never assumes atomicity across
//! an `.await`, only within one of these calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    PipelineDefinition, PipelineRecord, PipelineStatus, StageRecord, StageStatus, TaskAttemptRecord, TaskLease,
};
use crate::error::Result;
use crate::value_objects::{LeaseId, PipelineId, Value};

/// A patch to `PipelineRecord`'s mutable fields, applied by
/// [`StateStore::set_pipeline_status`].
#[derive(Debug, Clone, Default)]
pub struct PipelineStatusPatch {
    pub resume_cursor: Option<usize>,
}

/// A merge patch for [`StateStore::upsert_stage`]; `None` fields leave the
/// existing value untouched.
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    pub status: Option<StageStatus>,
    pub task_count: Option<usize>,
    pub completed_count: Option<usize>,
    /// Set alongside a terminal `status` so compensation ordering (§4.5
    /// responsibility 5) can recover true completion order across a
    /// `StateStore` reload, not just within one in-memory aggregate.
    pub completed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fails if `id` already has a record — pipeline creation is not
    /// idempotent by id reuse.
    async fn create_pipeline(&self, id: PipelineId, definition: PipelineDefinition, trigger: Value) -> Result<PipelineRecord>;

    /// Last-writer-wins, except that a status already terminal can never
    /// move to a different status.
    async fn set_pipeline_status(&self, id: PipelineId, status: PipelineStatus, patch: PipelineStatusPatch) -> Result<()>;

    async fn get_pipeline(&self, id: PipelineId) -> Result<Option<PipelineRecord>>;

    /// Merge-upserts a stage's ledger entry.
    async fn upsert_stage(&self, id: PipelineId, stage: &str, patch: StagePatch) -> Result<StageRecord>;

    async fn get_stage(&self, id: PipelineId, stage: &str) -> Result<Option<StageRecord>>;

    /// Atomically increments the stage's completed-task counter and
    /// returns the post-increment count.
    async fn update_stage_progress(&self, id: PipelineId, stage: &str, completed_delta: usize) -> Result<usize>;

    /// Appends one entry to the per-stage attempt ledger. Must be
    /// idempotent when `(stage, task_index, attempt, status)` repeats.
    async fn record_task_attempt(&self, id: PipelineId, attempt: TaskAttemptRecord) -> Result<()>;

    async fn append_stage_output(&self, id: PipelineId, stage: &str, task_index: usize, output: Value) -> Result<()>;

    async fn get_stage_outputs(&self, id: PipelineId, stage: &str) -> Result<Vec<Option<Value>>>;

    async fn clear_stage_outputs(&self, id: PipelineId, stage: &str) -> Result<()>;

    /// Succeeds iff there is no live lease, or the live lease's id matches
    /// `lease.lease_id` (re-acquisition by the current holder).
    async fn acquire_task_lease(&self, id: PipelineId, lease: TaskLease) -> Result<bool>;

    /// Renews iff `lease_id` matches the current holder; returns `false`
    /// if the lease was stolen or already expired.
    async fn renew_task_lease(&self, lease_id: LeaseId, ttl_ms: u64) -> Result<bool>;

    /// Releases iff `lease_id` matches the current holder. Releasing an
    /// absent or mismatched lease is a no-op, not an error.
    async fn release_task_lease(&self, lease_id: LeaseId) -> Result<()>;

    async fn get_task_lease(&self, id: PipelineId, stage: &str, task_index: usize) -> Result<Option<TaskLease>>;

    async fn mark_pipeline_cancelled(&self, id: PipelineId, reason: &str) -> Result<()>;

    async fn is_pipeline_cancelled(&self, id: PipelineId) -> Result<bool>;

    /// Stores an opaque evaluation-context snapshot for resume.
    async fn snapshot_context(&self, id: PipelineId, context: Value) -> Result<()>;

    async fn load_context(&self, id: PipelineId) -> Result<Option<Value>>;

    /// Every pipeline not yet in a terminal status — the resume loop's
    /// entry point.
    async fn list_running_pipelines(&self) -> Result<Vec<PipelineId>>;

    async fn list_task_attempts(&self, id: PipelineId, stage: &str) -> Result<Vec<TaskAttemptRecord>>;

    /// Tasks still `queued` or `running` — used both by resume and by the
    /// scatter executor's `max_parallel` admission check.
    async fn get_pending_tasks(&self, id: PipelineId, stage: &str) -> Result<Vec<TaskAttemptRecord>>;
}
