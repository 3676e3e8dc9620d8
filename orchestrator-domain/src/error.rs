// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Error kinds surfaced by the orchestration core.
//!
//! Recovery is local wherever possible (retries, alternative leases);
//! everything that cannot be recovered becomes a fatal pipeline transition.

use crate::value_objects::{PipelineId, StageName};

/// Errors surfaced anywhere in the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A structural problem with a pipeline definition (cycle, undefined
    /// reference, mode with a missing descriptor). Fatal at submission.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A task's resolved actor has no registered worker. Fatal for the task;
    /// retries do not help.
    #[error("no actor registered for type '{0}'")]
    ActorUnknown(String),

    /// The actor raised while processing a task. Subject to the stage's
    /// retry policy.
    #[error("task failed in stage '{stage}': {message}")]
    TaskFailed {
        stage: StageName,
        message: String,
        retryable: bool,
    },

    /// A gather barrier was not satisfied before its configured timeout.
    #[error("gather stage '{0}' timed out waiting on its barrier")]
    GatherTimeout(StageName),

    /// Enqueue refused because a circuit breaker is open for the actor type.
    #[error("circuit open for actor '{0}'")]
    CircuitOpen(String),

    /// The pipeline was cancelled; the caller must suppress output.
    #[error("pipeline '{0}' was cancelled")]
    PipelineCancelled(PipelineId),

    /// A worker's lease renewal failed; it must abort without publishing.
    #[error("lease lost for task {stage}[{task_index}]")]
    LeaseLost { stage: StageName, task_index: usize },

    /// A pipeline, stage, or task referenced by id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying store reported a transient fault; retry with backoff.
    #[error("storage transient error: {0}")]
    StorageTransient(String),

    /// The underlying queue reported a transient fault; retry with backoff.
    #[error("queue transient error: {0}")]
    QueueTransient(String),

    /// An expression failed to parse or evaluate.
    #[error("expression error: {0}")]
    Expression(String),

    /// Failure to (de)serialize a domain value.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<crate::services::DagError> for OrchestratorError {
    fn from(err: crate::services::DagError) -> Self {
        OrchestratorError::InvalidPipeline(err.to_string())
    }
}

impl OrchestratorError {
    /// Whether retrying the operation that produced this error might help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::StorageTransient(_) | OrchestratorError::QueueTransient(_) | OrchestratorError::CircuitOpen(_)
        ) || matches!(self, OrchestratorError::TaskFailed { retryable, .. } if *retryable)
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
