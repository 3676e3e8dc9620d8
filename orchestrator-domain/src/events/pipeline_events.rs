// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The event vocabulary a [`crate::aggregates::PipelineAggregate`] raises as
//! it drives a pipeline's frontier. Each variant mirrors a ledger write the
//! state store must persist; the orchestrator dispatches queue messages
//! only after the corresponding event has been committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::PipelineStatus;
use crate::value_objects::{PipelineId, StageName, TaskIndex, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineCreated { pipeline_id: PipelineId, at: DateTime<Utc> },
    StagePlanned { pipeline_id: PipelineId, stage: StageName, task_count: usize },
    StageSkipped { pipeline_id: PipelineId, stage: StageName },
    TaskOutputRecorded { pipeline_id: PipelineId, stage: StageName, task_index: TaskIndex, output: Value },
    StageCompleted { pipeline_id: PipelineId, stage: StageName },
    StageFailed { pipeline_id: PipelineId, stage: StageName, message: String },
    PipelineStatusChanged { pipeline_id: PipelineId, status: PipelineStatus },
    PipelineCancelled { pipeline_id: PipelineId, reason: String },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> PipelineId {
        match self {
            PipelineEvent::PipelineCreated { pipeline_id, .. }
            | PipelineEvent::StagePlanned { pipeline_id, .. }
            | PipelineEvent::StageSkipped { pipeline_id, .. }
            | PipelineEvent::TaskOutputRecorded { pipeline_id, .. }
            | PipelineEvent::StageCompleted { pipeline_id, .. }
            | PipelineEvent::StageFailed { pipeline_id, .. }
            | PipelineEvent::PipelineStatusChanged { pipeline_id, .. }
            | PipelineEvent::PipelineCancelled { pipeline_id, .. } => *pipeline_id,
        }
    }
}
