// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The live pipeline instance record, persisted at `pipeline:<id>:record`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pipeline_definition::PipelineDefinition;
use crate::value_objects::{PipelineId, Value};

/// Terminal and non-terminal pipeline states. Once a status reaches a
/// terminal variant it may never move to another status (invariant 6's
/// cancellation rule is a special case of this more general one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineStatus::Running)
    }
}

/// The live instance of a submitted [`PipelineDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub definition: PipelineDefinition,
    pub trigger: Value,
    pub status: PipelineStatus,
    /// Stages currently ready-or-running: the frontier the scheduler acts
    /// on next.
    pub frontier: BTreeSet<String>,
    pub active_stages: BTreeSet<String>,
    pub stage_order: Vec<String>,
    /// Index into `stage_order` the resume loop last made progress past;
    /// purely an optimization hint, not a correctness requirement, since
    /// resume always reconstructs the frontier from stage records.
    pub resume_cursor: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancellation: Option<CancellationInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub reason: String,
    pub at: DateTime<Utc>,
}

impl PipelineRecord {
    pub fn new(id: PipelineId, definition: PipelineDefinition, trigger: Value) -> Self {
        let stage_order = definition.stages.iter().map(|s| s.name.clone()).collect();
        let now = Utc::now();
        Self {
            id,
            definition,
            trigger,
            status: PipelineStatus::Running,
            frontier: BTreeSet::new(),
            active_stages: BTreeSet::new(),
            stage_order,
            resume_cursor: 0,
            created_at: now,
            updated_at: now,
            cancellation: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }
}
