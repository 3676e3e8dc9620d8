// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-stage ledger entry, persisted at `pipeline:<id>:stage:<name>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Ready,
    Running,
    /// A gather stage waiting on predecessor outputs; distinct from
    /// `Running` so the scheduler doesn't mistake a barrier wait for an
    /// active task.
    Waiting,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed | StageStatus::Skipped)
    }
}

/// The outputs and status of one DAG node. `outputs` holds one [`Value`] per
/// completed task index; for a `single` stage this is always a one-element
/// vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub task_count: usize,
    pub completed_count: usize,
    pub outputs: Vec<Option<Value>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            task_count: 0,
            completed_count: 0,
            outputs: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self, task_count: usize) {
        self.status = StageStatus::Running;
        self.task_count = task_count;
        self.outputs = vec![None; task_count];
        self.started_at = Some(Utc::now());
    }

    /// Records a task's output and returns whether every expected output
    /// has now arrived.
    pub fn record_output(&mut self, task_index: usize, value: Value) -> bool {
        if let Some(slot) = self.outputs.get_mut(task_index) {
            if slot.is_none() {
                self.completed_count += 1;
            }
            *slot = Some(value);
        }
        self.completed_count >= self.task_count
    }

    pub fn finish(&mut self, status: StageStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Collects every recorded output in task-index order, skipping tasks
    /// that never produced one (used by `any`/`count:N` gather conditions).
    pub fn collected_outputs(&self) -> Vec<&Value> {
        self.outputs.iter().filter_map(|o| o.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_output_reports_completion() {
        let mut stage = StageRecord::pending("scatter-detect");
        stage.start(3);
        assert!(!stage.record_output(0, Value::Number(1.0)));
        assert!(!stage.record_output(1, Value::Number(2.0)));
        assert!(stage.record_output(2, Value::Number(3.0)));
        assert_eq!(stage.collected_outputs().len(), 3);
    }

    #[test]
    fn re_recording_same_index_does_not_double_count() {
        let mut stage = StageRecord::pending("echo");
        stage.start(1);
        assert!(stage.record_output(0, Value::Bool(true)));
        assert!(stage.record_output(0, Value::Bool(false)));
        assert_eq!(stage.completed_count, 1);
    }
}
