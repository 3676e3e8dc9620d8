// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A single task attempt within a stage, persisted at
//! `pipeline:<id>:task:<stage>:<index>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Leased,
    Succeeded,
    /// Failed but still retryable; a new attempt will be enqueued after
    /// the policy's backoff delay.
    Retrying,
    /// Failed and exhausted retries, or failed with a non-retryable error;
    /// routed to the stage's dead-letter queue.
    DeadLettered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskErrorRecord {
    pub message: String,
    pub retryable: bool,
    pub at: DateTime<Utc>,
}

/// The durable record of one task's attempt history. `attempt` is 1-based
/// and incremented each time the task is re-enqueued after a retryable
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAttemptRecord {
    pub stage_name: String,
    pub task_index: usize,
    pub status: TaskStatus,
    pub attempt: u32,
    pub input: Value,
    pub output: Option<Value>,
    pub errors: Vec<TaskErrorRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskAttemptRecord {
    pub fn new(stage_name: impl Into<String>, task_index: usize, input: Value) -> Self {
        let now = Utc::now();
        Self {
            stage_name: stage_name.into(),
            task_index,
            status: TaskStatus::Queued,
            attempt: 1,
            input,
            output: None,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_leased(&mut self) {
        self.status = TaskStatus::Leased;
        self.updated_at = Utc::now();
    }

    pub fn mark_succeeded(&mut self, output: Value) {
        self.status = TaskStatus::Succeeded;
        self.output = Some(output);
        self.updated_at = Utc::now();
    }

    /// Records a failed attempt. The caller decides, via the stage's retry
    /// policy, whether to transition to `Retrying` (and re-enqueue after a
    /// delay) or `DeadLettered`.
    pub fn record_failure(&mut self, message: impl Into<String>, retryable: bool, will_retry: bool) {
        self.errors.push(TaskErrorRecord { message: message.into(), retryable, at: Utc::now() });
        self.status = if will_retry { TaskStatus::Retrying } else { TaskStatus::DeadLettered };
        self.updated_at = Utc::now();
    }

    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.status = TaskStatus::Queued;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_without_retry_dead_letters() {
        let mut task = TaskAttemptRecord::new("detect", 0, Value::Null);
        task.record_failure("boom", true, false);
        assert_eq!(task.status, TaskStatus::DeadLettered);
        assert_eq!(task.errors.len(), 1);
    }

    #[test]
    fn retry_increments_attempt_and_resets_to_queued() {
        let mut task = TaskAttemptRecord::new("detect", 0, Value::Null);
        task.record_failure("transient", true, true);
        assert_eq!(task.status, TaskStatus::Retrying);
        task.next_attempt();
        assert_eq!(task.attempt, 2);
        assert_eq!(task.status, TaskStatus::Queued);
    }
}
