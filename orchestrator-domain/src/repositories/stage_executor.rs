// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Executor Interface
//!
//! One implementation per [`crate::entities::ExecutionMode`] (single,
//! scatter, gather, broadcast, fork-join). Each exposes two pure
//! operations: `plan` turns a stage definition and its evaluation context
//! into an ordered task list, and `on_task_result` folds one task's output
//! into the stage's running state, reporting whether the stage's barrier
//! is now satisfied.
//!
//! Implementations hold no state of their own — all state lives in the
//! `StageRecord` the caller threads through `on_task_result`. This keeps
//! executors trivially testable and lets the orchestrator swap in a
//! different executor per mode without touching ledger plumbing.

use async_trait::async_trait;

use crate::entities::{StageDefinition, StageRecord};
use crate::error::Result;
use crate::value_objects::Value;

/// One task an executor wants dispatched, in emission order. `task_index`
/// is assigned by the executor and never reassigned; downstream readers
/// depend on outputs being positioned by this index rather than arrival
/// order.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub task_index: usize,
    pub input: Value,
    pub actor_type: String,
}

/// The result of folding a task output into a stage's running state.
#[derive(Debug, Clone)]
pub struct StageExecutorOutcome {
    pub finished: bool,
    /// Present only when `finished` and the executor has a single
    /// combined value to hand downstream stages (gather's `concat`/
    /// `object` combine modes); `None` means downstream readers should
    /// read the stage's per-task output list directly.
    pub aggregated_output: Option<Value>,
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Produces the ordered task list for a stage about to start running,
    /// resolved against `context` (which exposes `trigger`, `stages`, and,
    /// for scatter, the per-element `item`/`as` binding).
    ///
    /// Gather is the one mode that may legitimately return an empty task
    /// list and `finished: false`-equivalent signal when its upstream
    /// barrier has not yet been satisfied — callers must re-invoke `plan`
    /// once new upstream outputs arrive.
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>>;

    /// Folds one task's output into `stage_state`, mutating it in place,
    /// and reports whether the stage's barrier condition is now met.
    fn on_task_result(&self, stage_state: &mut StageRecord, task_index: usize, output: Value) -> StageExecutorOutcome;
}
