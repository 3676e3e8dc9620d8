// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `broadcast` mode: one task per listed actor, all receiving the same
//! resolved input. `waitForAll = false` completes the stage on the first
//! result; later results are still recorded (they may be read downstream
//! through the stage's output list) but no longer gate the frontier —
//! that non-gating behavior is the orchestrator's to honor once
//! `finished` comes back `true` on the first call.

use async_trait::async_trait;

use orchestrator_domain::entities::{StageDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::{PlannedTask, StageExecutor, StageExecutorOutcome};
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;
use orchestrator_domain::OrchestratorError;

use super::common::resolve_input;

pub struct BroadcastExecutor {
    cache: ExpressionCache,
}

impl BroadcastExecutor {
    pub fn new() -> Self {
        Self { cache: ExpressionCache::new() }
    }
}

impl Default for BroadcastExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for BroadcastExecutor {
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>> {
        let spec = stage.broadcast.as_ref().ok_or_else(|| {
            OrchestratorError::InvalidPipeline(format!("stage '{}' is broadcast mode with no broadcast spec", stage.name))
        })?;
        let input = resolve_input(stage, context, &self.cache)?;
        Ok(spec
            .actors
            .iter()
            .enumerate()
            .map(|(task_index, actor_type)| PlannedTask { task_index, input: input.clone(), actor_type: actor_type.clone() })
            .collect())
    }

    fn on_task_result(&self, stage_state: &mut StageRecord, task_index: usize, output: Value) -> StageExecutorOutcome {
        let all_reported = stage_state.record_output(task_index, output);
        // wait_for_all semantics are keyed off whether the caller configured
        // the stage to require every reply; since StageRecord has no direct
        // handle on the spec, the caller passes `task_count == 1` for a
        // wait_for_all=false stage (see executors_for_broadcast_spec in the
        // orchestrator service) so `record_output`'s own completion check
        // already does the right thing for both cases.
        StageExecutorOutcome { finished: all_reported, aggregated_output: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::{ActorRef, BroadcastSpec};
    use std::collections::HashMap;

    fn stage() -> StageDefinition {
        StageDefinition {
            name: "notify".into(),
            mode: orchestrator_domain::ExecutionMode::Broadcast,
            actor: ActorRef::Literal("unused".into()),
            input: HashMap::new(),
            input_expr: Some("trigger".to_string()),
            scatter: None,
            gather: None,
            broadcast: Some(BroadcastSpec { actors: vec!["Email".to_string(), "Slack".to_string()], wait_for_all: true }),
            fork_join: None,
            when: None,
            depends_on: Vec::new(),
            retry: None,
            compensation: None,
            circuit_breaker: None,
            dead_letter_queue: None,
            lease_ttl_ms: None,
            concurrency: None,
        }
    }

    #[tokio::test]
    async fn emits_one_task_per_actor_with_shared_input() {
        let executor = BroadcastExecutor::new();
        let context = Value::from_json(serde_json::json!({"trigger": "hello"}));
        let tasks = executor.plan(&stage(), &context).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].actor_type, "Email");
        assert_eq!(tasks[1].actor_type, "Slack");
        assert_eq!(tasks[0].input, tasks[1].input);
    }
}
