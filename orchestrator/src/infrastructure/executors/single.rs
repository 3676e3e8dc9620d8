// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `single` mode: exactly one task, completing the stage on its own result.

use async_trait::async_trait;

use orchestrator_domain::entities::{StageDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::{PlannedTask, StageExecutor, StageExecutorOutcome};
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;

use super::common::{resolve_actor, resolve_input};

pub struct SingleExecutor {
    cache: ExpressionCache,
}

impl SingleExecutor {
    pub fn new() -> Self {
        Self { cache: ExpressionCache::new() }
    }
}

impl Default for SingleExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for SingleExecutor {
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>> {
        let input = resolve_input(stage, context, &self.cache)?;
        let actor_type = resolve_actor(&stage.actor, context, &self.cache)?;
        Ok(vec![PlannedTask { task_index: 0, input, actor_type }])
    }

    fn on_task_result(&self, stage_state: &mut StageRecord, task_index: usize, output: Value) -> StageExecutorOutcome {
        let finished = stage_state.record_output(task_index, output);
        StageExecutorOutcome { finished, aggregated_output: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::ActorRef;
    use std::collections::HashMap;

    fn stage() -> StageDefinition {
        StageDefinition {
            name: "echo".into(),
            mode: orchestrator_domain::ExecutionMode::Single,
            actor: ActorRef::Literal("Echo".into()),
            input: HashMap::new(),
            input_expr: Some("trigger".to_string()),
            scatter: None,
            gather: None,
            broadcast: None,
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
    async fn plans_exactly_one_task() {
        let executor = SingleExecutor::new();
        let context = Value::from_json(serde_json::json!({"trigger": {"a": 1}}));
        let tasks = executor.plan(&stage(), &context).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_index, 0);
        assert_eq!(tasks[0].actor_type, "Echo");
    }

    #[test]
    fn completes_on_its_one_result() {
        let executor = SingleExecutor::new();
        let mut stage_state = StageRecord::pending("echo");
        stage_state.start(1);
        let outcome = executor.on_task_result(&mut stage_state, 0, Value::Bool(true));
        assert!(outcome.finished);
        assert!(outcome.aggregated_output.is_none());
    }
}
