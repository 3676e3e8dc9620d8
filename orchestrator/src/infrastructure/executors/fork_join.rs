// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `fork-join` mode: one task per named branch, each with its own actor
//! and input binding, always barrier-joined on every branch.

use async_trait::async_trait;

use orchestrator_domain::entities::{StageDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::{PlannedTask, StageExecutor, StageExecutorOutcome};
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;
use orchestrator_domain::OrchestratorError;

use super::common::resolve_input;

pub struct ForkJoinExecutor {
    cache: ExpressionCache,
}

impl ForkJoinExecutor {
    pub fn new() -> Self {
        Self { cache: ExpressionCache::new() }
    }
}

impl Default for ForkJoinExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ForkJoinExecutor {
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>> {
        let spec = stage.fork_join.as_ref().ok_or_else(|| {
            OrchestratorError::InvalidPipeline(format!("stage '{}' is fork-join mode with no fork_join spec", stage.name))
        })?;

        spec.branches
            .iter()
            .enumerate()
            .map(|(task_index, branch)| {
                let input = if let Some(expr) = &branch.input_expr {
                    self.cache.get_or_compile(expr)?.eval(context)
                } else if branch.input.is_empty() {
                    resolve_input(stage, context, &self.cache)?
                } else {
                    let mut map = std::collections::BTreeMap::new();
                    for (key, expr_src) in &branch.input {
                        map.insert(key.clone(), self.cache.get_or_compile(expr_src)?.eval(context));
                    }
                    Value::Map(map)
                };
                Ok(PlannedTask { task_index, input, actor_type: branch.actor.clone() })
            })
            .collect()
    }

    fn on_task_result(&self, stage_state: &mut StageRecord, task_index: usize, output: Value) -> StageExecutorOutcome {
        let finished = stage_state.record_output(task_index, output);
        StageExecutorOutcome { finished, aggregated_output: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::{ActorRef, ForkJoinBranch, ForkJoinSpec};
    use std::collections::HashMap;

    fn stage() -> StageDefinition {
        StageDefinition {
            name: "parallel-checks".into(),
            mode: orchestrator_domain::ExecutionMode::ForkJoin,
            actor: ActorRef::Literal("unused".into()),
            input: HashMap::new(),
            input_expr: None,
            scatter: None,
            gather: None,
            broadcast: None,
            fork_join: Some(ForkJoinSpec {
                branches: vec![
                    ForkJoinBranch { name: "virus-scan".into(), actor: "VirusScan".into(), input: HashMap::new(), input_expr: Some("trigger".to_string()) },
                    ForkJoinBranch { name: "schema-check".into(), actor: "SchemaCheck".into(), input: HashMap::new(), input_expr: Some("trigger".to_string()) },
                ],
            }),
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
    async fn emits_one_task_per_branch() {
        let executor = ForkJoinExecutor::new();
        let context = Value::from_json(serde_json::json!({"trigger": {"id": 7}}));
        let tasks = executor.plan(&stage(), &context).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].actor_type, "VirusScan");
        assert_eq!(tasks[1].actor_type, "SchemaCheck");
    }

    #[test]
    fn always_waits_for_every_branch() {
        let executor = ForkJoinExecutor::new();
        let mut stage_state = StageRecord::pending("parallel-checks");
        stage_state.start(2);
        assert!(!executor.on_task_result(&mut stage_state, 0, Value::Null).finished);
        assert!(executor.on_task_result(&mut stage_state, 1, Value::Null).finished);
    }
}
