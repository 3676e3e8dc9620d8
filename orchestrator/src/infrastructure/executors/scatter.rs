// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `scatter` mode: fan out over an iterable, one task per surviving
//! element. `maxParallel` is an orchestrator-level enqueue throttle, not
//! an executor concern — `plan` always returns the full surviving set so
//! the ledger records the true expected-task count up front.

use async_trait::async_trait;

use orchestrator_domain::entities::{StageDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::{PlannedTask, StageExecutor, StageExecutorOutcome};
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;
use orchestrator_domain::OrchestratorError;

use super::common::{augment, resolve_actor, resolve_input};

pub struct ScatterExecutor {
    cache: ExpressionCache,
}

impl ScatterExecutor {
    pub fn new() -> Self {
        Self { cache: ExpressionCache::new() }
    }
}

impl Default for ScatterExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageExecutor for ScatterExecutor {
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>> {
        let spec = stage
            .scatter
            .as_ref()
            .ok_or_else(|| OrchestratorError::InvalidPipeline(format!("stage '{}' is scatter mode with no scatter spec", stage.name)))?;

        let items = self.cache.get_or_compile(&spec.input)?.eval(context);
        let elements = items.as_list().map(<[Value]>::to_vec).unwrap_or_default();

        let condition = spec.condition.as_ref().map(|src| self.cache.get_or_compile(src)).transpose()?;

        let mut tasks = Vec::with_capacity(elements.len());
        let mut task_index = 0usize;
        for element in elements {
            let augmented = augment(context, &spec.as_name, element);
            if let Some(condition) = &condition {
                if !condition.eval_bool(&augmented) {
                    continue;
                }
            }
            let input = resolve_input(stage, &augmented, &self.cache)?;
            let actor_type = resolve_actor(&stage.actor, &augmented, &self.cache)?;
            tasks.push(PlannedTask { task_index, input, actor_type });
            task_index += 1;
        }
        Ok(tasks)
    }

    fn on_task_result(&self, stage_state: &mut StageRecord, task_index: usize, output: Value) -> StageExecutorOutcome {
        let finished = stage_state.record_output(task_index, output);
        StageExecutorOutcome { finished, aggregated_output: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::{ActorRef, ScatterExecutorConfig, ScatterSpec};
    use std::collections::HashMap;

    fn stage(condition: Option<&str>) -> StageDefinition {
        StageDefinition {
            name: "detect".into(),
            mode: orchestrator_domain::ExecutionMode::Scatter,
            actor: ActorRef::Literal("Detect".into()),
            input: HashMap::new(),
            input_expr: Some("item".to_string()),
            scatter: Some(ScatterSpec {
                input: "trigger.documents".to_string(),
                as_name: "doc".to_string(),
                condition: condition.map(str::to_string),
                executor_config: ScatterExecutorConfig::default(),
            }),
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

    fn context() -> Value {
        Value::from_json(serde_json::json!({"trigger": {"documents": ["a.pdf", "b.pdf", "c.txt"]}}))
    }

    #[tokio::test]
    async fn emits_one_task_per_element_with_contiguous_indices() {
        let executor = ScatterExecutor::new();
        let tasks = executor.plan(&stage(None), &context()).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks.iter().map(|t| t.task_index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn condition_filters_elements_and_reindexes_survivors() {
        let executor = ScatterExecutor::new();
        let filtered = stage(Some(r#"doc == `"a.pdf"` || doc == `"c.txt"`"#));
        let tasks = executor.plan(&filtered, &context()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_index, 0);
        assert_eq!(tasks[1].task_index, 1);
    }

    #[test]
    fn completes_only_once_every_surviving_task_reports() {
        let executor = ScatterExecutor::new();
        let mut stage_state = StageRecord::pending("detect");
        stage_state.start(2);
        assert!(!executor.on_task_result(&mut stage_state, 0, Value::Null).finished);
        assert!(executor.on_task_result(&mut stage_state, 1, Value::Null).finished);
    }
}
