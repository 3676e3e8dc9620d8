// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `gather` mode: the one executor that does not decide its own
//! readiness. The orchestrator service evaluates `GatherCondition`
//! (`all`/`any`/`count:N`) against predecessor stage records — and the
//! `executorConfig.timeout`/`minResults` deadline — before calling `plan`
//! at all; by the time `plan` runs, `context.stages[name]` already holds
//! whatever predecessor outputs the caller decided were enough.
//!
//! `plan` itself does two things with those outputs:
//! - `groupBy` set: partitions the concatenation of every named
//!   predecessor's outputs into groups (insertion order of first-seen
//!   key), emitting one task per group with input
//!   `{ group: { key, items } }`.
//! - `groupBy` unset: combines the named predecessors' output lists per
//!   `combine` (`concat` flattens them into one list, `object` maps
//!   predecessor stage name to its output list) and binds the result
//!   under `gathered` in the context used to resolve the stage's own
//!   (single) task input.

use std::collections::BTreeMap;

use async_trait::async_trait;

use orchestrator_domain::entities::{CombineMode, StageDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::{PlannedTask, StageExecutor, StageExecutorOutcome};
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;
use orchestrator_domain::OrchestratorError;

use super::common::{augment, resolve_actor, resolve_input};

pub struct GatherExecutor {
    cache: ExpressionCache,
}

impl GatherExecutor {
    pub fn new() -> Self {
        Self { cache: ExpressionCache::new() }
    }
}

impl Default for GatherExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn predecessor_outputs(context: &Value, name: &str) -> Vec<Value> {
    context
        .as_map()
        .and_then(|root| root.get("stages"))
        .and_then(|stages| stages.as_map())
        .and_then(|stages| stages.get(name))
        .and_then(Value::as_list)
        .map(<[Value]>::to_vec)
        .unwrap_or_default()
}

#[async_trait]
impl StageExecutor for GatherExecutor {
    async fn plan(&self, stage: &StageDefinition, context: &Value) -> Result<Vec<PlannedTask>> {
        let spec = stage
            .gather
            .as_ref()
            .ok_or_else(|| OrchestratorError::InvalidPipeline(format!("stage '{}' is gather mode with no gather spec", stage.name)))?;
        let predecessor_names = spec.stage.names();

        if let Some(group_by) = &spec.group_by {
            let group_by = self.cache.get_or_compile(group_by)?;
            let mut order: Vec<String> = Vec::new();
            let mut groups: std::collections::HashMap<String, Vec<Value>> = std::collections::HashMap::new();
            for name in &predecessor_names {
                for item in predecessor_outputs(context, name) {
                    let key = group_by.eval(&augment(context, "item", item.clone())).to_group_key();
                    if !groups.contains_key(&key) {
                        order.push(key.clone());
                    }
                    groups.entry(key).or_default().push(item);
                }
            }

            let mut tasks = Vec::with_capacity(order.len());
            for (task_index, key) in order.into_iter().enumerate() {
                let items = groups.remove(&key).unwrap_or_default();
                let mut group = BTreeMap::new();
                group.insert("key".to_string(), Value::String(key));
                group.insert("items".to_string(), Value::List(items));
                let mut augmented_map = context.as_map().cloned().unwrap_or_default();
                augmented_map.insert("group".to_string(), Value::Map(group));
                let augmented = Value::Map(augmented_map);

                let input = resolve_input(stage, &augmented, &self.cache)?;
                let actor_type = resolve_actor(&stage.actor, &augmented, &self.cache)?;
                tasks.push(PlannedTask { task_index, input, actor_type });
            }
            return Ok(tasks);
        }

        let gathered = match spec.combine {
            CombineMode::Concat => {
                let flat: Vec<Value> = predecessor_names.iter().flat_map(|name| predecessor_outputs(context, name)).collect();
                Value::List(flat)
            }
            CombineMode::Object => {
                let map: BTreeMap<String, Value> = predecessor_names
                    .iter()
                    .map(|name| (name.to_string(), Value::List(predecessor_outputs(context, name))))
                    .collect();
                Value::Map(map)
            }
        };
        let mut augmented_map = context.as_map().cloned().unwrap_or_default();
        augmented_map.insert("gathered".to_string(), gathered);
        let augmented = Value::Map(augmented_map);

        let input = resolve_input(stage, &augmented, &self.cache)?;
        let actor_type = resolve_actor(&stage.actor, &augmented, &self.cache)?;
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
    use orchestrator_domain::entities::{ActorRef, GatherCondition, GatherExecutorConfig, GatherSource, GatherSpec};
    use std::collections::HashMap;

    fn stage(group_by: Option<&str>, combine: CombineMode, sources: GatherSource) -> StageDefinition {
        StageDefinition {
            name: "consolidate".into(),
            mode: orchestrator_domain::ExecutionMode::Gather,
            actor: ActorRef::Literal("Consolidate".into()),
            input: HashMap::new(),
            input_expr: Some(if group_by.is_some() { "group".to_string() } else { "gathered".to_string() }),
            scatter: None,
            gather: Some(GatherSpec {
                stage: sources,
                condition: GatherCondition::All,
                group_by: group_by.map(str::to_string),
                combine,
                executor_config: GatherExecutorConfig::default(),
            }),
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

    fn context_with_detect_outputs() -> Value {
        Value::from_json(serde_json::json!({
            "stages": {
                "detect": [
                    {"kind": "pdf", "pages": 3},
                    {"kind": "csv", "pages": 1},
                    {"kind": "pdf", "pages": 5}
                ]
            }
        }))
    }

    #[tokio::test]
    async fn concat_combines_single_predecessor_into_one_task() {
        let executor = GatherExecutor::new();
        let stage = stage(None, CombineMode::Concat, GatherSource::Single("detect".to_string()));
        let tasks = executor.plan(&stage, &context_with_detect_outputs()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].input.as_list().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn object_combine_keys_by_predecessor_stage_name() {
        let executor = GatherExecutor::new();
        let stage = stage(None, CombineMode::Object, GatherSource::Many(vec!["detect".to_string()]));
        let tasks = executor.plan(&stage, &context_with_detect_outputs()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        let map = tasks[0].input.as_map().unwrap();
        assert!(map.contains_key("detect"));
    }

    #[tokio::test]
    async fn group_by_partitions_in_first_seen_order() {
        let executor = GatherExecutor::new();
        let stage = stage(Some("item.kind"), CombineMode::Concat, GatherSource::Single("detect".to_string()));
        let tasks = executor.plan(&stage, &context_with_detect_outputs()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        let first_group = tasks[0].input.as_map().unwrap();
        assert_eq!(first_group.get("key").unwrap(), &Value::String("pdf".to_string()));
        assert_eq!(first_group.get("items").unwrap().as_list().unwrap().len(), 2);
        let second_group = tasks[1].input.as_map().unwrap();
        assert_eq!(second_group.get("key").unwrap(), &Value::String("csv".to_string()));
    }
}
