// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared planning helpers used by every executor: resolving a stage's
//! declared `input`/`input_expr` binding, resolving an `ActorRef`, and
//! augmenting a context with a scatter/gather-local binding.

use std::collections::BTreeMap;

use orchestrator_domain::entities::{ActorRef, StageDefinition};
use orchestrator_domain::error::Result;
use orchestrator_domain::services::expression::ExpressionCache;
use orchestrator_domain::value_objects::Value;
use orchestrator_domain::OrchestratorError;

/// Resolves a stage's input binding against `context`. `input_expr` wins
/// when present; otherwise each entry of the `input` map is evaluated and
/// assembled into a `Value::Map`.
pub fn resolve_input(stage: &StageDefinition, context: &Value, cache: &ExpressionCache) -> Result<Value> {
    if let Some(expr) = &stage.input_expr {
        return Ok(cache.get_or_compile(expr)?.eval(context));
    }
    let mut map = BTreeMap::new();
    for (key, expr_src) in &stage.input {
        map.insert(key.clone(), cache.get_or_compile(expr_src)?.eval(context));
    }
    Ok(Value::Map(map))
}

/// Resolves which actor type a task should route to, per the three forms
/// an `ActorRef` may take. Evaluated per task so scatter/broadcast/fork-join
/// items may route to different actors.
pub fn resolve_actor(actor_ref: &ActorRef, context: &Value, cache: &ExpressionCache) -> Result<String> {
    match actor_ref {
        ActorRef::Literal(name) => Ok(name.clone()),
        ActorRef::Strategy { strategy } => {
            let resolved = cache.get_or_compile(strategy)?.eval(context);
            resolved.as_str().map(str::to_string).ok_or_else(|| {
                OrchestratorError::Expression(format!("actor strategy `{strategy}` did not yield a string"))
            })
        }
        ActorRef::WhenLadder { arms, default } => {
            for arm in arms {
                if cache.get_or_compile(&arm.condition)?.eval_bool(context) {
                    return Ok(arm.actor.clone());
                }
            }
            Ok(default.clone())
        }
    }
}

/// Returns a copy of `context` with `as_name` (and the fixed alias `item`)
/// bound to `element`, as used by scatter's per-element planning context
/// and gather's per-group-item `groupBy` evaluation.
pub fn augment(context: &Value, as_name: &str, element: Value) -> Value {
    let mut map = context.as_map().cloned().unwrap_or_default();
    map.insert("item".to_string(), element.clone());
    if as_name != "item" {
        map.insert(as_name.to_string(), element);
    }
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_domain::entities::WhenArm;
    use std::collections::HashMap;

    fn ctx() -> Value {
        Value::from_json(serde_json::json!({"trigger": {"kind": "pdf"}}))
    }

    #[test]
    fn resolve_input_prefers_expr_over_map() {
        let cache = ExpressionCache::new();
        let mut stage_input = HashMap::new();
        stage_input.insert("ignored".to_string(), "`1`".to_string());
        let stage = StageDefinition {
            name: "s".into(),
            mode: orchestrator_domain::ExecutionMode::Single,
            actor: ActorRef::Literal("Echo".into()),
            input: stage_input,
            input_expr: Some("trigger.kind".to_string()),
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
        };
        let resolved = resolve_input(&stage, &ctx(), &cache).unwrap();
        assert_eq!(resolved, Value::String("pdf".to_string()));
    }

    #[test]
    fn resolve_actor_when_ladder_falls_back_to_default() {
        let cache = ExpressionCache::new();
        let actor_ref = ActorRef::WhenLadder {
            arms: vec![WhenArm { condition: "`false`".to_string(), actor: "Never".to_string() }],
            default: "Default".to_string(),
        };
        assert_eq!(resolve_actor(&actor_ref, &ctx(), &cache).unwrap(), "Default");
    }

    #[test]
    fn augment_binds_both_item_and_custom_alias() {
        let augmented = augment(&ctx(), "doc", Value::String("a.pdf".to_string()));
        let map = augmented.as_map().unwrap();
        assert_eq!(map.get("item").unwrap(), &Value::String("a.pdf".to_string()));
        assert_eq!(map.get("doc").unwrap(), &Value::String("a.pdf".to_string()));
    }
}
