// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Definition
//!
//! The immutable, user-supplied shape of a pipeline: a named DAG of
//! [`StageDefinition`]s. A `PipelineDefinition` is deserialised from YAML,
//! TOML, or JSON and never mutated once a `PipelineRecord` has been created
//! from it — resubmitting the same id with a different definition is a
//! distinct pipeline run, never an in-place edit.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::value_objects::BackoffKind;

/// A named, ordered DAG of stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub stages: Vec<StageDefinition>,
}

impl PipelineDefinition {
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// One node in the pipeline DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub mode: ExecutionMode,
    pub actor: ActorRef,
    /// Input binding: either an expression string or a map of named
    /// sub-expressions, each resolved against the planning context.
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub input_expr: Option<String>,

    #[serde(default)]
    pub scatter: Option<ScatterSpec>,
    #[serde(default)]
    pub gather: Option<GatherSpec>,
    #[serde(default)]
    pub broadcast: Option<BroadcastSpec>,
    #[serde(default)]
    pub fork_join: Option<ForkJoinSpec>,

    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub compensation: Option<CompensationSpec>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerSpec>,
    #[serde(default)]
    pub dead_letter_queue: Option<String>,
    #[serde(default)]
    pub lease_ttl_ms: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl StageDefinition {
    pub fn lease_ttl(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.lease_ttl_ms.unwrap_or(default_ms))
    }

    pub fn dead_letter_queue_name(&self, actor_type: &str) -> String {
        self.dead_letter_queue
            .clone()
            .unwrap_or_else(|| format!("actor-{actor_type}:dlq"))
    }
}

/// The five supported stage execution modes, each backed by a distinct
/// `StageExecutor` implementation. See §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Single,
    Scatter,
    Gather,
    Broadcast,
    ForkJoin,
}

/// How a stage resolves which actor type handles a given task. Resolved
/// per-task so scatter items can route to different actors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActorRef {
    /// A literal actor type name.
    Literal(String),
    /// An expression evaluated against the task context to yield the actor
    /// type name.
    Strategy { strategy: String },
    /// A when-ladder: the first arm whose condition is true wins, falling
    /// back to `default`.
    WhenLadder {
        #[serde(rename = "when")]
        arms: Vec<WhenArm>,
        default: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenArm {
    pub condition: String,
    pub actor: String,
}

/// Alias kept for symmetry with the `strategy` form; not currently used by
/// the planner directly but documents the third resolution shape named in
/// the spec's actor-strategy design note.
pub type ActorStrategy = ActorRef;

/// Fan-out descriptor for `scatter` stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSpec {
    /// Expression yielding the iterable to fan out over.
    pub input: String,
    /// Name the current element is bound to inside the augmented context
    /// (also exposed as `item`).
    #[serde(rename = "as")]
    pub as_name: String,
    /// Optional per-element survival predicate.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub executor_config: ScatterExecutorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScatterExecutorConfig {
    pub max_parallel: Option<usize>,
}

/// Barrier descriptor for `gather` stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatherSpec {
    /// One or more predecessor stage names this gather collects from.
    pub stage: GatherSource,
    pub condition: GatherCondition,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default = "default_combine")]
    pub combine: CombineMode,
    #[serde(default)]
    pub executor_config: GatherExecutorConfig,
}

fn default_combine() -> CombineMode {
    CombineMode::Concat
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatherSource {
    Single(String),
    Many(Vec<String>),
}

impl GatherSource {
    pub fn names(&self) -> Vec<&str> {
        match self {
            GatherSource::Single(s) => vec![s.as_str()],
            GatherSource::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

/// The barrier predicate a gather stage waits on before planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatherCondition {
    All,
    Any,
    /// `count:N` — fires once `N` predecessor outputs have arrived.
    Count(usize),
}

impl GatherCondition {
    /// Parses the `all` | `any` | `count:N` surface syntax.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "all" => Some(GatherCondition::All),
            "any" => Some(GatherCondition::Any),
            other => other.strip_prefix("count:").and_then(|n| n.parse().ok()).map(GatherCondition::Count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    Concat,
    Object,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatherExecutorConfig {
    pub timeout_ms: Option<u64>,
    pub min_results: Option<usize>,
}

/// Descriptor for `broadcast` stages: one task per named actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastSpec {
    pub actors: Vec<String>,
    #[serde(default = "default_true")]
    pub wait_for_all: bool,
}

fn default_true() -> bool {
    true
}

/// Descriptor for `fork-join` stages: one task per branch, always
/// barrier-joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkJoinSpec {
    pub branches: Vec<ForkJoinBranch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkJoinBranch {
    pub name: String,
    pub actor: String,
    #[serde(default)]
    pub input: HashMap<String, String>,
    #[serde(default)]
    pub input_expr: Option<String>,
}

/// Retry policy for a stage's tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    #[serde(alias = "backoffDelay", alias = "backoff_ms")]
    pub backoff_delay_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryPolicy {
    /// Computes the delay before the given (1-based) retry attempt, per the
    /// backoff kind and caps declared on this policy.
    pub fn delay_for(&self, retry_attempt: u32) -> Duration {
        crate::value_objects::compute_backoff_delay(
            self.backoff,
            retry_attempt,
            Duration::from_millis(self.backoff_delay_ms),
            Duration::from_millis(self.max_backoff_delay_ms),
            self.backoff_multiplier,
        )
    }

    pub fn admits_retry(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

/// A user-supplied undo action associated with a completed stage, invoked
/// in reverse order on pipeline failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationSpec {
    pub actor: String,
    #[serde(default)]
    pub input: HashMap<String, String>,
}

/// Per-actor-type circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSpec {
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub half_open_requests: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_condition_parses_count() {
        assert_eq!(GatherCondition::parse("count:3"), Some(GatherCondition::Count(3)));
        assert!(matches!(GatherCondition::parse("all"), Some(GatherCondition::All)));
        assert!(GatherCondition::parse("bogus").is_none());
    }

    #[test]
    fn gather_source_names_handles_single_and_many() {
        let single = GatherSource::Single("detect".to_string());
        assert_eq!(single.names(), vec!["detect"]);
        let many = GatherSource::Many(vec!["a".into(), "b".into()]);
        assert_eq!(many.names(), vec!["a", "b"]);
    }

    #[test]
    fn pipeline_definition_deserializes_from_json() {
        let json = serde_json::json!({
            "name": "demo",
            "stages": [{
                "name": "echo",
                "mode": "single",
                "actor": "Echo",
                "input": {}
            }]
        });
        let def: PipelineDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(def.stages.len(), 1);
        assert_eq!(def.stages[0].mode, ExecutionMode::Single);
    }
}

impl PartialEq for GatherCondition {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (GatherCondition::All, GatherCondition::All) | (GatherCondition::Any, GatherCondition::Any)
        ) || matches!((self, other), (GatherCondition::Count(a), GatherCondition::Count(b)) if a == b)
    }
}
