// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `PipelineAggregate` wraps one pipeline's [`PipelineRecord`] together with
//! its [`StageRecord`]s and is the only place that mutates them. Every
//! mutation raises a [`PipelineEvent`], which the caller (the orchestrator's
//! result router) persists through `StateStore` before acting on it —
//! mirroring invariant 4's observable-ordering guarantee at the domain
//! layer instead of leaving it to call-site discipline.

use std::collections::HashMap;

use chrono::Utc;

use crate::entities::{CancellationInfo, PipelineDefinition, PipelineRecord, PipelineStatus, StageRecord, StageStatus};
use crate::events::PipelineEvent;
use crate::value_objects::{PipelineId, Value};

#[derive(Debug, Clone)]
pub struct PipelineAggregate {
    record: PipelineRecord,
    stages: HashMap<String, StageRecord>,
    version: u64,
    uncommitted_events: Vec<PipelineEvent>,
}

impl PipelineAggregate {
    /// Starts a brand new pipeline run: every stage begins `pending`.
    pub fn new(id: PipelineId, definition: PipelineDefinition, trigger: Value) -> Self {
        let stages = definition.stages.iter().map(|s| (s.name.clone(), StageRecord::pending(s.name.clone()))).collect();
        let record = PipelineRecord::new(id, definition, trigger);
        let mut aggregate = Self { record, stages, version: 0, uncommitted_events: Vec::new() };
        aggregate.add_event(PipelineEvent::PipelineCreated { pipeline_id: id, at: Utc::now() });
        aggregate
    }

    /// Rehydrates an aggregate from an already-persisted record and its
    /// stage ledger, with no uncommitted events — the resume path's entry
    /// point.
    pub fn hydrate(record: PipelineRecord, stages: HashMap<String, StageRecord>, version: u64) -> Self {
        Self { record, stages, version, uncommitted_events: Vec::new() }
    }

    pub fn record(&self) -> &PipelineRecord {
        &self.record
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.get(name)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn uncommitted_events(&self) -> &[PipelineEvent] {
        &self.uncommitted_events
    }

    pub fn mark_events_as_committed(&mut self) {
        self.uncommitted_events.clear();
    }

    pub fn is_cancelled(&self) -> bool {
        self.record.is_cancelled()
    }

    /// The stages eligible to plan right now: still `pending` and every
    /// predecessor named in `deps` has reached a terminal status
    /// (`completed` or `skipped`). `deps` is the compiled dependency map
    /// produced by [`crate::services::dag`].
    pub fn ready_stages<'a>(&'a self, deps: &HashMap<String, Vec<String>>) -> Vec<&'a str> {
        if self.is_cancelled() {
            return Vec::new();
        }
        self.record
            .stage_order
            .iter()
            .filter(|name| self.stages.get(name.as_str()).map(|s| s.status == StageStatus::Pending).unwrap_or(false))
            .filter(|name| {
                deps.get(name.as_str())
                    .map(|preds| {
                        preds.iter().all(|p| self.stages.get(p).map(|s| s.status.is_terminal()).unwrap_or(false))
                    })
                    .unwrap_or(true)
            })
            .map(String::as_str)
            .collect()
    }

    pub fn plan_stage(&mut self, stage: &str, task_count: usize) {
        self.add_event(PipelineEvent::StagePlanned {
            pipeline_id: self.record.id,
            stage: stage.into(),
            task_count,
        });
    }

    pub fn skip_stage(&mut self, stage: &str) {
        self.add_event(PipelineEvent::StageSkipped { pipeline_id: self.record.id, stage: stage.into() });
    }

    /// Records a task's output and returns whether the stage's barrier is
    /// now satisfied (invariant 3: late results past this point must be
    /// discarded by the caller, not replayed through this method again).
    pub fn record_task_output(&mut self, stage: &str, task_index: usize, output: Value) -> bool {
        self.add_event(PipelineEvent::TaskOutputRecorded {
            pipeline_id: self.record.id,
            stage: stage.into(),
            task_index: task_index.into(),
            output,
        });
        self.stages.get(stage).map(|s| s.status.is_terminal()).unwrap_or(false)
    }

    pub fn complete_stage(&mut self, stage: &str) {
        self.add_event(PipelineEvent::StageCompleted { pipeline_id: self.record.id, stage: stage.into() });
        if self.record.stage_order.iter().all(|name| self.stages.get(name).map(|s| s.status.is_terminal()).unwrap_or(false)) {
            self.set_status(PipelineStatus::Completed);
        }
    }

    pub fn fail_stage(&mut self, stage: &str, message: impl Into<String>) {
        self.add_event(PipelineEvent::StageFailed {
            pipeline_id: self.record.id,
            stage: stage.into(),
            message: message.into(),
        });
        self.set_status(PipelineStatus::Failed);
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        if self.is_cancelled() {
            return;
        }
        self.add_event(PipelineEvent::PipelineCancelled { pipeline_id: self.record.id, reason: reason.into() });
    }

    fn set_status(&mut self, status: PipelineStatus) {
        if self.record.status.is_terminal() {
            return;
        }
        self.add_event(PipelineEvent::PipelineStatusChanged { pipeline_id: self.record.id, status });
    }

    fn add_event(&mut self, event: PipelineEvent) {
        self.apply_event(&event);
        self.uncommitted_events.push(event);
        self.version += 1;
    }

    fn apply_event(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PipelineCreated { .. } => {}
            PipelineEvent::StagePlanned { stage, task_count, .. } => {
                if let Some(s) = self.stages.get_mut(stage.as_str()) {
                    s.start(*task_count);
                }
                self.record.frontier.insert(stage.as_str().to_string());
                self.record.active_stages.insert(stage.as_str().to_string());
            }
            PipelineEvent::StageSkipped { stage, .. } => {
                if let Some(s) = self.stages.get_mut(stage.as_str()) {
                    s.finish(StageStatus::Skipped);
                }
            }
            PipelineEvent::TaskOutputRecorded { stage, task_index, output, .. } => {
                if let Some(s) = self.stages.get_mut(stage.as_str()) {
                    let barrier_met = s.record_output(task_index.value(), output.clone());
                    if barrier_met && s.status != StageStatus::Completed {
                        s.finish(StageStatus::Completed);
                    }
                }
            }
            PipelineEvent::StageCompleted { stage, .. } => {
                if let Some(s) = self.stages.get_mut(stage.as_str()) {
                    if s.status != StageStatus::Completed {
                        s.finish(StageStatus::Completed);
                    }
                }
                self.record.active_stages.remove(stage.as_str());
                self.record.frontier.remove(stage.as_str());
            }
            PipelineEvent::StageFailed { stage, .. } => {
                if let Some(s) = self.stages.get_mut(stage.as_str()) {
                    s.finish(StageStatus::Failed);
                }
                self.record.active_stages.remove(stage.as_str());
            }
            PipelineEvent::PipelineStatusChanged { status, .. } => {
                self.record.status = *status;
                self.record.updated_at = Utc::now();
            }
            PipelineEvent::PipelineCancelled { reason, .. } => {
                self.record.cancellation = Some(CancellationInfo { reason: reason.clone(), at: Utc::now() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StageDefinition;

    fn definition() -> PipelineDefinition {
        let stage = |name: &str| StageDefinition {
            name: name.to_string(),
            mode: crate::entities::ExecutionMode::Single,
            actor: crate::entities::ActorRef::Literal("Echo".to_string()),
            input: Default::default(),
            input_expr: None,
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
        PipelineDefinition { name: "demo".to_string(), description: None, version: None, stages: vec![stage("a"), stage("b")] }
    }

    #[test]
    fn ready_stages_respects_dependency_map() {
        let agg = PipelineAggregate::new(PipelineId::new(), definition(), Value::from(serde_json::json!({})));
        let mut deps = HashMap::new();
        deps.insert("b".to_string(), vec!["a".to_string()]);
        let ready = agg.ready_stages(&deps);
        assert_eq!(ready, vec!["a"]);
    }

    #[test]
    fn completing_every_stage_completes_pipeline() {
        let mut agg = PipelineAggregate::new(PipelineId::new(), definition(), Value::from(serde_json::json!({})));
        agg.plan_stage("a", 1);
        agg.record_task_output("a", 0, Value::Bool(true));
        agg.complete_stage("a");
        agg.plan_stage("b", 1);
        agg.record_task_output("b", 0, Value::Bool(true));
        agg.complete_stage("b");
        assert_eq!(agg.record().status, PipelineStatus::Completed);
    }

    #[test]
    fn cancel_is_idempotent_and_sticky() {
        let mut agg = PipelineAggregate::new(PipelineId::new(), definition(), Value::from(serde_json::json!({})));
        agg.cancel("user requested");
        agg.cancel("second call ignored");
        assert!(agg.is_cancelled());
        assert!(agg.ready_stages(&HashMap::new()).is_empty());
    }
}
