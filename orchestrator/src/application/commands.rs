// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! CLI-facing command handlers backing `submit` / `cancel` / `status` /
//! `resume`. Translates [`orchestrator_bootstrap::ValidatedCommand`]'s
//! string/path arguments into domain calls; the bootstrap crate itself
//! stays domain-agnostic and never sees a `PipelineId`.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use orchestrator_domain::entities::{PipelineDefinition, StageRecord};
use orchestrator_domain::error::Result;
use orchestrator_domain::value_objects::{PipelineId, Value};
use orchestrator_domain::{OrchestratorError, StateStore};

use crate::application::OrchestratorService;

/// The outcome of running a status query: the pipeline's own record plus
/// each stage's ledger entry, in declared order.
pub struct StatusReport {
    pub pipeline_id: PipelineId,
    pub status: orchestrator_domain::PipelineStatus,
    pub stages: Vec<(String, StageRecord)>,
}

/// Reads a pipeline definition from disk, inferring the format from the
/// file extension. `.yaml`/`.yml`, `.toml`, and `.json` are all
/// first-class — operators author pipelines in whichever format their
/// own tooling already produces.
pub fn load_definition(path: &Path) -> Result<PipelineDefinition> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| OrchestratorError::InvalidPipeline(format!("reading {}: {e}", path.display())))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
            .map_err(|e| OrchestratorError::InvalidPipeline(format!("parsing {}: {e}", path.display()))),
        Some("toml") => {
            toml::from_str(&raw).map_err(|e| OrchestratorError::InvalidPipeline(format!("parsing {}: {e}", path.display())))
        }
        _ => serde_json::from_str(&raw)
            .map_err(|e| OrchestratorError::InvalidPipeline(format!("parsing {}: {e}", path.display()))),
    }
}

/// Reads the optional trigger payload; an absent path submits `{}`.
pub fn load_trigger(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(Value::Map(Default::default()));
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| OrchestratorError::InvalidPipeline(format!("reading {}: {e}", path.display())))?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(Value::from_json(json))
}

fn parse_pipeline_id(raw: &str) -> Result<PipelineId> {
    PipelineId::from_str(raw).map_err(|_| OrchestratorError::InvalidPipeline(format!("not a valid pipeline id: {raw}")))
}

/// Loads and submits the pipeline definition at `definition_path`, using
/// the trigger at `trigger_path` if given.
pub async fn submit(service: &OrchestratorService, definition_path: &Path, trigger_path: Option<&Path>) -> Result<PipelineId> {
    let definition = load_definition(definition_path)?;
    let trigger = load_trigger(trigger_path)?;
    service.submit(definition, trigger).await
}

pub async fn cancel(service: &OrchestratorService, pipeline_id: &str, reason: String) -> Result<()> {
    let id = parse_pipeline_id(pipeline_id)?;
    service.cancel(id, reason).await
}

/// Renders a pipeline's current record and full stage ledger. Reads
/// directly off the store rather than through an aggregate — status is
/// a read model, not something that needs hydration into an aggregate
/// capable of raising events.
pub async fn status(store: &Arc<dyn StateStore>, pipeline_id: &str) -> Result<StatusReport> {
    let id = parse_pipeline_id(pipeline_id)?;
    let record = store
        .get_pipeline(id)
        .await?
        .ok_or_else(|| OrchestratorError::NotFound(format!("pipeline {id}")))?;

    let mut stages = Vec::with_capacity(record.stage_order.len());
    for name in &record.stage_order {
        let stage = store.get_stage(id, name).await?.unwrap_or_else(|| StageRecord::pending(name.as_str()));
        stages.push((name.clone(), stage));
    }

    Ok(StatusReport { pipeline_id: id, status: record.status, stages })
}

pub async fn resume(service: &OrchestratorService) -> Result<()> {
    service.resume_running_pipelines().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("orchestrator-commands-test-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).expect("write scratch fixture");
        path
    }

    #[test]
    fn loads_yaml_definition() {
        let path = scratch_path("demo.yaml", "name: demo\nstages: []\n");
        let definition = load_definition(&path).expect("valid yaml definition");
        std::fs::remove_file(&path).ok();
        assert_eq!(definition.name, "demo");
    }

    #[test]
    fn loads_json_trigger() {
        let path = scratch_path("trigger.json", r#"{"key": "value"}"#);
        let trigger = load_trigger(Some(&path)).expect("valid json trigger");
        std::fs::remove_file(&path).ok();
        assert_eq!(trigger.as_map().and_then(|m| m.get("key")).and_then(Value::as_str), Some("value"));
    }

    #[test]
    fn missing_trigger_path_defaults_to_empty_map() {
        let trigger = load_trigger(None).expect("default trigger");
        assert_eq!(trigger, Value::Map(Default::default()));
    }

    #[test]
    fn rejects_malformed_pipeline_id() {
        assert!(parse_pipeline_id("not-a-ulid").is_err());
    }
}
