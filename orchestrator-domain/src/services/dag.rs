// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Compiles a [`PipelineDefinition`]'s stage list into a dependency map:
//! explicit `dependsOn` edges plus the implicit edges a stage acquires by
//! referencing another stage's output in its `gather.stage`, `input`,
//! `input_expr`, or `when` expressions. See §4.5 responsibility 1.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::entities::PipelineDefinition;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("stage `{0}` depends on unknown stage `{1}`")]
    UnknownStage(String, String),
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Returns, for every stage name, the list of stage names it depends on.
pub fn compile_dependencies(definition: &PipelineDefinition) -> Result<HashMap<String, Vec<String>>, DagError> {
    let known: HashSet<&str> = definition.stages.iter().map(|s| s.name.as_str()).collect();
    let mut deps: HashMap<String, Vec<String>> = HashMap::new();

    for stage in &definition.stages {
        let mut edges: Vec<String> = stage.depends_on.clone();

        if let Some(gather) = &stage.gather {
            edges.extend(gather.stage.names().iter().map(|s| s.to_string()));
        }

        for other in &definition.stages {
            if other.name == stage.name {
                continue;
            }
            if references_stage(stage, &other.name) && !edges.contains(&other.name) {
                edges.push(other.name.clone());
            }
        }

        for dep in &edges {
            if !known.contains(dep.as_str()) {
                return Err(DagError::UnknownStage(stage.name.clone(), dep.clone()));
            }
        }

        edges.sort();
        edges.dedup();
        deps.insert(stage.name.clone(), edges);
    }

    detect_cycle(&deps)?;
    Ok(deps)
}

/// Textual scan for `stages["name"]` / `stages.name` occurrences across a
/// stage's expression-bearing fields. Intentionally simple: it is a
/// superset detector (false positives only widen the dependency set,
/// which is always safe for scheduling), not a full expression parse.
fn references_stage(stage: &crate::entities::StageDefinition, name: &str) -> bool {
    let needles = [format!(r#"stages["{name}"]"#), format!("stages.{name}")];
    let haystacks: Vec<&str> = std::iter::empty()
        .chain(stage.when.as_deref())
        .chain(stage.input_expr.as_deref())
        .chain(stage.input.values().map(String::as_str))
        .chain(stage.scatter.as_ref().map(|s| s.input.as_str()))
        .chain(stage.scatter.as_ref().and_then(|s| s.condition.as_deref()))
        .collect();
    haystacks.iter().any(|h| needles.iter().any(|n| h.contains(n.as_str())))
}

fn detect_cycle(deps: &HashMap<String, Vec<String>>) -> Result<(), DagError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<String> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        deps: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<String>,
    ) -> Result<(), DagError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let mut cycle = path.clone();
                cycle.push(node.to_string());
                return Err(DagError::Cycle(cycle));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        path.push(node.to_string());
        if let Some(edges) = deps.get(node) {
            for dep in edges {
                visit(dep, deps, marks, path)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for node in deps.keys() {
        visit(node, deps, &mut marks, &mut path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ActorRef, ExecutionMode, GatherCondition, GatherSource, GatherSpec, StageDefinition};

    fn stage(name: &str, depends_on: Vec<&str>) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            mode: ExecutionMode::Single,
            actor: ActorRef::Literal("Echo".to_string()),
            input: Default::default(),
            input_expr: None,
            scatter: None,
            gather: None,
            broadcast: None,
            fork_join: None,
            when: None,
            depends_on: depends_on.into_iter().map(String::from).collect(),
            retry: None,
            compensation: None,
            circuit_breaker: None,
            dead_letter_queue: None,
            lease_ttl_ms: None,
            concurrency: None,
        }
    }

    #[test]
    fn explicit_depends_on_is_respected() {
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("a", vec![]), stage("b", vec!["a"])],
        };
        let deps = compile_dependencies(&definition).unwrap();
        assert_eq!(deps["b"], vec!["a".to_string()]);
    }

    #[test]
    fn gather_stage_implies_dependency_on_its_sources() {
        let mut gather_stage = stage("consolidate", vec![]);
        gather_stage.gather = Some(GatherSpec {
            stage: GatherSource::Many(vec!["detect".to_string(), "classify".to_string()]),
            condition: GatherCondition::All,
            group_by: None,
            combine: crate::entities::CombineMode::Concat,
            executor_config: Default::default(),
        });
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("detect", vec![]), stage("classify", vec![]), gather_stage],
        };
        let deps = compile_dependencies(&definition).unwrap();
        assert_eq!(deps["consolidate"], vec!["classify".to_string(), "detect".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("a", vec!["b"]), stage("b", vec!["a"])],
        };
        assert!(matches!(compile_dependencies(&definition), Err(DagError::Cycle(_))));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let definition = PipelineDefinition {
            name: "demo".to_string(),
            description: None,
            version: None,
            stages: vec![stage("a", vec!["ghost"])],
        };
        assert!(matches!(compile_dependencies(&definition), Err(DagError::UnknownStage(_, _))));
    }
}
