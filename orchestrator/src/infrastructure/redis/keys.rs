// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Redis key and queue-name builders. Centralized here so the layout stays
//! bit-exact with the documented key scheme no matter which module writes
//! to it.

use orchestrator_domain::PipelineId;

pub fn pipeline_record(id: PipelineId) -> String {
    format!("pipeline:{id}:record")
}

pub fn stage(id: PipelineId, stage: &str) -> String {
    format!("pipeline:{id}:stage:{stage}")
}

pub fn stage_attempts(id: PipelineId, stage: &str) -> String {
    format!("pipeline:{id}:stage:{stage}:attempts")
}

pub fn stage_attempts_seen(id: PipelineId, stage: &str, task_index: usize, attempt: u32, status: &str) -> String {
    format!("pipeline:{id}:stage:{stage}:attempts:seen:{task_index}:{attempt}:{status}")
}

pub fn stage_outputs(id: PipelineId, stage: &str) -> String {
    format!("pipeline:{id}:stage:{stage}:outputs")
}

pub fn context(id: PipelineId) -> String {
    format!("pipeline:{id}:context")
}

pub fn cancel(id: PipelineId) -> String {
    format!("pipeline:{id}:cancel")
}

pub fn task_lease(id: PipelineId, stage: &str, task_index: usize) -> String {
    format!("pipeline:{id}:stage:{stage}:task:{task_index}:lease")
}

pub fn lease_by_id(lease_id: impl std::fmt::Display) -> String {
    format!("lease:by-id:{lease_id}")
}

pub const RUNNING_PIPELINES: &str = "pipelines:running";

pub fn actor_queue(actor_type: &str) -> String {
    format!("actor-{actor_type}")
}

pub fn actor_dlq(actor_type: &str) -> String {
    format!("actor-{actor_type}:dlq")
}

/// A queue's priority sub-lists; `Priority::High` drains before `Normal`
/// before `Low`.
pub fn queue_priority_list(queue_name: &str, priority: orchestrator_domain::repositories::Priority) -> String {
    let suffix = match priority {
        orchestrator_domain::repositories::Priority::High => "p0",
        orchestrator_domain::repositories::Priority::Normal => "p1",
        orchestrator_domain::repositories::Priority::Low => "p2",
    };
    format!("{queue_name}:{suffix}")
}

pub fn queue_delayed(queue_name: &str) -> String {
    format!("{queue_name}:delayed")
}

pub fn queue_seen(queue_name: &str) -> String {
    format!("{queue_name}:seen")
}

pub const RESULTS_QUEUE: &str = "pipeline-stage-results";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_the_documented_layout() {
        let id = PipelineId::new();
        assert_eq!(pipeline_record(id), format!("pipeline:{id}:record"));
        assert_eq!(stage(id, "detect"), format!("pipeline:{id}:stage:detect"));
        assert_eq!(task_lease(id, "detect", 3), format!("pipeline:{id}:stage:detect:task:3:lease"));
        assert_eq!(actor_queue("Detector"), "actor-Detector");
        assert_eq!(actor_dlq("Detector"), "actor-Detector:dlq");
    }
}
