// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Renders command outcomes for the `orchestrator` CLI. Kept separate
//! from [`crate::application::commands`] so the command handlers stay
//! pure and testable: they return data, this module is the only place
//! that writes to stdout.

use orchestrator_domain::entities::{StageRecord, StageStatus};
use orchestrator_domain::value_objects::PipelineId;
use orchestrator_domain::PipelineStatus;

use crate::application::commands::StatusReport;

fn status_label(status: PipelineStatus) -> &'static str {
    match status {
        PipelineStatus::Running => "running",
        PipelineStatus::Completed => "completed",
        PipelineStatus::Failed => "failed",
        PipelineStatus::Cancelled => "cancelled",
    }
}

fn stage_label(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Ready => "ready",
        StageStatus::Running => "running",
        StageStatus::Waiting => "waiting",
        StageStatus::Completed => "completed",
        StageStatus::Failed => "failed",
        StageStatus::Skipped => "skipped",
    }
}

pub fn present_submitted(pipeline_id: PipelineId) {
    println!("submitted pipeline {pipeline_id}");
}

pub fn present_cancelled(pipeline_id: &str) {
    println!("cancellation requested for pipeline {pipeline_id}");
}

pub fn present_resumed() {
    println!("resume sweep complete");
}

pub fn present_status(report: &StatusReport) {
    println!("pipeline {} — {}", report.pipeline_id, status_label(report.status));
    for (name, stage) in &report.stages {
        println!("  {:<24} {:<10} {}", name, stage_label(stage.status), progress(stage));
    }
}

fn progress(stage: &StageRecord) -> String {
    if stage.task_count == 0 {
        String::new()
    } else {
        format!("{}/{}", stage.completed_count, stage.task_count)
    }
}

pub fn present_error(error: &orchestrator_domain::OrchestratorError) {
    eprintln!("error: {error}");
}
