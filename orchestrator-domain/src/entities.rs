// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: the immutable `PipelineDefinition` a user submits, and
//! the mutable ledger records the orchestrator writes as a pipeline runs.

mod lease;
mod message;
mod pipeline_definition;
mod pipeline_record;
mod stage_record;
mod task_attempt;

pub use lease::TaskLease;
pub use message::{MessagePayload, MessageType, PipelineMessage};
pub use pipeline_definition::{
    ActorRef, ActorStrategy, BroadcastSpec, CircuitBreakerSpec, CombineMode, CompensationSpec, ExecutionMode,
    ForkJoinBranch, ForkJoinSpec, GatherCondition, GatherExecutorConfig, GatherSource, GatherSpec, PipelineDefinition,
    RetryPolicy, ScatterExecutorConfig, ScatterSpec, StageDefinition, WhenArm,
};
pub use pipeline_record::{CancellationInfo, PipelineRecord, PipelineStatus};
pub use stage_record::{StageRecord, StageStatus};
pub use task_attempt::{TaskAttemptRecord, TaskErrorRecord, TaskStatus};
