// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Orchestrator Domain
//!
//! Pure domain layer for the durable pipeline orchestration core: a DAG
//! scheduler that dispatches work to named actor queues and persists every
//! state transition so a crashed component can resume without reprocessing
//! completed work or losing in-flight tasks.
//!
//! ## Architecture
//!
//! This crate follows the same Clean Architecture boundary the rest of the
//! workspace uses: domain types and port traits here, concrete Redis-backed
//! adapters and the scheduler loop in the `orchestrator` crate.
//!
//! - [`value_objects`] - strongly-typed identifiers and the dynamic [`Value`]
//!   tree used by the expression evaluator.
//! - [`entities`] - `PipelineDefinition`, the live `PipelineRecord` /
//!   `StageRecord` / `TaskAttemptRecord` ledger types, leases, and the queue
//!   envelope.
//! - [`aggregates`] - `PipelineAggregate`, the consistency boundary that
//!   drives the frontier and records domain events for a single pipeline.
//! - [`events`] - domain events raised by the aggregate.
//! - [`repositories`] - the `StateStore`, `MessageQueueAdapter`,
//!   `StageExecutor`, and `Actor` port traits implemented by infrastructure.
//! - [`services`] - the expression evaluator and DAG compiler, both pure
//!   functions over domain types.
//!
//! [`Value`]: value_objects::Value

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use aggregates::PipelineAggregate;
pub use entities::{
    ActorRef, CircuitBreakerSpec, CombineMode, CompensationSpec, ExecutionMode, GatherCondition, GatherSpec,
    MessagePayload, MessageType, PipelineDefinition, PipelineMessage, PipelineRecord, PipelineStatus, RetryPolicy,
    ScatterSpec, StageDefinition, StageRecord, StageStatus, TaskAttemptRecord, TaskErrorRecord, TaskLease, TaskStatus,
};
pub use error::OrchestratorError;
pub use events::PipelineEvent;
pub use repositories::{
    Actor, ActorFactory, MessageHandler, MessageQueueAdapter, PipelineStatusPatch, Priority, StagePatch, StageExecutor,
    StateStore,
};
pub use services::{compile_dependencies, CompiledExpression, DagError, Expression};
pub use value_objects::{BackoffKind, LeaseId, MessageId, PipelineId, StageName, TaskIndex, Value};
