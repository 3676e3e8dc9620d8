// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Port Traits
//!
//! The ports the domain depends on and the `orchestrator` crate implements:
//!
//! - [`StateStore`] — the durable ledger: pipelines, stage records, task
//!   attempts, leases, and the cancellation flag.
//! - [`MessageQueueAdapter`] — named, prioritised, at-least-once queues.
//! - [`StageExecutor`] — the per-execution-mode planning/aggregation
//!   contract (single, scatter, gather, broadcast, fork-join).
//! - [`Actor`] / [`ActorFactory`] — the unit of user-supplied work and the
//!   three ways the runtime may be told how to construct one.
//!
//! None of these traits know about Redis, tokio channels, or any other
//! transport; that knowledge lives entirely in the infrastructure layer.

mod actor;
mod message_queue;
mod stage_executor;
mod state_store;

pub use actor::{Actor, ActorFactory};
pub use message_queue::{MessageHandler, MessageQueueAdapter, Priority};
pub use stage_executor::{PlannedTask, StageExecutor, StageExecutorOutcome};
pub use state_store::{PipelineStatusPatch, StagePatch, StateStore};
