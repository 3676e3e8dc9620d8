// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Durable Pipeline Orchestrator
//!
//! A DAG-based pipeline orchestration core: pipelines are submitted as a
//! named graph of stages, each stage dispatches work to named actor
//! queues, and every state transition is persisted before the next
//! message is produced — a crashed orchestrator or worker resumes without
//! reprocessing completed work or losing in-flight tasks.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Presentation Layer                       │
//! │  (CLI commands, via the orchestrator-bootstrap crate)       │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Application Layer                          │
//! │  (Pipeline Orchestrator scheduler loop, use cases)          │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! │  (orchestrator-domain: entities, aggregates, ports)         │
//! └─────────────────────────────────────────────────────────────┘
//!                                │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Infrastructure Layer                         │
//! │  (Redis state store & queues, stage executors, workers)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipeline
//! A named DAG of stages submitted once as an immutable
//! [`orchestrator_domain::PipelineDefinition`]; each submission creates a
//! new, independently tracked [`orchestrator_domain::PipelineRecord`].
//!
//! ### Stages
//! Each stage runs in one of five modes — single, scatter, gather,
//! broadcast, fork-join — and dispatches one or more tasks to a named
//! actor queue (see [`infrastructure::executors`]).
//!
//! ### Actors
//! User-registered handlers that execute one task's input and return its
//! output. The worker runtime (see [`infrastructure::runtime::worker`])
//! claims a lease, invokes the actor, and reports the result back to the
//! orchestrator.
//!
//! ## Observability
//!
//! Structured logging via `tracing`, with an `EnvFilter` honoring
//! `RUST_LOG`. Prometheus counters/histograms track tasks dispatched,
//! completed, retried, dead-lettered, and circuit breaker trips; see
//! [`infrastructure::metrics`].
//!
//! ## Configuration
//!
//! Layered via the `config` crate: built-in defaults, an optional TOML
//! file, environment variables prefixed `ORCHESTRATOR_`, validated
//! eagerly at startup. See [`infrastructure::config`].

pub mod application;
pub mod infrastructure;
pub mod presentation;

// Tests are organized as:
// - Unit tests: #[cfg(test)] modules within each source file
// - Integration tests: separate files in tests/ directory

pub use orchestrator_domain::{
    Actor, ActorFactory, CompiledExpression, Expression, MessageQueueAdapter, OrchestratorError, PipelineAggregate,
    PipelineDefinition, StageExecutor, StateStore, Value,
};

pub use crate::application::orchestrator_service::OrchestratorService;
