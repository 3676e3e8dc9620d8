// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Adapters implementing the domain's repository ports plus the ambient
//! concerns (configuration, logging, metrics) that wire them up.
//!
//! - [`config`] - layered `Settings` (defaults, TOML file, env overrides).
//! - [`logging`] - `tracing` subscriber initialization.
//! - [`metrics`] - Prometheus counters/gauges and the `/metrics` endpoint.
//! - [`redis`] - `StateStore` and `MessageQueueAdapter` backed by Redis.
//! - [`executors`] - the five `StageExecutor` dispatch modes.
//! - [`runtime`] - the actor worker pool and lease renewal loop.

pub mod config;
pub mod executors;
pub mod logging;
pub mod metrics;
pub mod redis;
pub mod runtime;

pub use config::Settings;
pub use logging::init_tracing;
pub use metrics::{MetricsEndpoint, MetricsService};
pub use redis::{RedisConnection, RedisMessageQueue, RedisStateStore};
