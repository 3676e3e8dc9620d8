// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Configuration
//!
//! Layered configuration for the orchestrator: built-in defaults, an
//! optional TOML file, then environment variables prefixed
//! `ORCHESTRATOR_` (double-underscore-separated for nested keys, e.g.
//! `ORCHESTRATOR_REDIS__URL`). Validated eagerly at startup so a
//! misconfigured deployment fails before it claims any leases.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [redis]
//! url = "redis://localhost:6379"
//!
//! [orchestrator]
//! results_queue = "pipeline-stage-results"
//! default_lease_ttl_ms = 30000
//! resume_on_startup = true
//!
//! [observability]
//! log_level = "info"
//! metrics_port = 9090
//! ```

pub mod settings;

pub use settings::{ObservabilitySettings, OrchestratorSettings, RedisSettings, Settings};
