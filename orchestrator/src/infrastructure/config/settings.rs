// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Typed configuration, built on the `config` crate's layered-source
//! `Config` builder.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { url: "redis://127.0.0.1:6379".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// The single queue every actor worker's `result`/`failure` message is
    /// routed to.
    pub results_queue: String,
    pub default_lease_ttl_ms: u64,
    /// Multiplier applied to `default_lease_ttl_ms` to get the heartbeat
    /// cadence (TTL/3 per §4.6 — expressed here as a divisor).
    pub lease_heartbeat_divisor: u32,
    pub resume_on_startup: bool,
    /// Bound on stages the scheduler will plan concurrently; guards
    /// against a pathological DAG with an enormous frontier.
    pub max_concurrent_stages: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            results_queue: "pipeline-stage-results".to_string(),
            default_lease_ttl_ms: 30_000,
            lease_heartbeat_divisor: 3,
            resume_on_startup: true,
            max_concurrent_stages: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub metrics_port: u16,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self { log_level: "info".to_string(), metrics_port: 9090 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Loads defaults, an optional file at `config_path`, then
    /// `ORCHESTRATOR_`-prefixed environment variables, in that order of
    /// increasing precedence.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ORCHESTRATOR").separator("__").try_parsing(true),
        );

        let settings: Settings = builder.build().context("failed to assemble configuration")?.try_deserialize().context("failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.redis.url.is_empty(), "redis.url must not be empty");
        anyhow::ensure!(!self.orchestrator.results_queue.is_empty(), "orchestrator.results_queue must not be empty");
        anyhow::ensure!(self.orchestrator.default_lease_ttl_ms > 0, "orchestrator.default_lease_ttl_ms must be positive");
        anyhow::ensure!(self.orchestrator.lease_heartbeat_divisor > 0, "orchestrator.lease_heartbeat_divisor must be positive");
        anyhow::ensure!(self.orchestrator.max_concurrent_stages > 0, "orchestrator.max_concurrent_stages must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.redis.url, RedisSettings::default().url);
    }
}
