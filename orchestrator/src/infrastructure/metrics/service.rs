// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus registry and counters for pipeline and task execution.

use anyhow::{Context, Result};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Owns the Prometheus registry and every metric the orchestrator records.
///
/// Cloned cheaply (every field is an `Arc`-backed Prometheus handle) and
/// shared across the scheduler loop, the worker runtime, and the metrics
/// HTTP endpoint.
#[derive(Clone)]
pub struct MetricsService {
    registry: Registry,

    pub pipelines_submitted_total: IntCounter,
    pub pipelines_completed_total: IntCounter,
    pub pipelines_failed_total: IntCounter,
    pub pipelines_cancelled_total: IntCounter,

    pub tasks_dispatched_total: IntCounter,
    pub tasks_succeeded_total: IntCounter,
    pub tasks_retried_total: IntCounter,
    pub tasks_dead_lettered_total: IntCounter,

    pub gather_timeouts_total: IntCounter,
    pub circuit_breaker_trips_total: IntCounterVec,
    pub circuit_breaker_open: IntGauge,

    pub stage_duration_seconds: Histogram,
    pub active_leases: IntGauge,
}

impl MetricsService {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let pipelines_submitted_total =
            IntCounter::new("orchestrator_pipelines_submitted_total", "Pipelines submitted")?;
        let pipelines_completed_total =
            IntCounter::new("orchestrator_pipelines_completed_total", "Pipelines that reached Completed")?;
        let pipelines_failed_total =
            IntCounter::new("orchestrator_pipelines_failed_total", "Pipelines that reached Failed")?;
        let pipelines_cancelled_total =
            IntCounter::new("orchestrator_pipelines_cancelled_total", "Pipelines that reached Cancelled")?;

        let tasks_dispatched_total =
            IntCounter::new("orchestrator_tasks_dispatched_total", "Tasks enqueued to an actor queue")?;
        let tasks_succeeded_total = IntCounter::new("orchestrator_tasks_succeeded_total", "Tasks that succeeded")?;
        let tasks_retried_total = IntCounter::new("orchestrator_tasks_retried_total", "Task attempts retried")?;
        let tasks_dead_lettered_total =
            IntCounter::new("orchestrator_tasks_dead_lettered_total", "Tasks dead-lettered after exhausting retries")?;

        let gather_timeouts_total =
            IntCounter::new("orchestrator_gather_timeouts_total", "Gather stages that timed out waiting on sources")?;
        let circuit_breaker_trips_total = IntCounterVec::new(
            Opts::new("orchestrator_circuit_breaker_trips_total", "Circuit breaker open transitions by actor type"),
            &["actor_type"],
        )?;
        let circuit_breaker_open =
            IntGauge::new("orchestrator_circuit_breaker_open", "Number of actor types with an open circuit breaker")?;

        let stage_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "orchestrator_stage_duration_seconds",
            "Wall-clock time from a stage becoming Ready to reaching a terminal status",
        ))?;
        let active_leases = IntGauge::new("orchestrator_active_leases", "Task leases currently held by workers")?;

        registry.register(Box::new(pipelines_submitted_total.clone()))?;
        registry.register(Box::new(pipelines_completed_total.clone()))?;
        registry.register(Box::new(pipelines_failed_total.clone()))?;
        registry.register(Box::new(pipelines_cancelled_total.clone()))?;
        registry.register(Box::new(tasks_dispatched_total.clone()))?;
        registry.register(Box::new(tasks_succeeded_total.clone()))?;
        registry.register(Box::new(tasks_retried_total.clone()))?;
        registry.register(Box::new(tasks_dead_lettered_total.clone()))?;
        registry.register(Box::new(gather_timeouts_total.clone()))?;
        registry.register(Box::new(circuit_breaker_trips_total.clone()))?;
        registry.register(Box::new(circuit_breaker_open.clone()))?;
        registry.register(Box::new(stage_duration_seconds.clone()))?;
        registry.register(Box::new(active_leases.clone()))?;

        Ok(Self {
            registry,
            pipelines_submitted_total,
            pipelines_completed_total,
            pipelines_failed_total,
            pipelines_cancelled_total,
            tasks_dispatched_total,
            tasks_succeeded_total,
            tasks_retried_total,
            tasks_dead_lettered_total,
            gather_timeouts_total,
            circuit_breaker_trips_total,
            circuit_breaker_open,
            stage_duration_seconds,
            active_leases,
        })
    }

    pub fn record_circuit_trip(&self, actor_type: &str) {
        self.circuit_breaker_trips_total.with_label_values(&[actor_type]).inc();
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).context("failed to encode metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_without_collision() {
        let service = MetricsService::new().unwrap();
        service.pipelines_submitted_total.inc();
        let rendered = service.render().unwrap();
        assert!(rendered.contains("orchestrator_pipelines_submitted_total 1"));
    }

    #[test]
    fn circuit_trips_are_labeled_by_actor_type() {
        let service = MetricsService::new().unwrap();
        service.record_circuit_trip("resize-image");
        let rendered = service.render().unwrap();
        assert!(rendered.contains("actor_type=\"resize-image\""));
    }
}
