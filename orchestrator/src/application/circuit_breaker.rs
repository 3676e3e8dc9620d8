// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-actor-type circuit breaking (§4.5 responsibility 6). One breaker
//! per actor type, guarding enqueue rather than the actor call itself —
//! the orchestrator enqueues, it never invokes an actor directly.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::info;

use orchestrator_domain::entities::CircuitBreakerSpec;
use orchestrator_domain::error::Result;
use orchestrator_domain::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct ActorCircuit {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<DateTime<Utc>>,
    half_open_probes_issued: u32,
}

impl ActorCircuit {
    fn closed() -> Self {
        Self { state: CircuitState::Closed, failure_count: 0, opened_at: None, half_open_probes_issued: 0 }
    }
}

/// Tracks one [`ActorCircuit`] per actor type. Shared across the
/// orchestrator's enqueue path; interior-mutable so it can sit behind a
/// `&self` service method.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    circuits: RwLock<HashMap<String, ActorCircuit>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self { circuits: RwLock::new(HashMap::new()) }
    }

    /// Call before enqueuing a task for `actor_type`. `Err(CircuitOpen)`
    /// means the caller must not enqueue; the task should be treated as a
    /// retryable failure by the orchestrator's own retry path.
    pub fn admit(&self, actor_type: &str, spec: &CircuitBreakerSpec) -> Result<()> {
        let mut circuits = self.circuits.write().expect("circuit breaker lock poisoned");
        let circuit = circuits.entry(actor_type.to_string()).or_insert_with(ActorCircuit::closed);

        match circuit.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = circuit.opened_at.map(|at| Utc::now() - at).unwrap_or_default();
                if elapsed >= chrono::Duration::milliseconds(spec.timeout_ms as i64) {
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_probes_issued = 1;
                    info!(actor = actor_type, "circuit breaker half-open, admitting a probe");
                    Ok(())
                } else {
                    Err(OrchestratorError::CircuitOpen(actor_type.to_string()))
                }
            }
            CircuitState::HalfOpen => {
                if circuit.half_open_probes_issued < spec.half_open_requests {
                    circuit.half_open_probes_issued += 1;
                    Ok(())
                } else {
                    Err(OrchestratorError::CircuitOpen(actor_type.to_string()))
                }
            }
        }
    }

    pub fn record_success(&self, actor_type: &str) {
        let mut circuits = self.circuits.write().expect("circuit breaker lock poisoned");
        if let Some(circuit) = circuits.get_mut(actor_type) {
            if circuit.state != CircuitState::Closed {
                info!(actor = actor_type, "circuit breaker closing after successful probe");
            }
            *circuit = ActorCircuit::closed();
        }
    }

    pub fn record_failure(&self, actor_type: &str, spec: &CircuitBreakerSpec) {
        let mut circuits = self.circuits.write().expect("circuit breaker lock poisoned");
        let circuit = circuits.entry(actor_type.to_string()).or_insert_with(ActorCircuit::closed);

        if circuit.state == CircuitState::HalfOpen {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Utc::now());
            circuit.failure_count = spec.failure_threshold;
            info!(actor = actor_type, "probe failed, circuit breaker re-opening");
            return;
        }

        circuit.failure_count += 1;
        if circuit.failure_count >= spec.failure_threshold {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Utc::now());
            info!(actor = actor_type, failures = circuit.failure_count, "circuit breaker opening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> CircuitBreakerSpec {
        CircuitBreakerSpec { failure_threshold: 2, timeout_ms: 50, half_open_requests: 1 }
    }

    #[test]
    fn opens_after_threshold_failures_and_blocks_enqueue() {
        let registry = CircuitBreakerRegistry::new();
        let spec = spec();
        registry.record_failure("Detect", &spec);
        assert!(registry.admit("Detect", &spec).is_ok());
        registry.record_failure("Detect", &spec);
        assert!(matches!(registry.admit("Detect", &spec), Err(OrchestratorError::CircuitOpen(_))));
    }

    #[test]
    fn half_open_admits_one_probe_after_timeout() {
        let registry = CircuitBreakerRegistry::new();
        let spec = CircuitBreakerSpec { failure_threshold: 1, timeout_ms: 1, half_open_requests: 1 };
        registry.record_failure("Detect", &spec);
        assert!(registry.admit("Detect", &spec).is_err());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(registry.admit("Detect", &spec).is_ok());
        assert!(registry.admit("Detect", &spec).is_err());
    }

    #[test]
    fn success_closes_circuit() {
        let registry = CircuitBreakerRegistry::new();
        let spec = CircuitBreakerSpec { failure_threshold: 1, timeout_ms: 1, half_open_requests: 1 };
        registry.record_failure("Detect", &spec);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(registry.admit("Detect", &spec).is_ok());
        registry.record_success("Detect");
        assert!(registry.admit("Detect", &spec).is_ok());
    }
}
