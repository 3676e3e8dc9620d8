// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A thin layer over [`StateStore`]'s lease calls so workers and the
//! orchestrator share one acquire/heartbeat/release surface rather than
//! calling the store directly.
//!
//! Acquisition happens once, at enqueue time, on the orchestrator side.
//! A worker instead *claims* an already-acquired lease by presenting the
//! lease id carried in the message payload — `acquire_task_lease` succeeds
//! for it because the store only rejects a mismatched holder, not a
//! repeat presentation of the current one. Steal detection is implicit:
//! an expired lease is free for any caller's next acquire, which is what
//! lets the orchestrator's resume loop re-acquire on behalf of a new
//! worker after a crash.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use orchestrator_domain::entities::TaskLease;
use orchestrator_domain::error::Result;
use orchestrator_domain::repositories::StateStore;
use orchestrator_domain::value_objects::{LeaseId, PipelineId};

pub struct LeaseManager {
    store: Arc<dyn StateStore>,
}

/// Signals the foreground task to abort because its lease was stolen or a
/// renewal attempt failed outright.
#[derive(Clone, Default)]
pub struct LeaseLostSignal(Arc<Notify>);

impl LeaseLostSignal {
    pub fn new() -> Self {
        Self(Arc::new(Notify::new()))
    }

    pub async fn wait(&self) {
        self.0.notified().await;
    }

    fn fire(&self) {
        self.0.notify_waiters();
    }
}

impl LeaseManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn claim(&self, pipeline_id: PipelineId, lease: TaskLease) -> Result<bool> {
        self.store.acquire_task_lease(pipeline_id, lease).await
    }

    /// Spawns a background heartbeat that renews `lease_id` at `ttl_ms / 3`
    /// intervals until `stop` fires or a renewal observes the lease is no
    /// longer held by this worker, at which point `lost` is signalled and
    /// the loop exits. Returns the `lost` signal so the caller can race it
    /// against the actor invocation.
    pub fn spawn_heartbeat(&self, lease_id: LeaseId, ttl_ms: u64, stop: Arc<Notify>) -> LeaseLostSignal {
        let lost = LeaseLostSignal::new();
        let store = Arc::clone(&self.store);
        let interval = Duration::from_millis((ttl_ms / 3).max(1));
        let lost_handle = lost.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.notified() => return,
                }
                match store.renew_task_lease(lease_id, ttl_ms).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        warn!(%lease_id, "lease renewal rejected, another worker holds it");
                        lost_handle.fire();
                        return;
                    }
                    Err(e) => {
                        warn!(%lease_id, error = %e, "lease renewal failed");
                        lost_handle.fire();
                        return;
                    }
                }
            }
        });

        lost
    }

    pub async fn release(&self, lease_id: LeaseId) -> Result<()> {
        self.store.release_task_lease(lease_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lost_signal_wakes_waiter_on_fire() {
        let lost = LeaseLostSignal::new();
        let waiter = lost.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        lost.fire();
        tokio::time::timeout(Duration::from_millis(200), handle).await.expect("waiter should wake promptly").unwrap();
    }
}
