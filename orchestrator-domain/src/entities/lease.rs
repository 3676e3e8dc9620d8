// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Exclusive, TTL-bounded ownership of a task by one worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{LeaseId, StageName, TaskIndex};

/// A lease grants the holding worker exclusive rights to execute one task
/// until `expires_at`. A worker renews via heartbeat at roughly a third of
/// the TTL (see `LeaseManager`); a lease that is not renewed in time may be
/// stolen by another worker, at which point the original holder's next
/// write is rejected with `LeaseLost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLease {
    pub lease_id: LeaseId,
    pub stage_name: StageName,
    pub task_index: TaskIndex,
    pub worker_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TaskLease {
    pub fn new(stage_name: StageName, task_index: TaskIndex, worker_id: impl Into<String>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            lease_id: LeaseId::new(),
            stage_name,
            task_index,
            worker_id: worker_id.into(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at
    }

    pub fn renew(&mut self, ttl: chrono::Duration) {
        self.expires_at = Utc::now() + ttl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_expires_after_ttl() {
        let lease =
            TaskLease::new(StageName::from("detect"), TaskIndex::new(0), "worker-1", chrono::Duration::seconds(30));
        assert!(!lease.is_expired(lease.acquired_at));
        assert!(lease.is_expired(lease.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn renew_pushes_expiry_forward() {
        let mut lease =
            TaskLease::new(StageName::from("detect"), TaskIndex::new(0), "worker-1", chrono::Duration::seconds(10));
        let before = lease.expires_at;
        lease.renew(chrono::Duration::seconds(10));
        assert!(lease.expires_at >= before);
    }
}
