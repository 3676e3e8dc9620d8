// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Identifier Value Objects
//!
//! Strongly-typed identifiers so a pipeline id can never be passed where a
//! lease id is expected, even though both are ultimately strings on the
//! wire. `PipelineId` and `MessageId` are ULID-based so they sort in
//! creation order, which keeps Redis key scans and logs naturally ordered;
//! `LeaseId` is a UUID since lease identity carries no temporal meaning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

/// Identifies a single pipeline run. Time-ordered (ULID) so that
/// `pipelines:running` scans and logs sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineId(Ulid);

impl PipelineId {
    /// Generates a new, time-ordered pipeline id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PipelineId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Ulid::from_str(s)?))
    }
}

/// Identifies a single queue message (`execute` / `result` / `failure` /
/// `dead-letter`). Used for at-least-once duplicate suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Ulid);

impl MessageId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stage's unique-within-pipeline name. Newtype rather than a bare
/// `String` so stage lookups can't be confused with actor type names,
/// which share the same underlying representation but a different meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageName(String);

impl StageName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StageName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StageName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::borrow::Borrow<str> for StageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The zero-based position of a task within a stage's planned task list.
/// Task indices are assigned in emission order by the executor and never
/// reassigned; the stage output list is ordered by this index, not by
/// arrival time, which is what makes gather-over-scatter deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskIndex(usize);

impl TaskIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for TaskIndex {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// Identifies a single task lease. A lease is only renewable or releasable
/// by the holder presenting this id; see `StateStore::renew_task_lease`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseId(Uuid);

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_ids_sort_in_creation_order() {
        let a = PipelineId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = PipelineId::new();
        assert!(a < b);
    }

    #[test]
    fn stage_name_round_trips_through_display() {
        let name = StageName::new("detect");
        assert_eq!(name.to_string(), "detect");
        assert_eq!(name.as_str(), "detect");
    }

    #[test]
    fn pipeline_id_from_str_round_trips() {
        let id = PipelineId::new();
        let parsed: PipelineId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
