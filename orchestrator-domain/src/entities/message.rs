// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! [`PipelineMessage`] is the sole envelope carried on every named queue:
//! actor dispatch (`execute`), task completion (`result`), task failure
//! (`failure`), and dead-letter archival (`dead-letter`) all share this
//! shape, distinguished by `message_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::RetryPolicy;
use crate::value_objects::{LeaseId, MessageId, PipelineId, StageName, TaskIndex, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Execute,
    Result,
    Failure,
    DeadLetter,
}

/// The payload carried by a [`PipelineMessage`]. Not every field is
/// populated for every `MessageType`: an `execute` message carries `input`
/// and `lease_*`; a `result` carries `output`; a `failure`/`dead-letter`
/// carries `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub pipeline_id: PipelineId,
    pub stage_name: StageName,
    pub task_index: TaskIndex,
    pub actor_type: String,
    pub attempt: u32,
    pub retry_attempt: u32,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub lease_id: Option<LeaseId>,
    #[serde(default)]
    pub lease_ttl_ms: Option<u64>,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

/// The sole envelope on all queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub message_id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub message_type: MessageType,
    pub payload: MessagePayload,
    pub timestamp: DateTime<Utc>,
}

impl PipelineMessage {
    pub fn execute(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            message_id: MessageId::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type: MessageType::Execute,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn result(sender: impl Into<String>, recipient: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            message_id: MessageId::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type: MessageType::Result,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(sender: impl Into<String>, recipient: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            message_id: MessageId::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            message_type: MessageType::Failure,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Re-stamps an existing message as a dead-letter entry, preserving its
    /// original `message_id` so duplicate suppression still applies if the
    /// archival write is retried.
    pub fn into_dead_letter(mut self) -> Self {
        self.message_type = MessageType::DeadLetter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> MessagePayload {
        MessagePayload {
            pipeline_id: PipelineId::new(),
            stage_name: StageName::from("detect"),
            task_index: TaskIndex::new(0),
            actor_type: "Detector".to_string(),
            attempt: 1,
            retry_attempt: 0,
            input: Some(Value::Null),
            output: None,
            error: None,
            lease_id: None,
            lease_ttl_ms: None,
            retry_policy: None,
        }
    }

    #[test]
    fn failure_into_dead_letter_preserves_message_id() {
        let msg = PipelineMessage::failure("worker-1", "actor-Detector:dlq", payload());
        let id = msg.message_id;
        let dead = msg.into_dead_letter();
        assert_eq!(dead.message_id, id);
        assert_eq!(dead.message_type, MessageType::DeadLetter);
    }
}
