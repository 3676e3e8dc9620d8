// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Named-queue abstraction with at-least-once delivery and priority. The
//! orchestrator and every actor worker share one adapter instance; no
//! other transport is permitted.

use std::pin::Pin;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::entities::PipelineMessage;
use crate::error::Result;

/// Lower numeric value dispatches first. `Normal` is the default priority
/// for ordinary task dispatch; `High` is used for delayed-retry
/// redelivery so retries don't queue behind a backlog of first attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

/// A message handler invoked once per received message by a queue
/// consumer. Returning `Err` must *not* trigger automatic redelivery —
/// retries are solely the application's responsibility, driven by the
/// orchestrator's retry policy.
pub type MessageHandler = Box<dyn Fn(PipelineMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[async_trait]
pub trait MessageQueueAdapter: Send + Sync {
    /// Idempotent when `message.message_id` has already been enqueued on
    /// this queue (duplicate suppression).
    async fn enqueue(&self, queue_name: &str, message: PipelineMessage, priority: Priority) -> Result<()>;

    /// Enqueues for delivery no earlier than `delay_ms` from now — the
    /// retry backoff primitive.
    async fn enqueue_delayed(&self, queue_name: &str, message: PipelineMessage, delay_ms: u64) -> Result<()>;

    /// Spawns up to `concurrency` cooperatively-scheduled consumers, each
    /// receiving one message at a time. Returns a handle future that
    /// completes when every consumer has stopped (typically on shutdown
    /// signal).
    async fn register_worker(
        self: std::sync::Arc<Self>,
        queue_name: &str,
        concurrency: usize,
        handler: MessageHandler,
    ) -> Result<Pin<Box<dyn std::future::Future<Output = ()> + Send>>>;

    /// Writes an archive entry to the queue's dead-letter side list.
    async fn dead_letter(&self, queue_name: &str, message: PipelineMessage) -> Result<()>;

    async fn list_dead_letter(&self, queue_name: &str, limit: usize) -> Result<Vec<PipelineMessage>>;
}
