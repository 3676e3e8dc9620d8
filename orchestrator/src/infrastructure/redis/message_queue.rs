// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Redis-backed [`MessageQueueAdapter`]. Priority is three Redis lists per
//! queue name (`:p0` high, `:p1` normal, `:p2` low); `BLPOP` against all
//! three in that order pops from the highest-priority non-empty list, so
//! priority falls out of key ordering rather than any client-side logic.
//! Delayed redelivery (always high priority, per the port doc) lives in a
//! sorted set drained by [`scripts::DRAIN_DELAYED`].

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tokio::sync::Notify;
use tracing::{instrument, warn};

use orchestrator_domain::repositories::{MessageHandler, MessageQueueAdapter, Priority};
use orchestrator_domain::{OrchestratorError, PipelineMessage};

use super::connection::RedisConnection;
use super::keys;
use super::scripts;

const POLL_TIMEOUT_SECS: f64 = 1.0;
const DEAD_LETTER_SUFFIX: &str = ":dlq";

fn transient(e: redis::RedisError) -> OrchestratorError {
    OrchestratorError::StorageTransient(e.to_string())
}

fn serialize(message: &PipelineMessage) -> Result<String, OrchestratorError> {
    serde_json::to_string(message).map_err(OrchestratorError::from)
}

fn deserialize(raw: &str) -> Result<PipelineMessage, OrchestratorError> {
    serde_json::from_str(raw).map_err(OrchestratorError::from)
}

/// Local stand-in for a cancellation token: tells every spawned consumer
/// loop to stop after its current poll. Not shared with the bootstrap
/// crate's own coordinator so infrastructure never depends upward on it;
/// `shutdown` is wired to it from the binary's shutdown path instead.
#[derive(Clone)]
struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    fn new() -> Self {
        Self { stopped: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct RedisMessageQueue {
    conn: RedisConnection,
    stop: StopSignal,
}

impl RedisMessageQueue {
    pub fn new(conn: RedisConnection) -> Self {
        Self { conn, stop: StopSignal::new() }
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.conn.manager.clone()
    }

    /// Signals every consumer spawned by `register_worker` to stop after
    /// its current poll cycle.
    pub fn shutdown(&self) {
        self.stop.stop();
    }
}

#[async_trait]
impl MessageQueueAdapter for RedisMessageQueue {
    #[instrument(skip(self, message))]
    async fn enqueue(&self, queue_name: &str, message: PipelineMessage, priority: Priority) -> orchestrator_domain::error::Result<()> {
        let mut conn = self.conn();
        let first_seen: bool = conn
            .hset_nx(keys::queue_seen(queue_name), message.message_id.to_string(), 1)
            .await
            .map_err(transient)?;
        if !first_seen {
            return Ok(());
        }
        let payload = serialize(&message)?;
        let _: () = conn.rpush(keys::queue_priority_list(queue_name, priority), payload).await.map_err(transient)?;
        Ok(())
    }

    #[instrument(skip(self, message))]
    async fn enqueue_delayed(&self, queue_name: &str, message: PipelineMessage, delay_ms: u64) -> orchestrator_domain::error::Result<()> {
        let mut conn = self.conn();
        let first_seen: bool = conn
            .hset_nx(keys::queue_seen(queue_name), message.message_id.to_string(), 1)
            .await
            .map_err(transient)?;
        if !first_seen {
            return Ok(());
        }
        let payload = serialize(&message)?;
        let due_at_ms = Utc::now().timestamp_millis() + delay_ms as i64;
        let _: () = conn.zadd(keys::queue_delayed(queue_name), payload, due_at_ms).await.map_err(transient)?;
        Ok(())
    }

    async fn register_worker(
        self: Arc<Self>,
        queue_name: &str,
        concurrency: usize,
        handler: MessageHandler,
    ) -> orchestrator_domain::error::Result<Pin<Box<dyn std::future::Future<Output = ()> + Send>>> {
        let handler = Arc::new(handler);
        let queue_name = queue_name.to_string();

        let mut handles = Vec::with_capacity(concurrency);
        for worker_index in 0..concurrency {
            let this = Arc::clone(&self);
            let handler = Arc::clone(&handler);
            let queue_name = queue_name.clone();
            handles.push(tokio::spawn(async move {
                this.consume_loop(&queue_name, worker_index, handler).await;
            }));
        }

        Ok(Box::pin(async move {
            for handle in handles {
                let _ = handle.await;
            }
        }))
    }

    #[instrument(skip(self, message))]
    async fn dead_letter(&self, queue_name: &str, message: PipelineMessage) -> orchestrator_domain::error::Result<()> {
        let payload = serialize(&message)?;
        let dlq_key = format!("{queue_name}{DEAD_LETTER_SUFFIX}");
        let _: () = self.conn().rpush(dlq_key, payload).await.map_err(transient)?;
        Ok(())
    }

    async fn list_dead_letter(&self, queue_name: &str, limit: usize) -> orchestrator_domain::error::Result<Vec<PipelineMessage>> {
        let dlq_key = format!("{queue_name}{DEAD_LETTER_SUFFIX}");
        let raw: Vec<String> = self.conn().lrange(dlq_key, 0, limit.saturating_sub(1) as isize).await.map_err(transient)?;
        raw.iter().map(|s| deserialize(s)).collect()
    }
}

impl RedisMessageQueue {
    async fn consume_loop(&self, queue_name: &str, worker_index: usize, handler: Arc<MessageHandler>) {
        let high = keys::queue_priority_list(queue_name, Priority::High);
        let normal = keys::queue_priority_list(queue_name, Priority::Normal);
        let low = keys::queue_priority_list(queue_name, Priority::Low);
        let delayed = keys::queue_delayed(queue_name);
        let mut conn = self.conn();

        while !self.stop.is_stopped() {
            let due_ms = Utc::now().timestamp_millis();
            if let Err(e) = scripts::DRAIN_DELAYED
                .key(delayed.clone())
                .key(high.clone())
                .arg(due_ms)
                .invoke_async::<i64>(&mut conn)
                .await
            {
                warn!(queue = queue_name, worker = worker_index, error = %e, "failed to drain delayed queue");
            }

            let popped: Option<(String, String)> =
                match conn.blpop(vec![high.clone(), normal.clone(), low.clone()], POLL_TIMEOUT_SECS).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(queue = queue_name, worker = worker_index, error = %e, "blpop failed, backing off");
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                        continue;
                    }
                };

            let Some((_, payload)) = popped else { continue };
            let message = match deserialize(&payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!(queue = queue_name, worker = worker_index, error = %e, "dropping undecodable message");
                    continue;
                }
            };

            if let Err(e) = (handler)(message).await {
                warn!(queue = queue_name, worker = worker_index, error = %e, "handler returned an error");
            }
        }
    }
}
