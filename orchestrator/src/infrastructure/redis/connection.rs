// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A single shared `redis::aio::ConnectionManager`, cheaply `Clone`-able and
//! self-reconnecting, handed to both the state store and the message queue
//! adapter.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;

#[derive(Clone)]
pub struct RedisConnection {
    pub(super) manager: ConnectionManager,
}

impl RedisConnection {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).with_context(|| format!("invalid redis url: {url}"))?;
        let manager = client.get_connection_manager().await.context("failed to connect to redis")?;
        Ok(Self { manager })
    }
}
