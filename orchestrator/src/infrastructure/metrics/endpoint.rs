// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Endpoint HTTP Server
//!
//! A lightweight `/metrics` and `/health` HTTP server, hand-rolled over
//! `tokio::net::TcpListener` rather than pulling in a web framework — the
//! request shape is fixed and tiny enough that parsing the request line by
//! hand is simpler than wiring up a router.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::infrastructure::metrics::MetricsService;

/// Serves Prometheus metrics and a liveness check over plain HTTP.
///
/// # Endpoints
///
/// - `GET /metrics` - Prometheus text exposition format
/// - `GET /health` - `200 OK` with body `OK`
/// - anything else - `404 Not Found`
pub struct MetricsEndpoint {
    metrics_service: Arc<MetricsService>,
    port: u16,
}

impl MetricsEndpoint {
    pub fn new(metrics_service: Arc<MetricsService>, port: u16) -> Self {
        Self { metrics_service, port }
    }

    /// Binds and serves forever, spawning one task per accepted connection.
    pub async fn start(&self) -> anyhow::Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("prometheus metrics endpoint listening on http://{}/metrics", addr);

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics_service = self.metrics_service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, metrics_service).await {
                            error!("error handling metrics request: {}", e);
                        }
                    });
                }
                Err(e) => error!("error accepting metrics connection: {}", e),
            }
        }
    }
}

async fn handle_request(
    stream: &mut tokio::net::TcpStream,
    metrics_service: Arc<MetricsService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = [0; 1024];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    debug!("metrics endpoint request: {}", request.lines().next().unwrap_or(""));

    if request.starts_with("GET /metrics") {
        match metrics_service.render() {
            Ok(body) => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: \
                     {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
            Err(e) => {
                let body = format!("error rendering metrics: {}", e);
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: \
                     {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
        }
    } else if request.starts_with("GET /health") {
        stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK").await?;
    } else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nNot Found")
            .await?;
    }

    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn endpoint_binds_to_an_ephemeral_port() {
        let metrics_service = Arc::new(MetricsService::new().unwrap());
        let endpoint = MetricsEndpoint::new(metrics_service, 0);
        let addr = "0.0.0.0:0";
        let listener = TcpListener::bind(addr).await.unwrap();
        drop(listener);
        drop(endpoint);
    }
}
