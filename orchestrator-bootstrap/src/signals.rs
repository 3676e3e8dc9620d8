// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Listens for `SIGTERM`/`SIGINT`/`SIGHUP` on Unix (and Ctrl+C on Windows)
//! and drives the process's [`ShutdownCoordinator`] from them, so the
//! scheduler loop and worker pool get one cooperative cancellation signal
//! regardless of which OS-level signal arrived.

use crate::shutdown::ShutdownCoordinator;

/// Awaits the first termination signal the platform delivers, then
/// initiates graceful shutdown on `coordinator`. Returns once the signal
/// has been observed; callers typically `tokio::select!` this against
/// their own main loop.
pub async fn wait_for_shutdown_signal(coordinator: &ShutdownCoordinator) {
    wait_for_any_signal().await;
    coordinator.initiate_shutdown();
}

#[cfg(unix)]
async fn wait_for_any_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
        _ = sighup.recv() => tracing::info!("received SIGHUP"),
    }
}

#[cfg(windows)]
async fn wait_for_any_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received Ctrl+C");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// `wait_for_shutdown_signal` itself blocks on a real OS signal, which
    /// isn't safe to simulate by signalling the test process (it would
    /// take down the whole test binary). This exercises the half that is
    /// under our control: the coordinator reacts correctly once a signal
    /// has been observed.
    #[tokio::test]
    async fn coordinator_initiate_shutdown_wakes_waiters() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let token = coordinator.token();
        assert!(!token.is_cancelled());

        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_millis(200), token.cancelled()).await.expect("token should be cancelled promptly");
        assert!(token.is_cancelled());
    }
}
