// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Retry backoff strategy for failed task attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The shape of the delay curve between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// A constant delay between every retry.
    Fixed,
    /// `base * 2^(retry_attempt - 1)`, capped at `max_delay`.
    Exponential,
}

/// Computes the delay before the given retry attempt, per §4.5:
/// `fixed` is a constant delay; `exponential` is `base * multiplier^(n-1)`,
/// capped at `max_delay`.
///
/// `retry_attempt` is 1-based: the delay before the *first* retry is
/// computed with `retry_attempt == 1`.
pub fn compute_delay(kind: BackoffKind, retry_attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    compute_delay_with_multiplier(kind, retry_attempt, base_delay, max_delay, 2.0)
}

/// As [`compute_delay`], but with an explicit exponential multiplier
/// (defaults to 2.0 when callers use [`compute_delay`] directly).
pub fn compute_delay_with_multiplier(
    kind: BackoffKind,
    retry_attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
) -> Duration {
    let delay = match kind {
        BackoffKind::Fixed => base_delay,
        BackoffKind::Exponential => {
            let exponent = retry_attempt.saturating_sub(1) as i32;
            let factor = multiplier.powi(exponent);
            Duration::from_secs_f64((base_delay.as_secs_f64() * factor).max(0.0))
        }
    };
    delay.min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_is_constant() {
        let base = Duration::from_millis(10);
        let max = Duration::from_secs(1);
        assert_eq!(compute_delay(BackoffKind::Fixed, 1, base, max), base);
        assert_eq!(compute_delay(BackoffKind::Fixed, 5, base, max), base);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(350);
        assert_eq!(compute_delay(BackoffKind::Exponential, 1, base, max), Duration::from_millis(100));
        assert_eq!(compute_delay(BackoffKind::Exponential, 2, base, max), Duration::from_millis(200));
        // 400ms would be the uncapped value for retry 3; capped at max.
        assert_eq!(compute_delay(BackoffKind::Exponential, 3, base, max), Duration::from_millis(350));
    }
}
