// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Mapping
//!
//! Maps application errors to the `sysexits.h` convention so shell callers
//! and process supervisors can branch on failure class without parsing
//! log output.

use std::process::ExitCode as StdExitCode;

use crate::cli::ParseError;

/// Unix-style exit codes, following the `sysexits.h` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful termination.
    Ok = 0,
    /// Catchall for uncategorized errors.
    Software = 70,
    /// Input data was incorrect in some way (bad CLI args, bad pipeline
    /// definition).
    DataErr = 65,
    /// Input file did not exist or was not readable.
    NoInput = 66,
    /// A required external service (Redis) was unavailable.
    Unavailable = 69,
    /// Something isn't configured correctly.
    Config = 78,
    /// Operation cancelled by a shutdown signal before completion.
    Interrupted = 130,
}

impl From<ExitCode> for StdExitCode {
    fn from(code: ExitCode) -> Self {
        StdExitCode::from(code as u8)
    }
}

impl From<&ParseError> for ExitCode {
    fn from(err: &ParseError) -> Self {
        match err {
            ParseError::PathNotFound(_) => ExitCode::NoInput,
            ParseError::InvalidValue { .. } | ParseError::InvalidArgument(_) => ExitCode::DataErr,
            ParseError::Io(_) => ExitCode::Unavailable,
        }
    }
}

/// Maps an application-level error to an [`ExitCode`] using its textual
/// rendering as a coarse classifier. Callers with a typed error should
/// prefer a direct `From` impl; this is the fallback used for `anyhow`
/// chains at the top of `main`.
pub fn map_error_to_exit_code(err: &(dyn std::error::Error + 'static)) -> ExitCode {
    let message = err.to_string().to_lowercase();
    if message.contains("connection") || message.contains("unavailable") || message.contains("timed out") {
        ExitCode::Unavailable
    } else if message.contains("config") {
        ExitCode::Config
    } else if message.contains("not found") || message.contains("no such file") {
        ExitCode::NoInput
    } else {
        ExitCode::Software
    }
}

/// Converts an application `Result` into a process exit code, logging the
/// error (if any) before returning.
pub fn result_to_exit_code<T, E>(result: Result<T, E>) -> StdExitCode
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(_) => StdExitCode::from(ExitCode::Ok),
        Err(e) => {
            tracing::error!(error = %e, "application exited with an error");
            StdExitCode::from(map_error_to_exit_code(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("redis connection unavailable")]
    struct FakeConnError;

    #[test]
    fn classifies_connection_errors_as_unavailable() {
        assert_eq!(map_error_to_exit_code(&FakeConnError), ExitCode::Unavailable);
    }

    #[test]
    fn ok_result_maps_to_zero() {
        let result: Result<(), FakeConnError> = Ok(());
        assert_eq!(result_to_exit_code(result), StdExitCode::from(0));
    }
}
