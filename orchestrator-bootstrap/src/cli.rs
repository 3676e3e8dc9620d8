// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface Module
//!
//! Bootstrap-layer CLI handling with security-first design.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  1. Cli::parse()                    │  Parse CLI with clap
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  2. validate_cli()                  │  Security validation
//! └─────────────────┬───────────────────┘
//!                   ↓
//! ┌─────────────────────────────────────┐
//! │  3. ValidatedCli                    │  Safe, validated config
//! └─────────────────────────────────────┘
//! ```
//!
//! This crate is domain-agnostic: `ValidatedCommand` carries string/path
//! arguments only. Parsing a pipeline id string into
//! `orchestrator_domain::PipelineId` is the `orchestrator` binary's job.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("argument contains disallowed characters: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejects shell metacharacters and path-traversal sequences in
/// free-form string arguments (pipeline ids, actor type names, reasons).
pub struct SecureArgParser;

impl SecureArgParser {
    const DISALLOWED: &'static [char] = &[';', '|', '&', '$', '`', '\n', '\r', '\0'];

    pub fn validate_argument(value: &str) -> Result<(), ParseError> {
        if value.is_empty() {
            return Err(ParseError::InvalidArgument("must not be empty".to_string()));
        }
        if value.contains("..") || value.chars().any(|c| Self::DISALLOWED.contains(&c)) {
            return Err(ParseError::InvalidArgument(value.to_string()));
        }
        Ok(())
    }

    /// Validates and canonicalizes a path that must already exist.
    pub fn validate_path(raw: &str) -> Result<PathBuf, ParseError> {
        Self::validate_argument(raw)?;
        let path = PathBuf::from(raw);
        path.canonicalize().map_err(|_| ParseError::PathNotFound(path))
    }
}

#[derive(Debug, Parser)]
#[command(name = "orchestrator", about = "Durable DAG pipeline orchestration core", version)]
pub struct Cli {
    /// Path to a layered configuration file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submits a pipeline definition (YAML/TOML/JSON) for execution.
    Submit {
        definition: PathBuf,
        /// Optional JSON file supplying the trigger value; defaults to `{}`.
        #[arg(long)]
        trigger: Option<PathBuf>,
    },
    /// Requests cooperative cancellation of a running pipeline.
    Cancel {
        pipeline_id: String,
        #[arg(long, default_value = "cancelled by operator")]
        reason: String,
    },
    /// Prints a pipeline's current status and stage ledger.
    Status { pipeline_id: String },
    /// Resumes every pipeline not yet in a terminal status.
    Resume,
    /// Runs the actor worker pool for the given actor types.
    Worker {
        #[arg(long = "actor", required = true)]
        actor_types: Vec<String>,
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Runs the orchestrator scheduler loop and metrics endpoint.
    Serve,
}

#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Submit { definition: PathBuf, trigger: Option<PathBuf> },
    Cancel { pipeline_id: String, reason: String },
    Status { pipeline_id: String },
    Resume,
    Worker { actor_types: Vec<String>, concurrency: usize },
    Serve,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    validate_cli(parse_cli())
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = match &cli.config {
        Some(path) => {
            SecureArgParser::validate_argument(&path.to_string_lossy())?;
            Some(path.clone())
        }
        None => None,
    };

    let command = match cli.command {
        Commands::Submit { definition, trigger } => {
            let validated_definition = SecureArgParser::validate_path(&definition.to_string_lossy())?;
            let validated_trigger = trigger.map(|p| SecureArgParser::validate_path(&p.to_string_lossy())).transpose()?;
            ValidatedCommand::Submit { definition: validated_definition, trigger: validated_trigger }
        }
        Commands::Cancel { pipeline_id, reason } => {
            SecureArgParser::validate_argument(&pipeline_id)?;
            SecureArgParser::validate_argument(&reason)?;
            ValidatedCommand::Cancel { pipeline_id, reason }
        }
        Commands::Status { pipeline_id } => {
            SecureArgParser::validate_argument(&pipeline_id)?;
            ValidatedCommand::Status { pipeline_id }
        }
        Commands::Resume => ValidatedCommand::Resume,
        Commands::Worker { actor_types, concurrency } => {
            if actor_types.is_empty() {
                return Err(ParseError::InvalidValue {
                    arg: "actor".to_string(),
                    reason: "at least one --actor is required".to_string(),
                });
            }
            for actor_type in &actor_types {
                SecureArgParser::validate_argument(actor_type)?;
            }
            if concurrency == 0 || concurrency > 1024 {
                return Err(ParseError::InvalidValue {
                    arg: "concurrency".to_string(),
                    reason: "must be between 1 and 1024".to_string(),
                });
            }
            ValidatedCommand::Worker { actor_types, concurrency }
        }
        Commands::Serve => ValidatedCommand::Serve,
    };

    Ok(ValidatedCli { command, verbose: cli.verbose, config })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(SecureArgParser::validate_argument("pipe; rm -rf /").is_err());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(SecureArgParser::validate_argument("../../etc/passwd").is_err());
    }

    #[test]
    fn accepts_plain_pipeline_id() {
        assert!(SecureArgParser::validate_argument("01HZXK2Q6J9TN3S6Y8F6R6Z5E1").is_ok());
    }

    #[test]
    fn worker_requires_at_least_one_actor() {
        let cli = Cli {
            config: None,
            verbose: false,
            command: Commands::Worker { actor_types: Vec::new(), concurrency: 4 },
        };
        assert!(validate_cli(cli).is_err());
    }
}
