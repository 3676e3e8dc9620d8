// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The `PipelineAggregate` is the single consistency boundary for one
//! pipeline run: it owns the frontier transition rules and raises the
//! domain events the state store persists.

mod pipeline_aggregate;

pub use pipeline_aggregate::PipelineAggregate;
