// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! One [`orchestrator_domain::repositories::StageExecutor`] implementation
//! per [`orchestrator_domain::ExecutionMode`].
//!
//! Readiness (whether a stage's predecessors are satisfied) is the
//! orchestrator service's job, not the executor's: by the time `plan` is
//! called, the caller has already decided the stage may run and has built
//! a context whose `stages` map holds whatever predecessor outputs are
//! relevant to that decision. Executors are pure given that context — no
//! executor holds a handle to the state store or message queue.

mod broadcast;
mod common;
mod fork_join;
mod gather;
mod scatter;
mod single;

pub use broadcast::BroadcastExecutor;
pub use fork_join::ForkJoinExecutor;
pub use gather::GatherExecutor;
pub use scatter::ScatterExecutor;
pub use single::SingleExecutor;

/// Re-exported for the orchestrator service's resume path, which needs to
/// re-resolve an actor type for an in-flight task attempt the same way a
/// fresh `plan()` call would.
pub(crate) use common::resolve_actor;

use orchestrator_domain::repositories::StageExecutor;

/// Returns the executor for a given mode. Stateless singletons are cheap
/// to construct per call; the orchestrator service may also cache one
/// instance of each behind an `Arc` if profiling ever calls for it.
pub fn executor_for(mode: orchestrator_domain::ExecutionMode) -> std::sync::Arc<dyn StageExecutor> {
    use orchestrator_domain::ExecutionMode::*;
    match mode {
        Single => std::sync::Arc::new(SingleExecutor::new()),
        Scatter => std::sync::Arc::new(ScatterExecutor::new()),
        Gather => std::sync::Arc::new(GatherExecutor::new()),
        Broadcast => std::sync::Arc::new(BroadcastExecutor::new()),
        ForkJoin => std::sync::Arc::new(ForkJoinExecutor::new()),
    }
}
