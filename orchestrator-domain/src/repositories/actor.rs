// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The unit of user-supplied work, and the three ways the worker runtime
//! may be told how to obtain an instance of one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::value_objects::Value;

/// One actor type's business logic. `execute` receives the task's resolved
/// input and returns its output; any `Err` becomes a `failure` message,
/// never a panic or a re-raised transport error.
#[async_trait]
pub trait Actor: Send + Sync {
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// How the worker runtime obtains an `Actor` instance for a task. Chosen
/// per invocation so a context-taking factory can construct a fresh actor
/// scoped to the pipeline or task at hand, while a singleton factory
/// reuses one instance across every task of its type.
#[async_trait]
pub trait ActorFactory: Send + Sync {
    async fn create(&self, context: &Value) -> Result<Arc<dyn Actor>>;
}

/// Wraps an already-constructed, shared actor instance.
pub struct SingletonFactory(Arc<dyn Actor>);

impl SingletonFactory {
    pub fn new(actor: Arc<dyn Actor>) -> Self {
        Self(actor)
    }
}

#[async_trait]
impl ActorFactory for SingletonFactory {
    async fn create(&self, _context: &Value) -> Result<Arc<dyn Actor>> {
        Ok(self.0.clone())
    }
}

/// Wraps a zero-argument constructor, invoked fresh for every task.
pub struct DefaultConstructedFactory<F>(F)
where
    F: Fn() -> Arc<dyn Actor> + Send + Sync;

impl<F> DefaultConstructedFactory<F>
where
    F: Fn() -> Arc<dyn Actor> + Send + Sync,
{
    pub fn new(constructor: F) -> Self {
        Self(constructor)
    }
}

#[async_trait]
impl<F> ActorFactory for DefaultConstructedFactory<F>
where
    F: Fn() -> Arc<dyn Actor> + Send + Sync,
{
    async fn create(&self, _context: &Value) -> Result<Arc<dyn Actor>> {
        Ok((self.0)())
    }
}

/// Wraps a constructor that receives the task's evaluation context, so the
/// actor it produces may vary with the trigger or prior stage outputs.
pub struct ContextConstructedFactory<F>(F)
where
    F: Fn(&Value) -> Arc<dyn Actor> + Send + Sync;

impl<F> ContextConstructedFactory<F>
where
    F: Fn(&Value) -> Arc<dyn Actor> + Send + Sync,
{
    pub fn new(constructor: F) -> Self {
        Self(constructor)
    }
}

#[async_trait]
impl<F> ActorFactory for ContextConstructedFactory<F>
where
    F: Fn(&Value) -> Arc<dyn Actor> + Send + Sync,
{
    async fn create(&self, context: &Value) -> Result<Arc<dyn Actor>> {
        Ok((self.0)(context))
    }
}
