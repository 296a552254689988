//! Collaborators of the caching executor
//!
//! The compiler turns query text into an invocation and a translated plan;
//! the engine runs a plan. Both are opaque to the caches.

use crate::request::QueryRequest;
use async_trait::async_trait;
use query_cache::{CompiledQuery, ParameterBindings, QueryInvocation, QueryShape};
use query_core::Result;

/// Output of translating a compiled query
#[derive(Debug, Clone)]
pub struct Translation<P> {
    pub plan: P,
    pub shape: QueryShape,
}

/// Output of running a plan
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<T> {
    pub payload: T,
    /// Entity types the result was read from
    pub touched_types: Vec<String>,
}

impl<T> ExecutionOutcome<T> {
    pub fn new<I, S>(payload: T, touched_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            payload,
            touched_types: touched_types.into_iter().map(Into::into).collect(),
        }
    }
}

/// Query compiler
pub trait QueryCompiler: Send + Sync {
    type Plan: Send + Sync;
    type Invocation: CompiledQuery + QueryInvocation + Send + Sync;

    /// Stable identifier under which the translated plan is cached. Covers
    /// the query text and whatever context changes the translation.
    fn plan_identifier(&self, request: &QueryRequest) -> String;

    /// Build a fresh invocation for `request`
    fn prepare(&self, request: &QueryRequest) -> Result<Self::Invocation>;

    /// Translate an invocation into an executable plan
    fn translate(&self, invocation: &Self::Invocation) -> Result<Translation<Self::Plan>>;
}

/// Storage engine that runs translated plans
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    type Plan: Send + Sync;
    type Invocation: Send + Sync;
    type Payload: Send + Sync;

    async fn execute(
        &self,
        plan: &Self::Plan,
        invocation: &Self::Invocation,
        bindings: &ParameterBindings,
    ) -> Result<ExecutionOutcome<Self::Payload>>;
}
