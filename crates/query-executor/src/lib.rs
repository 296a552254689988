//! Cached query execution
//!
//! Wires the plan cache, result cache and execution statistics around a
//! query compiler and an execution engine supplied by the caller.

pub mod cached_executor;
pub mod engine;
pub mod request;

pub use cached_executor::CachingExecutor;
pub use engine::{ExecutionEngine, ExecutionOutcome, QueryCompiler, Translation};
pub use request::{ExecutionHints, QueryRequest};
