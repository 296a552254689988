//! Query identity and reuse caches
//!
//! This crate recognises when two query invocations are the same, reuses
//! translated plans and computed results across calls, and counts how often
//! each query runs.
//!
//! # Components
//!
//! - **QueryKey**: canonical identity of a compiled query plus its bound parameters
//! - **ResultCache**: query results keyed by `QueryKey`, with pinning and
//!   type-driven invalidation
//! - **PlanCache**: translated plans keyed by a stable query identifier
//! - **ExecutionStatistics**: per-query execution counters with reset support
//!
//! Each cache is an ordinary value. One instance of each is created per
//! executor and shared by reference (usually an `Arc`) with every caller.
//!
//! # Example
//!
//! ```ignore
//! use query_cache::{CacheConfig, ParameterBindings, QueryKey, ResultCache};
//!
//! let cache = ResultCache::new(&CacheConfig::default());
//! let key = QueryKey::derive(&compiled, &ParameterBindings::positional_values([42i64]))?;
//!
//! if let Some(rows) = cache.lookup(&key) {
//!     return Ok(rows);
//! }
//!
//! let rows = engine.execute(&plan)?;
//! cache.insert(key, rows, ["Employee"]);
//! ```

pub mod config;
pub mod invalidation;
pub mod key;
pub mod plan_cache;
pub mod result_cache;
pub mod statistics;
pub mod stats;

pub use config::CacheConfig;
pub use invalidation::{CacheInvalidator, InvalidationEvent};
pub use key::{BindingMode, CompiledQuery, CompiledQueryId, ParamSlot, ParameterBindings, QueryKey};
pub use plan_cache::{PlanCache, PreparedPlan, QueryInvocation, QueryShape};
pub use result_cache::ResultCache;
pub use statistics::{ExecutionStatistics, QueryExecutionCount, StatisticsSnapshot};
pub use stats::{CacheStats, CacheStatsSnapshot};
