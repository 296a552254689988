//! Cached Query Executor
//!
//! Runs queries through the plan cache and the result cache before falling
//! back to the compiler and the execution engine.

use crate::engine::{ExecutionEngine, QueryCompiler};
use crate::request::QueryRequest;
use query_cache::{
    CacheConfig, CacheInvalidator, ExecutionStatistics, PlanCache, PreparedPlan, QueryKey,
    ResultCache,
};
use query_core::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// A query executor with plan and result caching
///
/// One executor owns one set of caches, shared by every caller holding a
/// reference to it.
pub struct CachingExecutor<C, E>
where
    C: QueryCompiler,
    E: ExecutionEngine<Plan = C::Plan, Invocation = C::Invocation>,
{
    compiler: C,
    engine: E,
    plan_cache: Arc<PlanCache<C::Plan>>,
    result_cache: Arc<ResultCache<E::Payload>>,
    statistics: Arc<ExecutionStatistics>,
    config: CacheConfig,
}

impl<C, E> CachingExecutor<C, E>
where
    C: QueryCompiler,
    E: ExecutionEngine<Plan = C::Plan, Invocation = C::Invocation>,
{
    /// Create an executor with fresh caches built from `config`
    pub fn new(compiler: C, engine: E, config: CacheConfig) -> Self {
        Self {
            compiler,
            engine,
            plan_cache: Arc::new(PlanCache::new(&config)),
            result_cache: Arc::new(ResultCache::new(&config)),
            statistics: Arc::new(ExecutionStatistics::new()),
            config,
        }
    }

    /// Create an executor with default configuration
    pub fn with_defaults(compiler: C, engine: E) -> Self {
        Self::new(compiler, engine, CacheConfig::default())
    }

    /// Create an executor over caches shared with other components
    pub fn with_caches(
        compiler: C,
        engine: E,
        plan_cache: Arc<PlanCache<C::Plan>>,
        result_cache: Arc<ResultCache<E::Payload>>,
        statistics: Arc<ExecutionStatistics>,
        config: CacheConfig,
    ) -> Self {
        Self {
            compiler,
            engine,
            plan_cache,
            result_cache,
            statistics,
            config,
        }
    }

    /// Execute a query, reusing a cached plan and a cached result when
    /// possible
    pub async fn execute(&self, request: &QueryRequest) -> Result<Arc<E::Payload>> {
        if self.config.statistics_enabled {
            self.statistics.record_execution(&request.text);
        }

        let identifier = self.compiler.plan_identifier(request);
        if request.hints.invalidate_plan {
            self.plan_cache.invalidate(&identifier);
        }

        let mut invocation = self.compiler.prepare(request)?;
        let prepared = self.prepared_plan(identifier, &mut invocation)?;

        let key = if request.hints.use_result_cache && self.result_cache.is_enabled() {
            match QueryKey::derive(&invocation, &request.bindings) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Executing {} uncached: {}", request.text, e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(payload) = self.result_cache.lookup(key) {
                debug!("Result cache hit for {}", key);
                if request.hints.pin_result {
                    self.result_cache.pin(key);
                }
                return Ok(payload);
            }
        }

        let outcome = self
            .engine
            .execute(prepared.plan(), &invocation, &request.bindings)
            .await?;

        match key {
            Some(key) => {
                let payload =
                    self.result_cache
                        .insert(key.clone(), outcome.payload, outcome.touched_types);
                if request.hints.pin_result {
                    self.result_cache.pin(&key);
                }
                Ok(payload)
            }
            None => Ok(Arc::new(outcome.payload)),
        }
    }

    /// Find the cached plan for `identifier` and re-apply its shape, or
    /// translate and cache a new one
    fn prepared_plan(
        &self,
        identifier: String,
        invocation: &mut C::Invocation,
    ) -> Result<Arc<PreparedPlan<C::Plan>>> {
        if let Some(prepared) = self.plan_cache.lookup(&identifier) {
            debug!("Plan cache hit for {}", identifier);
            if !prepared.is_projection() {
                self.plan_cache.apply_to(&prepared, invocation)?;
            }
            return Ok(prepared);
        }

        let translation = self.compiler.translate(invocation)?;
        Ok(self
            .plan_cache
            .insert_with_shape(identifier, translation.plan, translation.shape))
    }

    /// Evict every cached result that read from `entity_type`
    pub fn notify_modified(&self, entity_type: &str) -> usize {
        self.result_cache.invalidate_type(entity_type)
    }

    /// Drop the cached plan stored under `identifier`
    pub fn invalidate_plan(&self, identifier: &str) -> bool {
        self.plan_cache.invalidate(identifier)
    }

    /// Clear both caches, pinned results included
    pub fn clear_caches(&self) {
        self.plan_cache.clear();
        self.result_cache.clear();
    }

    pub fn plan_cache(&self) -> &Arc<PlanCache<C::Plan>> {
        &self.plan_cache
    }

    pub fn result_cache(&self) -> &Arc<ResultCache<E::Payload>> {
        &self.result_cache
    }

    pub fn statistics(&self) -> &Arc<ExecutionStatistics> {
        &self.statistics
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
