//! Prepared plan cache
//!
//! Maps a stable query identifier to a translated plan plus the result shape
//! needed to re-apply it to a new invocation, so repeated queries skip
//! translation.
//!
//! # Stale plans
//!
//! The cache never checks whether a stored plan still matches the execution
//! context. If the same identifier is executed under a lock mode or fetch
//! configuration that would translate differently, the stored plan is
//! returned as-is. Callers that know a plan is no longer valid must call
//! [`PlanCache::invalidate`] (the executor does this for the
//! `invalidate_plan` hint) before the next lookup.

use crate::config::CacheConfig;
use crate::stats::CacheStats;
use ahash::RandomState;
use dashmap::DashMap;
use query_core::{QueryError, Result};
use std::sync::Arc;
use tracing::debug;

/// Result shape recorded at translation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryShape {
    /// Entity type the query returns
    pub candidate_type: String,
    /// Whether instances of subclasses are returned as well
    pub include_subclasses: bool,
    /// Whether the query returns selected expressions rather than entities
    pub projection: bool,
}

impl QueryShape {
    /// Shape of a query returning entities of `candidate_type`
    pub fn candidate(candidate_type: impl Into<String>, include_subclasses: bool) -> Self {
        Self {
            candidate_type: candidate_type.into(),
            include_subclasses,
            projection: false,
        }
    }

    /// Shape of a projection query
    pub fn projection(candidate_type: impl Into<String>) -> Self {
        Self {
            candidate_type: candidate_type.into(),
            include_subclasses: false,
            projection: true,
        }
    }
}

/// A translated plan ready to run again
#[derive(Debug)]
pub struct PreparedPlan<P> {
    identifier: String,
    plan: Arc<P>,
    shape: QueryShape,
}

impl<P> PreparedPlan<P> {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn plan(&self) -> &Arc<P> {
        &self.plan
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    pub fn is_projection(&self) -> bool {
        self.shape.projection
    }
}

/// A fresh query invocation whose result shape can be set from a cached plan
pub trait QueryInvocation {
    fn set_result_shape(&mut self, candidate_type: &str, include_subclasses: bool);
}

/// Thread-safe cache of translated plans
pub struct PlanCache<P> {
    plans: DashMap<String, Arc<PreparedPlan<P>>, RandomState>,
    enabled: bool,
    stats: Arc<CacheStats>,
}

impl<P> PlanCache<P> {
    /// Create a plan cache from the given configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            plans: DashMap::with_capacity_and_hasher(config.initial_capacity, RandomState::new()),
            enabled: config.plan_cache_enabled,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(&CacheConfig::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up the plan stored under `identifier`
    pub fn lookup(&self, identifier: &str) -> Option<Arc<PreparedPlan<P>>> {
        if !self.enabled {
            return None;
        }

        match self.plans.get(identifier) {
            Some(plan) => {
                self.stats.record_hit();
                Some(Arc::clone(plan.value()))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Store a translated plan, replacing any plan already stored under the
    /// same identifier.
    pub fn insert(
        &self,
        identifier: impl Into<String>,
        plan: P,
        candidate_type: impl Into<String>,
        include_subclasses: bool,
        projection: bool,
    ) -> Arc<PreparedPlan<P>> {
        let shape = QueryShape {
            candidate_type: candidate_type.into(),
            include_subclasses,
            projection,
        };
        self.insert_with_shape(identifier, plan, shape)
    }

    /// Store a translated plan with an already built [`QueryShape`]
    pub fn insert_with_shape(
        &self,
        identifier: impl Into<String>,
        plan: P,
        shape: QueryShape,
    ) -> Arc<PreparedPlan<P>> {
        let identifier = identifier.into();
        let prepared = Arc::new(PreparedPlan {
            identifier: identifier.clone(),
            plan: Arc::new(plan),
            shape,
        });
        if !self.enabled {
            return prepared;
        }

        if self.plans.insert(identifier, Arc::clone(&prepared)).is_some() {
            debug!("Replaced prepared plan {}", prepared.identifier);
        }
        self.stats.record_insertion();
        prepared
    }

    /// Drop the plan stored under `identifier`. Returns `true` if one was
    /// removed; an absent identifier is not an error.
    pub fn invalidate(&self, identifier: &str) -> bool {
        let removed = self.plans.remove(identifier).is_some();
        if removed {
            self.stats.record_evictions(1);
            debug!("Invalidated prepared plan {}", identifier);
        }
        removed
    }

    /// Drop every stored plan
    pub fn clear(&self) {
        let count = self.plans.len();
        self.plans.clear();
        self.stats.record_evictions(count as u64);
    }

    /// Re-apply a cached plan's result shape to a fresh invocation.
    ///
    /// A projection's shape comes from its select clause, so applying a
    /// projection plan is rejected and the invocation is left untouched.
    pub fn apply_to(
        &self,
        plan: &PreparedPlan<P>,
        invocation: &mut dyn QueryInvocation,
    ) -> Result<()> {
        if plan.shape.projection {
            return Err(QueryError::ShapeApplication(format!(
                "plan {} is a projection; candidate type {} cannot be applied",
                plan.identifier, plan.shape.candidate_type
            )));
        }

        invocation.set_result_shape(&plan.shape.candidate_type, plan.shape.include_subclasses);
        Ok(())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.plans.contains_key(identifier)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

impl<P> Default for PlanCache<P> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<P> std::fmt::Debug for PlanCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache")
            .field("enabled", &self.enabled)
            .field("plans", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Debug, Default)]
    struct Invocation {
        candidate_type: Option<String>,
        include_subclasses: bool,
    }

    impl QueryInvocation for Invocation {
        fn set_result_shape(&mut self, candidate_type: &str, include_subclasses: bool) {
            self.candidate_type = Some(candidate_type.to_string());
            self.include_subclasses = include_subclasses;
        }
    }

    #[test]
    fn test_insert_lookup() {
        let cache = PlanCache::with_defaults();
        cache.insert("SELECT e FROM Employee e", "sql-1", "Employee", true, false);

        let plan = cache.lookup("SELECT e FROM Employee e").unwrap();
        assert_eq!(**plan.plan(), "sql-1");
        assert_eq!(plan.shape(), &QueryShape::candidate("Employee", true));
        assert!(cache.lookup("SELECT d FROM Department d").is_none());
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn test_insert_overwrites() {
        let cache = PlanCache::with_defaults();
        cache.insert("q", "first", "Employee", false, false);
        cache.insert("q", "second", "Employee", false, false);

        assert_eq!(**cache.lookup("q").unwrap().plan(), "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_lifecycle() {
        let cache = PlanCache::with_defaults();
        assert!(!cache.invalidate("q"));

        cache.insert("q", 1, "Employee", false, false);
        assert!(cache.contains("q"));

        assert!(cache.invalidate("q"));
        assert!(cache.lookup("q").is_none());

        cache.insert("q", 2, "Employee", false, false);
        assert_eq!(**cache.lookup("q").unwrap().plan(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = PlanCache::with_defaults();
        cache.insert("a", 1, "A", false, false);
        cache.insert("b", 2, "B", false, true);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions(), 2);
    }

    #[test]
    fn test_apply_to_sets_candidate() {
        let cache = PlanCache::with_defaults();
        let plan = cache.insert("q", (), "Employee", true, false);
        let mut invocation = Invocation::default();

        cache.apply_to(&plan, &mut invocation).unwrap();

        assert_eq!(invocation.candidate_type.as_deref(), Some("Employee"));
        assert!(invocation.include_subclasses);
    }

    #[test]
    fn test_apply_to_projection_is_rejected() {
        let cache = PlanCache::with_defaults();
        let plan = cache.insert("q", (), "Employee", true, true);
        let mut invocation = Invocation::default();

        let err = cache.apply_to(&plan, &mut invocation).unwrap_err();

        assert!(matches!(err, QueryError::ShapeApplication(_)));
        assert!(invocation.candidate_type.is_none());
        assert!(!invocation.include_subclasses);
    }

    #[test]
    fn test_stale_plan_returned_until_invalidated() {
        let cache = PlanCache::with_defaults();
        cache.insert("SELECT e FROM Employee e", "no-lock", "Employee", false, false);

        // Same text under a different lock mode still finds the old plan
        let plan = cache.lookup("SELECT e FROM Employee e").unwrap();
        assert_eq!(**plan.plan(), "no-lock");

        cache.invalidate("SELECT e FROM Employee e");
        cache.insert("SELECT e FROM Employee e", "for-update", "Employee", false, false);
        assert_eq!(**cache.lookup("SELECT e FROM Employee e").unwrap().plan(), "for-update");
    }

    #[test]
    fn test_disabled_cache() {
        let cache = PlanCache::new(&CacheConfig::disabled());
        let plan = cache.insert("q", 1, "Employee", false, false);

        assert_eq!(**plan.plan(), 1);
        assert!(cache.is_empty());
        assert!(cache.lookup("q").is_none());
    }

    #[test]
    fn test_concurrent_insert_lookup() {
        let cache = Arc::new(PlanCache::with_defaults());
        let mut handles = vec![];

        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                let id = format!("query-{}", i % 4);
                cache.insert(id.clone(), i, "Employee", false, false);
                let plan = cache.lookup(&id).expect("inserted plan must be visible");
                assert_eq!(plan.identifier(), id);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 4);
    }
}
