//! Query execution statistics
//!
//! Counts executions per query text, both since the last [`reset`] and since
//! the statistics were created. Meant for operators and monitoring exports,
//! not for the query hot path to read.
//!
//! [`reset`]: ExecutionStatistics::reset

use ahash::RandomState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct QueryCounters {
    since_reset: AtomicU64,
    since_start: AtomicU64,
}

impl QueryCounters {
    fn increment(&self) {
        self.since_reset.fetch_add(1, Ordering::Relaxed);
        self.since_start.fetch_add(1, Ordering::Relaxed);
    }
}

/// Execution counts for one query text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryExecutionCount {
    pub query: String,
    pub executions: u64,
    pub total_executions: u64,
}

/// Point-in-time copy of [`ExecutionStatistics`], suitable for export
#[derive(Debug, Clone, Serialize)]
pub struct StatisticsSnapshot {
    pub start: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub executions: u64,
    pub total_executions: u64,
    /// Sorted by query text
    pub queries: Vec<QueryExecutionCount>,
}

impl StatisticsSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Execution counters shared by every caller of one executor
///
/// Recording takes the shared side of `reset_lock` and then only touches
/// atomics; [`reset`](Self::reset) takes the exclusive side, so a reset never
/// interleaves with a half-recorded execution.
#[derive(Debug)]
pub struct ExecutionStatistics {
    queries: DashMap<String, QueryCounters, RandomState>,
    executions: AtomicU64,
    total_executions: AtomicU64,
    start: DateTime<Utc>,
    since: RwLock<DateTime<Utc>>,
    reset_lock: RwLock<()>,
}

impl ExecutionStatistics {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            queries: DashMap::with_hasher(RandomState::new()),
            executions: AtomicU64::new(0),
            total_executions: AtomicU64::new(0),
            start: now,
            since: RwLock::new(now),
            reset_lock: RwLock::new(()),
        }
    }

    /// Count one execution of `query`
    pub fn record_execution(&self, query: &str) {
        let _guard = self.reset_lock.read();

        // Global first, so readers never see per-query totals above it
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.total_executions.fetch_add(1, Ordering::Relaxed);

        if let Some(counters) = self.queries.get(query) {
            counters.increment();
            return;
        }
        self.queries
            .entry(query.to_string())
            .or_default()
            .increment();
    }

    /// Executions of all queries since the last reset
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Executions of all queries since start
    pub fn total_execution_count(&self) -> u64 {
        self.total_executions.load(Ordering::Relaxed)
    }

    /// Executions of `query` since the last reset; 0 if never recorded
    pub fn query_execution_count(&self, query: &str) -> u64 {
        self.queries
            .get(query)
            .map_or(0, |c| c.since_reset.load(Ordering::Relaxed))
    }

    /// Executions of `query` since start; 0 if never recorded
    pub fn query_total_execution_count(&self, query: &str) -> u64 {
        self.queries
            .get(query)
            .map_or(0, |c| c.since_start.load(Ordering::Relaxed))
    }

    /// Time of the last reset, or of start if never reset
    pub fn since(&self) -> DateTime<Utc> {
        *self.since.read()
    }

    /// Time the statistics were created
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Query texts recorded so far, sorted
    pub fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self.queries.iter().map(|e| e.key().clone()).collect();
        queries.sort();
        queries
    }

    /// Zero every since-reset counter and move `since` to now. Since-start
    /// counters and the start time are kept.
    pub fn reset(&self) {
        let _guard = self.reset_lock.write();

        self.executions.store(0, Ordering::Relaxed);
        for counters in self.queries.iter() {
            counters.since_reset.store(0, Ordering::Relaxed);
        }
        *self.since.write() = Utc::now();
    }

    /// Copy all counters under one consistent view
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let _guard = self.reset_lock.write();

        let mut queries: Vec<QueryExecutionCount> = self
            .queries
            .iter()
            .map(|entry| QueryExecutionCount {
                query: entry.key().clone(),
                executions: entry.since_reset.load(Ordering::Relaxed),
                total_executions: entry.since_start.load(Ordering::Relaxed),
            })
            .collect();
        queries.sort_by(|a, b| a.query.cmp(&b.query));

        StatisticsSnapshot {
            start: self.start,
            since: *self.since.read(),
            executions: self.execution_count(),
            total_executions: self.total_execution_count(),
            queries,
        }
    }
}

impl Default for ExecutionStatistics {
    fn default() -> Self {
        Self::new()
    }
}
