//! Cache invalidation support
//!
//! Writes to an entity type invalidate every cached result that read from
//! that type. Invalidation is type-granular, not row-granular: some results
//! are evicted needlessly, none are served stale.

use crate::result_cache::ResultCache;
use tracing::debug;

/// Trait for caches that react to data changes
pub trait CacheInvalidator: Send + Sync {
    /// Invalidate all unpinned entries that touched `entity_type`.
    /// Returns the number of entries removed.
    fn invalidate_type(&self, entity_type: &str) -> usize;

    /// Invalidate all unpinned entries
    fn invalidate_all(&self) -> usize;

    /// Route an event to the matching invalidation
    fn handle(&self, event: &InvalidationEvent) -> usize {
        debug!("Handling invalidation event {:?}", event);
        match event {
            InvalidationEvent::EntityModified { entity_type } => self.invalidate_type(entity_type),
            InvalidationEvent::InvalidateAll => self.invalidate_all(),
        }
    }
}

/// Events that can trigger cache invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// Instances of an entity type were inserted, updated or deleted
    EntityModified { entity_type: String },
    /// Force invalidation of every unpinned entry
    InvalidateAll,
}

impl InvalidationEvent {
    /// Create an entity modification event
    pub fn entity_modified(entity_type: impl Into<String>) -> Self {
        Self::EntityModified {
            entity_type: entity_type.into(),
        }
    }
}

impl<P: Send + Sync> CacheInvalidator for ResultCache<P> {
    fn invalidate_type(&self, entity_type: &str) -> usize {
        self.evict_all_of_type(entity_type)
    }

    fn invalidate_all(&self) -> usize {
        self.evict_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::tests::TestQuery;
    use crate::key::{ParameterBindings, QueryKey};

    #[test]
    fn test_entity_modified_event() {
        let event = InvalidationEvent::entity_modified("Employee");
        match event {
            InvalidationEvent::EntityModified { entity_type } => {
                assert_eq!(entity_type, "Employee");
            }
            _ => panic!("Expected EntityModified event"),
        }
    }

    #[test]
    fn test_result_cache_handles_events() {
        let cache = ResultCache::with_defaults();
        let query = TestQuery::new(vec![]);
        let key = |v: i64| {
            QueryKey::derive(&query, &ParameterBindings::positional_values([v])).unwrap()
        };

        cache.insert(key(1), "a", ["Employee"]);
        cache.insert(key(2), "b", ["Department"]);
        cache.insert(key(3), "c", ["Employee", "Department"]);

        assert_eq!(cache.handle(&InvalidationEvent::entity_modified("Employee")), 2);
        assert!(cache.contains(&key(2)));

        assert_eq!(cache.handle(&InvalidationEvent::InvalidateAll), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidator_as_trait_object() {
        let cache: ResultCache<u32> = ResultCache::with_defaults();
        let invalidator: &dyn CacheInvalidator = &cache;
        assert_eq!(invalidator.invalidate_type("Employee"), 0);
        assert_eq!(invalidator.invalidate_all(), 0);
    }
}
