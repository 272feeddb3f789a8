//! Registry of live pools

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::metrics::PoolMetrics;
use crate::pool::{ObjectPool, PoolInner};

/// Type-erased view of a pool held by a [`PoolRegistry`]
pub trait ManagedPool: Send + Sync {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn is_closed(&self) -> bool;

    fn get_size(&self) -> usize;

    fn get_metrics(&self) -> PoolMetrics;

    /// Close the pool, destroying all of its objects
    fn close(&self);
}

impl<T: Send + Sync + 'static> ManagedPool for PoolInner<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_closed(&self) -> bool {
        PoolInner::is_closed(self)
    }

    fn get_size(&self) -> usize {
        self.objects.len()
    }

    fn get_metrics(&self) -> PoolMetrics {
        self.snapshot()
    }

    fn close(&self) {
        if let Some(inner) = self.this.upgrade() {
            ObjectPool::from_inner(inner).close();
        }
    }
}

/// Tracks pools so they can be inspected and shut down together
///
/// Pools join through [`PoolConfiguration::with_registry`](crate::PoolConfiguration::with_registry)
/// and leave when closed. The registry only holds weak references; a pool
/// dropped without being closed disappears from it on the next lookup.
///
/// # Examples
///
/// ```
/// use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration, PoolRegistry};
/// use std::sync::Arc;
///
/// struct Numbers;
///
/// impl ObjectFactory<u32> for Numbers {
///     fn make_object(&self, _pool: &ObjectPool<u32>) -> FactoryResult<u32> {
///         Ok(0)
///     }
///
///     fn destroy_object(&self, _pool: &ObjectPool<u32>, _object: &u32) -> FactoryResult<()> {
///         Ok(())
///     }
/// }
///
/// let registry = Arc::new(PoolRegistry::new());
/// let config = PoolConfiguration::new()
///     .with_name("numbers")
///     .with_registry(Arc::clone(&registry));
/// let pool = ObjectPool::new(Numbers, config).unwrap();
///
/// assert_eq!(registry.len(), 1);
/// registry.close_all();
/// assert!(pool.is_closed());
/// assert!(registry.is_empty());
/// ```
#[derive(Default)]
pub struct PoolRegistry {
    pools: DashMap<u64, Weak<dyn ManagedPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static>(&self, pool: &ObjectPool<T>) {
        let handle: Weak<dyn ManagedPool> = pool.downgrade();
        self.pools.insert(pool.id(), handle);
        debug!(pool = %pool.name(), id = pool.id(), "pool registered");
    }

    /// Returns whether the pool was registered
    pub fn deregister(&self, id: u64) -> bool {
        self.pools.remove(&id).is_some()
    }

    /// Live pools, in no particular order
    pub fn pools(&self) -> Vec<Arc<dyn ManagedPool>> {
        self.pools.retain(|_, pool| pool.strong_count() > 0);
        self.pools
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pools().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every registered pool
    pub fn close_all(&self) {
        for pool in self.pools() {
            pool.close();
        }
    }

    /// Metrics of every live pool, keyed by pool name
    pub fn get_metrics(&self) -> HashMap<String, PoolMetrics> {
        self.pools()
            .into_iter()
            .map(|pool| (pool.name().to_string(), pool.get_metrics()))
            .collect()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FactoryResult, ObjectFactory, PoolConfiguration};

    struct Words;

    impl ObjectFactory<String> for Words {
        fn make_object(&self, _pool: &ObjectPool<String>) -> FactoryResult<String> {
            Ok("word".to_string())
        }

        fn destroy_object(
            &self,
            _pool: &ObjectPool<String>,
            _object: &String,
        ) -> FactoryResult<()> {
            Ok(())
        }
    }

    fn registered(registry: &Arc<PoolRegistry>, name: &str) -> ObjectPool<String> {
        let config = PoolConfiguration::new()
            .with_name(name)
            .with_registry(Arc::clone(registry))
            .without_executor();
        ObjectPool::new(Words, config).unwrap()
    }

    #[test]
    fn test_pools_register_and_leave_on_close() {
        let registry = Arc::new(PoolRegistry::new());
        let first = registered(&registry, "first");
        let _second = registered(&registry, "second");
        assert_eq!(registry.len(), 2);

        first.close();
        assert_eq!(registry.len(), 1);
        assert!(!registry.deregister(first.id()));
    }

    #[test]
    fn test_dropped_pools_disappear() {
        let registry = Arc::new(PoolRegistry::new());
        let pool = registered(&registry, "short-lived");
        assert!(!registry.is_empty());

        drop(pool);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_metrics_by_name() {
        let registry = Arc::new(PoolRegistry::new());
        let pool = registered(&registry, "words");
        let _word = pool.borrow_object().unwrap();

        let metrics = registry.get_metrics();
        assert_eq!(metrics.get("words").map(|m| m.active_objects), Some(1));
    }

    #[test]
    fn test_close_all() {
        let registry = Arc::new(PoolRegistry::new());
        let first = registered(&registry, "first");
        let second = registered(&registry, "second");
        second.add_object().unwrap();

        registry.close_all();
        assert!(first.is_closed() && second.is_closed());
        assert_eq!(second.get_size(), 0);
        assert!(registry.is_empty());
        assert!(registry.pools().iter().all(|pool| pool.is_closed()));
    }
}
