//! Reclamation of expired, abandoned and inactive objects

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::pool::ObjectPool;
use crate::pooled::{PooledObject, State};

/// Why the sweep took an object out of the pool
///
/// # Examples
///
/// ```
/// use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration};
/// use std::time::Duration;
///
/// struct Numbers;
///
/// impl ObjectFactory<u32> for Numbers {
///     fn make_object(&self, _pool: &ObjectPool<u32>) -> FactoryResult<u32> {
///         Ok(1)
///     }
///
///     fn destroy_object(&self, _pool: &ObjectPool<u32>, _object: &u32) -> FactoryResult<()> {
///         Ok(())
///     }
/// }
///
/// // Idle objects expire after 10ms
/// let config = PoolConfiguration::new()
///     .with_inactive_timeout(Duration::from_millis(10))
///     .with_warmup(2)
///     .without_executor();
///
/// let pool = ObjectPool::new(Numbers, config).unwrap();
/// std::thread::sleep(Duration::from_millis(20));
/// assert_eq!(pool.evict(), 2);
/// assert_eq!(pool.get_size(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReclaimReason {
    /// Borrowed for longer than the time-to-live timeout
    TimeToLive,

    /// Borrowed but unused for longer than the abandoned timeout
    Abandoned,

    /// Idle for longer than the inactive timeout
    Inactive,

    /// Older than the maximum reuse time
    ReuseTime,

    /// Borrowed the maximum number of times
    ReuseCount,

    /// Failed validation while idle
    ValidationFailed,
}

impl fmt::Display for ReclaimReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ReclaimReason::TimeToLive => "time to live expired",
            ReclaimReason::Abandoned => "abandoned",
            ReclaimReason::Inactive => "inactive",
            ReclaimReason::ReuseTime => "maximum reuse time reached",
            ReclaimReason::ReuseCount => "maximum reuse count reached",
            ReclaimReason::ValidationFailed => "validation failed",
        };
        f.write_str(reason)
    }
}

impl<T: Send + Sync + 'static> ObjectPool<T> {
    /// Run one reclamation pass over every object in the pool
    ///
    /// The configured executor calls this periodically; pools built
    /// without one can drive it by hand. Returns the number of objects
    /// reclaimed.
    pub fn evict(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let now = Instant::now();
        let mut reclaimed = 0;

        for object in self.pooled_objects() {
            if object.state() != State::Active {
                continue;
            }
            if let Some(reason) = self.reclaim_active(&object, now) {
                self.reclaimed(&object, reason);
                reclaimed += 1;
            }
        }
        reclaimed += self.reclaim_idle(now);
        if self.inner.config.validate_while_idle {
            reclaimed += self.validate_idle();
        }

        trace!(pool = %self.name(), reclaimed, "sweep finished");
        reclaimed
    }

    /// The reuse limit an object has reached, if any.
    pub(crate) fn retirement(&self, object: &PooledObject<T>) -> Option<ReclaimReason> {
        let config = &self.inner.config;
        if object.age() >= config.maximum_reuse_time {
            return Some(ReclaimReason::ReuseTime);
        }
        match config.maximum_reuse_count {
            Some(maximum) if object.borrowed_count() >= maximum => Some(ReclaimReason::ReuseCount),
            _ => None,
        }
    }

    /// Reuse limits on borrowed objects are applied when they come back.
    fn reclaim_active(&self, object: &Arc<PooledObject<T>>, now: Instant) -> Option<ReclaimReason> {
        let config = &self.inner.config;
        let _lock = object.lock();
        let active_for = object.active_for(now)?;

        if active_for > config.time_to_live_timeout {
            return self
                .invalidate_locked(object)
                .then_some(ReclaimReason::TimeToLive);
        }

        let last_used_time = config.usage_reporter?;
        // held for writing, so in use
        let reported = last_used_time(&*object.try_read()?);
        let unused_for = match reported {
            Some(used) => {
                object.record_usage(used);
                now.saturating_duration_since(used).min(active_for)
            }
            None => active_for,
        };
        if unused_for > config.abandoned_timeout
            && object.transition(State::Active, State::Abandoned)
        {
            return self
                .destroy_locked(object)
                .then_some(ReclaimReason::Abandoned);
        }
        None
    }

    /// Take retired and inactive objects out of the idle queue and destroy them.
    ///
    /// Candidates are picked in one pass under the queue lock, so a borrower
    /// can neither take nor give back an object between the decision and
    /// the claim. Inactive objects are taken oldest first and never below
    /// `minimum`.
    fn reclaim_idle(&self, now: Instant) -> usize {
        let config = &self.inner.config;
        let candidates = self.inner.idle.extract(|object, remaining| {
            self.retirement(object).is_some()
                || (remaining > config.minimum
                    && object
                        .idle_for(now)
                        .is_some_and(|idle| idle > config.inactive_timeout))
        });

        let mut reclaimed = 0;
        for object in candidates {
            let reason = self
                .retirement(&object)
                .unwrap_or(ReclaimReason::Inactive);
            let _lock = object.lock();
            if self.destroy_locked(&object) {
                self.reclaimed(&object, reason);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Validate every idle object, keeping the ones that pass in queue order.
    fn validate_idle(&self) -> usize {
        let mut failed = 0;
        for object in self.inner.idle.drain() {
            let _lock = object.lock();
            if object.state() != State::Idle {
                continue;
            }
            if self.validate_locked(&object) {
                self.inner.idle.push(Arc::clone(&object));
            } else {
                self.reclaimed(&object, ReclaimReason::ValidationFailed);
                failed += 1;
            }
        }
        failed
    }

    fn reclaimed(&self, object: &PooledObject<T>, reason: ReclaimReason) {
        self.inner.metrics.record_reclaimed();
        debug!(pool = %self.name(), object = object.id(), %reason, "object reclaimed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FactoryResult, ObjectFactory, PoolConfiguration, UsageReporter};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;
    use std::time::Duration;

    struct Numbers {
        next: AtomicU64,
        rejected: Arc<AtomicU64>,
    }

    impl Numbers {
        fn new() -> Self {
            Self {
                next: AtomicU64::new(1),
                rejected: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl ObjectFactory<u64> for Numbers {
        fn make_object(&self, _pool: &ObjectPool<u64>) -> FactoryResult<u64> {
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        fn destroy_object(&self, _pool: &ObjectPool<u64>, _object: &u64) -> FactoryResult<()> {
            Ok(())
        }

        fn validate_object(&self, _pool: &ObjectPool<u64>, object: &u64) -> FactoryResult<bool> {
            Ok(*object != self.rejected.load(Ordering::SeqCst))
        }
    }

    struct Session {
        touched: Mutex<Instant>,
    }

    impl Session {
        fn touch(&self) {
            *self.touched.lock() = Instant::now();
        }
    }

    impl UsageReporter for Session {
        fn last_used_time(&self) -> Option<Instant> {
            Some(*self.touched.lock())
        }
    }

    struct Sessions;

    impl ObjectFactory<Session> for Sessions {
        fn make_object(&self, _pool: &ObjectPool<Session>) -> FactoryResult<Session> {
            Ok(Session {
                touched: Mutex::new(Instant::now()),
            })
        }

        fn destroy_object(
            &self,
            _pool: &ObjectPool<Session>,
            _object: &Session,
        ) -> FactoryResult<()> {
            Ok(())
        }
    }

    fn config() -> PoolConfiguration<u64> {
        PoolConfiguration::new().with_maximum(5).without_executor()
    }

    #[test]
    fn test_inactive_objects_keep_minimum() {
        let config = config()
            .with_minimum(1)
            .with_warmup(3)
            .with_inactive_timeout(Duration::from_millis(20));
        let pool = ObjectPool::new(Numbers::new(), config).unwrap();

        thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.evict(), 2);
        assert_eq!(pool.get_size(), 1);
        assert_eq!(pool.get_metrics().reclaimed_objects, 2);
    }

    #[test]
    fn test_idle_objects_are_judged_when_claimed() {
        let config = config()
            .with_minimum(1)
            .with_warmup(2)
            .with_strategy(crate::Strategy::Fifo)
            .with_inactive_timeout(Duration::from_millis(20));
        let pool = ObjectPool::new(Numbers::new(), config).unwrap();

        thread::sleep(Duration::from_millis(40));
        let first = pool.borrow_object().unwrap();
        assert_eq!(*first, 1);
        drop(first);

        // only the object nobody touched is reclaimed
        assert_eq!(pool.evict(), 1);
        let kept = pool.get_objects();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].borrowed_count, 1);

        // the last idle object is the floor
        thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.evict(), 0);
        assert_eq!(pool.get_size(), 1);
    }

    #[test]
    fn test_recently_returned_objects_stay() {
        let config = config().with_inactive_timeout(Duration::from_secs(60));
        let pool = ObjectPool::new(Numbers::new(), config).unwrap();
        drop(pool.borrow_object().unwrap());

        assert_eq!(pool.evict(), 0);
        assert_eq!(pool.get_size_in_state(State::Idle), 1);
    }

    #[test]
    fn test_time_to_live_reclaims_borrowed_object() {
        let config = config().with_time_to_live_timeout(Duration::from_millis(20));
        let pool = ObjectPool::new(Numbers::new(), config).unwrap();
        let held = pool.borrow_object().unwrap();

        thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.evict(), 1);
        assert_eq!(held.pooled().state(), State::Destroyed);
        assert_eq!(pool.get_size(), 0);
        // returning a reclaimed object changes nothing
        assert!(pool.return_object(held).is_err());
        assert_eq!(pool.get_size(), 0);
    }

    #[test]
    fn test_abandoned_objects_are_reclaimed() {
        let config = PoolConfiguration::<Session>::new()
            .with_abandoned_timeout(Duration::from_millis(30))
            .with_usage_reporting()
            .without_executor();
        let pool = ObjectPool::new(Sessions, config).unwrap();
        let forgotten = pool.borrow_object().unwrap();
        let busy = pool.borrow_object().unwrap();

        thread::sleep(Duration::from_millis(60));
        busy.touch();

        assert_eq!(pool.evict(), 1);
        assert_eq!(forgotten.pooled().state(), State::Destroyed);
        assert_eq!(busy.pooled().state(), State::Active);
        assert!(busy.pooled().last_used_time().is_some());
        assert_eq!(pool.get_size(), 1);
    }

    #[test]
    fn test_abandoned_timeout_needs_usage_reporting() {
        let config = PoolConfiguration::<Session>::new()
            .with_abandoned_timeout(Duration::from_millis(10))
            .without_executor();
        let pool = ObjectPool::new(Sessions, config).unwrap();
        let _held = pool.borrow_object().unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(pool.evict(), 0);
        assert_eq!(pool.get_size(), 1);
    }

    #[test]
    fn test_reuse_time_retires_idle_but_not_borrowed() {
        let config = config()
            .with_warmup(1)
            .with_maximum_reuse_time(Duration::from_millis(20));
        let pool = ObjectPool::new(Numbers::new(), config).unwrap();
        let held = pool.borrow_object().unwrap();
        pool.add_object().unwrap();

        thread::sleep(Duration::from_millis(40));
        assert_eq!(pool.evict(), 1);
        assert_eq!(pool.get_size(), 1);
        assert_eq!(held.pooled().state(), State::Active);

        pool.return_object(held).unwrap();
        assert_eq!(pool.get_size(), 0);
    }

    #[test]
    fn test_validation_while_idle() {
        let factory = Numbers::new();
        let rejected = Arc::clone(&factory.rejected);
        let config = config().with_warmup(2).with_validation_while_idle();
        let pool = ObjectPool::new(factory, config).unwrap();

        rejected.store(1, Ordering::SeqCst);
        assert_eq!(pool.evict(), 1);
        assert_eq!(pool.get_size_in_state(State::Idle), 1);
        assert_eq!(pool.get_metrics().validation_failures, 1);
    }

    #[test]
    fn test_closed_pool_is_not_swept() {
        let pool = ObjectPool::new(Numbers::new(), config()).unwrap();
        pool.close();
        assert_eq!(pool.evict(), 0);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(ReclaimReason::TimeToLive.to_string(), "time to live expired");
        assert_eq!(ReclaimReason::ReuseCount.to_string(), "maximum reuse count reached");
    }
}
