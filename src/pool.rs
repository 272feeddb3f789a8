//! Core object pool implementation

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{ArcRwLockUpgradableReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock};
use tracing::{debug, trace, warn};

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::executor::ScheduledTask;
use crate::factory::{ActivableObjectFactory, Factory, ObjectFactory};
#[cfg(feature = "prometheus")]
use crate::metrics::MetricsExporter;
use crate::metrics::{MetricsTracker, Occupancy, PoolMetrics};
use crate::pooled::{PooledObject, PooledObjectMetrics, State};
use crate::queue::{Backoff, WaitQueue};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// The borrower's hold on a resource
enum Claim<T> {
    Shared(ArcRwLockUpgradableReadGuard<RawRwLock, T>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, T>),
    Released,
}

/// A borrowed object that automatically returns to the pool when dropped
///
/// Reading goes through a shared claim that the pool can still inspect;
/// the first mutable access upgrades it to an exclusive one for the rest
/// of the borrow.
pub struct Borrowed<T: Send + Sync + 'static> {
    object: Arc<PooledObject<T>>,
    claim: Claim<T>,
    released: bool,
}

impl<T: Send + Sync + 'static> Borrowed<T> {
    fn new(object: Arc<PooledObject<T>>) -> Self {
        let claim = Claim::Shared(object.claim());
        Self {
            object,
            claim,
            released: false,
        }
    }

    /// Drop the claim so the pool can work on the resource again.
    fn let_go(&mut self) {
        self.claim = Claim::Released;
    }

    /// The pool-side wrapper, with the object's state and usage metrics
    pub fn pooled(&self) -> &PooledObject<T> {
        &self.object
    }

    pub fn id(&self) -> u64 {
        self.object.id()
    }
}

impl<T: Send + Sync + 'static> Deref for Borrowed<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match &self.claim {
            Claim::Shared(guard) => &**guard,
            Claim::Exclusive(guard) => &**guard,
            Claim::Released => unreachable!("borrowed object already handed back"),
        }
    }
}

impl<T: Send + Sync + 'static> DerefMut for Borrowed<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.claim = match mem::replace(&mut self.claim, Claim::Released) {
            Claim::Shared(guard) => Claim::Exclusive(ArcRwLockUpgradableReadGuard::upgrade(guard)),
            claim => claim,
        };
        match &mut self.claim {
            Claim::Exclusive(guard) => &mut **guard,
            _ => unreachable!("borrowed object already handed back"),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Borrowed<T> {
    fn drop(&mut self) {
        self.let_go();
        if self.released {
            return;
        }
        if let Some(pool) = self.object.pool() {
            if let Err(e) = pool.release(&self.object) {
                debug!(
                    pool = %pool.name(),
                    object = self.object.id(),
                    error = %e,
                    "dropped object not returned"
                );
            }
        }
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for Borrowed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Borrowed").field("object", &self.object).finish()
    }
}

/// Shared state behind every handle of one pool.
pub(crate) struct PoolInner<T> {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) config: PoolConfiguration<T>,
    pub(crate) factory: Factory<T>,
    pub(crate) objects: DashMap<u64, Arc<PooledObject<T>>>,
    /// Guards insertion into and removal from `objects`.
    structure: Mutex<()>,
    pub(crate) idle: WaitQueue<T>,
    closed: AtomicBool,
    pub(crate) metrics: MetricsTracker,
    next_id: AtomicU64,
    sweeper: Mutex<Option<ScheduledTask>>,
    pub(crate) this: Weak<PoolInner<T>>,
}

impl<T> PoolInner<T> {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        let active = self
            .objects
            .iter()
            .filter(|entry| entry.value().state() == State::Active)
            .count();
        self.metrics.get_metrics(Occupancy {
            size: self.objects.len(),
            active,
            idle: self.idle.len(),
            maximum: self.config.maximum,
        })
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        if !self.is_closed() && !self.objects.is_empty() {
            debug!(pool = %self.name, objects = self.objects.len(), "pool dropped without close");
        }
    }
}

/// Thread-safe, bounded pool of factory-made objects
///
/// Handles are cheap to clone and all refer to the same pool.
///
/// # Examples
///
/// ```
/// use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration};
///
/// struct Buffers;
///
/// impl ObjectFactory<Vec<u8>> for Buffers {
///     fn make_object(&self, _pool: &ObjectPool<Vec<u8>>) -> FactoryResult<Vec<u8>> {
///         Ok(vec![0; 1024])
///     }
///
///     fn destroy_object(
///         &self,
///         _pool: &ObjectPool<Vec<u8>>,
///         _object: &Vec<u8>,
///     ) -> FactoryResult<()> {
///         Ok(())
///     }
/// }
///
/// let pool = ObjectPool::new(Buffers, PoolConfiguration::new().with_maximum(4)).unwrap();
/// {
///     let mut buffer = pool.borrow_object().unwrap();
///     buffer[0] = 7;
///     assert_eq!(buffer.len(), 1024);
///     // returned to the pool here
/// }
/// assert_eq!(pool.get_size(), 1);
/// pool.close();
/// ```
pub struct ObjectPool<T> {
    pub(crate) inner: Arc<PoolInner<T>>,
}

impl<T> ObjectPool<T> {
    pub(crate) fn from_inner(inner: Arc<PoolInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<PoolInner<T>> {
        Arc::downgrade(&self.inner)
    }

    /// Process-unique pool identifier
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn get_configuration(&self) -> &PoolConfiguration<T> {
        &self.inner.config
    }
}

impl<T> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("size", &self.inner.objects.len())
            .field("maximum", &self.inner.config.maximum)
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl<T: Send + Sync + 'static> ObjectPool<T> {
    /// Create a pool around a plain factory
    pub fn new(
        factory: impl ObjectFactory<T> + 'static,
        config: PoolConfiguration<T>,
    ) -> PoolResult<Self> {
        Self::build(Factory::Plain(Arc::new(factory)), config)
    }

    /// Create a pool whose objects are activated on borrow and deactivated on return
    pub fn with_activation(
        factory: impl ActivableObjectFactory<T> + 'static,
        config: PoolConfiguration<T>,
    ) -> PoolResult<Self> {
        Self::build(Factory::Activable(Arc::new(factory)), config)
    }

    fn build(factory: Factory<T>, config: PoolConfiguration<T>) -> PoolResult<Self> {
        config.validate()?;

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let name = config.name.clone().unwrap_or_else(|| format!("pool-{id}"));
        let idle = WaitQueue::new(config.strategy, config.maximum.min(1024));
        let inner = Arc::new_cyclic(|this| PoolInner {
            id,
            name,
            config,
            factory,
            objects: DashMap::new(),
            structure: Mutex::new(()),
            idle,
            closed: AtomicBool::new(false),
            metrics: MetricsTracker::new(),
            next_id: AtomicU64::new(1),
            sweeper: Mutex::new(None),
            this: this.clone(),
        });
        let pool = Self { inner };

        pool.schedule_sweep()?;
        if let Some(registry) = &pool.inner.config.registry {
            registry.register(&pool);
        }
        if let Some(size) = pool.inner.config.warmup_size {
            if let Err(e) = pool.warmup(size) {
                pool.close();
                return Err(e);
            }
        }

        debug!(
            pool = %pool.inner.name,
            maximum = pool.inner.config.maximum,
            strategy = ?pool.inner.config.strategy,
            activable = pool.inner.factory.is_activable(),
            "pool created"
        );
        Ok(pool)
    }

    fn schedule_sweep(&self) -> PoolResult<()> {
        let Some(executor) = &self.inner.config.executor else {
            return Ok(());
        };
        let period = self.inner.config.effective_sweep_interval();
        let weak = self.downgrade();
        let task = executor.schedule_at_fixed_rate(
            period,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return false;
                };
                let pool = ObjectPool::from_inner(inner);
                if pool.is_closed() {
                    return false;
                }
                pool.evict();
                true
            }),
        )?;
        *self.inner.sweeper.lock() = Some(task);
        trace!(pool = %self.inner.name, period = ?period, "sweep scheduled");
        Ok(())
    }

    /// Create one object and add it to the idle set
    ///
    /// Fails with [`PoolError::PoolFull`] once the pool holds `maximum` objects.
    pub fn add_object(&self) -> PoolResult<()> {
        self.ensure_open()?;

        let _structure = self.inner.structure.lock();
        self.ensure_open()?;
        if self.inner.objects.len() >= self.inner.config.maximum {
            return Err(PoolError::PoolFull {
                pool: self.inner.name.clone(),
                maximum: self.inner.config.maximum,
            });
        }

        let resource = self
            .inner
            .factory
            .make(self)
            .map_err(|e| PoolError::creation(&self.inner.name, e))?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let object = Arc::new(PooledObject::new(id, self.downgrade(), resource));
        self.inner.objects.insert(id, Arc::clone(&object));
        self.inner.idle.push(object);
        self.inner.metrics.record_created();

        debug!(pool = %self.inner.name, object = id, "object created");
        Ok(())
    }

    /// Pre-create up to `count` objects, stopping at capacity
    ///
    /// Returns how many objects were created.
    pub fn warmup(&self, count: usize) -> PoolResult<usize> {
        let mut created = 0;
        while created < count {
            match self.add_object() {
                Ok(()) => created += 1,
                Err(PoolError::PoolFull { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        debug!(pool = %self.inner.name, created, "pool warmed up");
        Ok(created)
    }

    /// Borrow an object, waiting up to the configured maximum wait
    pub fn borrow_object(&self) -> PoolResult<Borrowed<T>> {
        self.ensure_open()?;
        let started = Instant::now();
        // too far out to represent means no deadline
        let deadline = started.checked_add(self.inner.config.maximum_wait);
        let mut backoff = Backoff::new();

        loop {
            if let Some(borrowed) = self.try_acquire(started)? {
                return Ok(borrowed);
            }
            let wait = self.next_wait(&mut backoff, deadline)?;
            if let Some(object) = self.inner.idle.pop(wait) {
                if let Some(borrowed) = self.checkout(object, started) {
                    return Ok(borrowed);
                }
            }
        }
    }

    /// Borrow an object without blocking the runtime thread while waiting
    ///
    /// Factory hooks still run inline on the calling task.
    pub async fn borrow_object_async(&self) -> PoolResult<Borrowed<T>> {
        self.ensure_open()?;
        let started = Instant::now();
        let deadline = started.checked_add(self.inner.config.maximum_wait);
        let mut backoff = Backoff::new();

        loop {
            if let Some(borrowed) = self.try_acquire(started)? {
                return Ok(borrowed);
            }
            let wait = self.next_wait(&mut backoff, deadline)?;
            tokio::time::sleep(wait).await;
        }
    }

    /// Take an idle object or grow the pool by one, without waiting.
    ///
    /// A candidate that fails checkout ends the attempt, so the caller
    /// backs off before the factory is asked for another one.
    fn try_acquire(&self, started: Instant) -> PoolResult<Option<Borrowed<T>>> {
        self.ensure_open()?;
        if let Some(object) = self.inner.idle.try_pop() {
            return Ok(self.checkout(object, started));
        }
        if self.inner.objects.len() >= self.inner.config.maximum {
            return Ok(None);
        }
        match self.add_object() {
            Ok(()) => {}
            Err(PoolError::PoolFull { .. }) => return Ok(None),
            Err(e) => return Err(e),
        }
        Ok(self
            .inner
            .idle
            .try_pop()
            .and_then(|object| self.checkout(object, started)))
    }

    /// The next backoff slice, cut short at the deadline.
    fn next_wait(&self, backoff: &mut Backoff, deadline: Option<Instant>) -> PoolResult<Duration> {
        let wait = backoff.next_wait();
        let Some(deadline) = deadline else {
            return Ok(wait);
        };
        let now = Instant::now();
        if now >= deadline {
            return Err(self.timed_out());
        }
        Ok(wait.min(deadline - now))
    }

    fn checkout(&self, object: Arc<PooledObject<T>>, started: Instant) -> Option<Borrowed<T>> {
        if !self.activate(&object) {
            return None;
        }
        self.inner.metrics.record_borrowed(started.elapsed());
        trace!(pool = %self.inner.name, object = object.id(), "object borrowed");
        Some(Borrowed::new(object))
    }

    /// Move a candidate popped from the idle queue to `Active`, destroying it on failure.
    fn activate(&self, object: &Arc<PooledObject<T>>) -> bool {
        let _lock = object.lock();
        if object.state() != State::Idle {
            return false;
        }

        let mut from = State::Idle;
        if self.inner.config.validate_on_borrow {
            if !object.transition(State::Idle, State::Validation) {
                return false;
            }
            from = State::Validation;
            if !self.inner.factory.validate(self, &object.read()) {
                self.inner.metrics.record_validation_failure();
                debug!(
                    pool = %self.inner.name,
                    object = object.id(),
                    "object failed validation on borrow"
                );
                self.destroy_locked(object);
                return false;
            }
        }

        if let Some(reason) = self.retirement(object) {
            debug!(pool = %self.inner.name, object = object.id(), %reason, "retiring object");
            self.destroy_locked(object);
            return false;
        }

        if let Err(e) = self.inner.factory.activate(self, object) {
            self.inner.metrics.record_activation_failure();
            warn!(
                pool = %self.inner.name,
                object = object.id(),
                error = %e,
                "failed to activate object"
            );
            self.destroy_locked(object);
            return false;
        }

        if !object.transition(from, State::Active) {
            self.destroy_locked(object);
            return false;
        }
        true
    }

    /// Give a borrowed object back to the pool
    ///
    /// An object that does not belong to this pool is left untouched and
    /// goes back to its own pool when the handle drops.
    pub fn return_object(&self, mut borrowed: Borrowed<T>) -> PoolResult<()> {
        self.ensure_open()?;
        self.ensure_owned(&borrowed.object)?;
        borrowed.released = true;
        borrowed.let_go();
        self.release(&borrowed.object)
    }

    /// Hand back an object whose borrower has let go of it.
    fn release(&self, object: &Arc<PooledObject<T>>) -> PoolResult<()> {
        let started = Instant::now();
        let _lock = object.lock();
        if self.finish_deferred(object) {
            return Err(self.not_owned(object));
        }
        self.ensure_open()?;
        self.ensure_owned(object)?;

        if !object.transition(State::Active, State::Returning) {
            // reclaimed while borrowed
            return Err(self.not_owned(object));
        }

        if let Err(e) = self.inner.factory.deactivate(self, object) {
            self.inner.metrics.record_activation_failure();
            warn!(
                pool = %self.inner.name,
                object = object.id(),
                error = %e,
                "failed to deactivate object"
            );
            self.destroy_locked(object);
        } else if let Some(reason) = self.retirement(object) {
            debug!(pool = %self.inner.name, object = object.id(), %reason, "retiring object");
            self.destroy_locked(object);
        } else if !object.transition(State::Returning, State::Idle) {
            self.destroy_locked(object);
        } else if !self.inner.config.validate_on_return || self.validate_locked(object) {
            self.inner.idle.push(Arc::clone(object));
        }

        self.inner.metrics.record_released(started.elapsed());
        trace!(pool = %self.inner.name, object = object.id(), "object returned");
        Ok(())
    }

    /// Destroy a borrowed object instead of returning it
    pub fn invalidate_object(&self, mut borrowed: Borrowed<T>) -> PoolResult<()> {
        self.ensure_owned(&borrowed.object)?;
        borrowed.released = true;
        borrowed.let_go();

        let object = &borrowed.object;
        let _lock = object.lock();
        if self.finish_deferred(object) || !self.invalidate_locked(object) {
            return Err(self.not_owned(object));
        }
        debug!(pool = %self.inner.name, object = object.id(), "object invalidated");
        Ok(())
    }

    /// Deactivate an active object, then destroy it. Caller holds the object lock.
    pub(crate) fn invalidate_locked(&self, object: &Arc<PooledObject<T>>) -> bool {
        if object.transition(State::Active, State::Returning) {
            if let Err(e) = self.inner.factory.deactivate(self, object) {
                self.inner.metrics.record_activation_failure();
                warn!(
                    pool = %self.inner.name,
                    object = object.id(),
                    error = %e,
                    "failed to deactivate object"
                );
            }
        }
        self.destroy_locked(object)
    }

    /// Validate an idle object, destroying it on failure. Caller holds the object lock.
    pub(crate) fn validate_locked(&self, object: &Arc<PooledObject<T>>) -> bool {
        if !object.transition(State::Idle, State::Validation) {
            return false;
        }
        let valid = self.inner.factory.validate(self, &object.read());
        if valid && object.transition(State::Validation, State::Idle) {
            return true;
        }
        self.inner.metrics.record_validation_failure();
        debug!(pool = %self.inner.name, object = object.id(), "object failed validation");
        self.destroy_locked(object);
        false
    }

    /// Destroy an object and forget it. Caller holds the object lock.
    ///
    /// Returns false when the object is already being destroyed. A
    /// resource its borrower holds for writing is only handed to the
    /// factory once the borrower lets go of it.
    pub(crate) fn destroy_locked(&self, object: &Arc<PooledObject<T>>) -> bool {
        if !object.begin_destroy() {
            return false;
        }
        self.inner.idle.remove(object);

        match object.try_read() {
            Some(resource) => self.destroy_resource(object, &resource),
            None => {
                object.defer_destroy();
                debug!(pool = %self.inner.name, object = object.id(), "destroy waits for borrower");
            }
        }

        {
            let _structure = self.inner.structure.lock();
            self.inner.objects.remove(&object.id());
        }
        self.inner.metrics.record_destroyed();
        debug!(pool = %self.inner.name, object = object.id(), "object destroyed");
        true
    }

    fn destroy_resource(&self, object: &PooledObject<T>, resource: &T) {
        if let Err(e) = self.inner.factory.destroy(self, resource) {
            self.inner.metrics.record_destroy_failure();
            warn!(
                pool = %self.inner.name,
                object = object.id(),
                error = %e,
                "failed to destroy object"
            );
        }
        object.transition(State::Destroying, State::Destroyed);
    }

    /// Finish a destroy that waited for the borrower. Caller holds the object lock.
    fn finish_deferred(&self, object: &PooledObject<T>) -> bool {
        if !object.take_deferred() {
            return false;
        }
        self.destroy_resource(object, &object.read());
        true
    }

    /// Destroy every idle object; borrowed objects are untouched
    pub fn clear(&self) -> PoolResult<()> {
        self.ensure_open()?;
        let mut destroyed = 0;
        for object in self.inner.idle.drain() {
            let _lock = object.lock();
            if self.destroy_locked(&object) {
                destroyed += 1;
            }
        }
        debug!(pool = %self.inner.name, destroyed, "pool cleared");
        Ok(())
    }

    /// Close the pool and destroy all of its objects, borrowed or not
    ///
    /// Closing twice has no further effect.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sweeper = self.inner.sweeper.lock().take();
        if let Some(task) = sweeper {
            task.cancel();
        }
        if let Some(registry) = &self.inner.config.registry {
            registry.deregister(self.inner.id);
        }

        self.inner.idle.drain();
        let objects: Vec<_> = {
            let _structure = self.inner.structure.lock();
            self.inner
                .objects
                .iter()
                .map(|entry| Arc::clone(entry.value()))
                .collect()
        };
        for object in &objects {
            let _lock = object.lock();
            self.destroy_locked(object);
        }
        self.inner.idle.drain();

        debug!(pool = %self.inner.name, destroyed = objects.len(), "pool closed");
    }

    /// Number of objects in the pool, borrowed or not
    pub fn get_size(&self) -> usize {
        self.inner.objects.len()
    }

    pub fn get_size_in_state(&self, state: State) -> usize {
        self.inner
            .objects
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    /// State and usage metrics of every object; the resources stay with their borrowers
    pub fn get_objects(&self) -> Vec<PooledObjectMetrics> {
        self.inner
            .objects
            .iter()
            .map(|entry| entry.value().metrics())
            .collect()
    }

    pub fn get_objects_in_state(&self, state: State) -> Vec<PooledObjectMetrics> {
        self.get_objects()
            .into_iter()
            .filter(|metrics| metrics.state == state)
            .collect()
    }

    pub(crate) fn pooled_objects(&self) -> Vec<Arc<PooledObject<T>>> {
        self.inner
            .objects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.snapshot()
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format, labelled with the pool name and `tags`
    #[cfg(feature = "prometheus")]
    pub fn export_metrics_prometheus(
        &self,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.get_metrics(), &self.inner.name, tags)
    }

    fn ensure_open(&self) -> PoolResult<()> {
        if self.is_closed() {
            return Err(PoolError::Closed {
                pool: self.inner.name.clone(),
            });
        }
        Ok(())
    }

    fn ensure_owned(&self, object: &PooledObject<T>) -> PoolResult<()> {
        if object.belongs_to(&self.inner) && self.inner.objects.contains_key(&object.id()) {
            Ok(())
        } else {
            Err(self.not_owned(object))
        }
    }

    fn not_owned(&self, object: &PooledObject<T>) -> PoolError {
        PoolError::NotOwned {
            pool: self.inner.name.clone(),
            object: object.id(),
        }
    }

    fn timed_out(&self) -> PoolError {
        self.inner.metrics.record_timeout();
        debug!(pool = %self.inner.name, wait = ?self.inner.config.maximum_wait, "borrow timed out");
        PoolError::Timeout {
            pool: self.inner.name.clone(),
            wait: self.inner.config.maximum_wait,
        }
    }
}
