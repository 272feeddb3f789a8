//! Pooled object wrapper and its life-cycle state machine

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{
    ArcRwLockUpgradableReadGuard, Mutex, MutexGuard, RawRwLock, RwLock, RwLockReadGuard,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pool::{ObjectPool, PoolInner};

/// Life-cycle state of a pooled object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum State {
    /// Sitting in the pool, available for borrowing
    Idle,

    /// Borrowed and in use
    Active,

    /// Being deactivated on its way back to the pool
    Returning,

    /// Held too long without being used, pending reclaim
    Abandoned,

    /// Undergoing factory validation
    Validation,

    /// The factory is destroying the resource
    Destroying,

    /// Destroyed and removed from the pool
    Destroyed,
}

impl State {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: State) -> bool {
        use State::*;
        matches!(
            (self, next),
            (Idle, Active | Validation | Destroying)
                | (Active, Returning | Abandoned | Validation | Destroying)
                | (Returning, Idle | Destroying)
                | (Abandoned, Destroying)
                | (Validation, Idle | Active | Destroying)
                | (Destroying, Destroyed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == State::Destroyed
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Idle => "idle",
            State::Active => "active",
            State::Returning => "returning",
            State::Abandoned => "abandoned",
            State::Validation => "validation",
            State::Destroying => "destroying",
            State::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Usage metrics of one pooled object
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PooledObjectMetrics {
    pub id: u64,
    pub state: State,
    pub created_time: SystemTime,
    pub last_borrowed_time: Option<SystemTime>,
    pub last_returned_time: Option<SystemTime>,
    pub last_used_time: Option<SystemTime>,
    pub borrowed_count: u64,
    /// Duration of the last borrow
    pub borrowed_duration: Duration,
    pub total_borrowed_duration: Duration,
    /// Duration of the last idle period
    pub idle_duration: Duration,
    pub total_idle_duration: Duration,
}

struct Tracking {
    state: State,
    idle_since: Option<Instant>,
    last_borrowed: Option<Instant>,
    last_returned: Option<Instant>,
    last_used: Option<Instant>,
    borrowed_count: u64,
    borrowed_duration: Duration,
    total_borrowed_duration: Duration,
    idle_duration: Duration,
    total_idle_duration: Duration,
}

impl Tracking {
    fn enter(&mut self, next: State, now: Instant) {
        if self.state == State::Active {
            if let Some(borrowed) = self.last_borrowed {
                let held = now.saturating_duration_since(borrowed);
                self.borrowed_duration = held;
                self.total_borrowed_duration += held;
            }
        }
        match next {
            State::Active => {
                self.borrowed_count += 1;
                self.last_borrowed = Some(now);
                if let Some(since) = self.idle_since.take() {
                    let idle = now.saturating_duration_since(since);
                    self.idle_duration = idle;
                    self.total_idle_duration += idle;
                }
            }
            State::Returning => self.last_returned = Some(now),
            State::Idle => {
                self.idle_since.get_or_insert(now);
            }
            _ => {}
        }
        self.state = next;
    }
}

/// A resource under pool control, with its state and usage metrics.
///
/// The resource sits behind a read-write lock. A borrower holds an
/// upgradable claim on it for the whole borrow and takes the write side
/// the first time it mutates the resource; the pool only ever reads.
pub struct PooledObject<T> {
    id: u64,
    pool: Weak<PoolInner<T>>,
    resource: Arc<RwLock<T>>,
    created: Instant,
    created_time: SystemTime,
    tracking: Mutex<Tracking>,
    lifecycle: Mutex<()>,
    /// Set while the object sits in the idle queue; guarded by the queue lock.
    queued: AtomicBool,
    /// Destroyed while a borrower held it for writing.
    deferred: AtomicBool,
}

impl<T> PooledObject<T> {
    pub(crate) fn new(id: u64, pool: Weak<PoolInner<T>>, object: T) -> Self {
        let now = Instant::now();
        Self {
            id,
            pool,
            resource: Arc::new(RwLock::new(object)),
            created: now,
            created_time: SystemTime::now(),
            tracking: Mutex::new(Tracking {
                state: State::Idle,
                idle_since: Some(now),
                last_borrowed: None,
                last_returned: None,
                last_used: None,
                borrowed_count: 0,
                borrowed_duration: Duration::ZERO,
                total_borrowed_duration: Duration::ZERO,
                idle_duration: Duration::ZERO,
                total_idle_duration: Duration::ZERO,
            }),
            lifecycle: Mutex::new(()),
            queued: AtomicBool::new(false),
            deferred: AtomicBool::new(false),
        }
    }

    /// Identifier, unique within the owning pool
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Read access to the wrapped resource
    ///
    /// `None` while a borrower holds the resource for writing.
    pub fn get(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.resource.try_read_recursive()
    }

    pub fn state(&self) -> State {
        self.tracking.lock().state
    }

    /// The owning pool, `None` once it has been dropped
    pub fn pool(&self) -> Option<ObjectPool<T>> {
        self.pool.upgrade().map(ObjectPool::from_inner)
    }

    pub fn created_time(&self) -> SystemTime {
        self.created_time
    }

    /// Time since the object was created
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn last_borrowed_time(&self) -> Option<SystemTime> {
        self.tracking.lock().last_borrowed.map(wall_clock)
    }

    pub fn last_returned_time(&self) -> Option<SystemTime> {
        self.tracking.lock().last_returned.map(wall_clock)
    }

    /// Last use reported by the resource, see [`UsageReporter`](crate::UsageReporter)
    pub fn last_used_time(&self) -> Option<SystemTime> {
        self.tracking.lock().last_used.map(wall_clock)
    }

    pub fn borrowed_count(&self) -> u64 {
        self.tracking.lock().borrowed_count
    }

    /// How long the object was held during its last borrow
    pub fn borrowed_duration(&self) -> Duration {
        self.tracking.lock().borrowed_duration
    }

    pub fn total_borrowed_duration(&self) -> Duration {
        self.tracking.lock().total_borrowed_duration
    }

    /// How long the object sat idle before its last borrow
    pub fn idle_duration(&self) -> Duration {
        self.tracking.lock().idle_duration
    }

    pub fn total_idle_duration(&self) -> Duration {
        self.tracking.lock().total_idle_duration
    }

    pub fn metrics(&self) -> PooledObjectMetrics {
        let tracking = self.tracking.lock();
        PooledObjectMetrics {
            id: self.id,
            state: tracking.state,
            created_time: self.created_time,
            last_borrowed_time: tracking.last_borrowed.map(wall_clock),
            last_returned_time: tracking.last_returned.map(wall_clock),
            last_used_time: tracking.last_used.map(wall_clock),
            borrowed_count: tracking.borrowed_count,
            borrowed_duration: tracking.borrowed_duration,
            total_borrowed_duration: tracking.total_borrowed_duration,
            idle_duration: tracking.idle_duration,
            total_idle_duration: tracking.total_idle_duration,
        }
    }

    /// Serializes life-cycle work (activate, deactivate, validate, destroy).
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock()
    }

    /// Read the resource without waiting on a writing borrower.
    pub(crate) fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.resource.try_read()
    }

    /// Read an object nobody has borrowed.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read()
    }

    /// The borrower's claim on the resource.
    pub(crate) fn claim(&self) -> ArcRwLockUpgradableReadGuard<RawRwLock, T> {
        self.resource.upgradable_read_arc()
    }

    pub(crate) fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Relaxed)
    }

    pub(crate) fn set_queued(&self, queued: bool) {
        self.queued.store(queued, Ordering::Relaxed);
    }

    /// Leave the factory destroy to whoever drops the borrower's claim.
    pub(crate) fn defer_destroy(&self) {
        self.deferred.store(true, Ordering::Release);
    }

    pub(crate) fn take_deferred(&self) -> bool {
        self.deferred.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolInner<T>>) -> bool {
        std::ptr::eq(self.pool.as_ptr(), Arc::as_ptr(pool))
    }

    /// Move from `expected` to `next`; refused when the object is elsewhere
    /// or the state machine forbids the move.
    pub(crate) fn transition(&self, expected: State, next: State) -> bool {
        let mut tracking = self.tracking.lock();
        if tracking.state != expected || !expected.can_transition_to(next) {
            return false;
        }
        tracking.enter(next, Instant::now());
        true
    }

    /// Enter `Destroying` from any live state; false if already on the way out.
    pub(crate) fn begin_destroy(&self) -> bool {
        let mut tracking = self.tracking.lock();
        if !tracking.state.can_transition_to(State::Destroying) {
            return false;
        }
        tracking.enter(State::Destroying, Instant::now());
        true
    }

    /// How long the object has been borrowed, `None` unless it is active.
    pub(crate) fn active_for(&self, now: Instant) -> Option<Duration> {
        let tracking = self.tracking.lock();
        match (tracking.state, tracking.last_borrowed) {
            (State::Active, Some(borrowed)) => Some(now.saturating_duration_since(borrowed)),
            _ => None,
        }
    }

    /// How long the object has been idle, `None` unless it is idle.
    pub(crate) fn idle_for(&self, now: Instant) -> Option<Duration> {
        let tracking = self.tracking.lock();
        match (tracking.state, tracking.idle_since) {
            (State::Idle, Some(since)) => Some(now.saturating_duration_since(since)),
            _ => None,
        }
    }

    pub(crate) fn record_usage(&self, used: Instant) {
        let mut tracking = self.tracking.lock();
        if tracking.last_used.is_none_or(|last| used > last) {
            tracking.last_used = Some(used);
        }
    }
}

impl<T> fmt::Debug for PooledObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracking = self.tracking.lock();
        f.debug_struct("PooledObject")
            .field("id", &self.id)
            .field("state", &tracking.state)
            .field("borrowed_count", &tracking.borrowed_count)
            .finish()
    }
}

/// Convert a monotonic instant into wall-clock time.
pub(crate) fn wall_clock(instant: Instant) -> SystemTime {
    SystemTime::now()
        .checked_sub(instant.elapsed())
        .unwrap_or(UNIX_EPOCH)
}
