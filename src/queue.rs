//! Blocking queue of idle objects

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::Strategy;
use crate::pooled::PooledObject;

const INITIAL_WAIT: Duration = Duration::from_millis(10);
const MAXIMUM_WAIT: Duration = Duration::from_millis(100);
const WAIT_GROWTH: f64 = 1.2;

/// Idle objects, handed out in the order picked by the strategy.
///
/// Objects are always appended at the back; LIFO pops from the back,
/// FIFO from the front.
pub(crate) struct WaitQueue<T> {
    items: Mutex<VecDeque<Arc<PooledObject<T>>>>,
    available: Condvar,
    strategy: Strategy,
}

impl<T> WaitQueue<T> {
    pub(crate) fn new(strategy: Strategy, capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            strategy,
        }
    }

    pub(crate) fn push(&self, object: Arc<PooledObject<T>>) {
        let mut items = self.items.lock();
        object.set_queued(true);
        items.push_back(object);
        drop(items);
        self.available.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Arc<PooledObject<T>>> {
        let mut items = self.items.lock();
        self.take(&mut items)
    }

    /// Pop an object, waiting up to `wait` for one to be pushed.
    pub(crate) fn pop(&self, wait: Duration) -> Option<Arc<PooledObject<T>>> {
        let deadline = Instant::now() + wait;
        let mut items = self.items.lock();
        while items.is_empty() {
            if self.available.wait_until(&mut items, deadline).timed_out() {
                break;
            }
        }
        self.take(&mut items)
    }

    /// Pull a specific object out of the queue; `None` if someone else got it first.
    pub(crate) fn remove(&self, object: &PooledObject<T>) -> Option<Arc<PooledObject<T>>> {
        let mut items = self.items.lock();
        if !object.is_queued() {
            return None;
        }
        let position = items.iter().position(|queued| queued.id() == object.id())?;
        let removed = items.remove(position)?;
        removed.set_queued(false);
        Some(removed)
    }

    /// Pull out every object `select` picks, in queue order, in one pass.
    ///
    /// `select` also sees how many objects are still queued. It runs under
    /// the queue lock and must not touch the queue.
    pub(crate) fn extract(
        &self,
        mut select: impl FnMut(&PooledObject<T>, usize) -> bool,
    ) -> Vec<Arc<PooledObject<T>>> {
        let mut items = self.items.lock();
        let mut remaining = items.len();
        let mut selected = Vec::new();
        items.retain(|object| {
            if select(&**object, remaining) {
                remaining -= 1;
                object.set_queued(false);
                selected.push(Arc::clone(object));
                false
            } else {
                true
            }
        });
        selected
    }

    pub(crate) fn drain(&self) -> Vec<Arc<PooledObject<T>>> {
        self.extract(|_, _| true)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn take(&self, items: &mut VecDeque<Arc<PooledObject<T>>>) -> Option<Arc<PooledObject<T>>> {
        let object = match self.strategy {
            Strategy::Lifo => items.pop_back(),
            Strategy::Fifo => items.pop_front(),
        }?;
        object.set_queued(false);
        Some(object)
    }
}

/// Growing wait between polls of an exhausted pool.
pub(crate) struct Backoff {
    next: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self { next: INITIAL_WAIT }
    }

    pub(crate) fn next_wait(&mut self) -> Duration {
        let current = self.next;
        self.next = current.mul_f64(WAIT_GROWTH).min(MAXIMUM_WAIT);
        current
    }
}
