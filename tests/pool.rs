use objectpool::{
    FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration, PoolError, PoolRegistry, State,
    Strategy, ThreadExecutor, TokioExecutor, UsageReporter,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

/// A resource that flags concurrent use.
struct Slot {
    id: usize,
    in_use: AtomicBool,
    last_used: Mutex<Instant>,
    writes: u64,
}

impl Slot {
    fn enter(&self) -> bool {
        *self.last_used.lock() = Instant::now();
        !self.in_use.swap(true, Ordering::SeqCst)
    }

    fn leave(&self) {
        self.in_use.store(false, Ordering::SeqCst);
    }
}

impl UsageReporter for Slot {
    fn last_used_time(&self) -> Option<Instant> {
        Some(*self.last_used.lock())
    }
}

#[derive(Default)]
struct Slots {
    made: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl ObjectFactory<Slot> for Slots {
    fn make_object(&self, _pool: &ObjectPool<Slot>) -> FactoryResult<Slot> {
        let id = self.made.fetch_add(1, Ordering::SeqCst);
        Ok(Slot {
            id,
            in_use: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
            writes: 0,
        })
    }

    fn destroy_object(&self, _pool: &ObjectPool<Slot>, _object: &Slot) -> FactoryResult<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn config(maximum: usize) -> PoolConfiguration<Slot> {
    PoolConfiguration::new()
        .with_maximum(maximum)
        .with_maximum_wait(Duration::from_secs(10))
        .without_executor()
}

#[test]
fn never_exceeds_maximum_under_contention() {
    let pool = ObjectPool::new(Slots::default(), config(4)).unwrap();
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let pool = pool.clone();
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..50 {
                    let slot = pool.borrow_object().unwrap();
                    peak.fetch_max(pool.get_size(), Ordering::SeqCst);
                    thread::yield_now();
                    drop(slot);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(pool.get_size() <= 4);
    assert_eq!(pool.get_metrics().borrowed_count, 16 * 50);
}

#[test]
fn borrowers_never_share_an_object() {
    let pool = ObjectPool::new(Slots::default(), config(3)).unwrap();
    let shared = Arc::new(AtomicBool::new(false));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..100 {
                    let slot = pool.borrow_object().unwrap();
                    if !slot.enter() {
                        shared.store(true, Ordering::SeqCst);
                    }
                    thread::yield_now();
                    slot.leave();
                    pool.return_object(slot).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(!shared.load(Ordering::SeqCst));
    assert_eq!(pool.get_size_in_state(State::Active), 0);
}

#[test]
fn held_objects_are_distinct() {
    let config = config(5).with_strategy(Strategy::Fifo);
    let pool = ObjectPool::new(Slots::default(), config).unwrap();
    let held: Vec<_> = (0..5).map(|_| pool.borrow_object().unwrap()).collect();
    let ids: HashSet<_> = held.iter().map(|slot| slot.id).collect();
    assert_eq!(ids.len(), 5);
    assert_eq!(pool.get_size_in_state(State::Active), 5);
}

#[test]
fn sweep_runs_alongside_borrowers() {
    let factory = Slots::default();
    let made = Arc::clone(&factory.made);
    let destroyed = Arc::clone(&factory.destroyed);
    let config = config(4)
        .with_time_to_live_timeout(Duration::from_millis(5))
        .with_abandoned_timeout(Duration::from_millis(3))
        .with_usage_reporting()
        .with_inactive_timeout(Duration::from_millis(2))
        .with_maximum_reuse_count(5)
        .with_sweep_interval(Duration::from_millis(1))
        .with_executor(ThreadExecutor::new("busy-sweep"));
    let pool = ObjectPool::new(factory, config).unwrap();
    let shared = Arc::new(AtomicBool::new(false));
    let peak = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pool = pool.clone();
            let shared = Arc::clone(&shared);
            let peak = Arc::clone(&peak);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..200 {
                    let mut slot = pool.borrow_object().unwrap();
                    if !slot.enter() {
                        shared.store(true, Ordering::SeqCst);
                    }
                    if (worker + round) % 2 == 0 {
                        slot.writes += 1;
                    }
                    thread::yield_now();
                    slot.leave();
                    peak.fetch_max(pool.get_size(), Ordering::SeqCst);
                    if round % 50 == 0 {
                        thread::sleep(Duration::from_millis(6));
                    }
                    drop(slot);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(!shared.load(Ordering::SeqCst));
    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(pool.get_size() <= 4);
    // every object is retired after five borrows
    assert!(made.load(Ordering::SeqCst) >= 8 * 200 / 5);

    pool.close();
    assert_eq!(pool.get_size(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), made.load(Ordering::SeqCst));
}

#[test]
fn background_sweep_reclaims_abandoned_objects() {
    let factory = Slots::default();
    let destroyed = Arc::clone(&factory.destroyed);
    let config = PoolConfiguration::<Slot>::new()
        .with_abandoned_timeout(Duration::from_millis(50))
        .with_usage_reporting()
        .with_sweep_interval(Duration::from_millis(10))
        .with_executor(ThreadExecutor::new("abandoned-sweep"));
    let pool = ObjectPool::new(factory, config).unwrap();

    let forgotten = pool.borrow_object().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while forgotten.pooled().state() != State::Destroyed && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    assert_eq!(forgotten.pooled().state(), State::Destroyed);
    assert_eq!(pool.get_size(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(pool.get_metrics().reclaimed_objects >= 1);
}

#[tokio::test]
async fn tokio_sweep_evicts_inactive_objects() {
    let config = PoolConfiguration::<Slot>::new()
        .with_warmup(3)
        .with_minimum(1)
        .with_inactive_timeout(Duration::from_millis(30))
        .with_sweep_interval(Duration::from_millis(10))
        .with_executor(TokioExecutor::current().unwrap());
    let pool = ObjectPool::new(Slots::default(), config).unwrap();
    assert_eq!(pool.get_size(), 3);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(pool.get_size(), 1);
    pool.close();
}

#[test]
fn close_wakes_waiting_borrowers() {
    let pool = ObjectPool::new(Slots::default(), config(1)).unwrap();
    let _held = pool.borrow_object().unwrap();

    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || pool.borrow_object().map(|_| ()))
    };
    thread::sleep(Duration::from_millis(50));
    pool.close();

    let started = Instant::now();
    let result = waiter.join().unwrap();
    assert!(matches!(result, Err(PoolError::Closed { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn close_twice_destroys_everything_once() {
    let factory = Slots::default();
    let destroyed = Arc::clone(&factory.destroyed);
    let registry = Arc::new(PoolRegistry::new());
    let config = config(4)
        .with_warmup(3)
        .with_registry(Arc::clone(&registry));
    let pool = ObjectPool::new(factory, config).unwrap();
    let _held = pool.borrow_object().unwrap();

    pool.close();
    pool.close();

    assert!(pool.is_closed());
    assert_eq!(pool.get_size(), 0);
    assert_eq!(destroyed.load(Ordering::SeqCst), 3);
    assert!(registry.is_empty());
}
