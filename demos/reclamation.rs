//! Reclamation of abandoned and inactive objects

use objectpool::{
    FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration, PoolRegistry, State, UsageReporter,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// A worker that remembers when it last did something
struct Worker {
    name: String,
    last_used: Mutex<Instant>,
}

impl Worker {
    fn work(&self) {
        *self.last_used.lock() = Instant::now();
    }
}

impl UsageReporter for Worker {
    fn last_used_time(&self) -> Option<Instant> {
        Some(*self.last_used.lock())
    }
}

struct Workers;

impl ObjectFactory<Worker> for Workers {
    fn make_object(&self, pool: &ObjectPool<Worker>) -> FactoryResult<Worker> {
        Ok(Worker {
            name: format!("{}-worker-{}", pool.name(), pool.get_size() + 1),
            last_used: Mutex::new(Instant::now()),
        })
    }

    fn destroy_object(&self, _pool: &ObjectPool<Worker>, object: &Worker) -> FactoryResult<()> {
        println!("   destroyed {}", object.name);
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("objectpool=debug"))
        .init();

    println!("=== objectpool - Reclamation Examples ===\n");

    let registry = Arc::new(PoolRegistry::new());

    // Example 1: Abandoned objects
    let _abandoned = abandoned(&registry);

    // Example 2: Inactive objects
    let _inactive = inactive(&registry);

    println!("3. Shutdown:");
    println!("   Pools still registered: {}", registry.len());
    registry.close_all();
    println!("   Pools after close_all: {}", registry.len());
}

fn abandoned(registry: &Arc<PoolRegistry>) -> ObjectPool<Worker> {
    println!("1. Abandoned Objects:");
    let config = PoolConfiguration::<Worker>::new()
        .with_name("abandoned")
        .with_abandoned_timeout(Duration::from_millis(100))
        .with_usage_reporting()
        .with_sweep_interval(Duration::from_millis(25))
        .with_registry(Arc::clone(registry));
    let pool = ObjectPool::new(Workers, config).unwrap();

    let forgotten = pool.borrow_object().unwrap();
    let busy = pool.borrow_object().unwrap();
    for _ in 0..10 {
        busy.work();
        thread::sleep(Duration::from_millis(25));
    }

    println!("   {} is {}", forgotten.name, forgotten.pooled().state());
    println!("   {} is {}", busy.name, busy.pooled().state());
    println!("   Reclaimed: {}", pool.get_metrics().reclaimed_objects);
    println!();
    pool
}

fn inactive(registry: &Arc<PoolRegistry>) -> ObjectPool<Worker> {
    println!("2. Inactive Objects:");
    let config = PoolConfiguration::new()
        .with_name("inactive")
        .with_minimum(2)
        .with_warmup(5)
        .with_inactive_timeout(Duration::from_millis(100))
        .with_registry(Arc::clone(registry));
    let pool = ObjectPool::new(Workers, config).unwrap();

    println!("   Idle after warm-up: {}", pool.get_size_in_state(State::Idle));
    thread::sleep(Duration::from_millis(300));
    println!("   Idle after sweep: {}", pool.get_size_in_state(State::Idle));
    println!();
    pool
}
