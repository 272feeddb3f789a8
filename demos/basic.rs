//! Basic usage examples

use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration, State, Strategy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Hands out numbered "connections"
struct Connections {
    next: AtomicU32,
}

impl Connections {
    fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }
}

impl ObjectFactory<String> for Connections {
    fn make_object(&self, pool: &ObjectPool<String>) -> FactoryResult<String> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        println!("   [{}] opening connection-{}", pool.name(), id);
        Ok(format!("connection-{id}"))
    }

    fn destroy_object(&self, pool: &ObjectPool<String>, object: &String) -> FactoryResult<()> {
        println!("   [{}] closing {}", pool.name(), object);
        Ok(())
    }
}

fn main() {
    println!("=== objectpool - Basic Examples ===\n");

    // Example 1: Borrow and automatic return
    simple_borrow();

    // Example 2: Explicit return and invalidation
    return_and_invalidate();

    // Example 3: LIFO vs FIFO
    strategies();

    // Example 4: Exhausted pool
    exhausted_pool();

    // Example 5: Metrics
    metrics();
}

fn simple_borrow() {
    println!("1. Simple Borrow:");
    let config = PoolConfiguration::new().with_name("simple");
    let pool = ObjectPool::new(Connections::new(), config).unwrap();

    {
        let connection = pool.borrow_object().unwrap();
        println!("   Got: {}", *connection);
        println!("   Active objects: {}", pool.get_size_in_state(State::Active));
    }

    println!("   Idle after return: {}", pool.get_size_in_state(State::Idle));
    pool.close();
    println!();
}

fn return_and_invalidate() {
    println!("2. Return and Invalidate:");
    let config = PoolConfiguration::new().with_name("explicit");
    let pool = ObjectPool::new(Connections::new(), config).unwrap();

    let first = pool.borrow_object().unwrap();
    let second = pool.borrow_object().unwrap();
    pool.return_object(first).unwrap();
    pool.invalidate_object(second).unwrap();

    println!("   Objects left: {}", pool.get_size());
    pool.close();
    println!();
}

fn strategies() {
    println!("3. Hand-out Order:");
    for strategy in [Strategy::Lifo, Strategy::Fifo] {
        let config = PoolConfiguration::new().with_strategy(strategy).with_warmup(2);
        let pool = ObjectPool::new(Connections::new(), config).unwrap();

        let a = pool.borrow_object().unwrap();
        let b = pool.borrow_object().unwrap();
        let (a_name, b_name) = (a.to_string(), b.to_string());
        pool.return_object(a).unwrap();
        pool.return_object(b).unwrap();

        let next = pool.borrow_object().unwrap();
        println!("   {strategy:?}: returned {a_name} then {b_name}, next borrow gets {}", *next);
        drop(next);
        pool.close();
    }
    println!();
}

fn exhausted_pool() {
    println!("4. Exhausted Pool:");
    let config = PoolConfiguration::new()
        .with_name("tiny")
        .with_maximum(1)
        .with_maximum_wait(Duration::from_millis(200));
    let pool = ObjectPool::new(Connections::new(), config).unwrap();

    let _held = pool.borrow_object().unwrap();
    match pool.borrow_object() {
        Ok(_) => println!("   Unexpectedly got an object"),
        Err(e) => println!("   Error: {e}"),
    }
    pool.close();
    println!();
}

fn metrics() {
    println!("5. Metrics:");
    let config = PoolConfiguration::new().with_name("metrics");
    let pool = ObjectPool::new(Connections::new(), config).unwrap();

    for _ in 0..5 {
        let _connection = pool.borrow_object().unwrap();
    }

    let mut exported: Vec<_> = pool.export_metrics().into_iter().collect();
    exported.sort();
    for (key, value) in exported {
        println!("   {key}: {value}");
    }

    print_prometheus(&pool);
    pool.close();
}

#[cfg(feature = "prometheus")]
fn print_prometheus(pool: &ObjectPool<String>) {
    match pool.export_metrics_prometheus(None) {
        Ok(text) => println!("\n   Prometheus:\n{text}"),
        Err(e) => println!("   Error: {e}"),
    }
}

#[cfg(not(feature = "prometheus"))]
fn print_prometheus(_pool: &ObjectPool<String>) {}
