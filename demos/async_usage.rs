//! Async usage examples

use objectpool::{
    ActivableObjectFactory, FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration,
    PooledObject, TokioExecutor,
};
use std::time::Duration;
use tokio::time::sleep;

/// Sessions that must be reset between borrowers
struct Sessions;

impl ObjectFactory<Vec<u8>> for Sessions {
    fn make_object(&self, _pool: &ObjectPool<Vec<u8>>) -> FactoryResult<Vec<u8>> {
        Ok(Vec::with_capacity(256))
    }

    fn destroy_object(&self, _pool: &ObjectPool<Vec<u8>>, _object: &Vec<u8>) -> FactoryResult<()> {
        Ok(())
    }
}

impl ActivableObjectFactory<Vec<u8>> for Sessions {
    fn activate_object(
        &self,
        _pool: &ObjectPool<Vec<u8>>,
        object: &PooledObject<Vec<u8>>,
    ) -> FactoryResult<()> {
        tracing::info!(object = object.id(), "session activated");
        Ok(())
    }

    fn deactivate_object(
        &self,
        _pool: &ObjectPool<Vec<u8>>,
        object: &PooledObject<Vec<u8>>,
    ) -> FactoryResult<()> {
        tracing::info!(
            object = object.id(),
            borrowed = ?object.borrowed_duration(),
            "session deactivated"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("objectpool=debug,async_usage=info"))
        .init();

    println!("=== objectpool - Async Examples ===\n");

    // Example 1: Async borrow
    async_borrow().await;

    // Example 2: Async with timeout
    async_with_timeout().await;

    // Example 3: Concurrent access
    concurrent_access().await;
}

fn config(name: &str) -> PoolConfiguration<Vec<u8>> {
    let config = PoolConfiguration::new().with_name(name);
    match TokioExecutor::current() {
        Ok(executor) => config.with_executor(executor),
        Err(_) => config,
    }
}

async fn async_borrow() {
    println!("1. Async Borrow:");
    let pool = ObjectPool::with_activation(Sessions, config("borrow")).unwrap();

    {
        let mut session = pool.borrow_object_async().await.unwrap();
        session.extend_from_slice(b"hello");
        println!("   Session {} holds {} bytes", session.id(), session.len());
    }

    pool.close();
    println!();
}

async fn async_with_timeout() {
    println!("2. Async with Timeout:");
    let config = config("timeout")
        .with_maximum(1)
        .with_maximum_wait(Duration::from_millis(100));
    let pool = ObjectPool::with_activation(Sessions, config).unwrap();

    // Take the only session
    let _session = pool.borrow_object_async().await.unwrap();

    // Try to get another (should time out)
    match pool.borrow_object_async().await {
        Ok(_) => println!("   Got session"),
        Err(e) => println!("   Error: {e}"),
    }

    pool.close();
    println!();
}

async fn concurrent_access() {
    println!("3. Concurrent Access:");
    let config = config("concurrent")
        .with_maximum(3)
        .with_maximum_wait(Duration::from_secs(5));
    let pool = ObjectPool::with_activation(Sessions, config).unwrap();

    let mut handles = vec![];
    for i in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let session = pool.borrow_object_async().await.unwrap();
            sleep(Duration::from_millis(20)).await;
            println!("   Task {} used session {}", i, session.id());
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let metrics = pool.get_metrics();
    println!(
        "   Created {} sessions for {} borrows",
        metrics.created_objects, metrics.borrowed_count
    );
    pool.close();
}
