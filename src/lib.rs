//! # objectpool
//!
//! Bounded, thread-safe object pool for expensive resources such as
//! connections, buffers or workers.
//!
//! ## Features
//!
//! - Objects created on demand by a user-supplied factory, up to a maximum
//! - Per-object life-cycle state machine with activation and validation hooks
//! - Blocking and async borrowing with a bounded wait
//! - Automatic return of objects via RAII (Drop trait)
//! - LIFO or FIFO hand-out order
//! - Background reclamation of expired, abandoned and inactive objects
//! - Maximum reuse time and count per object
//! - Pool and per-object metrics, with Prometheus export
//! - Injectable registry for managing pools together
//!
//! ## Quick Start
//!
//! ```rust
//! use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration};
//! use std::time::Duration;
//!
//! struct Connections;
//!
//! impl ObjectFactory<String> for Connections {
//!     fn make_object(&self, _pool: &ObjectPool<String>) -> FactoryResult<String> {
//!         Ok("connection".to_string())
//!     }
//!
//!     fn destroy_object(
//!         &self,
//!         _pool: &ObjectPool<String>,
//!         _object: &String,
//!     ) -> FactoryResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let config = PoolConfiguration::new()
//!     .with_name("connections")
//!     .with_maximum(8)
//!     .with_maximum_wait(Duration::from_secs(1));
//! let pool = ObjectPool::new(Connections, config).unwrap();
//! {
//!     let connection = pool.borrow_object().unwrap();
//!     println!("Got: {}", *connection);
//!     // Object automatically returned when `connection` goes out of scope
//! }
//! pool.close();
//! ```

mod config;
mod errors;
mod eviction;
mod executor;
mod factory;
mod metrics;
mod pool;
mod pooled;
mod queue;
mod registry;

pub use config::{PoolConfiguration, Strategy, MAXIMUM_POOL_SIZE};
pub use errors::{FactoryError, FactoryResult, PoolError, PoolResult};
pub use eviction::ReclaimReason;
pub use executor::{PeriodicTask, ScheduledExecutor, ScheduledTask, ThreadExecutor, TokioExecutor};
pub use factory::{ActivableObjectFactory, ObjectFactory, UsageReporter};
#[cfg(feature = "prometheus")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use pool::{Borrowed, ObjectPool};
pub use pooled::{PooledObject, PooledObjectMetrics, State};
pub use registry::{ManagedPool, PoolRegistry};
