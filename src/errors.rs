//! Error types for the object pool

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error raised by an [`ObjectFactory`](crate::ObjectFactory) hook.
pub type FactoryError = Box<dyn StdError + Send + Sync>;

/// Result of an [`ObjectFactory`](crate::ObjectFactory) hook.
pub type FactoryResult<T> = Result<T, FactoryError>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool '{pool}' is closed")]
    Closed { pool: String },

    #[error("Pool '{pool}' is at maximum capacity ({maximum} objects)")]
    PoolFull { pool: String, maximum: usize },

    #[error("Failed to create object in pool '{pool}', root cause: {source}")]
    Creation {
        pool: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    #[error("Failed to borrow object from pool '{pool}' within the expected timeout ({wait:?})")]
    Timeout { pool: String, wait: Duration },

    #[error("Object {object} is not owned by pool '{pool}'")]
    NotOwned { pool: String, object: u64 },

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to schedule pool maintenance: {0}")]
    Executor(String),

    #[error("Failed to export metrics: {0}")]
    MetricsExport(String),
}

impl PoolError {
    pub(crate) fn creation(pool: &str, source: FactoryError) -> Self {
        PoolError::Creation {
            pool: pool.to_string(),
            source: Arc::from(source),
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
