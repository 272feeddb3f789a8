//! Pool configuration options

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::executor::{ScheduledExecutor, ThreadExecutor};
use crate::factory::UsageReporter;
use crate::registry::PoolRegistry;

/// The maximum number of objects any pool can hold.
pub const MAXIMUM_POOL_SIZE: usize = 1024 * 1024;

const MINIMUM_SWEEP_INTERVAL: Duration = Duration::from_millis(10);
const MAXIMUM_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Order in which idle objects are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strategy {
    /// The object returned last is borrowed first, keeping a small hot set.
    #[default]
    Lifo,

    /// The object returned first is borrowed first, spreading usage evenly.
    Fifo,
}

/// Configuration for object pool behavior
///
/// # Examples
///
/// ```
/// use objectpool::{PoolConfiguration, Strategy};
/// use std::time::Duration;
///
/// let config = PoolConfiguration::<u32>::new()
///     .with_minimum(2)
///     .with_maximum(15)
///     .with_strategy(Strategy::Fifo)
///     .with_maximum_wait(Duration::from_secs(25));
///
/// assert_eq!(config.maximum, 15);
/// assert_eq!(config.strategy, Strategy::Fifo);
/// assert!(config.validate().is_ok());
/// ```
pub struct PoolConfiguration<T> {
    /// Name used in logs, errors and metric labels
    pub name: Option<String>,

    /// Number of idle objects the inactive timeout never evicts below
    pub minimum: usize,

    /// Maximum number of objects that can exist in the pool
    pub maximum: usize,

    /// How long an object may stay borrowed before it is reclaimed
    pub time_to_live_timeout: Duration,

    /// How long a borrowed object may go unused before it is reclaimed
    ///
    /// Only applies when a usage reporter is configured.
    pub abandoned_timeout: Duration,

    /// How long an idle object may sit in the pool before it is destroyed
    pub inactive_timeout: Duration,

    /// How long a borrower waits for an object to become available
    pub maximum_wait: Duration,

    /// Maximum lifetime of an object, borrowed or idle
    pub maximum_reuse_time: Duration,

    /// Maximum number of times an object can be borrowed, unbounded when `None`
    pub maximum_reuse_count: Option<u64>,

    /// Borrow order of idle objects
    pub strategy: Strategy,

    /// Validate idle objects before handing them out
    pub validate_on_borrow: bool,

    /// Validate objects when they are returned to the pool
    pub validate_on_return: bool,

    /// Validate idle objects during the reclamation sweep
    pub validate_while_idle: bool,

    /// Number of objects created when the pool is built
    pub warmup_size: Option<usize>,

    /// Reads the last time a pooled resource was used
    pub usage_reporter: Option<fn(&T) -> Option<Instant>>,

    /// Executor running the reclamation sweep, `None` disables it
    pub executor: Option<Arc<dyn ScheduledExecutor>>,

    /// Period of the reclamation sweep
    pub sweep_interval: Option<Duration>,

    /// Registry the pool joins on construction
    pub registry: Option<Arc<PoolRegistry>>,
}

impl<T> Default for PoolConfiguration<T> {
    fn default() -> Self {
        Self {
            name: None,
            minimum: 0,
            maximum: 10,
            time_to_live_timeout: Duration::from_secs(60 * 60),
            abandoned_timeout: Duration::from_secs(60 * 60),
            inactive_timeout: Duration::from_secs(60),
            maximum_wait: Duration::from_secs(60),
            maximum_reuse_time: Duration::from_secs(15 * 60),
            maximum_reuse_count: None,
            strategy: Strategy::default(),
            validate_on_borrow: false,
            validate_on_return: false,
            validate_while_idle: false,
            warmup_size: None,
            usage_reporter: None,
            executor: Some(Arc::new(ThreadExecutor::default())),
            sweep_interval: None,
            registry: None,
        }
    }
}

impl<T> Clone for PoolConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            minimum: self.minimum,
            maximum: self.maximum,
            time_to_live_timeout: self.time_to_live_timeout,
            abandoned_timeout: self.abandoned_timeout,
            inactive_timeout: self.inactive_timeout,
            maximum_wait: self.maximum_wait,
            maximum_reuse_time: self.maximum_reuse_time,
            maximum_reuse_count: self.maximum_reuse_count,
            strategy: self.strategy,
            validate_on_borrow: self.validate_on_borrow,
            validate_on_return: self.validate_on_return,
            validate_while_idle: self.validate_while_idle,
            warmup_size: self.warmup_size,
            usage_reporter: self.usage_reporter,
            executor: self.executor.clone(),
            sweep_interval: self.sweep_interval,
            registry: self.registry.clone(),
        }
    }
}

impl<T> fmt::Debug for PoolConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfiguration")
            .field("name", &self.name)
            .field("minimum", &self.minimum)
            .field("maximum", &self.maximum)
            .field("time_to_live_timeout", &self.time_to_live_timeout)
            .field("abandoned_timeout", &self.abandoned_timeout)
            .field("inactive_timeout", &self.inactive_timeout)
            .field("maximum_wait", &self.maximum_wait)
            .field("maximum_reuse_time", &self.maximum_reuse_time)
            .field("maximum_reuse_count", &self.maximum_reuse_count)
            .field("strategy", &self.strategy)
            .field("validate_on_borrow", &self.validate_on_borrow)
            .field("validate_on_return", &self.validate_on_return)
            .field("validate_while_idle", &self.validate_while_idle)
            .field("warmup_size", &self.warmup_size)
            .field("usage_reporting", &self.usage_reporter.is_some())
            .field("executor", &self.executor)
            .field("sweep_interval", &self.sweep_interval)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

impl<T> PoolConfiguration<T> {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the minimum number of idle objects kept by the sweep
    pub fn with_minimum(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use objectpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::<u32>::new().with_maximum(50);
    /// assert_eq!(config.maximum, 50);
    /// ```
    pub fn with_maximum(mut self, maximum: usize) -> Self {
        self.maximum = maximum;
        self
    }

    pub fn with_time_to_live_timeout(mut self, timeout: Duration) -> Self {
        self.time_to_live_timeout = timeout;
        self
    }

    pub fn with_abandoned_timeout(mut self, timeout: Duration) -> Self {
        self.abandoned_timeout = timeout;
        self
    }

    pub fn with_inactive_timeout(mut self, timeout: Duration) -> Self {
        self.inactive_timeout = timeout;
        self
    }

    /// Set how long a borrower waits before giving up
    pub fn with_maximum_wait(mut self, wait: Duration) -> Self {
        self.maximum_wait = wait;
        self
    }

    pub fn with_maximum_reuse_time(mut self, time: Duration) -> Self {
        self.maximum_reuse_time = time;
        self
    }

    pub fn with_maximum_reuse_count(mut self, count: u64) -> Self {
        self.maximum_reuse_count = Some(count);
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate idle objects with the factory before they are borrowed
    pub fn with_validation_on_borrow(mut self) -> Self {
        self.validate_on_borrow = true;
        self
    }

    /// Validate objects with the factory when they are returned
    pub fn with_validation_on_return(mut self) -> Self {
        self.validate_on_return = true;
        self
    }

    /// Validate idle objects with the factory during each sweep
    pub fn with_validation_while_idle(mut self) -> Self {
        self.validate_while_idle = true;
        self
    }

    /// Set warm-up size
    pub fn with_warmup(mut self, size: usize) -> Self {
        self.warmup_size = Some(size);
        self
    }

    /// Run the reclamation sweep on the given executor
    pub fn with_executor(mut self, executor: impl ScheduledExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Disable the background sweep; reclamation then only runs through
    /// [`ObjectPool::evict`](crate::ObjectPool::evict).
    pub fn without_executor(mut self) -> Self {
        self.executor = None;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Register the pool in `registry` once it is built
    pub fn with_registry(mut self, registry: Arc<PoolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Check the bounds of the configured options
    pub fn validate(&self) -> PoolResult<()> {
        if self.maximum > MAXIMUM_POOL_SIZE {
            return Err(PoolError::InvalidConfiguration(format!(
                "maximum ({}) must not exceed {}",
                self.maximum, MAXIMUM_POOL_SIZE
            )));
        }
        if self.minimum > self.maximum {
            return Err(PoolError::InvalidConfiguration(format!(
                "minimum ({}) must not exceed maximum ({})",
                self.minimum, self.maximum
            )));
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(PoolError::InvalidConfiguration(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The sweep period, derived from the smallest timeout unless set explicitly.
    pub fn effective_sweep_interval(&self) -> Duration {
        if let Some(interval) = self.sweep_interval {
            return interval;
        }
        let mut smallest = self
            .time_to_live_timeout
            .min(self.inactive_timeout)
            .min(self.maximum_reuse_time);
        if self.usage_reporter.is_some() {
            smallest = smallest.min(self.abandoned_timeout);
        }
        (smallest / 4).clamp(MINIMUM_SWEEP_INTERVAL, MAXIMUM_SWEEP_INTERVAL)
    }
}

impl<T: UsageReporter> PoolConfiguration<T> {
    /// Track abandoned objects through their [`UsageReporter`] implementation
    pub fn with_usage_reporting(mut self) -> Self {
        self.usage_reporter = Some(T::last_used_time);
        self
    }
}
