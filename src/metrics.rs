//! Metrics collection and export for object pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use objectpool::{FactoryResult, ObjectFactory, ObjectPool, PoolConfiguration};
///
/// struct Numbers;
///
/// impl ObjectFactory<u32> for Numbers {
///     fn make_object(&self, _pool: &ObjectPool<u32>) -> FactoryResult<u32> {
///         Ok(7)
///     }
///
///     fn destroy_object(&self, _pool: &ObjectPool<u32>, _object: &u32) -> FactoryResult<()> {
///         Ok(())
///     }
/// }
///
/// let pool = ObjectPool::new(Numbers, PoolConfiguration::new().without_executor()).unwrap();
/// let _object = pool.borrow_object().unwrap();
///
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.borrowed_count, 1);
/// assert_eq!(metrics.active_objects, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// When the pool was created
    pub created_time: SystemTime,

    /// Successful borrows
    pub borrowed_count: u64,

    /// Total time borrowers spent acquiring objects
    pub borrowed_duration: Duration,

    /// Objects handed back through return
    pub released_count: u64,

    /// Total time spent returning objects
    pub released_duration: Duration,

    /// Objects created by the factory
    pub created_objects: u64,

    /// Objects destroyed
    pub destroyed_objects: u64,

    /// Destroy calls the factory failed
    pub destroy_failures: u64,

    /// Failed activations or deactivations
    pub activation_failures: u64,

    /// Objects that failed validation
    pub validation_failures: u64,

    /// Objects reclaimed by the sweep
    pub reclaimed_objects: u64,

    /// Borrows that gave up waiting
    pub borrow_timeouts: u64,

    /// Objects currently tracked
    pub size: usize,

    /// Current active objects
    pub active_objects: usize,

    /// Current idle objects
    pub idle_objects: usize,

    /// Maximum pool capacity
    pub maximum: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("borrowed_count".to_string(), self.borrowed_count.to_string());
        metrics.insert(
            "borrowed_duration_ms".to_string(),
            self.borrowed_duration.as_millis().to_string(),
        );
        metrics.insert("released_count".to_string(), self.released_count.to_string());
        metrics.insert(
            "released_duration_ms".to_string(),
            self.released_duration.as_millis().to_string(),
        );
        metrics.insert("created_objects".to_string(), self.created_objects.to_string());
        metrics.insert("destroyed_objects".to_string(), self.destroyed_objects.to_string());
        metrics.insert("destroy_failures".to_string(), self.destroy_failures.to_string());
        metrics.insert("activation_failures".to_string(), self.activation_failures.to_string());
        metrics.insert("validation_failures".to_string(), self.validation_failures.to_string());
        metrics.insert("reclaimed_objects".to_string(), self.reclaimed_objects.to_string());
        metrics.insert("borrow_timeouts".to_string(), self.borrow_timeouts.to_string());
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("active_objects".to_string(), self.active_objects.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("maximum".to_string(), self.maximum.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "prometheus")]
pub struct MetricsExporter;

#[cfg(feature = "prometheus")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every sample is labelled with `pool="<pool_name>"` plus the given tags.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        Self::render(metrics, pool_name, tags)
            .map_err(|e| crate::PoolError::MetricsExport(e.to_string()))
    }

    fn render(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{
            Counter, Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder,
        };

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());
        let registry = Registry::new();

        // Gauge metrics
        for (name, help, value) in [
            ("objectpool_objects", "Objects currently tracked", metrics.size),
            ("objectpool_objects_active", "Current active objects", metrics.active_objects),
            ("objectpool_objects_idle", "Current idle objects", metrics.idle_objects),
            ("objectpool_objects_maximum", "Maximum pool capacity", metrics.maximum),
        ] {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
            registry.register(Box::new(gauge))?;
        }
        let utilization =
            Gauge::with_opts(opts("objectpool_utilization", "Pool utilization ratio"))?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        // Counter metrics
        for (name, help, value) in [
            ("objectpool_borrowed_total", "Objects borrowed", metrics.borrowed_count),
            ("objectpool_released_total", "Objects returned", metrics.released_count),
            ("objectpool_created_total", "Objects created", metrics.created_objects),
            ("objectpool_destroyed_total", "Objects destroyed", metrics.destroyed_objects),
            ("objectpool_destroy_failures_total", "Failed destroys", metrics.destroy_failures),
            (
                "objectpool_activation_failures_total",
                "Failed activations",
                metrics.activation_failures,
            ),
            (
                "objectpool_validation_failures_total",
                "Failed validations",
                metrics.validation_failures,
            ),
            (
                "objectpool_reclaimed_total",
                "Objects reclaimed by the sweep",
                metrics.reclaimed_objects,
            ),
            ("objectpool_borrow_timeouts_total", "Borrows that timed out", metrics.borrow_timeouts),
        ] {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }
        for (name, help, value) in [
            (
                "objectpool_borrow_seconds_total",
                "Time spent acquiring objects",
                metrics.borrowed_duration,
            ),
            (
                "objectpool_release_seconds_total",
                "Time spent returning objects",
                metrics.released_duration,
            ),
        ] {
            let counter = Counter::with_opts(opts(name, help))?;
            counter.inc_by(value.as_secs_f64());
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    created_time: SystemTime,
    borrowed_count: AtomicU64,
    borrowed_nanos: AtomicU64,
    released_count: AtomicU64,
    released_nanos: AtomicU64,
    created_objects: AtomicU64,
    destroyed_objects: AtomicU64,
    destroy_failures: AtomicU64,
    activation_failures: AtomicU64,
    validation_failures: AtomicU64,
    reclaimed_objects: AtomicU64,
    borrow_timeouts: AtomicU64,
}

/// Point-in-time object counts passed into a snapshot.
pub(crate) struct Occupancy {
    pub size: usize,
    pub active: usize,
    pub idle: usize,
    pub maximum: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            created_time: SystemTime::now(),
            borrowed_count: AtomicU64::new(0),
            borrowed_nanos: AtomicU64::new(0),
            released_count: AtomicU64::new(0),
            released_nanos: AtomicU64::new(0),
            created_objects: AtomicU64::new(0),
            destroyed_objects: AtomicU64::new(0),
            destroy_failures: AtomicU64::new(0),
            activation_failures: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            reclaimed_objects: AtomicU64::new(0),
            borrow_timeouts: AtomicU64::new(0),
        }
    }

    pub fn record_borrowed(&self, waited: Duration) {
        self.borrowed_count.fetch_add(1, Ordering::Relaxed);
        self.borrowed_nanos.fetch_add(nanos(waited), Ordering::Relaxed);
    }

    pub fn record_released(&self, took: Duration) {
        self.released_count.fetch_add(1, Ordering::Relaxed);
        self.released_nanos.fetch_add(nanos(took), Ordering::Relaxed);
    }

    pub fn record_created(&self) {
        self.created_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroyed(&self) {
        self.destroyed_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_destroy_failure(&self) {
        self.destroy_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activation_failure(&self) {
        self.activation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reclaimed(&self) {
        self.reclaimed_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.borrow_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, occupancy: Occupancy) -> PoolMetrics {
        let utilization = if occupancy.maximum > 0 {
            occupancy.active as f64 / occupancy.maximum as f64
        } else {
            0.0
        };

        PoolMetrics {
            created_time: self.created_time,
            borrowed_count: self.borrowed_count.load(Ordering::Relaxed),
            borrowed_duration: Duration::from_nanos(self.borrowed_nanos.load(Ordering::Relaxed)),
            released_count: self.released_count.load(Ordering::Relaxed),
            released_duration: Duration::from_nanos(self.released_nanos.load(Ordering::Relaxed)),
            created_objects: self.created_objects.load(Ordering::Relaxed),
            destroyed_objects: self.destroyed_objects.load(Ordering::Relaxed),
            destroy_failures: self.destroy_failures.load(Ordering::Relaxed),
            activation_failures: self.activation_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            reclaimed_objects: self.reclaimed_objects.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            size: occupancy.size,
            active_objects: occupancy.active,
            idle_objects: occupancy.idle,
            maximum: occupancy.maximum,
            utilization,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tracker: &MetricsTracker) -> PoolMetrics {
        tracker.get_metrics(Occupancy {
            size: 4,
            active: 3,
            idle: 1,
            maximum: 4,
        })
    }

    #[test]
    fn test_tracker_accumulates() {
        let tracker = MetricsTracker::new();
        tracker.record_borrowed(Duration::from_millis(3));
        tracker.record_borrowed(Duration::from_millis(2));
        tracker.record_released(Duration::from_millis(1));
        tracker.record_created();
        tracker.record_timeout();

        let metrics = snapshot(&tracker);
        assert_eq!(metrics.borrowed_count, 2);
        assert_eq!(metrics.borrowed_duration, Duration::from_millis(5));
        assert_eq!(metrics.released_count, 1);
        assert_eq!(metrics.created_objects, 1);
        assert_eq!(metrics.borrow_timeouts, 1);
        assert!((metrics.utilization - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_export_map() {
        let metrics = snapshot(&MetricsTracker::new());
        let exported = metrics.export();
        assert_eq!(exported.get("active_objects").map(String::as_str), Some("3"));
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.75"));
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_prometheus_labels() {
        let tracker = MetricsTracker::new();
        tracker.record_borrowed(Duration::from_millis(1));
        let metrics = snapshot(&tracker);

        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "api".to_string());
        let output = MetricsExporter::export_prometheus(&metrics, "db", Some(&tags)).unwrap();

        assert!(output.contains("objectpool_objects_active"));
        assert!(output.contains("pool=\"db\""));
        assert!(output.contains("service=\"api\""));
        assert!(output.contains("objectpool_borrowed_total"));
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_prometheus_rejects_bad_label() {
        let metrics = snapshot(&MetricsTracker::new());
        let mut tags = HashMap::new();
        tags.insert("not a label".to_string(), "x".to_string());
        assert!(MetricsExporter::export_prometheus(&metrics, "db", Some(&tags)).is_err());
    }
}
