//! Metrics collection and export for pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of one pool's counters
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use scoped_objectpool::Pool;
///
/// let pool = Pool::new(2, || Ok(0_u64));
///
/// let instance = pool.get_object().unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.checked_out, 1);
///
/// pool.return_object(instance).unwrap();
/// assert_eq!(pool.metrics().idle_objects, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Type name of the pooled component
    pub service: &'static str,

    /// Idle-store capacity
    pub maximum_retained: usize,

    /// Instances currently idle in the pool
    pub idle_objects: usize,

    /// Instances handed out and not yet returned or discarded
    pub checked_out: usize,

    /// Instances built by the factory
    pub total_created: usize,

    /// Checkouts served from the idle store
    pub total_reused: usize,

    /// Returns that went back into the idle store
    pub total_retained: usize,

    /// Returns that were discarded
    pub total_discarded: usize,

    /// Idle-store fill ratio (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("service".to_string(), self.service.to_string());
        metrics.insert("maximum_retained".to_string(), self.maximum_retained.to_string());
        metrics.insert("idle_objects".to_string(), self.idle_objects.to_string());
        metrics.insert("checked_out".to_string(), self.checked_out.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_reused".to_string(), self.total_reused.to_string());
        metrics.insert("total_retained".to_string(), self.total_retained.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }

    /// Share of returns that ended in a discard.
    pub fn discard_ratio(&self) -> f64 {
        let returns = self.total_retained + self.total_discarded;
        if returns > 0 {
            self.total_discarded as f64 / returns as f64
        } else {
            0.0
        }
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use scoped_objectpool::Pool;
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::new(4, || Ok(String::new()));
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("scopedpool_objects_idle"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::errors::PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

        let registry = Registry::new();
        let labels = Self::labels(pool_name, tags);

        let int_gauges: [(&str, &str, usize); 7] = [
            ("scopedpool_objects_idle", "Current idle objects", metrics.idle_objects),
            ("scopedpool_objects_checked_out", "Current checked-out objects", metrics.checked_out),
            ("scopedpool_objects_created_total", "Total objects created", metrics.total_created),
            ("scopedpool_objects_reused_total", "Total checkouts served from the pool", metrics.total_reused),
            ("scopedpool_objects_retained_total", "Total objects retained on return", metrics.total_retained),
            ("scopedpool_objects_discarded_total", "Total objects discarded on return", metrics.total_discarded),
            ("scopedpool_maximum_retained", "Idle-store capacity", metrics.maximum_retained),
        ];

        for (name, help, value) in int_gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .map_err(Self::export_error)?;
            gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
            registry.register(Box::new(gauge)).map_err(Self::export_error)?;
        }

        let utilization = Gauge::with_opts(
            Opts::new("scopedpool_utilization", "Idle-store fill ratio").const_labels(labels),
        )
        .map_err(Self::export_error)?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization)).map_err(Self::export_error)?;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(Self::export_error)?;

        String::from_utf8(buffer).map_err(Self::export_error)
    }

    fn labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        labels
    }

    fn export_error<E>(err: E) -> crate::errors::PoolError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        crate::errors::PoolError::MetricsExport(std::sync::Arc::new(err))
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    created: AtomicUsize,
    reused: AtomicUsize,
    retained: AtomicUsize,
    discarded: AtomicUsize,
    checked_out: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
            retained: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            checked_out: AtomicUsize::new(0),
        }
    }

    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retained(&self) {
        self.retained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_checkout(&self) {
        self.checked_out.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_checkin(&self) {
        // Saturate so a foreign instance handed back cannot wrap the gauge.
        let _ = self
            .checked_out
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out.load(Ordering::Acquire)
    }

    pub fn get_metrics(
        &self,
        service: &'static str,
        idle: usize,
        maximum_retained: usize,
    ) -> PoolMetrics {
        let utilization = if maximum_retained > 0 {
            idle as f64 / maximum_retained as f64
        } else {
            0.0
        };

        PoolMetrics {
            service,
            maximum_retained,
            idle_objects: idle,
            checked_out: self.checked_out(),
            total_created: self.created.load(Ordering::Relaxed),
            total_reused: self.reused.load(Ordering::Relaxed),
            total_retained: self.retained.load(Ordering::Relaxed),
            total_discarded: self.discarded.load(Ordering::Relaxed),
            utilization,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discard_ratio() {
        let tracker = MetricsTracker::new();
        tracker.record_retained();
        tracker.record_discarded();
        tracker.record_discarded();
        tracker.record_discarded();

        let metrics = tracker.get_metrics("svc", 0, 4);
        assert!((metrics.discard_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_checkin_saturates() {
        let tracker = MetricsTracker::new();
        tracker.record_checkin();
        assert_eq!(tracker.checked_out(), 0);

        tracker.record_checkout();
        tracker.record_checkin();
        tracker.record_checkin();
        assert_eq!(tracker.checked_out(), 0);
    }

    #[test]
    fn test_export_map() {
        let tracker = MetricsTracker::new();
        tracker.record_created();

        let exported = tracker.get_metrics("svc", 1, 2).export();
        assert_eq!(exported.get("total_created").map(String::as_str), Some("1"));
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.50"));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export_carries_labels() {
        let tracker = MetricsTracker::new();
        tracker.record_created();
        tracker.record_checkout();

        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "dev".to_string());

        let text =
            MetricsExporter::export_prometheus(&tracker.get_metrics("svc", 0, 2), "conn", Some(&tags))
                .unwrap();

        assert!(text.contains("# TYPE scopedpool_objects_checked_out gauge"));
        assert!(text.contains("pool=\"conn\""));
        assert!(text.contains("env=\"dev\""));
        assert!(text.contains("scopedpool_objects_created_total"));
    }
}
