//! Health monitoring for pools

use crate::metrics::PoolMetrics;

/// Discard ratio above which the pool is considered undersized.
const MAX_HEALTHY_DISCARD_RATIO: f64 = 0.5;

/// Returns observed before the discard ratio is trusted.
const MIN_RETURNS_FOR_RATIO: usize = 10;

/// Health status of a pool
///
/// # Examples
///
/// ```
/// use scoped_objectpool::Pool;
///
/// let pool = Pool::new(3, || Ok(7_u8));
///
/// let health = pool.health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_objects, 0);
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Share of returns that were discarded (0.0 to 1.0)
    pub discard_ratio: f64,

    /// Idle objects count
    pub idle_objects: usize,

    /// Checked-out objects count
    pub checked_out: usize,

    /// Idle-store capacity
    pub maximum_retained: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn from_metrics(metrics: &PoolMetrics) -> Self {
        let discard_ratio = metrics.discard_ratio();
        let returns = metrics.total_retained + metrics.total_discarded;

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        // Most returns being thrown away means the capacity is too small for the load.
        if returns >= MIN_RETURNS_FOR_RATIO
            && metrics.maximum_retained > 0
            && discard_ratio > MAX_HEALTHY_DISCARD_RATIO
        {
            warnings.push(format!(
                "High discard ratio: {:.1}% of returns discarded",
                discard_ratio * 100.0
            ));
            is_healthy = false;
        }

        if metrics.idle_objects == 0 && metrics.maximum_retained > 0 && metrics.total_created > 0 {
            warnings.push("Idle store is empty".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            discard_ratio,
            idle_objects: metrics.idle_objects,
            checked_out: metrics.checked_out,
            maximum_retained: metrics.maximum_retained,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(retained: usize, discarded: usize, idle: usize) -> PoolMetrics {
        PoolMetrics {
            service: "svc",
            maximum_retained: 2,
            idle_objects: idle,
            checked_out: 0,
            total_created: retained + discarded,
            total_reused: 0,
            total_retained: retained,
            total_discarded: discarded,
            utilization: idle as f64 / 2.0,
        }
    }

    #[test]
    fn test_undersized_pool_is_unhealthy() {
        let health = HealthStatus::from_metrics(&metrics(2, 18, 2));

        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 1);
        assert!(health.warnings[0].contains("discard"));
    }

    #[test]
    fn test_few_returns_do_not_trip_ratio() {
        let health = HealthStatus::from_metrics(&metrics(0, 3, 0));

        assert!(health.is_healthy());
        assert_eq!(health.warnings, vec!["Idle store is empty".to_string()]);
    }
}
