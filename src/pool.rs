//! Bounded store of idle reusable instances

use crate::component::{Component, Dispose, DisposeHook};
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace, warn};

/// Thread-safe pool of idle instances backed by a factory.
///
/// `get_object` never blocks: it pops an idle instance or builds a new one. Returned
/// instances are retained while fewer than `maximum_retained` are idle and discarded
/// (and disposed, when a disposer is set) otherwise.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use scoped_objectpool::Pool;
///
/// let pool = Pool::new(1, || Ok(String::from("expensive")));
///
/// let first = pool.get_object().unwrap();
/// pool.return_object(Arc::clone(&first)).unwrap();
///
/// let again = pool.get_object().unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
/// ```
pub struct Pool<T> {
    idle: ArrayQueue<Arc<T>>,
    maximum_retained: usize,
    factory: Box<dyn Fn() -> PoolResult<T> + Send + Sync>,
    disposer: Option<DisposeHook<T>>,
    metrics: MetricsTracker,
    torn_down: AtomicBool,
}

impl<T: Component> Pool<T> {
    /// Create an empty pool that retains at most `maximum_retained` idle instances.
    pub fn new<F>(maximum_retained: usize, factory: F) -> Self
    where
        F: Fn() -> PoolResult<T> + Send + Sync + 'static,
    {
        Self {
            // ArrayQueue rejects a zero capacity; a zero-retention pool never pushes.
            idle: ArrayQueue::new(maximum_retained.max(1)),
            maximum_retained,
            factory: Box::new(factory),
            disposer: None,
            metrics: MetricsTracker::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Run `disposer` on every instance the pool abandons.
    pub fn with_disposer(mut self, disposer: fn(&T) -> Result<(), BoxError>) -> Self {
        self.disposer = Some(disposer);
        self
    }

    /// Dispose abandoned instances through their [`Dispose`] implementation.
    pub fn with_dispose(self) -> Self
    where
        T: Dispose,
    {
        self.with_disposer(<T as Dispose>::dispose)
    }

    /// Take an idle instance, or build one when none is idle.
    pub fn get_object(&self) -> PoolResult<Arc<T>> {
        let instance = match self.idle.pop() {
            Some(instance) => {
                self.metrics.record_reused();
                trace!(target: "scoped_objectpool", service = std::any::type_name::<T>(), "reusing idle instance");
                instance
            }
            None => {
                let instance = Arc::new((self.factory)()?);
                self.metrics.record_created();
                trace!(target: "scoped_objectpool", service = std::any::type_name::<T>(), "created new instance");
                instance
            }
        };

        self.metrics.record_checkout();
        Ok(instance)
    }

    /// Hand a checked-out instance back.
    ///
    /// The instance is retained when there is room and the pool has not been torn down;
    /// otherwise it is discarded.
    pub fn return_object(&self, instance: Arc<T>) -> PoolResult<()> {
        if self.maximum_retained == 0 || self.is_torn_down() {
            return self.discard_object(instance);
        }

        match self.idle.push(instance) {
            Ok(()) => {
                self.metrics.record_checkin();
                self.metrics.record_retained();
                trace!(target: "scoped_objectpool", service = std::any::type_name::<T>(), idle = self.idle.len(), "retained instance");

                // A teardown that ran between the check above and the push would otherwise
                // leave this instance stranded in a dead pool.
                if self.is_torn_down() {
                    return self.drain();
                }
                Ok(())
            }
            Err(instance) => self.discard_object(instance),
        }
    }

    /// Abandon a checked-out instance, disposing it when a disposer is set.
    pub fn discard_object(&self, instance: Arc<T>) -> PoolResult<()> {
        self.metrics.record_checkin();
        self.metrics.record_discarded();
        trace!(target: "scoped_objectpool", service = std::any::type_name::<T>(), "discarding instance");
        self.dispose(&instance)
    }

    /// Dispose every idle instance. Later returns are always discarded; later gets
    /// still succeed by building fresh instances.
    pub fn teardown(&self) -> PoolResult<()> {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(
            target: "scoped_objectpool",
            service = std::any::type_name::<T>(),
            idle = self.idle.len(),
            "tearing down pool"
        );
        self.drain()
    }

    /// Whether [`teardown`](Self::teardown) has run.
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Most idle instances the pool keeps.
    pub fn maximum_retained(&self) -> usize {
        self.maximum_retained
    }

    /// Number of idle instances currently stored.
    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    /// Number of instances handed out and not yet returned or discarded.
    pub fn checked_out_count(&self) -> usize {
        self.metrics.checked_out()
    }

    /// Snapshot of the pool counters.
    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(
            std::any::type_name::<T>(),
            self.idle.len(),
            self.maximum_retained,
        )
    }

    /// Health derived from the current metrics.
    pub fn health_status(&self) -> HealthStatus {
        HealthStatus::from_metrics(&self.metrics())
    }

    /// Current metrics as string key/value pairs.
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    fn drain(&self) -> PoolResult<()> {
        let mut first_error: Option<PoolError> = None;

        while let Some(instance) = self.idle.pop() {
            if let Err(err) = self.dispose(&instance) {
                if first_error.is_some() {
                    warn!(target: "scoped_objectpool", error = %err, "additional failure while draining pool");
                } else {
                    first_error = Some(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn dispose(&self, instance: &T) -> PoolResult<()> {
        match self.disposer {
            Some(dispose) => dispose(instance).map_err(PoolError::dispose::<T>),
            None => Ok(()),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("service", &std::any::type_name::<T>())
            .field("maximum_retained", &self.maximum_retained)
            .field("idle", &self.idle.len())
            .field("torn_down", &self.torn_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Tracked {
        disposed: AtomicUsize,
    }

    impl Dispose for Tracked {
        fn dispose(&self) -> Result<(), BoxError> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counting_pool(capacity: usize) -> (Pool<Tracked>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let pool = Pool::new(capacity, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Tracked::default())
        })
        .with_dispose();
        (pool, built)
    }

    #[test]
    fn test_returned_instance_is_reused() {
        let (pool, built) = counting_pool(4);

        let first = pool.get_object().unwrap();
        pool.return_object(Arc::clone(&first)).unwrap();
        let second = pool.get_object().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(first.disposed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_capacity_one_retains_first_and_discards_second() {
        let (pool, built) = counting_pool(1);

        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);

        pool.return_object(Arc::clone(&a)).unwrap();
        pool.return_object(Arc::clone(&b)).unwrap();

        assert_eq!(pool.idle_count(), 1);
        assert_eq!(a.disposed.load(Ordering::SeqCst), 0);
        assert_eq!(b.disposed.load(Ordering::SeqCst), 1);

        let metrics = pool.metrics();
        assert_eq!(metrics.total_retained, 1);
        assert_eq!(metrics.total_discarded, 1);
        assert_eq!(metrics.checked_out, 0);
    }

    #[test]
    fn test_zero_capacity_never_retains() {
        let (pool, built) = counting_pool(0);

        let a = pool.get_object().unwrap();
        pool.return_object(Arc::clone(&a)).unwrap();
        let b = pool.get_object().unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(a.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_teardown_disposes_idle_only() {
        let (pool, _) = counting_pool(4);

        let idle = pool.get_object().unwrap();
        let outstanding = pool.get_object().unwrap();
        pool.return_object(Arc::clone(&idle)).unwrap();

        pool.teardown().unwrap();

        assert_eq!(idle.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(outstanding.disposed.load(Ordering::SeqCst), 0);
        assert_eq!(pool.idle_count(), 0);

        // Returns after teardown are discarded, gets still build.
        pool.return_object(Arc::clone(&outstanding)).unwrap();
        assert_eq!(outstanding.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);
        assert!(pool.get_object().is_ok());

        // Second teardown is a no-op.
        pool.teardown().unwrap();
        assert_eq!(idle.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_error_propagates() {
        let pool: Pool<Tracked> = Pool::new(2, || Err(PoolError::ContainerDisposed));

        assert!(matches!(pool.get_object(), Err(PoolError::ContainerDisposed)));
        assert_eq!(pool.checked_out_count(), 0);
    }

    #[test]
    fn test_dispose_error_propagates() {
        struct Faulty;
        let pool = Pool::new(0, || Ok(Faulty)).with_disposer(|_| Err("boom".into()));

        let instance = pool.get_object().unwrap();
        let err = pool.return_object(instance).unwrap_err();

        assert!(err.is_dispose_failure());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_teardown_disposes_past_failures() {
        static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

        struct Faulty;
        let pool = Pool::new(3, || Ok(Faulty)).with_disposer(|_| {
            let attempt = ATTEMPTS.fetch_add(1, Ordering::SeqCst);
            Err(format!("boom {attempt}").into())
        });

        let checked_out: Vec<_> = (0..3).map(|_| pool.get_object().unwrap()).collect();
        for instance in checked_out {
            pool.return_object(instance).unwrap();
        }

        let err = pool.teardown().unwrap_err();

        assert!(err.to_string().contains("boom 0"));
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 3);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_concurrent_get_and_return_respect_capacity() {
        let (pool, built) = counting_pool(3);
        let pool = Arc::new(pool);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let instance = pool.get_object().unwrap();
                        assert!(pool.idle_count() <= 3);
                        pool.return_object(instance).unwrap();
                        assert!(pool.idle_count() <= 3);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = pool.metrics();
        assert!(metrics.idle_objects <= 3);
        assert_eq!(metrics.checked_out, 0);
        assert!(metrics.idle_objects + metrics.checked_out <= built.load(Ordering::SeqCst));
        assert_eq!(metrics.total_created, built.load(Ordering::SeqCst));
    }
}
