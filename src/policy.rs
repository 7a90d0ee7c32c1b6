//! Pluggable policies governing transitions into and out of a pool

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::component::Component;
use crate::context::ResolveContext;
use crate::errors::{PoolError, PoolResult};

/// Where a checkout takes its instance from, as decided by
/// [`RegistrationPolicy::before_get`].
pub enum GetSource<T> {
    /// Take an idle instance from the pool, building one if none is idle.
    Pool,
    /// Skip the pool and use this instance. The requesting scope owns it and disposes it
    /// when the scope ends; it is never offered back to the pool.
    Private(Arc<T>),
    /// Produce nothing. Resolution fails with
    /// [`PoolError::PolicyYieldedNoInstance`].
    Decline,
}

/// Decision-maker invoked around every pool get and return of one registration.
///
/// A policy is shared by every scope resolving the registration and is called without
/// any external locking; policies with their own state synchronize it themselves.
///
/// Hook order for a checkout sourced from the pool: `before_get`, pool get,
/// `after_get`, then the component's
/// [`on_get_from_pool`](crate::PoolAware::on_get_from_pool). At scope teardown:
/// [`on_return_to_pool`](crate::PoolAware::on_return_to_pool), `before_return`, then the
/// pool retains or discards.
pub trait RegistrationPolicy<T>: Send + Sync {
    /// Idle-store capacity of the pool, fixed for the policy's lifetime.
    fn maximum_retained(&self) -> usize;

    /// Runs before the pool is consulted. May block, e.g. for admission control.
    fn before_get(&self, _ctx: &ResolveContext<'_>) -> GetSource<T> {
        GetSource::Pool
    }

    /// Runs after a pool-sourced instance is obtained.
    fn after_get(&self, _ctx: &ResolveContext<'_>, _instance: &T) {}

    /// Runs when a checkout admitted by `before_get` fails before it is bound to a scope.
    fn get_failed(&self, _ctx: &ResolveContext<'_>, _error: &PoolError) {}

    /// `true` offers the instance back to the pool, `false` discards and disposes it.
    fn before_return(&self, _instance: &T) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Always pools, never blocks.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{DefaultRegistrationPolicy, RegistrationPolicy};
///
/// let policy = DefaultRegistrationPolicy::with_maximum_retained(8).unwrap();
/// assert_eq!(RegistrationPolicy::<String>::maximum_retained(&policy), 8);
///
/// assert!(DefaultRegistrationPolicy::with_maximum_retained(-1).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DefaultRegistrationPolicy {
    maximum_retained: usize,
}

impl DefaultRegistrationPolicy {
    /// Retain up to twice the available parallelism.
    pub fn new() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);

        Self {
            maximum_retained: parallelism * 2,
        }
    }

    pub fn with_maximum_retained(maximum_retained: i64) -> PoolResult<Self> {
        let maximum_retained = usize::try_from(maximum_retained)
            .map_err(|_| PoolError::NegativeCapacity(maximum_retained))?;

        Ok(Self { maximum_retained })
    }
}

impl Default for DefaultRegistrationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> RegistrationPolicy<T> for DefaultRegistrationPolicy {
    fn maximum_retained(&self) -> usize {
        self.maximum_retained
    }
}

/// Caps the number of concurrently checked-out instances by blocking in `before_get`
/// until a permit frees up.
///
/// Permits are taken by pool-sourced checkouts and given back when the checkout is
/// returned or fails.
pub struct AdmissionControlPolicy {
    maximum_retained: usize,
    max_live: usize,
    live: Mutex<usize>,
    permit_released: Condvar,
}

impl AdmissionControlPolicy {
    /// Allow at most `max_live` checkouts at once and retain as many idle instances.
    pub fn new(max_live: NonZeroUsize) -> Self {
        Self {
            maximum_retained: max_live.get(),
            max_live: max_live.get(),
            live: Mutex::new(0),
            permit_released: Condvar::new(),
        }
    }

    pub fn with_maximum_retained(mut self, maximum_retained: usize) -> Self {
        self.maximum_retained = maximum_retained;
        self
    }

    /// Checkouts currently holding a permit.
    pub fn in_use(&self) -> usize {
        *self.live.lock()
    }

    fn acquire(&self) {
        let mut live = self.live.lock();
        while *live >= self.max_live {
            self.permit_released.wait(&mut live);
        }
        *live += 1;
    }

    fn release(&self) {
        let mut live = self.live.lock();
        *live = live.saturating_sub(1);
        drop(live);
        self.permit_released.notify_one();
    }
}

impl std::fmt::Debug for AdmissionControlPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionControlPolicy")
            .field("maximum_retained", &self.maximum_retained)
            .field("max_live", &self.max_live)
            .field("in_use", &self.in_use())
            .finish()
    }
}

impl<T: Component> RegistrationPolicy<T> for AdmissionControlPolicy {
    fn maximum_retained(&self) -> usize {
        self.maximum_retained
    }

    fn before_get(&self, _ctx: &ResolveContext<'_>) -> GetSource<T> {
        self.acquire();
        GetSource::Pool
    }

    fn get_failed(&self, _ctx: &ResolveContext<'_>, _error: &PoolError) {
        self.release();
    }

    fn before_return(&self, _instance: &T) -> bool {
        self.release();
        true
    }
}
