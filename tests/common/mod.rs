#![allow(dead_code)]

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use scoped_objectpool::{
    BoxError, Component, DefaultRegistrationPolicy, Dispose, GetSource, PoolAware, RegistrationPolicy,
    ResolveContext,
};

/// Component that counts every notification it receives.
#[derive(Debug, Default)]
pub struct PooledComponent {
    pub get_called: AtomicUsize,
    pub return_called: AtomicUsize,
    pub dispose_called: AtomicUsize,
}

impl PooledComponent {
    pub fn gets(&self) -> usize {
        self.get_called.load(Ordering::SeqCst)
    }

    pub fn returns(&self) -> usize {
        self.return_called.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.dispose_called.load(Ordering::SeqCst)
    }
}

impl PoolAware for PooledComponent {
    fn on_get_from_pool(&self, _ctx: &ResolveContext<'_>) {
        self.get_called.fetch_add(1, Ordering::SeqCst);
    }

    fn on_return_to_pool(&self) {
        self.return_called.fetch_add(1, Ordering::SeqCst);
    }
}

impl Dispose for PooledComponent {
    fn dispose(&self) -> Result<(), BoxError> {
        self.dispose_called.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Policy counting how many instances are currently out of the pool.
pub struct PoolTrackingPolicy {
    inner: DefaultRegistrationPolicy,
    out_of_pool: AtomicIsize,
}

impl PoolTrackingPolicy {
    pub fn new() -> Self {
        Self {
            inner: DefaultRegistrationPolicy::new(),
            out_of_pool: AtomicIsize::new(0),
        }
    }

    pub fn out_of_pool(&self) -> isize {
        self.out_of_pool.load(Ordering::SeqCst)
    }
}

impl<T: Component> RegistrationPolicy<T> for PoolTrackingPolicy {
    fn maximum_retained(&self) -> usize {
        RegistrationPolicy::<T>::maximum_retained(&self.inner)
    }

    fn before_get(&self, _ctx: &ResolveContext<'_>) -> GetSource<T> {
        self.out_of_pool.fetch_add(1, Ordering::SeqCst);
        GetSource::Pool
    }

    fn before_return(&self, _instance: &T) -> bool {
        self.out_of_pool.fetch_sub(1, Ordering::SeqCst);
        true
    }
}
