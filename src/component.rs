//! Component bounds and optional pool capabilities

use crate::context::ResolveContext;
use crate::errors::BoxError;

/// Bound shared by everything the container can hand out.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Optional capability for components that want to know when they leave and re-enter
/// the pool.
///
/// Opt in per registration with
/// [`RegistrationBuilder::with_pool_notifications`](crate::RegistrationBuilder::with_pool_notifications).
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use scoped_objectpool::{PoolAware, ResolveContext};
///
/// #[derive(Default)]
/// struct Buffer {
///     checkouts: AtomicUsize,
/// }
///
/// impl PoolAware for Buffer {
///     fn on_get_from_pool(&self, _ctx: &ResolveContext<'_>) {
///         self.checkouts.fetch_add(1, Ordering::Relaxed);
///     }
///
///     fn on_return_to_pool(&self) {}
/// }
/// ```
pub trait PoolAware {
    /// Called once per checkout that was sourced through the pool.
    fn on_get_from_pool(&self, ctx: &ResolveContext<'_>);

    /// Called once per checkout when the owning scope ends, before the instance is
    /// retained or discarded. Release every scope-held collaborator here.
    fn on_return_to_pool(&self);
}

/// Optional disposal contract, run when an instance is abandoned.
pub trait Dispose {
    fn dispose(&self) -> Result<(), BoxError>;
}

pub(crate) type OnGetHook<T> = fn(&T, &ResolveContext<'_>);
pub(crate) type OnReturnHook<T> = fn(&T);
pub(crate) type DisposeHook<T> = fn(&T) -> Result<(), BoxError>;

/// Capabilities captured for one registration.
pub(crate) struct Capabilities<T> {
    pub on_get: Option<OnGetHook<T>>,
    pub on_return: Option<OnReturnHook<T>>,
    pub dispose: Option<DisposeHook<T>>,
}

impl<T> Capabilities<T> {
    pub fn none() -> Self {
        Self {
            on_get: None,
            on_return: None,
            dispose: None,
        }
    }
}

impl<T: PoolAware> Capabilities<T> {
    pub fn with_pool_notifications(mut self) -> Self {
        self.on_get = Some(<T as PoolAware>::on_get_from_pool);
        self.on_return = Some(<T as PoolAware>::on_return_to_pool);
        self
    }
}

impl<T: Dispose> Capabilities<T> {
    pub fn with_disposal(mut self) -> Self {
        self.dispose = Some(<T as Dispose>::dispose);
        self
    }
}

impl<T> Clone for Capabilities<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Capabilities<T> {}
