//! Container construction and the root scope

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::component::Component;
use crate::context::{Parameter, ScopeTag};
use crate::errors::{PoolError, PoolResult};
use crate::identity::RegistrationId;
use crate::metrics::PoolMetrics;
use crate::registration::{PendingRegistration, RegistrationBuilder, Registry};
use crate::scope::Scope;

/// Collects registrations and validates them into a [`Container`]
#[derive(Default)]
pub struct ContainerBuilder {
    pending: Vec<Box<dyn PendingRegistration>>,
}

impl ContainerBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration. Configuration errors surface from [`build`](Self::build).
    pub fn register<T: Component>(&mut self, registration: RegistrationBuilder<T>) -> RegistrationId {
        let id = registration.id();
        self.pending.push(Box::new(registration));
        id
    }

    pub(crate) fn into_pending(self) -> Vec<Box<dyn PendingRegistration>> {
        self.pending
    }

    /// Validate every registration and build the container.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid registration: a negative capacity, a pooled provided
    /// instance, or a pooled registration carrying a release callback.
    pub fn build(self) -> PoolResult<Container> {
        let registry = Registry::build(self.pending)?;
        debug!(
            target: "scoped_objectpool",
            registrations = registry.registration_count(),
            "built container"
        );

        Ok(Container {
            root: Scope::root(Arc::new(registry)),
            disposed: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Root of the scope tree and owner of every pool
///
/// Disposing the container disposes the root scope and then tears down every
/// materialized pool, disposing the instances idle in them. Child scopes still alive
/// keep working; instances they hand back afterwards are discarded.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{ContainerBuilder, RegistrationBuilder};
///
/// let mut builder = ContainerBuilder::new();
/// let id = builder.register(
///     RegistrationBuilder::from_factory(|_| Ok(Vec::<u8>::with_capacity(4096)))
///         .pooled_instance_per_lifetime_scope_with_capacity(4),
/// );
/// let container = builder.build().unwrap();
///
/// let scope = container.begin_lifetime_scope().unwrap();
/// scope.resolve::<Vec<u8>>().unwrap();
/// scope.dispose().unwrap();
///
/// let metrics = container.pool_metrics(id).unwrap();
/// assert_eq!(metrics.idle_objects, 1);
///
/// container.dispose().unwrap();
/// ```
pub struct Container {
    root: Scope,
    disposed: AtomicBool,
}

impl Container {
    /// The root scope. Disposed together with the container.
    pub fn root_scope(&self) -> &Scope {
        &self.root
    }

    /// Start an untagged child of the root scope.
    pub fn begin_lifetime_scope(&self) -> PoolResult<Scope> {
        self.ensure_live()?;
        self.root.begin_lifetime_scope()
    }

    /// Start a child of the root scope with registrations of its own.
    ///
    /// See [`Scope::begin_lifetime_scope_with`].
    pub fn begin_lifetime_scope_with<F>(&self, configure: F) -> PoolResult<Scope>
    where
        F: FnOnce(&mut ContainerBuilder),
    {
        self.ensure_live()?;
        self.root.begin_lifetime_scope_with(configure)
    }

    /// Start a child of the root scope carrying `tags`.
    pub fn begin_tagged_scope<I, S>(&self, tags: I) -> PoolResult<Scope>
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeTag>,
    {
        self.ensure_live()?;
        self.root.begin_tagged_scope(tags)
    }

    /// Resolve from the root scope.
    pub fn resolve<T: Component>(&self) -> PoolResult<Arc<T>> {
        self.ensure_live()?;
        self.root.resolve::<T>()
    }

    /// Resolve from the root scope, passing `parameters` to the activator and policy.
    pub fn resolve_with<T: Component>(&self, parameters: &[Parameter]) -> PoolResult<Arc<T>> {
        self.ensure_live()?;
        self.root.resolve_with::<T>(parameters)
    }

    /// Resolve every registration of `T` from the root scope.
    pub fn resolve_all<T: Component>(&self) -> PoolResult<Vec<Arc<T>>> {
        self.ensure_live()?;
        self.root.resolve_all::<T>()
    }

    /// Metrics of the pool owned by `registration`, once it has been materialized.
    pub fn pool_metrics(&self, registration: RegistrationId) -> Option<PoolMetrics> {
        self.root.registry().pools().metrics(registration)
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Dispose the root scope, then tear down every pool.
    ///
    /// Both steps always run; the first failure is returned.
    pub fn dispose(&self) -> PoolResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let pools = self.root.registry().pools();
        debug!(target: "scoped_objectpool", pools = pools.len(), "disposing container");

        let scope_result = self.root.dispose();
        let pool_result = pools.teardown_all();
        match (scope_result, pool_result) {
            (Err(scope_err), Err(pool_err)) => {
                warn!(target: "scoped_objectpool", error = %pool_err, "additional failure while tearing down pools");
                Err(scope_err)
            }
            (scope_result, pool_result) => scope_result.and(pool_result),
        }
    }

    fn ensure_live(&self) -> PoolResult<()> {
        if self.is_disposed() {
            Err(PoolError::ContainerDisposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(target: "scoped_objectpool", error = %err, "disposing dropped container failed");
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("root", &self.root)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Dispose;
    use crate::errors::BoxError;
    use std::sync::atomic::AtomicUsize;

    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Handle;

    impl Dispose for Handle {
        fn dispose(&self) -> Result<(), BoxError> {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_register_returns_registration_id() {
        let mut builder = ContainerBuilder::new();
        let registration = RegistrationBuilder::from_factory(|_| Ok(1_u16));
        let expected = registration.id();

        assert_eq!(builder.register(registration), expected);
    }

    #[test]
    fn test_build_fails_fast_on_invalid_registration() {
        let mut builder = ContainerBuilder::new();
        builder.register(RegistrationBuilder::from_instance(5_u16).pooled_instance_per_lifetime_scope());

        assert!(matches!(builder.build(), Err(PoolError::ProvidedInstanceNotPoolable { .. })));
    }

    #[test]
    fn test_dispose_tears_down_pools_once() {
        let mut builder = ContainerBuilder::new();
        let id = builder.register(
            RegistrationBuilder::from_factory(|_| Ok(Handle))
                .pooled_instance_per_lifetime_scope_with_capacity(2)
                .with_disposal(),
        );
        let container = builder.build().unwrap();
        assert!(container.pool_metrics(id).is_none());

        let scope = container.begin_lifetime_scope().unwrap();
        scope.resolve::<Handle>().unwrap();
        scope.dispose().unwrap();
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 0);

        container.dispose().unwrap();
        container.dispose().unwrap();

        assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
        assert!(matches!(container.resolve::<Handle>(), Err(PoolError::ContainerDisposed)));
        assert!(matches!(container.begin_lifetime_scope(), Err(PoolError::ContainerDisposed)));
    }
}
