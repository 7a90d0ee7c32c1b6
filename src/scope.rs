//! Lifetime scopes: the hierarchy instances are shared and released in

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::binding::{BindingTable, ScopeEntry, ScopedInstance};
use crate::component::Component;
use crate::container::ContainerBuilder;
use crate::context::{Parameter, ResolveContext, ScopeTag};
use crate::errors::{PoolError, PoolResult};
use crate::identity::ScopeId;
use crate::pipeline;
use crate::registration::{Lifetime, Registration, Registry};

pub(crate) struct ScopeInner {
    id: ScopeId,
    tags: Vec<ScopeTag>,
    parent: Option<Arc<ScopeInner>>,
    // Scope that introduced `registry`; pools of its registrations activate against it.
    activation_root: Weak<ScopeInner>,
    registry: Arc<Registry>,
    bindings: BindingTable,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if self.bindings.is_disposed() {
            return;
        }

        if let Err(err) = self.bindings.release_all() {
            warn!(target: "scoped_objectpool", scope = %self.id, error = %err, "releasing dropped scope failed");
        }
    }
}

/// A node of the scope tree
///
/// Pooled and per-scope registrations share one instance per scope (or per nearest
/// matching tagged ancestor) until the scope is disposed. Handles are cheap to clone; the
/// scope is released on [`dispose`](Scope::dispose) or when the last handle, and the last
/// child scope, is dropped.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use scoped_objectpool::{ContainerBuilder, RegistrationBuilder};
///
/// struct Session;
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(
///     RegistrationBuilder::from_factory(|_| Ok(Session))
///         .pooled_instance_per_matching_lifetime_scope(["request"]),
/// );
/// let container = builder.build().unwrap();
///
/// let request = container.begin_tagged_scope(["request"]).unwrap();
/// let nested = request.begin_lifetime_scope().unwrap();
///
/// let outer = request.resolve::<Session>().unwrap();
/// let inner = nested.resolve::<Session>().unwrap();
/// assert!(Arc::ptr_eq(&outer, &inner));
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn root(registry: Arc<Registry>) -> Self {
        let inner = Arc::new_cyclic(|root| ScopeInner {
            id: ScopeId::next(),
            tags: Vec::new(),
            parent: None,
            activation_root: Weak::clone(root),
            registry,
            bindings: BindingTable::new(),
        });

        debug!(target: "scoped_objectpool", scope = %inner.id, "created root scope");
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    /// Unique id of this scope.
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// Tags this scope was started with.
    pub fn tags(&self) -> &[ScopeTag] {
        &self.inner.tags
    }

    /// The enclosing scope, `None` for the root.
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.as_ref().map(|parent| Self::from_inner(Arc::clone(parent)))
    }

    /// Whether the scope has been released.
    pub fn is_disposed(&self) -> bool {
        self.inner.bindings.is_disposed()
    }

    /// Start an untagged child scope.
    pub fn begin_lifetime_scope(&self) -> PoolResult<Scope> {
        self.begin_child(Vec::new())
    }

    /// Start a child scope carrying `tags`.
    pub fn begin_tagged_scope<I, S>(&self, tags: I) -> PoolResult<Scope>
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeTag>,
    {
        self.begin_child(tags.into_iter().map(Into::into).collect())
    }

    /// Start an untagged child scope with registrations of its own.
    ///
    /// Registrations added by `configure` win over the enclosing scopes' for resolves made
    /// in the child and its descendants. Pooled ones get pools of their own, which stay
    /// with the container; their checkouts go back when the child scope ends.
    ///
    /// # Errors
    ///
    /// [`PoolError::ScopeDisposed`] if this scope is disposed, or the first invalid
    /// registration added by `configure`.
    pub fn begin_lifetime_scope_with<F>(&self, configure: F) -> PoolResult<Scope>
    where
        F: FnOnce(&mut ContainerBuilder),
    {
        if self.is_disposed() {
            return Err(PoolError::ScopeDisposed);
        }

        let mut builder = ContainerBuilder::new();
        configure(&mut builder);
        let registry = Arc::new(Registry::build_child(&self.inner.registry, builder.into_pending())?);

        let inner = Arc::new_cyclic(|this| ScopeInner {
            id: ScopeId::next(),
            tags: Vec::new(),
            parent: Some(Arc::clone(&self.inner)),
            activation_root: Weak::clone(this),
            registry,
            bindings: BindingTable::new(),
        });

        debug!(
            target: "scoped_objectpool",
            scope = %inner.id,
            parent = %self.inner.id,
            registrations = inner.registry.registration_count(),
            "began lifetime scope with registrations"
        );
        Ok(Self { inner })
    }

    fn begin_child(&self, tags: Vec<ScopeTag>) -> PoolResult<Scope> {
        if self.is_disposed() {
            return Err(PoolError::ScopeDisposed);
        }

        let inner = Arc::new(ScopeInner {
            id: ScopeId::next(),
            tags,
            parent: Some(Arc::clone(&self.inner)),
            activation_root: Weak::clone(&self.inner.activation_root),
            registry: Arc::clone(&self.inner.registry),
            bindings: BindingTable::new(),
        });

        debug!(
            target: "scoped_objectpool",
            scope = %inner.id,
            parent = %self.inner.id,
            tags = ?inner.tags,
            "began lifetime scope"
        );
        Ok(Self { inner })
    }

    /// Resolve the last registration of `T`.
    pub fn resolve<T: Component>(&self) -> PoolResult<Arc<T>> {
        self.resolve_with(&[])
    }

    /// Resolve the last registration of `T`, passing `parameters` to its activator and
    /// policy.
    pub fn resolve_with<T: Component>(&self, parameters: &[Parameter]) -> PoolResult<Arc<T>> {
        let registration = self.inner.registry.last::<T>()?;
        self.resolve_registration(&registration, parameters)
    }

    /// Resolve every registration of `T`, in registration order.
    pub fn resolve_all<T: Component>(&self) -> PoolResult<Vec<Arc<T>>> {
        self.inner
            .registry
            .all::<T>()?
            .iter()
            .map(|registration| self.resolve_registration(registration, &[]))
            .collect()
    }

    /// Release everything this scope holds: pooled checkouts go back to their pools,
    /// scoped instances are released or disposed. Later calls are no-ops.
    pub fn dispose(&self) -> PoolResult<()> {
        if self.is_disposed() {
            return Ok(());
        }

        debug!(
            target: "scoped_objectpool",
            scope = %self.inner.id,
            bound = self.inner.bindings.bound_count(),
            "disposing scope"
        );
        self.inner.bindings.release_all()
    }

    fn resolve_registration<T: Component>(
        &self,
        registration: &Arc<Registration<T>>,
        parameters: &[Parameter],
    ) -> PoolResult<Arc<T>> {
        if self.is_disposed() {
            return Err(PoolError::ScopeDisposed);
        }

        match &registration.lifetime {
            Lifetime::Transient(factory) => {
                let ctx = ResolveContext::new(self, parameters);
                registration.activate(factory, &ctx).map(Arc::new)
            }
            Lifetime::PerLifetimeScope(factory) => {
                let instance = self.inner.bindings.get_or_bind(registration.id, || {
                    let ctx = ResolveContext::new(self, parameters);
                    let instance = Arc::new(registration.activate(factory, &ctx)?);
                    let entry: Box<dyn ScopeEntry> = Box::new(ScopedInstance::new(
                        instance,
                        registration.on_release.clone(),
                        registration.capabilities.dispose,
                    ));
                    Ok(entry)
                })?;
                pipeline::unpack::<T>(instance)
            }
            Lifetime::Singleton(instance) => Ok(Arc::clone(instance)),
            Lifetime::Pooled { factory, settings } => {
                pipeline::resolve_pooled(self, registration, factory, settings, parameters)
            }
        }
    }

    /// This scope or its closest ancestor carrying any of `tags`.
    pub(crate) fn nearest_tagged(&self, tags: &[ScopeTag]) -> Option<Scope> {
        let mut current = Some(&self.inner);
        while let Some(scope) = current {
            if scope.tags.iter().any(|tag| tags.contains(tag)) {
                return Some(Self::from_inner(Arc::clone(scope)));
            }
            current = scope.parent.as_ref();
        }
        None
    }

    pub(crate) fn bindings(&self) -> &BindingTable {
        &self.inner.bindings
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn activation_root(&self) -> &Weak<ScopeInner> {
        &self.inner.activation_root
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("tags", &self.inner.tags)
            .field("parent", &self.inner.parent.as_ref().map(|parent| parent.id))
            .field("bindings", &self.inner.bindings)
            .finish()
    }
}
