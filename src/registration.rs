//! Registrations: how a component is activated and how long its instances live

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::component::{Capabilities, Component, Dispose, PoolAware};
use crate::config::{PooledRegistrationOptions, PooledSettings};
use crate::context::{ResolveContext, ScopeTag};
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::identity::RegistrationId;
use crate::pipeline::PoolTable;
use crate::policy::RegistrationPolicy;

pub(crate) type Factory<T> = Arc<dyn Fn(&ResolveContext<'_>) -> Result<T, BoxError> + Send + Sync>;
pub(crate) type ActivatedCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub(crate) type ReleaseCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Activator<T> {
    Factory(Factory<T>),
    Provided(Arc<T>),
}

enum LifetimeChoice<T> {
    Default,
    Transient,
    PerLifetimeScope,
    Pooled(PooledRegistrationOptions<T>),
}

pub(crate) enum Lifetime<T> {
    /// New instance on every resolve, not tracked by any scope.
    Transient(Factory<T>),
    /// One instance per scope, released when the scope ends.
    PerLifetimeScope(Factory<T>),
    /// A provided instance shared everywhere.
    Singleton(Arc<T>),
    /// Per-scope sharing of instances checked out of a process-wide pool.
    Pooled {
        factory: Factory<T>,
        settings: PooledSettings<T>,
    },
}

/// A validated registration, as stored in the container.
pub(crate) struct Registration<T> {
    pub id: RegistrationId,
    pub lifetime: Lifetime<T>,
    pub capabilities: Capabilities<T>,
    pub on_activated: Vec<ActivatedCallback<T>>,
    pub on_release: Option<ReleaseCallback<T>>,
}

impl<T: Component> Registration<T> {
    /// Build a new instance with `factory` and fire the activation callbacks.
    pub fn activate(&self, factory: &Factory<T>, ctx: &ResolveContext<'_>) -> PoolResult<T> {
        let instance = factory(ctx).map_err(PoolError::activation::<T>)?;
        for callback in &self.on_activated {
            callback(&instance);
        }
        Ok(instance)
    }
}

/// Describes one component registration before the container is built
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{ContainerBuilder, RegistrationBuilder};
///
/// struct Connection;
///
/// let mut builder = ContainerBuilder::new();
/// builder.register(
///     RegistrationBuilder::from_factory(|_| Ok(Connection))
///         .pooled_instance_per_lifetime_scope(),
/// );
///
/// let container = builder.build().unwrap();
/// let scope = container.begin_lifetime_scope().unwrap();
/// let first = scope.resolve::<Connection>().unwrap();
/// let second = scope.resolve::<Connection>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub struct RegistrationBuilder<T> {
    id: RegistrationId,
    activator: Activator<T>,
    lifetime: LifetimeChoice<T>,
    capabilities: Capabilities<T>,
    on_activated: Vec<ActivatedCallback<T>>,
    on_release: Option<ReleaseCallback<T>>,
}

impl<T: Component> RegistrationBuilder<T> {
    /// Activate instances with `factory`. Transient unless another lifetime is chosen.
    pub fn from_factory<F>(factory: F) -> Self
    where
        F: Fn(&ResolveContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::with_activator(Activator::Factory(Arc::new(factory)))
    }

    /// Always hand out `instance`. Cannot be pooled.
    pub fn from_instance(instance: T) -> Self {
        Self::with_activator(Activator::Provided(Arc::new(instance)))
    }

    fn with_activator(activator: Activator<T>) -> Self {
        Self {
            id: RegistrationId::next(),
            activator,
            lifetime: LifetimeChoice::Default,
            capabilities: Capabilities::none(),
            on_activated: Vec::new(),
            on_release: None,
        }
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn instance_per_dependency(mut self) -> Self {
        self.lifetime = LifetimeChoice::Transient;
        self
    }

    pub fn instance_per_lifetime_scope(mut self) -> Self {
        self.lifetime = LifetimeChoice::PerLifetimeScope;
        self
    }

    /// Share one pooled instance per scope with the default policy.
    pub fn pooled_instance_per_lifetime_scope(self) -> Self {
        self.pooled_with(PooledRegistrationOptions::new())
    }

    /// Share one pooled instance per scope, retaining at most `capacity` idle instances.
    pub fn pooled_instance_per_lifetime_scope_with_capacity(self, capacity: i64) -> Self {
        self.pooled_with(PooledRegistrationOptions::new().with_capacity(capacity))
    }

    /// Share one pooled instance per scope under a custom policy.
    pub fn pooled_instance_per_lifetime_scope_with_policy<P>(self, policy: Arc<P>) -> Self
    where
        P: RegistrationPolicy<T> + 'static,
    {
        self.pooled_with(PooledRegistrationOptions::new().with_policy(policy))
    }

    /// Share one pooled instance at the nearest ancestor scope tagged with one of `tags`.
    pub fn pooled_instance_per_matching_lifetime_scope<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeTag>,
    {
        self.pooled_with(PooledRegistrationOptions::new().with_scope_tags(tags))
    }

    pub fn pooled_with(mut self, options: PooledRegistrationOptions<T>) -> Self {
        self.lifetime = LifetimeChoice::Pooled(options);
        self
    }

    /// Deliver [`PoolAware`] notifications to instances of this registration.
    pub fn with_pool_notifications(mut self) -> Self
    where
        T: PoolAware,
    {
        self.capabilities = self.capabilities.with_pool_notifications();
        self
    }

    /// Dispose abandoned instances through their [`Dispose`] implementation.
    pub fn with_disposal(mut self) -> Self
    where
        T: Dispose,
    {
        self.capabilities = self.capabilities.with_disposal();
        self
    }

    /// Run `callback` after every instance the factory builds.
    pub fn on_activated<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_activated.push(Arc::new(callback));
        self
    }

    /// Run `callback` instead of disposal when a scope releases its instance.
    pub fn on_release<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_release = Some(Arc::new(callback));
        self
    }

    fn build(self) -> PoolResult<Registration<T>> {
        let service = std::any::type_name::<T>();

        let lifetime = match (self.activator, self.lifetime) {
            (Activator::Provided(_), LifetimeChoice::Pooled(_)) => {
                return Err(PoolError::ProvidedInstanceNotPoolable { service });
            }
            (Activator::Factory(_), LifetimeChoice::Pooled(_)) if self.on_release.is_some() => {
                return Err(PoolError::ReleaseCallbackNotPoolable { service });
            }
            (Activator::Factory(factory), LifetimeChoice::Pooled(options)) => Lifetime::Pooled {
                factory,
                settings: options.into_settings()?,
            },
            (Activator::Provided(instance), _) => Lifetime::Singleton(instance),
            (Activator::Factory(factory), LifetimeChoice::PerLifetimeScope) => {
                Lifetime::PerLifetimeScope(factory)
            }
            (Activator::Factory(factory), LifetimeChoice::Default | LifetimeChoice::Transient) => {
                Lifetime::Transient(factory)
            }
        };

        Ok(Registration {
            id: self.id,
            lifetime,
            capabilities: self.capabilities,
            on_activated: self.on_activated,
            on_release: self.on_release,
        })
    }
}

impl<T> fmt::Debug for RegistrationBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationBuilder")
            .field("id", &self.id)
            .field("service", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

/// Type-erased registration awaiting validation.
pub(crate) trait PendingRegistration: Send {
    fn finish(self: Box<Self>) -> PoolResult<(TypeId, Arc<dyn Any + Send + Sync>)>;
}

impl<T: Component> PendingRegistration for RegistrationBuilder<T> {
    fn finish(self: Box<Self>) -> PoolResult<(TypeId, Arc<dyn Any + Send + Sync>)> {
        let registration = Arc::new((*self).build()?);
        Ok((TypeId::of::<T>(), registration as Arc<dyn Any + Send + Sync>))
    }
}

/// Every registration of a built container plus the pools materialized for them.
///
/// A registry built for a nested scope layers over its parent's: lookups fall back to the
/// parent and every layer shares one pool table.
pub(crate) struct Registry {
    services: HashMap<TypeId, Vec<Arc<dyn Any + Send + Sync>>>,
    parent: Option<Arc<Registry>>,
    pools: Arc<PoolTable>,
}

impl Registry {
    pub fn build(pending: Vec<Box<dyn PendingRegistration>>) -> PoolResult<Self> {
        Ok(Self {
            services: Self::finish_all(pending)?,
            parent: None,
            pools: Arc::new(PoolTable::new()),
        })
    }

    /// Layer `pending` over `parent`.
    pub fn build_child(parent: &Arc<Registry>, pending: Vec<Box<dyn PendingRegistration>>) -> PoolResult<Self> {
        Ok(Self {
            services: Self::finish_all(pending)?,
            parent: Some(Arc::clone(parent)),
            pools: Arc::clone(&parent.pools),
        })
    }

    fn finish_all(
        pending: Vec<Box<dyn PendingRegistration>>,
    ) -> PoolResult<HashMap<TypeId, Vec<Arc<dyn Any + Send + Sync>>>> {
        let mut services: HashMap<TypeId, Vec<Arc<dyn Any + Send + Sync>>> = HashMap::new();

        for registration in pending {
            let (type_id, registration) = registration.finish()?;
            services.entry(type_id).or_default().push(registration);
        }

        Ok(services)
    }

    pub fn pools(&self) -> &PoolTable {
        &self.pools
    }

    /// Registrations added by this layer alone.
    pub fn registration_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }

    /// The registration of `T` that wins a single resolve: the last one registered in the
    /// innermost layer that has any.
    pub fn last<T: Component>(&self) -> PoolResult<Arc<Registration<T>>> {
        match self
            .services
            .get(&TypeId::of::<T>())
            .and_then(|registrations| registrations.last())
        {
            Some(registration) => Self::downcast::<T>(registration),
            None => match &self.parent {
                Some(parent) => parent.last::<T>(),
                None => Err(PoolError::NotRegistered {
                    service: std::any::type_name::<T>(),
                }),
            },
        }
    }

    /// Every registration of `T`, outer layers first, each in registration order.
    pub fn all<T: Component>(&self) -> PoolResult<Vec<Arc<Registration<T>>>> {
        let mut registrations = match &self.parent {
            Some(parent) => parent.all::<T>()?,
            None => Vec::new(),
        };

        if let Some(own) = self.services.get(&TypeId::of::<T>()) {
            for registration in own {
                registrations.push(Self::downcast::<T>(registration)?);
            }
        }

        Ok(registrations)
    }

    fn downcast<T: Component>(registration: &Arc<dyn Any + Send + Sync>) -> PoolResult<Arc<Registration<T>>> {
        Arc::clone(registration)
            .downcast::<Registration<T>>()
            .map_err(|_| PoolError::TypeMismatch {
                service: std::any::type_name::<T>(),
            })
    }
}
