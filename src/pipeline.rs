//! Resolution stages for pooled registrations
//!
//! * pool materialization: build a registration's pool on first use and share it
//!   process-wide ([`PoolTable::materialize`]);
//! * get: drive the scope binding and, on a fresh binding, check an instance out
//!   ([`resolve_pooled`], [`checkout`]);
//! * unpack: hand consumers the raw instance, never the checkout record ([`unpack`]).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::binding::{PooledCheckout, PrivateInstance, ScopeEntry, SharedInstance};
use crate::component::Component;
use crate::config::PooledSettings;
use crate::context::{Parameter, ResolveContext, ScopeTag};
use crate::errors::{PoolError, PoolResult};
use crate::identity::{PoolIdentity, RegistrationId};
use crate::metrics::PoolMetrics;
use crate::policy::GetSource;
use crate::pool::Pool;
use crate::registration::{Factory, Registration};
use crate::scope::{Scope, ScopeInner};

/// Type-erased operations the container needs on every pool it owns.
trait PoolLifecycle: Send + Sync {
    fn teardown(&self) -> PoolResult<()>;
    fn metrics(&self) -> PoolMetrics;
}

impl<T: Component> PoolLifecycle for Pool<T> {
    fn teardown(&self) -> PoolResult<()> {
        Pool::teardown(self)
    }

    fn metrics(&self) -> PoolMetrics {
        Pool::metrics(self)
    }
}

struct PoolEntry {
    typed: Arc<dyn Any + Send + Sync>,
    lifecycle: Arc<dyn PoolLifecycle>,
}

/// Process-wide table of materialized pools, keyed by the owning registration.
pub(crate) struct PoolTable {
    pools: DashMap<PoolIdentity, PoolEntry>,
    torn_down: AtomicBool,
}

impl PoolTable {
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Return the pool of `registration`, building it on first use.
    ///
    /// The pool's factory activates instances against `root`, the scope that introduced
    /// the registration, so pooled instances never capture collaborators of the scope
    /// that first asked for them.
    /// A pool first asked for after [`teardown_all`](Self::teardown_all) is handed out
    /// already torn down: it still builds instances but never retains them.
    pub fn materialize<T: Component>(
        &self,
        registration: &Arc<Registration<T>>,
        factory: &Factory<T>,
        settings: &PooledSettings<T>,
        root: &Weak<ScopeInner>,
    ) -> PoolResult<Arc<Pool<T>>> {
        let identity = PoolIdentity::of(registration.id);

        let typed = {
            let entry = self.pools.entry(identity).or_insert_with(|| {
                let pool = Arc::new(build_pool(registration, factory, settings, root));
                debug!(
                    target: "scoped_objectpool",
                    pool = %identity,
                    service = std::any::type_name::<T>(),
                    maximum_retained = pool.maximum_retained(),
                    policy = settings.policy.name(),
                    "materialized pool"
                );
                PoolEntry {
                    typed: Arc::clone(&pool) as Arc<dyn Any + Send + Sync>,
                    lifecycle: pool,
                }
            });
            Arc::clone(&entry.typed)
        };

        let pool = typed.downcast::<Pool<T>>().map_err(|_| PoolError::TypeMismatch {
            service: std::any::type_name::<T>(),
        })?;

        if self.torn_down.load(Ordering::SeqCst) {
            if let Err(err) = pool.teardown() {
                warn!(target: "scoped_objectpool", pool = %identity, error = %err, "tearing down late pool failed");
            }
        }

        Ok(pool)
    }

    pub fn metrics(&self, registration: RegistrationId) -> Option<PoolMetrics> {
        self.pools
            .get(&PoolIdentity::of(registration))
            .map(|entry| entry.lifecycle.metrics())
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Tear down every pool, continuing past failures and returning the first one.
    ///
    /// Pools materialized afterwards are born torn down.
    pub fn teardown_all(&self) -> PoolResult<()> {
        self.torn_down.store(true, Ordering::SeqCst);

        let pools: Vec<Arc<dyn PoolLifecycle>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(&entry.value().lifecycle))
            .collect();

        let mut first_error: Option<PoolError> = None;
        for pool in pools {
            if let Err(err) = pool.teardown() {
                if first_error.is_some() {
                    warn!(target: "scoped_objectpool", error = %err, "additional failure while tearing down pools");
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
}

fn build_pool<T: Component>(
    registration: &Arc<Registration<T>>,
    factory: &Factory<T>,
    settings: &PooledSettings<T>,
    root: &Weak<ScopeInner>,
) -> Pool<T> {
    let registration_for_factory = Arc::clone(registration);
    let factory = Arc::clone(factory);
    let root = Weak::clone(root);

    let pool = Pool::new(settings.policy.maximum_retained(), move || {
        let root = root
            .upgrade()
            .map(Scope::from_inner)
            .ok_or(PoolError::ContainerDisposed)?;
        let ctx = ResolveContext::new(&root, &[]);
        registration_for_factory.activate(&factory, &ctx)
    });

    match registration.capabilities.dispose {
        Some(dispose) => pool.with_disposer(dispose),
        None => pool,
    }
}

/// Get stage: resolve `registration` in `scope`, checking an instance out on the first
/// request from the owning scope and sharing it on every later one.
pub(crate) fn resolve_pooled<T: Component>(
    scope: &Scope,
    registration: &Arc<Registration<T>>,
    factory: &Factory<T>,
    settings: &PooledSettings<T>,
    parameters: &[Parameter],
) -> PoolResult<Arc<T>> {
    let owner = match &settings.scope_tags {
        None => scope.clone(),
        Some(tags) => scope
            .nearest_tagged(tags)
            .ok_or_else(|| PoolError::NoMatchingScope {
                service: std::any::type_name::<T>(),
                tags: describe_tags(tags),
            })?,
    };

    let instance = owner.bindings().get_or_bind(registration.id, || {
        checkout(&owner, scope.activation_root(), registration, factory, settings, parameters)
    })?;

    unpack::<T>(instance)
}

/// Check one instance out for `owner`, honoring the registration policy.
///
/// `activation_root` is the scope a freshly materialized pool builds instances against.
pub(crate) fn checkout<T: Component>(
    owner: &Scope,
    activation_root: &Weak<ScopeInner>,
    registration: &Arc<Registration<T>>,
    factory: &Factory<T>,
    settings: &PooledSettings<T>,
    parameters: &[Parameter],
) -> PoolResult<Box<dyn ScopeEntry>> {
    let ctx = ResolveContext::new(owner, parameters);
    let policy = &settings.policy;

    match policy.before_get(&ctx) {
        GetSource::Decline => Err(PoolError::PolicyYieldedNoInstance {
            policy: policy.name(),
            service: std::any::type_name::<T>(),
        }),
        GetSource::Private(instance) => {
            debug!(
                target: "scoped_objectpool",
                service = std::any::type_name::<T>(),
                policy = policy.name(),
                scope = %owner.id(),
                "policy bypassed the pool"
            );
            Ok(Box::new(PrivateInstance::new(
                instance,
                registration.capabilities.dispose,
            )))
        }
        GetSource::Pool => {
            let instance = owner
                .registry()
                .pools()
                .materialize(registration, factory, settings, activation_root)
                .and_then(|pool| pool.get_object().map(|instance| (pool, instance)));

            let (pool, instance) = match instance {
                Ok(checked_out) => checked_out,
                Err(err) => {
                    policy.get_failed(&ctx, &err);
                    return Err(err);
                }
            };

            policy.after_get(&ctx, &instance);
            if let Some(on_get) = registration.capabilities.on_get {
                on_get(&instance, &ctx);
            }

            Ok(Box::new(PooledCheckout::new(
                pool,
                Arc::clone(policy),
                instance,
                registration.capabilities.on_return,
            )))
        }
    }
}

/// Unpack stage: recover the typed instance from a scope binding.
pub(crate) fn unpack<T: Component>(instance: SharedInstance) -> PoolResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| PoolError::TypeMismatch {
        service: std::any::type_name::<T>(),
    })
}

fn describe_tags(tags: &[ScopeTag]) -> String {
    tags.iter().map(ScopeTag::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::{Lifetime, PendingRegistration, RegistrationBuilder, Registry};

    #[test]
    fn test_pool_materialized_after_teardown_is_torn_down() {
        let pending: Vec<Box<dyn PendingRegistration>> = vec![Box::new(
            RegistrationBuilder::from_factory(|_| Ok(3_u8)).pooled_instance_per_lifetime_scope(),
        )];
        let registry = Registry::build(pending).unwrap();
        let registration = registry.last::<u8>().unwrap();
        let Lifetime::Pooled { factory, settings } = &registration.lifetime else {
            panic!("expected a pooled registration");
        };

        let table = PoolTable::new();
        table.teardown_all().unwrap();
        assert_eq!(table.len(), 0);

        let pool = table
            .materialize(&registration, factory, settings, &Weak::new())
            .unwrap();
        assert!(pool.is_torn_down());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unpack_rejects_wrong_type() {
        let instance: SharedInstance = Arc::new(5_u32);

        assert_eq!(*unpack::<u32>(Arc::clone(&instance)).unwrap(), 5);
        assert!(matches!(
            unpack::<String>(instance),
            Err(PoolError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_describe_tags() {
        let tags = [ScopeTag::from("a"), ScopeTag::from("b")];
        assert_eq!(describe_tags(&tags), "a, b");
    }
}
