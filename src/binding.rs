//! Per-scope instance bindings and the cleanup obligations they carry
//!
//! Every scope owns a [`BindingTable`] mapping a registration to a [`BindingSlot`]. A slot
//! moves `Unbound -> Bound -> Released` exactly once; the bound entry holds both the
//! instance handed to consumers and whatever must happen to it when the scope ends.

use std::any::Any;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::component::{Component, DisposeHook, OnReturnHook};
use crate::errors::{PoolError, PoolResult};
use crate::identity::RegistrationId;
use crate::policy::RegistrationPolicy;
use crate::pool::Pool;
use crate::registration::ReleaseCallback;

pub(crate) type SharedInstance = Arc<dyn Any + Send + Sync>;

/// Something a scope holds on behalf of one registration until the scope ends.
pub(crate) trait ScopeEntry: Send + Sync {
    fn instance(&self) -> SharedInstance;

    /// Run the end-of-scope logic. Calls after the first are no-ops.
    fn release(&self) -> PoolResult<()>;
}

/// The checkout record of a pool-sourced instance.
pub(crate) struct PooledCheckout<T> {
    pool: Arc<Pool<T>>,
    policy: Arc<dyn RegistrationPolicy<T>>,
    instance: Arc<T>,
    on_return: Option<OnReturnHook<T>>,
    returned: AtomicBool,
}

impl<T: Component> PooledCheckout<T> {
    pub fn new(
        pool: Arc<Pool<T>>,
        policy: Arc<dyn RegistrationPolicy<T>>,
        instance: Arc<T>,
        on_return: Option<OnReturnHook<T>>,
    ) -> Self {
        Self {
            pool,
            policy,
            instance,
            on_return,
            returned: AtomicBool::new(false),
        }
    }
}

impl<T: Component> ScopeEntry for PooledCheckout<T> {
    fn instance(&self) -> SharedInstance {
        Arc::clone(&self.instance) as SharedInstance
    }

    fn release(&self) -> PoolResult<()> {
        if self.returned.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(on_return) = self.on_return {
            on_return(&self.instance);
        }

        if self.policy.before_return(&self.instance) {
            self.pool.return_object(Arc::clone(&self.instance))
        } else {
            trace!(
                target: "scoped_objectpool",
                service = std::any::type_name::<T>(),
                policy = self.policy.name(),
                "policy declined to retain instance"
            );
            self.pool.discard_object(Arc::clone(&self.instance))
        }
    }
}

/// An instance a policy supplied instead of going through the pool. The scope owns it
/// outright, so teardown only disposes it.
pub(crate) struct PrivateInstance<T> {
    instance: Arc<T>,
    dispose: Option<DisposeHook<T>>,
    released: AtomicBool,
}

impl<T: Component> PrivateInstance<T> {
    pub fn new(instance: Arc<T>, dispose: Option<DisposeHook<T>>) -> Self {
        Self {
            instance,
            dispose,
            released: AtomicBool::new(false),
        }
    }
}

impl<T: Component> ScopeEntry for PrivateInstance<T> {
    fn instance(&self) -> SharedInstance {
        Arc::clone(&self.instance) as SharedInstance
    }

    fn release(&self) -> PoolResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        dispose_instance(self.dispose, &self.instance)
    }
}

/// An ordinary per-scope instance.
pub(crate) struct ScopedInstance<T> {
    instance: Arc<T>,
    on_release: Option<ReleaseCallback<T>>,
    dispose: Option<DisposeHook<T>>,
    released: AtomicBool,
}

impl<T: Component> ScopedInstance<T> {
    pub fn new(
        instance: Arc<T>,
        on_release: Option<ReleaseCallback<T>>,
        dispose: Option<DisposeHook<T>>,
    ) -> Self {
        Self {
            instance,
            on_release,
            dispose,
            released: AtomicBool::new(false),
        }
    }
}

impl<T: Component> ScopeEntry for ScopedInstance<T> {
    fn instance(&self) -> SharedInstance {
        Arc::clone(&self.instance) as SharedInstance
    }

    fn release(&self) -> PoolResult<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // A release callback replaces automatic disposal.
        match &self.on_release {
            Some(on_release) => {
                on_release(&self.instance);
                Ok(())
            }
            None => dispose_instance(self.dispose, &self.instance),
        }
    }
}

fn dispose_instance<T>(dispose: Option<DisposeHook<T>>, instance: &T) -> PoolResult<()> {
    match dispose {
        Some(dispose) => dispose(instance).map_err(PoolError::dispose::<T>),
        None => Ok(()),
    }
}

enum BindingState {
    Unbound,
    Bound { entry: Box<dyn ScopeEntry>, seq: u64 },
    Released,
}

pub(crate) struct BindingSlot {
    state: Mutex<BindingState>,
}

impl BindingSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(BindingState::Unbound),
        }
    }

    fn take_for_release(&self) -> Option<(u64, Box<dyn ScopeEntry>)> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, BindingState::Released) {
            BindingState::Bound { entry, seq } => Some((seq, entry)),
            BindingState::Unbound | BindingState::Released => None,
        }
    }
}

/// Scope-owned map from registration to its single shared instance.
pub(crate) struct BindingTable {
    slots: DashMap<RegistrationId, Arc<BindingSlot>>,
    next_seq: AtomicU64,
    disposed: AtomicBool,
}

impl BindingTable {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            next_seq: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Return the instance bound to `registration`, binding the entry produced by `bind`
    /// on first use.
    ///
    /// Concurrent callers for the same registration wait for the first binding and then
    /// share it; `bind` runs at most once per table and registration.
    pub fn get_or_bind<F>(&self, registration: RegistrationId, bind: F) -> PoolResult<SharedInstance>
    where
        F: FnOnce() -> PoolResult<Box<dyn ScopeEntry>>,
    {
        if self.is_disposed() {
            return Err(PoolError::ScopeDisposed);
        }

        let slot = Arc::clone(
            self.slots
                .entry(registration)
                .or_insert_with(|| Arc::new(BindingSlot::new()))
                .value(),
        );

        let mut state = slot.state.lock();
        match &*state {
            BindingState::Bound { entry, .. } => return Ok(entry.instance()),
            BindingState::Released => return Err(PoolError::ScopeDisposed),
            BindingState::Unbound => {}
        }

        // Teardown may have started after the slot was inserted; it will lock this slot
        // next, so refusing here is enough to never leave a binding behind.
        if self.disposed.load(Ordering::SeqCst) {
            *state = BindingState::Released;
            return Err(PoolError::ScopeDisposed);
        }

        let entry = bind()?;
        let instance = entry.instance();
        *state = BindingState::Bound {
            entry,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        Ok(instance)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn bound_count(&self) -> usize {
        let slots: Vec<Arc<BindingSlot>> = self
            .slots
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect();

        slots
            .iter()
            .filter(|slot| matches!(*slot.state.lock(), BindingState::Bound { .. }))
            .count()
    }

    /// Release every bound entry, most recently bound first.
    ///
    /// All entries are released even when some fail; the first failure is returned.
    pub fn release_all(&self) -> PoolResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let slots: Vec<Arc<BindingSlot>> = self
            .slots
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect();

        let mut entries: Vec<(u64, Box<dyn ScopeEntry>)> =
            slots.iter().filter_map(|slot| slot.take_for_release()).collect();
        entries.sort_by_key(|(seq, _)| Reverse(*seq));

        let mut first_error: Option<PoolError> = None;
        for (_, entry) in entries {
            if let Err(err) = entry.release() {
                if first_error.is_some() {
                    warn!(target: "scoped_objectpool", error = %err, "additional failure while releasing scope");
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

impl fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingTable")
            .field("slots", &self.slots.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
