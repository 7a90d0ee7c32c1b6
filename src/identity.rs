//! Identity keys for registrations, pools and scopes

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REGISTRATION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one registration.
///
/// Two registrations of the same component type always get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) fn next() -> Self {
        Self(NEXT_REGISTRATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration#{}", self.0)
    }
}

/// Key of a pool in the process-wide pool table.
///
/// Derived from the registration that owns the pool, never from the payload type, so
/// independent registrations of one type never share idle instances.
///
/// # Examples
///
/// ```
/// use scoped_objectpool::{PoolIdentity, RegistrationBuilder};
///
/// let a = RegistrationBuilder::from_factory(|_| Ok(1_u32));
/// let b = RegistrationBuilder::from_factory(|_| Ok(1_u32));
///
/// assert_ne!(PoolIdentity::of(a.id()), PoolIdentity::of(b.id()));
/// assert_eq!(PoolIdentity::of(a.id()), PoolIdentity::of(a.id()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolIdentity(RegistrationId);

impl PoolIdentity {
    pub fn of(registration: RegistrationId) -> Self {
        Self(registration)
    }

    pub fn registration(self) -> RegistrationId {
        self.0
    }
}

impl fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}
