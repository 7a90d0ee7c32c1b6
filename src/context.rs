//! Resolution context handed to activators, policies and pool-aware components

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::component::Component;
use crate::errors::PoolResult;
use crate::scope::Scope;

/// Marker attached to a scope so that registrations can anchor their sharing at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeTag(Arc<str>);

impl ScopeTag {
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScopeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for ScopeTag {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value passed along with a single resolve call.
#[derive(Clone)]
pub enum Parameter {
    Named {
        name: Arc<str>,
        value: Arc<dyn Any + Send + Sync>,
    },
    Typed(Arc<dyn Any + Send + Sync>),
}

impl Parameter {
    pub fn named<V: Component>(name: impl Into<Arc<str>>, value: V) -> Self {
        Self::Named {
            name: name.into(),
            value: Arc::new(value),
        }
    }

    pub fn typed<V: Component>(value: V) -> Self {
        Self::Typed(Arc::new(value))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named { name, .. } => Some(name.as_ref()),
            Self::Typed(_) => None,
        }
    }

    /// Borrow the value if it has type `V`.
    pub fn value<V: Any>(&self) -> Option<&V> {
        match self {
            Self::Named { value, .. } | Self::Typed(value) => value.downcast_ref::<V>(),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name, .. } => f.debug_struct("Named").field("name", name).finish_non_exhaustive(),
            Self::Typed(_) => f.debug_tuple("Typed").finish_non_exhaustive(),
        }
    }
}

/// What an activator, policy hook or [`PoolAware`](crate::PoolAware) component sees of
/// the resolve call in progress.
pub struct ResolveContext<'a> {
    scope: &'a Scope,
    parameters: &'a [Parameter],
}

impl<'a> ResolveContext<'a> {
    pub(crate) fn new(scope: &'a Scope, parameters: &'a [Parameter]) -> Self {
        Self { scope, parameters }
    }

    /// Scope the request is being served from.
    pub fn scope(&self) -> &'a Scope {
        self.scope
    }

    pub fn parameters(&self) -> &'a [Parameter] {
        self.parameters
    }

    /// Resolve a collaborator from the same scope.
    pub fn resolve<U: Component>(&self) -> PoolResult<Arc<U>> {
        self.scope.resolve::<U>()
    }

    /// First named parameter called `name` whose value has type `V`.
    pub fn named<V: Any>(&self, name: &str) -> Option<&'a V> {
        self.parameters
            .iter()
            .filter(|p| p.name() == Some(name))
            .find_map(|p| p.value::<V>())
    }

    /// First typed parameter whose value has type `V`.
    pub fn typed<V: Any>(&self) -> Option<&'a V> {
        self.parameters
            .iter()
            .filter(|p| matches!(p, Parameter::Typed(_)))
            .find_map(|p| p.value::<V>())
    }
}

impl fmt::Debug for ResolveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("scope", &self.scope.id())
            .field("parameters", &self.parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_lookup() {
        let named = Parameter::named("Val1", 123_i32);
        let typed = Parameter::typed(456_i32);

        assert_eq!(named.name(), Some("Val1"));
        assert_eq!(named.value::<i32>(), Some(&123));
        assert_eq!(typed.name(), None);
        assert_eq!(typed.value::<i32>(), Some(&456));
        assert!(typed.value::<u64>().is_none());
    }

    #[test]
    fn test_scope_tag_conversions() {
        let a: ScopeTag = "request".into();
        let b = ScopeTag::from(String::from("request"));

        assert_eq!(a, b);
        assert_eq!(a.to_string(), "request");
    }
}
