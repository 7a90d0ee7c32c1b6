//! Pooled registration options

use std::sync::Arc;

use tracing::warn;

use crate::component::Component;
use crate::context::ScopeTag;
use crate::errors::PoolResult;
use crate::policy::{DefaultRegistrationPolicy, RegistrationPolicy};

/// Configuration for a pooled registration
///
/// # Examples
///
/// ```
/// use scoped_objectpool::PooledRegistrationOptions;
///
/// let options = PooledRegistrationOptions::<String>::new()
///     .with_capacity(16)
///     .with_scope_tags(["request"]);
///
/// assert_eq!(options.capacity, Some(16));
/// assert_eq!(options.scope_tags.as_ref().map(Vec::len), Some(1));
/// ```
pub struct PooledRegistrationOptions<T> {
    /// Maximum idle instances kept by the pool. Negative values are rejected when the
    /// container is built; `0` means never retain.
    pub capacity: Option<i64>,

    /// Full override of get and return behavior. Takes precedence over `capacity`.
    pub policy: Option<Arc<dyn RegistrationPolicy<T>>>,

    /// Share the instance at the nearest ancestor scope carrying one of these tags
    /// instead of per immediate scope.
    pub scope_tags: Option<Vec<ScopeTag>>,
}

impl<T> Default for PooledRegistrationOptions<T> {
    fn default() -> Self {
        Self {
            capacity: None,
            policy: None,
            scope_tags: None,
        }
    }
}

impl<T: Component> PooledRegistrationOptions<T> {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of retained idle instances
    ///
    /// # Examples
    ///
    /// ```
    /// use scoped_objectpool::PooledRegistrationOptions;
    ///
    /// let options = PooledRegistrationOptions::<u32>::new().with_capacity(0);
    ///
    /// assert_eq!(options.capacity, Some(0));
    /// ```
    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Use a custom registration policy
    pub fn with_policy<P>(mut self, policy: Arc<P>) -> Self
    where
        P: RegistrationPolicy<T> + 'static,
    {
        self.policy = Some(policy as Arc<dyn RegistrationPolicy<T>>);
        self
    }

    /// Restrict sharing to the nearest ancestor scope tagged with one of `tags`
    pub fn with_scope_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeTag>,
    {
        self.scope_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub(crate) fn into_settings(self) -> PoolResult<PooledSettings<T>> {
        let capacity_policy = self
            .capacity
            .map(DefaultRegistrationPolicy::with_maximum_retained)
            .transpose()?;

        let policy: Arc<dyn RegistrationPolicy<T>> = match (self.policy, capacity_policy) {
            (Some(policy), Some(_)) => {
                warn!(
                    target: "scoped_objectpool",
                    service = std::any::type_name::<T>(),
                    policy = policy.name(),
                    "capacity ignored, the registration policy decides it"
                );
                policy
            }
            (Some(policy), None) => policy,
            (None, Some(capacity_policy)) => Arc::new(capacity_policy),
            (None, None) => Arc::new(DefaultRegistrationPolicy::new()),
        };

        let scope_tags = self
            .scope_tags
            .filter(|tags| !tags.is_empty())
            .map(Arc::<[ScopeTag]>::from);

        Ok(PooledSettings { policy, scope_tags })
    }
}

/// Validated pooling settings of one registration.
pub(crate) struct PooledSettings<T> {
    pub policy: Arc<dyn RegistrationPolicy<T>>,
    pub scope_tags: Option<Arc<[ScopeTag]>>,
}

impl<T> Clone for PooledSettings<T> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            scope_tags: self.scope_tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PoolError;

    #[test]
    fn test_negative_capacity_rejected() {
        let result = PooledRegistrationOptions::<u8>::new().with_capacity(-1).into_settings();

        assert!(matches!(result, Err(PoolError::NegativeCapacity(-1))));
    }

    #[test]
    fn test_capacity_feeds_default_policy() {
        let settings = PooledRegistrationOptions::<u8>::new()
            .with_capacity(3)
            .into_settings()
            .unwrap();

        assert_eq!(settings.policy.maximum_retained(), 3);
        assert!(settings.scope_tags.is_none());
    }

    #[test]
    fn test_policy_wins_over_capacity() {
        let policy = Arc::new(DefaultRegistrationPolicy::with_maximum_retained(9).unwrap());
        let settings = PooledRegistrationOptions::<u8>::new()
            .with_capacity(1)
            .with_policy(policy)
            .into_settings()
            .unwrap();

        assert_eq!(settings.policy.maximum_retained(), 9);
    }

    #[test]
    fn test_empty_tag_set_means_immediate_scope() {
        let settings = PooledRegistrationOptions::<u8>::new()
            .with_scope_tags(Vec::<ScopeTag>::new())
            .into_settings()
            .unwrap();

        assert!(settings.scope_tags.is_none());
    }
}
