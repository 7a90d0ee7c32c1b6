//! Error types for scoped pooling

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by activators and disposal hooks.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Maximum retained instances cannot be negative (got {0})")]
    NegativeCapacity(i64),

    #[error("Service {service} uses a provided instance and cannot be pooled")]
    ProvidedInstanceNotPoolable { service: &'static str },

    #[error("Service {service} registers a release callback, which cannot be combined with pooling")]
    ReleaseCallbackNotPoolable { service: &'static str },

    #[error("No registration found for service {service}")]
    NotRegistered { service: &'static str },

    #[error("No scope tagged with any of [{tags}] is visible from the requesting scope of {service}")]
    NoMatchingScope { service: &'static str, tags: String },

    #[error("Pooled registration policy {policy} yielded no instance of {service}")]
    PolicyYieldedNoInstance {
        policy: &'static str,
        service: &'static str,
    },

    #[error("Activating {service} failed: {source}")]
    ActivationFailed {
        service: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("Disposing {service} failed: {source}")]
    DisposeFailed {
        service: &'static str,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },

    #[error("Scope has already been disposed")]
    ScopeDisposed,

    #[error("Container has been disposed")]
    ContainerDisposed,

    #[error("Instance stored for {service} has an unexpected type")]
    TypeMismatch { service: &'static str },

    #[error("Exporting metrics failed: {0}")]
    MetricsExport(Arc<dyn StdError + Send + Sync + 'static>),
}

impl PoolError {
    pub(crate) fn activation<T: ?Sized>(source: BoxError) -> Self {
        Self::ActivationFailed {
            service: std::any::type_name::<T>(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn dispose<T: ?Sized>(source: BoxError) -> Self {
        Self::DisposeFailed {
            service: std::any::type_name::<T>(),
            source: Arc::from(source),
        }
    }

    /// Whether this error was raised by a disposal hook.
    pub fn is_dispose_failure(&self) -> bool {
        matches!(self, Self::DisposeFailed { .. })
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
