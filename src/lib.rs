//! # Scoped object pooling
//!
//! Share one pooled instance per lifetime scope, hand it back to a bounded pool when the
//! scope ends, and let a pluggable policy decide how instances move in and out of the
//! pool.
//!
//! ## Features
//!
//! - Bounded, thread-safe pool per registration, materialized on first use
//! - At most one checkout per scope (or per nearest tagged ancestor scope)
//! - Exactly-once return at scope teardown, safe under concurrent disposal
//! - Registration policies that can block, bypass the pool or decline retention
//! - Optional [`PoolAware`] notifications and [`Dispose`] contract
//! - Health monitoring and metrics
//! - Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use scoped_objectpool::{ContainerBuilder, RegistrationBuilder};
//!
//! struct Parser {
//!     buffer: Vec<u8>,
//! }
//!
//! let mut builder = ContainerBuilder::new();
//! builder.register(
//!     RegistrationBuilder::from_factory(|_| Ok(Parser { buffer: Vec::with_capacity(1024) }))
//!         .pooled_instance_per_lifetime_scope(),
//! );
//! let container = builder.build().unwrap();
//!
//! let first = {
//!     let scope = container.begin_lifetime_scope().unwrap();
//!     let parser = scope.resolve::<Parser>().unwrap();
//!     assert!(Arc::ptr_eq(&parser, &scope.resolve::<Parser>().unwrap()));
//!     scope.dispose().unwrap();
//!     parser
//! };
//!
//! // The next scope reuses the instance the first one returned.
//! let scope = container.begin_lifetime_scope().unwrap();
//! assert!(Arc::ptr_eq(&first, &scope.resolve::<Parser>().unwrap()));
//! ```

mod binding;
mod component;
mod config;
mod container;
mod context;
mod errors;
mod health;
mod identity;
mod metrics;
mod pipeline;
mod policy;
mod pool;
mod registration;
mod scope;

pub use component::{Component, Dispose, PoolAware};
pub use config::PooledRegistrationOptions;
pub use container::{Container, ContainerBuilder};
pub use context::{Parameter, ResolveContext, ScopeTag};
pub use errors::{BoxError, PoolError, PoolResult};
pub use health::HealthStatus;
pub use identity::{PoolIdentity, RegistrationId, ScopeId};
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use metrics::PoolMetrics;
pub use policy::{AdmissionControlPolicy, DefaultRegistrationPolicy, GetSource, RegistrationPolicy};
pub use pool::Pool;
pub use registration::RegistrationBuilder;
pub use scope::Scope;
