//! Advanced features: custom policies, disposal, parameters, Prometheus export

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use scoped_objectpool::{
    BoxError, ContainerBuilder, Dispose, GetSource, Parameter, PoolAware, RegistrationBuilder,
    RegistrationPolicy, ResolveContext,
};

struct Session {
    id: usize,
    poisoned: AtomicBool,
}

impl Session {
    fn new(id: usize) -> Self {
        Self {
            id,
            poisoned: AtomicBool::new(false),
        }
    }
}

impl PoolAware for Session {
    fn on_get_from_pool(&self, ctx: &ResolveContext<'_>) {
        if let Some(user) = ctx.named::<String>("user") {
            println!("   session {} now serves {user}", self.id);
        }
    }

    fn on_return_to_pool(&self) {}
}

impl Dispose for Session {
    fn dispose(&self) -> Result<(), BoxError> {
        println!("   session {} closed", self.id);
        Ok(())
    }
}

/// Hands out a private session to administrators and drops poisoned sessions.
struct SessionPolicy;

impl RegistrationPolicy<Session> for SessionPolicy {
    fn maximum_retained(&self) -> usize {
        2
    }

    fn before_get(&self, ctx: &ResolveContext<'_>) -> GetSource<Session> {
        match ctx.named::<String>("user").map(String::as_str) {
            Some("admin") => GetSource::Private(Arc::new(Session::new(0))),
            _ => GetSource::Pool,
        }
    }

    fn before_return(&self, session: &Session) -> bool {
        !session.poisoned.load(Ordering::Relaxed)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Scoped object pooling - Advanced Features ===\n");

    let next_id = Arc::new(AtomicUsize::new(1));
    let mut builder = ContainerBuilder::new();
    let id = builder.register(
        RegistrationBuilder::from_factory(move |_| Ok(Session::new(next_id.fetch_add(1, Ordering::Relaxed))))
            .with_pool_notifications()
            .with_disposal()
            .pooled_instance_per_lifetime_scope_with_policy(Arc::new(SessionPolicy)),
    );
    let container = builder.build().unwrap();

    // Example 1: Parameters reach the policy and the component
    println!("1. Parameters:");
    for user in ["alice", "bob"] {
        let scope = container.begin_lifetime_scope().unwrap();
        scope
            .resolve_with::<Session>(&[Parameter::named("user", user.to_string())])
            .unwrap();
        scope.dispose().unwrap();
    }
    println!();

    // Example 2: Bypassing the pool
    println!("2. Private instance:");
    {
        let scope = container.begin_lifetime_scope().unwrap();
        let session = scope
            .resolve_with::<Session>(&[Parameter::named("user", "admin".to_string())])
            .unwrap();
        println!("   admin got session {}", session.id);
        scope.dispose().unwrap();
    }
    println!();

    // Example 3: Declining to retain
    println!("3. Poisoned instance:");
    {
        let scope = container.begin_lifetime_scope().unwrap();
        let session = scope.resolve::<Session>().unwrap();
        session.poisoned.store(true, Ordering::Relaxed);
        scope.dispose().unwrap();
    }
    println!();

    // Example 4: Prometheus metrics
    println!("4. Prometheus Metrics Export:");
    if let Some(metrics) = container.pool_metrics(id) {
        let health = scoped_objectpool::HealthStatus::from_metrics(&metrics);
        println!("   healthy: {} ({} warnings)", health.is_healthy(), health.warning_count);

        #[cfg(feature = "metrics")]
        {
            let mut tags = std::collections::HashMap::new();
            tags.insert("service".to_string(), "sessions".to_string());
            match scoped_objectpool::MetricsExporter::export_prometheus(&metrics, "session_pool", Some(&tags)) {
                Ok(text) => println!("{text}"),
                Err(err) => println!("   export failed: {err}"),
            }
        }
        #[cfg(not(feature = "metrics"))]
        println!("   {:?}", metrics.export());
    }

    container.dispose().unwrap();
}
