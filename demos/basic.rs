//! Basic usage examples for scoped pooling

use std::sync::Arc;

use scoped_objectpool::{ContainerBuilder, PoolAware, RegistrationBuilder, ResolveContext};

struct Connection {
    id: usize,
}

impl PoolAware for Connection {
    fn on_get_from_pool(&self, ctx: &ResolveContext<'_>) {
        println!("   connection {} checked out for {}", self.id, ctx.scope().id());
    }

    fn on_return_to_pool(&self) {
        println!("   connection {} handed back", self.id);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Scoped object pooling - Basic Examples ===\n");

    // Example 1: One instance per scope, reused across scopes
    per_scope_sharing();

    // Example 2: Tagged scopes
    tagged_scopes();

    // Example 3: Metrics and health
    metrics_and_health();
}

fn connection_registration() -> RegistrationBuilder<Connection> {
    let next_id = Arc::new(std::sync::atomic::AtomicUsize::new(1));
    RegistrationBuilder::from_factory(move |_| {
        Ok(Connection {
            id: next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        })
    })
    .with_pool_notifications()
}

fn per_scope_sharing() {
    println!("1. Per-scope sharing:");

    let mut builder = ContainerBuilder::new();
    builder.register(connection_registration().pooled_instance_per_lifetime_scope());
    let container = builder.build().unwrap();

    for request in 1..=2 {
        let scope = container.begin_lifetime_scope().unwrap();
        let first = scope.resolve::<Connection>().unwrap();
        let second = scope.resolve::<Connection>().unwrap();
        println!(
            "   request {request}: connection {} (same instance: {})",
            first.id,
            Arc::ptr_eq(&first, &second)
        );
        scope.dispose().unwrap();
    }

    println!();
}

fn tagged_scopes() {
    println!("2. Tagged scopes:");

    let mut builder = ContainerBuilder::new();
    builder.register(connection_registration().pooled_instance_per_matching_lifetime_scope(["request"]));
    let container = builder.build().unwrap();

    let request = container.begin_tagged_scope(["request"]).unwrap();
    let handler = request.begin_lifetime_scope().unwrap();

    let outer = request.resolve::<Connection>().unwrap();
    let inner = handler.resolve::<Connection>().unwrap();
    println!("   handler shares the request connection: {}", Arc::ptr_eq(&outer, &inner));

    handler.dispose().unwrap();
    println!("   handler scope disposed, connection still checked out");
    request.dispose().unwrap();

    match container.begin_lifetime_scope().unwrap().resolve::<Connection>() {
        Ok(_) => println!("   unexpected: resolved outside a request"),
        Err(err) => println!("   outside a request: {err}"),
    }

    println!();
}

fn metrics_and_health() {
    println!("3. Metrics and health:");

    let mut builder = ContainerBuilder::new();
    let id = builder.register(connection_registration().pooled_instance_per_lifetime_scope_with_capacity(1));
    let container = builder.build().unwrap();

    let a = container.begin_lifetime_scope().unwrap();
    let b = container.begin_lifetime_scope().unwrap();
    a.resolve::<Connection>().unwrap();
    b.resolve::<Connection>().unwrap();
    a.dispose().unwrap();
    b.dispose().unwrap();

    if let Some(metrics) = container.pool_metrics(id) {
        println!("   created: {}", metrics.total_created);
        println!("   retained: {}", metrics.total_retained);
        println!("   discarded: {}", metrics.total_discarded);
        println!("   idle: {}/{}", metrics.idle_objects, metrics.maximum_retained);
    }

    container.dispose().unwrap();
    println!();
}
