//! Capping concurrently checked-out instances with a blocking policy

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use scoped_objectpool::{AdmissionControlPolicy, ContainerBuilder, RegistrationBuilder};

struct Worker;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Scoped object pooling - Admission Control ===\n");

    let policy = Arc::new(AdmissionControlPolicy::new(NonZeroUsize::new(3).unwrap()));

    let mut builder = ContainerBuilder::new();
    let id = builder.register(
        RegistrationBuilder::from_factory(|_| Ok(Worker))
            .pooled_instance_per_lifetime_scope_with_policy(Arc::clone(&policy)),
    );
    let container = Arc::new(builder.build().unwrap());

    let tasks: Vec<_> = (0..12)
        .map(|job| {
            let container = Arc::clone(&container);
            let policy = Arc::clone(&policy);
            tokio::task::spawn_blocking(move || {
                let scope = container.begin_lifetime_scope().unwrap();
                scope.resolve::<Worker>().unwrap();
                println!("   job {job:>2} running, {} in use", policy.in_use());
                std::thread::sleep(Duration::from_millis(20));
                scope.dispose().unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    if let Some(metrics) = container.pool_metrics(id) {
        println!("\n   instances created: {}", metrics.total_created);
        println!("   checkouts served from the pool: {}", metrics.total_reused);
        #[cfg(feature = "metrics")]
        println!(
            "\n{}",
            scoped_objectpool::MetricsExporter::export_prometheus(&metrics, "workers", None).unwrap()
        );
    }

    container.dispose().unwrap();
}
