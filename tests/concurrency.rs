mod common;

use std::num::NonZeroUsize;
use std::sync::Arc;

use common::{PoolTrackingPolicy, PooledComponent};
use scoped_objectpool::{AdmissionControlPolicy, ContainerBuilder, RegistrationBuilder};

fn pooled_component() -> RegistrationBuilder<PooledComponent> {
    RegistrationBuilder::from_factory(|_| Ok(PooledComponent::default()))
        .with_pool_notifications()
        .with_disposal()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_pool_used_from_many_scopes() {
    let policy = Arc::new(PoolTrackingPolicy::new());

    let mut builder = ContainerBuilder::new();
    let id = builder.register(
        pooled_component().pooled_instance_per_lifetime_scope_with_policy(Arc::clone(&policy)),
    );
    let container = Arc::new(builder.build().unwrap());

    let tasks: Vec<_> = (0..2000)
        .map(|_| {
            let container = Arc::clone(&container);
            tokio::task::spawn_blocking(move || {
                let scope = container.begin_lifetime_scope().unwrap();
                let first = scope.resolve::<PooledComponent>().unwrap();
                let second = scope.resolve::<PooledComponent>().unwrap();
                assert!(Arc::ptr_eq(&first, &second));
                scope.dispose().unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(policy.out_of_pool(), 0);

    let metrics = container.pool_metrics(id).unwrap();
    assert_eq!(metrics.checked_out, 0);
    assert_eq!(metrics.total_created + metrics.total_reused, 2000);
    assert_eq!(metrics.total_retained + metrics.total_discarded, 2000);

    container.dispose().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_admission_policy_caps_live_checkouts() {
    let policy = Arc::new(AdmissionControlPolicy::new(NonZeroUsize::new(4).unwrap()));

    let mut builder = ContainerBuilder::new();
    let id = builder.register(
        pooled_component().pooled_instance_per_lifetime_scope_with_policy(Arc::clone(&policy)),
    );
    let container = Arc::new(builder.build().unwrap());

    let tasks: Vec<_> = (0..2000)
        .map(|_| {
            let container = Arc::clone(&container);
            let policy = Arc::clone(&policy);
            tokio::task::spawn_blocking(move || {
                let scope = container.begin_lifetime_scope().unwrap();
                scope.resolve::<PooledComponent>().unwrap();

                let in_use = policy.in_use();
                assert!((1..=4).contains(&in_use), "in use: {in_use}");

                scope.dispose().unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(policy.in_use(), 0);
    assert_eq!(container.pool_metrics(id).unwrap().checked_out, 0);

    container.dispose().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispose_returns_once() {
    let mut builder = ContainerBuilder::new();
    builder.register(pooled_component().pooled_instance_per_lifetime_scope());
    let container = builder.build().unwrap();

    for _ in 0..200 {
        let scope = container.begin_lifetime_scope().unwrap();
        let instance = scope.resolve::<PooledComponent>().unwrap();
        let returns_before = instance.returns();

        let disposers: Vec<_> = (0..4)
            .map(|_| {
                let scope = scope.clone();
                tokio::task::spawn_blocking(move || scope.dispose())
            })
            .collect();

        for disposer in disposers {
            disposer.await.unwrap().unwrap();
        }

        assert_eq!(instance.returns(), returns_before + 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolves_share_one_checkout() {
    let mut builder = ContainerBuilder::new();
    builder.register(pooled_component().pooled_instance_per_lifetime_scope());
    let container = builder.build().unwrap();

    let scope = container.begin_lifetime_scope().unwrap();
    let resolvers: Vec<_> = (0..16)
        .map(|_| {
            let scope = scope.clone();
            tokio::task::spawn_blocking(move || scope.resolve::<PooledComponent>().unwrap())
        })
        .collect();

    let mut instances = Vec::new();
    for resolver in resolvers {
        instances.push(resolver.await.unwrap());
    }

    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
    assert_eq!(instances[0].gets(), 1);

    scope.dispose().unwrap();
    assert_eq!(instances[0].returns(), 1);
}
