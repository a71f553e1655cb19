use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use channel::{
    Command, ComponentDescriptor, InMemoryServiceRegistry, Injectable, ServiceChannel,
    ServiceDirectoryExt, ServiceEntry, ServiceError, ServiceImplementation, ServiceInstance,
};
use common::ErasedHandle;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

#[async_trait]
trait Node: Send + Sync {
    async fn descend(&self, depth: usize) -> Result<usize, ServiceError>;
}

#[derive(Default)]
struct NodeService {
    channel: OnceLock<ServiceChannel>,
}

#[async_trait]
impl Node for NodeService {
    async fn descend(&self, depth: usize) -> Result<usize, ServiceError> {
        if depth == 0 {
            return Ok(0);
        }
        let channel = self.channel.get().unwrap();
        let reached = channel
            .call_required(Command::new("descend", move |node: Arc<dyn Node>| async move {
                node.descend(depth - 1).await
            }))
            .await?;
        Ok(reached + 1)
    }
}

impl Injectable for NodeService {}

#[async_trait]
impl ServiceImplementation for NodeService {}

struct NodeProxy(ServiceChannel);

#[async_trait]
impl Node for NodeProxy {
    async fn descend(&self, depth: usize) -> Result<usize, ServiceError> {
        self.0
            .call_required(Command::new("descend", move |node: Arc<dyn Node>| async move {
                node.descend(depth).await
            }))
            .await
    }
}

fn setup() -> (ServiceChannel, Arc<dyn Node>) {
    let channel = ServiceChannel::builder().build();
    let service = Arc::new(NodeService::default());
    service.channel.set(channel.clone()).unwrap();

    let mut registry = InMemoryServiceRegistry::new();
    registry
        .register(
            ServiceEntry::new(
                ServiceInstance::new::<dyn Node>(service.clone(), service),
                ErasedHandle::new::<dyn Node>(Arc::new(NodeProxy(channel.clone()))),
                Arc::new(ComponentDescriptor::new("bench")),
            )
            .unwrap(),
        )
        .unwrap();
    let registry = Arc::new(registry);
    channel.attach(registry.clone()).unwrap();
    let node = registry.proxy_of::<dyn Node>().unwrap();
    (channel, node)
}

fn bench_nested_required(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_channel, node) = setup();
    let mut group = c.benchmark_group("dispatch/nested_required");

    for depth in [0usize, 1, 5, 10] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                rt.block_on(async {
                    let reached = node.descend(depth).await.unwrap();
                    assert_eq!(reached, depth);
                });
            });
        });
    }
    group.finish();
}

fn bench_requires_new(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (channel, _node) = setup();

    c.bench_function("dispatch/requires_new", |b| {
        b.iter(|| {
            rt.block_on(async {
                channel
                    .call_requires_new(Command::new("descend", |node: Arc<dyn Node>| async move {
                        node.descend(0).await
                    }))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_nested_required, bench_requires_new);
criterion_main!(benches);
