//! Benchmarks for topic fan-out
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sensorcast::sensors::{Reading, SensorSnapshot};
use sensorcast::websocket::{ConnectionHandle, ConnectionRegistry};
use sensorcast::{Broadcaster, DeliveryConfig, Envelope};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

fn snapshot() -> Envelope {
    let all = vec![
        Reading::new("s1", "Garage", 72.3),
        Reading::new("s2", "Water", 51.8),
    ];
    Envelope::from_payload("update", &SensorSnapshot { all }).unwrap()
}

/// Broadcaster with `count` subscribers on "all", each drained by a task
fn setup(rt: &Runtime, count: usize) -> Arc<Broadcaster> {
    rt.block_on(async {
        let registry = Arc::new(ConnectionRegistry::new());
        for i in 0..count {
            let (tx, mut rx) = mpsc::channel(1024);
            registry
                .register(ConnectionHandle::new(format!("c{}", i), tx), "all")
                .await
                .unwrap();
            tokio::spawn(async move { while rx.recv().await.is_some() {} });
        }
        Arc::new(Broadcaster::new(registry, DeliveryConfig::default()))
    })
}

fn bench_publish(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("publish");

    for subscribers in [1, 100, 1000] {
        let broadcaster = setup(&rt, subscribers);
        group.throughput(Throughput::Elements(subscribers as u64));

        group.bench_function(format!("fan_out_{}", subscribers), |b| {
            b.iter(|| rt.block_on(broadcaster.publish("all", black_box(snapshot()))))
        });
    }

    group.finish();
}

fn bench_publish_other_topic(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let broadcaster = setup(&rt, 1000);

    c.bench_function("publish_empty_topic", |b| {
        b.iter(|| rt.block_on(broadcaster.publish("multiSensor", black_box(snapshot()))))
    });
}

fn bench_register(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("register_unregister", |b| {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        b.iter(|| {
            rt.block_on(async {
                registry
                    .register(ConnectionHandle::new("bench", tx.clone()), "all")
                    .await
                    .unwrap();
                registry.unregister(black_box("bench")).await
            })
        })
    });
}

criterion_group!(benches, bench_publish, bench_publish_other_topic, bench_register);
criterion_main!(benches);
