//! Runtime engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use exo_runtime::{Callback, Machine, MachineOptions};
use serde_json::{json, Value};
use tokio::runtime::Runtime;

const TOGGLE: &str = "
main machine toggle {
    initial state off { on:FLIP ${0} }
    state on { on:FLIP ${1} }
}
";

fn toggle_machine(rt: &Runtime) -> Machine<Value> {
    let _guard = rt.enter();
    Machine::from_source(
        MachineOptions::default(),
        json!({}),
        TOGGLE,
        vec![Callback::goto("on"), Callback::goto("off")],
    )
    .unwrap()
}

fn bench_construct(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_construct");

    group.bench_function("toggle", |b| {
        b.iter(|| black_box(toggle_machine(&rt)));
    });

    group.finish();
}

fn bench_send(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let machine = toggle_machine(&rt);

    let mut group = c.benchmark_group("engine_send");
    group.throughput(Throughput::Elements(1));

    group.bench_function("transition", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(machine.send("FLIP", Value::Null).await.unwrap()) });
    });

    group.bench_function("unhandled", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(machine.send("NOPE", Value::Null).await.unwrap()) });
    });

    group.finish();
}

fn bench_subscribers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_notify");

    for subscribers in [1, 10, 100] {
        let machine = toggle_machine(&rt);
        for _ in 0..subscribers {
            machine.subscribe(|snapshot| {
                black_box(snapshot.state.len());
            });
        }
        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &machine,
            |b, machine| {
                b.to_async(&rt)
                    .iter(|| async { black_box(machine.send("FLIP", Value::Null).await.unwrap()) });
            },
        );
    }

    group.finish();
}

fn bench_wildcard_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_wildcard");

    for handlers in [1, 8, 64] {
        let mut source = String::from("main machine m { initial state idle { ");
        for i in 0..handlers {
            source.push_str(&format!("on:* ${{{}}} ", i));
        }
        source.push_str("} }");

        let machine = {
            let _guard = rt.enter();
            let callbacks = (0..handlers)
                .map(|_| {
                    Callback::new(|_, _| futures::future::ready(Ok(())))
                })
                .collect();
            Machine::from_source(MachineOptions::default(), json!({}), &source, callbacks).unwrap()
        };

        group.bench_with_input(BenchmarkId::from_parameter(handlers), &machine, |b, machine| {
            b.to_async(&rt)
                .iter(|| async { black_box(machine.send("PING", Value::Null).await.unwrap()) });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_construct,
    bench_send,
    bench_subscribers,
    bench_wildcard_fanout
);
criterion_main!(benches);
