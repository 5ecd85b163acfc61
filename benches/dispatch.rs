//! Transition dispatch benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use petra_ac::{registry, InMemoryServer, OnOffCondition, StatusCode, TransitionKind};

fn bench_dispatch(c: &mut Criterion) {
    let runtime = InMemoryServer::new();
    let server = runtime.handle();
    let source = runtime.add_event_source("BenchSource").unwrap();

    let mut group = c.benchmark_group("dispatch");
    for conditions in [1usize, 100, 1000] {
        let alarms: Vec<OnOffCondition> = (0..conditions)
            .map(|i| {
                let alarm = OnOffCondition::new(&server, &source, format!("Alarm{}", i), None, 500).unwrap();
                alarm.on_active(|_, _, _| StatusCode::GOOD, false).unwrap();
                alarm
            })
            .collect();
        let target = alarms[conditions / 2].id().clone();

        group.bench_with_input(BenchmarkId::new("registered", conditions), &target, |b, id| {
            b.iter(|| registry::dispatch(&server, TransitionKind::EnteringActive, black_box(id), None))
        });
        group.bench_with_input(BenchmarkId::new("empty_slot", conditions), &target, |b, id| {
            b.iter(|| registry::dispatch(&server, TransitionKind::EnteringAcked, black_box(id), None))
        });
    }
    group.finish();
}

fn bench_set_active(c: &mut Criterion) {
    let runtime = InMemoryServer::new();
    let server = runtime.handle();
    let source = runtime.add_event_source("BenchSource").unwrap();
    let alarm = OnOffCondition::with_defaults(&server, &source).unwrap();
    alarm.on_active(|_, _, _| StatusCode::GOOD, false).unwrap();

    let mut active = false;
    c.bench_function("set_active_toggle", |b| {
        b.iter(|| {
            active = !active;
            alarm.set_active(&source, black_box(active), None).unwrap()
        })
    });
}

criterion_group!(benches, bench_dispatch, bench_set_active);
criterion_main!(benches);
