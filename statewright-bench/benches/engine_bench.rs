//! State machine engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::Value;
use statewright_core::{Callback, Context, Machine, MachineDefinition, Transition};
use std::sync::Arc;
use std::thread;

fn order_machine(callbacks: Vec<Callback<String, String>>) -> Machine<String, String> {
    let definition = serde_json::json!({
        "initial": "created",
        "transitions": [
            {"from": "created", "event": "START", "to": "processing"},
            {"from": "processing", "event": "COMPLETE", "to": "completed"},
            {"from": "processing", "event": "FAIL", "to": "failed"},
            {"from": "failed", "event": "RETRY", "to": "processing"},
            {"from": ["completed", "failed"], "event": "RESET", "to": "created"},
        ]
    });
    MachineDefinition::from_json(&definition)
        .unwrap()
        .build(callbacks)
        .unwrap()
}

fn chain_transitions(len: usize) -> Vec<Transition<String, String>> {
    (0..len)
        .map(|i| {
            Transition::new(
                format!("NEXT_{}", i),
                [format!("state_{}", i)],
                format!("state_{}", i + 1),
            )
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_build");

    let simple = vec![Transition::new("GO".to_string(), ["a".to_string()], "b".to_string())];
    group.bench_function("simple", |b| {
        b.iter(|| black_box(Machine::new("a".to_string(), simple.clone(), Vec::new()).unwrap()))
    });

    for len in [20, 200] {
        let transitions = chain_transitions(len);
        group.bench_with_input(BenchmarkId::new("chain", len), &transitions, |b, t| {
            b.iter(|| {
                black_box(Machine::new("state_0".to_string(), t.clone(), Vec::new()).unwrap())
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_lookup");

    let machine = Machine::new("state_0".to_string(), chain_transitions(200), Vec::new()).unwrap();
    let known = "NEXT_0".to_string();
    let wrong_state = "NEXT_100".to_string();

    group.throughput(Throughput::Elements(1));
    group.bench_function("can", |b| b.iter(|| black_box(machine.can(&known))));
    group.bench_function("cannot", |b| b.iter(|| black_box(machine.can(&wrong_state))));
    group.bench_function("available_transitions", |b| {
        b.iter(|| black_box(machine.available_transitions()))
    });
    group.bench_function("current", |b| b.iter(|| black_box(machine.current())));

    group.finish();
}

fn bench_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_event");
    group.throughput(Throughput::Elements(2));

    let ctx = Context::background();
    let machine = order_machine(Vec::new());
    group.bench_function("no_callbacks", |b| {
        b.iter(|| {
            machine.fire(&ctx, "START".to_string()).unwrap();
            machine.fire(&ctx, "FAIL".to_string()).unwrap();
            machine.set_state("created".to_string());
        })
    });

    let machine = order_machine(vec![
        Callback::before_all_events(|_| {}),
        Callback::leave_all_states(|_| {}),
        Callback::enter_all_states(|_| {}),
        Callback::after_all_events(|_| {}),
        Callback::enter_state("processing".to_string(), |cb| {
            black_box(cb.args().len());
        }),
    ]);
    group.bench_function("all_phases", |b| {
        b.iter(|| {
            machine.fire(&ctx, "START".to_string()).unwrap();
            machine.fire(&ctx, "FAIL".to_string()).unwrap();
            machine.set_state("created".to_string());
        })
    });

    let machine = order_machine(Vec::new());
    let payload = vec![serde_json::json!({"action": "process", "data": "x".repeat(100)})];
    group.bench_function("with_args", |b| {
        b.iter(|| {
            machine.event(&ctx, "START".to_string(), payload.clone()).unwrap();
            machine.event(&ctx, "FAIL".to_string(), payload.clone()).unwrap();
            machine.set_state("created".to_string());
        })
    });

    group.finish();
}

fn bench_rejected(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_rejected");

    let ctx = Context::background();
    let machine = order_machine(Vec::new());
    group.bench_function("invalid_event", |b| {
        b.iter(|| black_box(machine.fire(&ctx, "COMPLETE".to_string()).is_err()))
    });
    group.bench_function("unknown_event", |b| {
        b.iter(|| black_box(machine.fire(&ctx, "EXPLODE".to_string()).is_err()))
    });

    group.finish();
}

fn bench_reentrant(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_reentrant");
    group.throughput(Throughput::Elements(3));

    // Each START chains FAIL and RESET from inside callbacks.
    let machine = order_machine(vec![
        Callback::enter_state("processing".to_string(), |cb| {
            let _ = cb.machine().fire(cb.context(), "FAIL".to_string());
        }),
        Callback::after_event("FAIL".to_string(), |cb| {
            let _ = cb.machine().fire(cb.context(), "RESET".to_string());
        }),
    ]);
    let ctx = Context::background();
    group.bench_function("chain_of_three", |b| {
        b.iter(|| machine.fire(&ctx, "START".to_string()).unwrap())
    });

    group.finish();
}

fn bench_async(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_async");

    let machine = order_machine(vec![Callback::leave_state("created".to_string(), |cb| {
        cb.set_async()
    })]);
    let ctx = Context::background();
    group.bench_function("defer_and_complete", |b| {
        b.iter(|| {
            let deferred = machine.fire(&ctx, "START".to_string());
            black_box(deferred.is_err());
            machine.transition().unwrap();
            machine.set_state("created".to_string());
        })
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("machine_contended");
    group.sample_size(20);

    for threads in [2usize, 8] {
        let machine = Arc::new(Machine::new(
            "closed".to_string(),
            vec![
                Transition::new("open".to_string(), ["closed".to_string()], "open".to_string()),
                Transition::new("close".to_string(), ["open".to_string()], "closed".to_string()),
            ],
            Vec::new(),
        )
        .unwrap());

        group.throughput(Throughput::Elements((threads * 1000) as u64));
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &n| {
            b.iter(|| {
                let handles: Vec<_> = (0..n)
                    .map(|t| {
                        let machine = machine.clone();
                        thread::spawn(move || {
                            let ctx = Context::background();
                            let event = if t % 2 == 0 { "open" } else { "close" };
                            for _ in 0..1000 {
                                let _ = machine.event(&ctx, event.to_string(), Vec::<Value>::new());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_lookup,
    bench_event,
    bench_rejected,
    bench_reentrant,
    bench_async,
    bench_contended,
);

criterion_main!(benches);
