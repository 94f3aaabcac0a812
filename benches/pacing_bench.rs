/*
Measures tick jitter for the output loop period (88 Hz ≈ 11.36 ms) with the two
timing primitives available to the scheduler: OS thread::sleep and the hybrid
SpinSleeper (coarse sleep + spin for the last stretch).
*/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    hint::black_box,
    thread,
    time::{Duration, Instant},
};

use dmx_bridge::output::scheduler::SchedulerOptions;

// Ticks per iteration: enough to expose jitter, short enough for a bench run
const TICKS: usize = 20;

/// Runs `TICKS` absolute-deadline ticks and returns per-tick lateness in µs.
fn run_ticks(interval: Duration, mut sleep: impl FnMut(Duration)) -> Vec<u64> {
    let mut lateness = Vec::with_capacity(TICKS);
    let mut next = Instant::now() + interval;
    for _ in 0..TICKS {
        let now = Instant::now();
        if next > now {
            sleep(next - now);
        }
        lateness.push(Instant::now().saturating_duration_since(next).as_micros() as u64);
        next += interval;
    }
    lateness
}

fn bench_pacing(c: &mut Criterion) {
    let interval = SchedulerOptions::new(88.0).interval();
    let mut group = c.benchmark_group("output_pacing");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(BenchmarkId::new("thread_sleep", "88Hz"), |b| {
        b.iter(|| black_box(run_ticks(interval, thread::sleep)));
    });

    group.bench_function(BenchmarkId::new("spin_sleeper", "88Hz"), |b| {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        b.iter(|| black_box(run_ticks(interval, |d| sleeper.sleep(d))));
    });

    group.finish();
}

criterion_group!(benches, bench_pacing);
criterion_main!(benches);
