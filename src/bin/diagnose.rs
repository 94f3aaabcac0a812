//! # Performance Diagnostics
//!
//! Quick checks of whether this machine can sustain the configured output rate:
//! 1. **Timing precision:** OS `thread::sleep` vs `SpinSleeper` at the output interval.
//! 2. **Buffer throughput:** concurrent producer/consumer through `FrameBuffer`.
//! 3. **Send throughput:** encode + write of full frames to the configured device
//!    (or a null writer when none is configured).
//!
//! Usage: `diagnose [config.toml]`

use std::{
    env, io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use average::{Estimate, Max, Variance};
use spin_sleep::{SpinSleeper, SpinStrategy};

use dmx_bridge::{
    BridgeConfig, Frame,
    ingest::buffer::FrameBuffer,
    output::{
        sink::{FrameSink, SendOutcome},
        transport::{DeviceTransport, Transport, WriterTransport},
    },
    utils::metrics::PerformanceMonitor,
};

const TIMING_SAMPLES: usize = 200;
const BUFFER_FRAMES: usize = 100_000;
const SEND_FRAMES: usize = 500;

struct TimingReport {
    mean_err_us: f64,
    std_err_us: f64,
    max_err_us: f64,
}

fn main() {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => match BridgeConfig::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Could not load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => BridgeConfig::default(),
    };
    let interval = config.scheduler_options().interval();
    let channels = config.output.channels;

    println!("=== DMX BRIDGE DIAGNOSTICS ===");
    println!(
        "target: {:.1} Hz ({:?} interval), {} channels\n",
        config.output.rate_hz, interval, channels
    );

    // ------------------------------------------------------------------------
    // 1. Timing precision
    // ------------------------------------------------------------------------
    println!("[1] Timing precision ({} sleeps of {:?})", TIMING_SAMPLES, interval);
    let os = measure_timing(interval, |d| thread::sleep(d));
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let spin = measure_timing(interval, |d| sleeper.sleep(d));
    print_timing("thread::sleep", &os);
    print_timing("SpinSleeper", &spin);
    let budget_us = interval.as_secs_f64() * 1e6 * 0.1;
    if spin.max_err_us < budget_us {
        println!("    verdict: OK (worst overshoot within 10% of the interval)\n");
    } else {
        println!("    verdict: JITTERY (worst overshoot {:.0} µs > {:.0} µs)\n", spin.max_err_us, budget_us);
    }

    // ------------------------------------------------------------------------
    // 2. Buffer throughput
    // ------------------------------------------------------------------------
    println!("[2] Frame buffer throughput ({} frames, capacity {})", BUFFER_FRAMES, config.buffer.capacity);
    let (fps, dropped) = measure_buffer(config.buffer.capacity, channels);
    println!("    {:.0} frames/s pushed, {} evicted under contention", fps, dropped);
    verdict(fps, config.output.rate_hz);

    // ------------------------------------------------------------------------
    // 3. Encode + write throughput
    // ------------------------------------------------------------------------
    let transport: Box<dyn Transport> = match &config.output.device {
        Some(path) => match DeviceTransport::open(path) {
            Ok(t) => Box::new(t),
            Err(e) => {
                println!("[3] device {} unavailable ({}), using null writer", path.display(), e);
                Box::new(WriterTransport::new("null", io::sink()))
            }
        },
        None => Box::new(WriterTransport::new("null", io::sink())),
    };
    println!("[3] Send throughput via {} ({} frames)", transport.describe(), SEND_FRAMES);
    let sink = FrameSink::with_transport(transport, config.write_timeout());
    let frame = Frame::filled(channels, 0x80);
    let started = Instant::now();
    let mut errors = 0usize;
    for _ in 0..SEND_FRAMES {
        match sink.send(&frame) {
            Ok(SendOutcome::Sent) | Ok(SendOutcome::Skipped) => {}
            Err(_) => errors += 1,
        }
    }
    let fps = SEND_FRAMES as f64 / started.elapsed().as_secs_f64();
    println!("    {:.0} frames/s, {} write errors", fps, errors);
    verdict(fps, config.output.rate_hz);
    sink.close();
}

fn measure_timing(interval: Duration, mut sleep: impl FnMut(Duration)) -> TimingReport {
    let mut err = Variance::new();
    let mut max = Max::new();
    for _ in 0..TIMING_SAMPLES {
        let t0 = Instant::now();
        sleep(interval);
        let over = t0.elapsed().saturating_sub(interval).as_secs_f64() * 1e6;
        err.add(over);
        max.add(over);
    }
    TimingReport {
        mean_err_us: err.mean(),
        std_err_us: err.sample_variance().sqrt(),
        max_err_us: max.max(),
    }
}

fn print_timing(name: &str, r: &TimingReport) {
    println!(
        "    {:<14} mean overshoot {:>8.1} µs  stddev {:>8.1} µs  max {:>8.1} µs",
        name, r.mean_err_us, r.std_err_us, r.max_err_us
    );
}

/// Producer pushes as fast as it can while a consumer drains; returns (push rate, evictions).
fn measure_buffer(capacity: usize, channels: usize) -> (f64, u64) {
    let monitor = Arc::new(PerformanceMonitor::new());
    let buffer = Arc::new(FrameBuffer::new(capacity, monitor.clone()));
    let frame = Frame::filled(channels, 1);

    let consumer_buf = buffer.clone();
    let consumer_monitor = monitor.clone();
    let consumer = thread::spawn(move || {
        while consumer_monitor.processed() < BUFFER_FRAMES as u64 || !consumer_buf.is_empty() {
            if consumer_buf.pop().is_none() {
                std::hint::spin_loop();
            }
        }
    });

    let started = Instant::now();
    for _ in 0..BUFFER_FRAMES {
        buffer.push(frame.clone());
    }
    let elapsed = started.elapsed();
    let _ = consumer.join();

    (BUFFER_FRAMES as f64 / elapsed.as_secs_f64(), monitor.dropped())
}

fn verdict(fps: f64, rate_hz: f64) {
    let headroom = fps / rate_hz;
    if headroom >= 10.0 {
        println!("    verdict: OK ({:.0}x headroom over {:.1} Hz)\n", headroom, rate_hz);
    } else if headroom >= 1.0 {
        println!("    verdict: TIGHT ({:.1}x headroom over {:.1} Hz)\n", headroom, rate_hz);
    } else {
        println!("    verdict: TOO SLOW ({:.2}x of {:.1} Hz)\n", headroom, rate_hz);
    }
}
