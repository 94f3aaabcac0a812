//! # DMX Bridge Console
//!
//! Runs the bridge with the config given as the first argument (defaults otherwise)
//! and drives it from a small interactive menu.
//!
//! ## Frame Sources
//! - Raw UDP frames when `[ingest] udp_bind` is set.
//! - Built-in demo effect (`d` toggles it, cycling Chase → Fade → Sparkle).
//! - Test patterns (`1`..`4`), which preempt whatever is queued.
//!
//! ## Outputs
//! - Serial device from `[output] device`; without one, output ticks are no-op skips.
//! - Background status line whenever rate / activity / drop rate change.
//! - Optional CSV stats log and HTTP status endpoint (see `[monitoring]`).

use std::{
    env,
    io::{Write, stdin, stdout},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{error, info, warn};

use dmx_bridge::{
    Bridge, BridgeConfig, StatusProbe, StatusSnapshot, TestPattern,
    config::DMX_FPS,
    ingest::generator::{Effect, PatternGenerator},
};

const STATUS_POLL: Duration = Duration::from_millis(500);
const DEMO_EFFECTS: [Effect; 3] = [Effect::Chase, Effect::Fade, Effect::Sparkle];

fn main() {
    env_logger::init();
    info!("=== DMX BRIDGE START ===");

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            eprintln!("Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut bridge = match Bridge::new(config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Could not create bridge: {}", e);
            std::process::exit(1);
        }
    };

    if bridge.config().output.device.is_some() {
        if let Err(e) = bridge.open_device() {
            warn!("Serial device unavailable, running without output: {}", e);
        }
    } else {
        println!("No [output] device configured: frames are paced but not written.");
    }

    if let Err(e) = bridge.start() {
        eprintln!("Could not start output loop: {}", e);
        std::process::exit(1);
    }
    if let Some(addr) = bridge.status_addr() {
        println!("Status endpoint: http://{}/stats", addr);
    }
    if let Some(addr) = bridge.udp_addr() {
        println!("Listening for raw frames on udp://{}", addr);
    }

    let (status_running, status_handle) = spawn_status_line(bridge.status_probe());
    let mut demo: Option<(PatternGenerator, Effect)> = None;
    let mut next_effect = 0usize;

    print_help();
    loop {
        match prompt().as_str() {
            "1" => send_pattern(&bridge, TestPattern::AllOff),
            "2" => send_pattern(&bridge, TestPattern::FirstFive),
            "3" => send_pattern(&bridge, TestPattern::Dim),
            "4" => send_pattern(&bridge, TestPattern::AllOn),
            "d" => match demo.take() {
                Some((mut generator, effect)) => {
                    let pushed = generator.stop();
                    println!("Demo {:?} stopped after {} frames.", effect, pushed);
                }
                None => {
                    let effect = DEMO_EFFECTS[next_effect % DEMO_EFFECTS.len()];
                    next_effect += 1;
                    match PatternGenerator::spawn(bridge.pipeline().clone(), effect, DMX_FPS) {
                        Ok(g) => {
                            println!("Demo {:?} running at {} FPS.", effect, DMX_FPS);
                            demo = Some((g, effect));
                        }
                        Err(e) => println!("Could not start demo: {}", e),
                    }
                }
            },
            "s" => print_status(&bridge.status_probe().snapshot()),
            "c" => print_config(bridge.config()),
            "?" | "h" => print_help(),
            "q" => break,
            "" => {}
            other => println!("Unrecognized option '{}', press ? for help.", other),
        }
    }

    if let Some((mut generator, _)) = demo.take() {
        generator.stop();
    }
    status_running.store(false, Ordering::Release);
    let _ = status_handle.join();

    let stats = bridge.shutdown();
    println!(
        "\nFinal: {} processed, {} dropped ({:.1}%), {} sent ({} repeats), {} send errors",
        stats.processed, stats.dropped, stats.drop_rate_pct, stats.sent, stats.repeated, stats.send_errors
    );
    info!("=== DMX BRIDGE FINISHED ===");
}

fn load_config() -> dmx_bridge::Result<BridgeConfig> {
    match env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {}", path);
            BridgeConfig::load(path)
        }
        None => Ok(BridgeConfig::default()),
    }
}

fn send_pattern(bridge: &Bridge, pattern: TestPattern) {
    if bridge.send_test(pattern) {
        println!("Test pattern: {}", pattern.name());
    } else {
        println!("Bridge is stopped.");
    }
}

/// Prints a one-line summary whenever the displayed values change.
fn spawn_status_line(probe: StatusProbe) -> (Arc<AtomicBool>, JoinHandle<()>) {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let handle = thread::spawn(move || {
        let mut last_line = String::new();
        while flag.load(Ordering::Acquire) {
            thread::sleep(STATUS_POLL);
            let snap = probe.snapshot();
            let line = format!(
                "[{}] {:.1} FPS | {} active ch | max {} | {:.1}% dropped",
                if snap.active { "ACTIVE" } else { "idle" },
                snap.stats.rate,
                snap.active_channels,
                snap.max_value,
                snap.stats.drop_rate_pct
            );
            if line != last_line {
                println!("{}", line);
                last_line = line;
            }
        }
    });

    (running, handle)
}

fn prompt() -> String {
    print!("> ");
    let _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        // EOF behaves like quit so piped sessions terminate
        Ok(0) => "q".to_string(),
        Ok(_) => input.trim().to_lowercase(),
        Err(_) => "q".to_string(),
    }
}

fn print_help() {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│  DMX BRIDGE                                 │");
    println!("├─────────────────────────────────────────────┤");
    println!("│  1) all channels off                        │");
    println!("│  2) first five channels full                │");
    println!("│  3) all channels 50%                        │");
    println!("│  4) all channels full                       │");
    println!("│  d) toggle demo effect                      │");
    println!("│  s) status    c) config    ?) help          │");
    println!("│  q) quit                                    │");
    println!("└─────────────────────────────────────────────┘");
}

fn print_status(snap: &StatusSnapshot) {
    let s = &snap.stats;
    println!("State:        {}", snap.state.name());
    println!("Connected:    {}", snap.connected);
    println!("DMX active:   {}", snap.active);
    println!("Channels:     {} ({} active, max {})", snap.channels, snap.active_channels, snap.max_value);
    println!("Queued:       {}", snap.queued);
    println!("Rate:         {:.1} FPS", s.rate);
    println!("Processed:    {}", s.processed);
    println!("Dropped:      {} ({:.1}%)", s.dropped, s.drop_rate_pct);
    println!("Sent:         {} ({} repeats)", s.sent, s.repeated);
    println!("Skipped:      {}", s.skipped);
    println!("Send errors:  {}", s.send_errors);
    println!("Resyncs:      {}", s.resyncs);
}

fn print_config(config: &BridgeConfig) {
    match toml::to_string_pretty(config) {
        Ok(text) => println!("{}", text),
        Err(e) => println!("Could not render config: {}", e),
    }
}
