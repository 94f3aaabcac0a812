//! generator.rs
//! Synthetic frame source: drives the pipeline with a lighting effect at a fixed rate.
//! - Periodic release paced with `SpinSleeper`, like the output loop.
//! - Pushes through `Pipeline::ingest`, exactly as an external decoder would.
//! - Used for the console demo, overload experiments and benches.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::debug;
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::error::{BridgeError, Result};
use crate::ingest::frame::Frame;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// One lit channel walking across the universe.
    Chase,
    /// Sine fade on every channel, phase-shifted per channel.
    Fade,
    /// Random channels flashing on a dark background.
    Sparkle,
}

impl Effect {
    /// Frame number `step` of the effect.
    pub fn render(&self, step: u64, channels: usize) -> Frame {
        let mut values = vec![0u8; channels];
        match self {
            Effect::Chase => {
                if channels > 0 {
                    values[(step as usize) % channels] = 255;
                }
            }
            Effect::Fade => {
                for (i, v) in values.iter_mut().enumerate() {
                    let phase = step as f64 / 10.0 + i as f64 / 16.0;
                    *v = (128.0 + 127.0 * phase.sin()) as u8;
                }
            }
            Effect::Sparkle => {
                for v in values.iter_mut() {
                    if random_range(0..100u32) < 5 {
                        *v = random_range(64..=255u8);
                    }
                }
            }
        }
        Frame::normalize(&values, channels)
    }
}

pub struct PatternGenerator {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl PatternGenerator {
    /// Starts pushing `effect` frames into `pipeline` at `rate_hz`.
    pub fn spawn(pipeline: Arc<Pipeline>, effect: Effect, rate_hz: f64) -> Result<Self> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(BridgeError::Config(format!(
                "generator rate must be positive, got {}",
                rate_hz
            )));
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let period = Duration::from_secs_f64(1.0 / rate_hz);

        let handle = thread::Builder::new()
            .name("dmx-generator".to_string())
            .spawn(move || {
                let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
                let channels = pipeline.channels();
                let mut next_release = Instant::now();
                let mut step: u64 = 0;

                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < next_release {
                        sleeper.sleep(next_release - now);
                        continue;
                    }

                    pipeline.ingest_frame(effect.render(step, channels));
                    step += 1;

                    next_release += period;
                    if next_release < now {
                        next_release = now + period;
                    }
                }

                debug!("[Generator] {:?} stopped after {} frames", effect, step);
                step
            })
            .map_err(|e| BridgeError::Spawn("generator", e))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stops the source; returns how many frames it pushed.
    pub fn stop(&mut self) -> u64 {
        self.running.store(false, Ordering::Release);
        match self.handle.take() {
            Some(h) => h.join().unwrap_or(0),
            None => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PatternGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
