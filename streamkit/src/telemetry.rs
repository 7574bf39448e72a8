//! Turns a stream of fractional-progress callbacks into throttled rate/ETA samples.

use crate::utils::{format_file_size, format_time};
use std::time::{Duration, Instant};

/// The minimum wall-clock time between two emitted samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// One throttled progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// The completed fraction, clamped to `[0, 1]`.
    pub fraction: f64,
    /// The bytes transferred so far.
    pub bytes_so_far: u64,
    /// The expected total, as last known to the sampler.
    pub total_bytes: u64,
    /// Bytes per second since the previous sample.
    pub speed: f64,
    /// Bytes per second since the transfer started.
    pub average_speed: f64,
    /// Remaining bytes divided by the average speed, 0 when the average speed is 0.
    pub eta_secs: f64,
    /// Time since the transfer started.
    pub elapsed: Duration,
    /// Whether this is the terminal sample of the transfer.
    pub finished: bool,
}

impl Sample {
    /// Renders the sample as `"<label> | <rate>/s | ETA: <time>"`.
    pub fn describe(&self, label: &str) -> String {
        format!(
            "{} | {}/s | ETA: {}",
            label,
            format_file_size(self.speed as u64),
            format_time(self.eta_secs as u64)
        )
    }
}

/// Converts progress fractions into [`Sample`]s, emitting at most one every [`SAMPLE_INTERVAL`].
///
/// The first observation and any observation with a fraction of 1 are always emitted.
/// The sampler does not enforce monotonic fractions.
#[derive(Debug, Clone)]
pub struct Sampler {
    total_bytes: u64,
    started: Instant,
    last_sample: Option<(Instant, u64)>,
}

impl Sampler {
    /// Starts a sampler for a transfer of `total_bytes`, timed from now.
    pub fn new(total_bytes: u64) -> Self {
        Self::starting_at(total_bytes, Instant::now())
    }

    /// Starts a sampler whose clock began at `started`.
    pub fn starting_at(total_bytes: u64, started: Instant) -> Self {
        Self {
            total_bytes,
            started,
            last_sample: None,
        }
    }

    /// The expected total in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Replaces the expected total, e.g. once the server has announced it.
    ///
    /// A total of 0 means unknown and is ignored.
    pub fn resize(&mut self, total_bytes: u64) {
        if total_bytes > 0 {
            self.total_bytes = total_bytes;
        }
    }

    /// Records progress at the current time.
    pub fn observe(&mut self, fraction: f64) -> Option<Sample> {
        self.observe_at(fraction, Instant::now())
    }

    /// Records progress at the given time, returning a sample unless throttled.
    pub fn observe_at(&mut self, fraction: f64, now: Instant) -> Option<Sample> {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        let finished = fraction >= 1.0;

        let (last_time, last_bytes) = match self.last_sample {
            Some((time, _)) if !finished && now.saturating_duration_since(time) < SAMPLE_INTERVAL => {
                return None;
            }
            Some(last) => last,
            None => (self.started, 0),
        };

        let bytes_so_far = ((self.total_bytes as f64) * fraction).round() as u64;
        let since_last = now.saturating_duration_since(last_time).as_secs_f64();
        let elapsed = now.saturating_duration_since(self.started);

        let speed = if since_last > 0.0 {
            bytes_so_far.saturating_sub(last_bytes) as f64 / since_last
        } else {
            0.0
        };
        let average_speed = if elapsed.as_secs_f64() > 0.0 {
            bytes_so_far as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let remaining = self.total_bytes.saturating_sub(bytes_so_far) as f64;
        let eta_secs = if average_speed > 0.0 {
            remaining / average_speed
        } else {
            0.0
        };

        self.last_sample = Some((now, bytes_so_far));

        Some(Sample {
            fraction,
            bytes_so_far,
            total_bytes: self.total_bytes,
            speed,
            average_speed,
            eta_secs,
            elapsed,
            finished,
        })
    }
}
