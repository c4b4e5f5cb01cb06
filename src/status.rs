//! Throughput sampling and the transient progress line
//!
//! Every connection task pushes a `(timestamp, bytes)` sample after each
//! successful post. Once a second the sampler drains the feed, computes the
//! rate over the retained window and rewrites a single `\r`-terminated
//! progress line. Samples older than five seconds are trimmed each tick.

use chrono::Utc;
use std::io::Write;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Milliseconds of samples retained for the rate window
const WINDOW_MS: i64 = 5_000;

/// One throughput sample
#[derive(Clone, Copy, Debug)]
pub struct TimeData {
    /// Sample timestamp in unix milliseconds
    pub stamp_ms: i64,
    /// Bytes posted (zero for the sampler's own tick marks)
    pub bytes: u64,
}

impl TimeData {
    /// A sample stamped with the current wall clock
    pub fn now(bytes: u64) -> Self {
        Self {
            stamp_ms: Utc::now().timestamp_millis(),
            bytes,
        }
    }
}

/// Pick a display unit so the value lands in [10,100) when possible.
pub fn pretty_size(rate: f64) -> (f64, &'static str) {
    const UNITS: [(&str, f64); 5] = [
        ("B", 1.0),
        ("KB", 1024.0),
        ("MB", 1024.0 * 1024.0),
        ("GB", 1024.0 * 1024.0 * 1024.0),
        ("TB", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ];
    for (unit, divisor) in UNITS {
        let value = rate / divisor;
        if (10.0..100.0).contains(&value) {
            return (value, unit);
        }
    }
    // No unit puts the value in [10,100): clamp to the nearest end.
    if rate < 10.0 {
        (rate, "B")
    } else {
        (rate / (1024.0f64.powi(4)), "TB")
    }
}

/// Run the sampler until cancelled.
pub async fn run_sampler(mut feed: UnboundedReceiver<TimeData>, cancel: CancellationToken) {
    let mut samples: Vec<TimeData> = Vec::new();
    let mut total_posted: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let stamp = Utc::now().timestamp_millis();
                samples.push(TimeData { stamp_ms: stamp, bytes: 0 });
                while let Ok(sample) = feed.try_recv() {
                    total_posted += sample.bytes;
                    samples.push(sample);
                }
                print_progress(&samples, total_posted);
                trim_window(&mut samples, stamp - WINDOW_MS);
            }
            _ = cancel.cancelled() => return,
        }
    }
}

fn print_progress(samples: &[TimeData], total_posted: u64) {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return;
    };
    let elapsed = (last.stamp_ms - first.stamp_ms) as f64 / 1000.0;
    if elapsed <= 0.0 {
        return;
    }
    let window_bytes: u64 = samples.iter().map(|sample| sample.bytes).sum();
    let (rate, unit) = pretty_size(window_bytes as f64 / elapsed);
    let posted = total_posted as f64 / 1024.0 / 1024.0;

    // Transient line, deliberately outside tracing: rewritten in place each tick.
    print!("Posted {posted:.1}MiB - current speed: {rate:.1}{unit}/s             \r");
    let _ = std::io::stdout().flush();
}

fn trim_window(samples: &mut Vec<TimeData>, earliest: i64) {
    samples.retain(|sample| sample.stamp_ms >= earliest);
}
