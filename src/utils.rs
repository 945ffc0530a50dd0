use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::state::SharedState;

/// Spawn a named worker thread.
pub fn spawn_named<F>(name: &str, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

/// Sleep for `total`, waking early if the running flag is cleared.
pub fn sleep_while_running(state: &SharedState, total: Duration) {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while state.is_running() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

/// Debounce helper to prevent rapid repeated triggers
pub struct Debouncer {
    last_trigger: Option<Instant>,
    debounce_duration: Duration,
}

impl Debouncer {
    /// Create a new debouncer with specified duration in milliseconds
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            last_trigger: None,
            debounce_duration: Duration::from_millis(debounce_ms),
        }
    }

    /// Returns true if we should trigger, false if still in debounce period
    pub fn should_trigger(&mut self) -> bool {
        self.should_trigger_at(Instant::now())
    }

    pub fn should_trigger_at(&mut self, now: Instant) -> bool {
        match self.last_trigger {
            Some(last) if now.duration_since(last) < self.debounce_duration => false,
            _ => {
                self.last_trigger = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_trigger = None;
    }
}

/// Fires once per LOW→HIGH transition of a sampled level.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the current level; true only on a rising edge.
    pub fn rising(&mut self, high: bool) -> bool {
        let fired = high && !self.previous;
        self.previous = high;
        fired
    }
}

/// Exponential retry delay, doubled per failure up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns a longer one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Timing measurements for a single processed shot
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTiming {
    pub detect_us: f64,
    pub classify_us: f64,
    pub score_us: f64,
    pub encode_us: f64,
    pub total_us: f64,
}

impl StageTiming {
    pub fn total_ms(&self) -> f64 {
        self.total_us / 1000.0
    }
}

pub fn micros_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000_000.0
}

/// Statistics collector for latency measurements
#[derive(Default)]
pub struct LatencyStats {
    timings: Vec<StageTiming>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, timing: StageTiming) {
        self.timings.push(timing);
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx]
    }

    /// (mean, p50, p95, p99) for one stage
    fn stage_stats(&self, extract: impl Fn(&StageTiming) -> f64) -> (f64, f64, f64, f64) {
        if self.timings.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut values: Vec<f64> = self.timings.iter().map(&extract).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let p50 = Self::percentile(&values, 50.0);
        let p95 = Self::percentile(&values, 95.0);
        let p99 = Self::percentile(&values, 99.0);

        (mean, p50, p95, p99)
    }

    /// Log the per-stage latency table
    pub fn print_report(&self) {
        if self.timings.is_empty() {
            tracing::info!("No shots processed, no timing data collected");
            return;
        }

        let stages = [
            ("Detect", self.stage_stats(|t| t.detect_us)),
            ("Classify", self.stage_stats(|t| t.classify_us)),
            ("Register+Score", self.stage_stats(|t| t.score_us)),
            ("Encode", self.stage_stats(|t| t.encode_us)),
        ];
        let total = self.stage_stats(|t| t.total_us);

        tracing::info!("Shot latency report ({} shots)", self.timings.len());
        tracing::info!("┌─────────────────┬──────────┬──────────┬──────────┬──────────┐");
        tracing::info!("│ Stage           │   Mean   │   p50    │   p95    │   p99    │");
        tracing::info!("├─────────────────┼──────────┼──────────┼──────────┼──────────┤");
        for (name, stats) in stages {
            Self::print_row(name, stats);
        }
        tracing::info!("├─────────────────┼──────────┼──────────┼──────────┼──────────┤");
        Self::print_row("TOTAL", total);
        tracing::info!("└─────────────────┴──────────┴──────────┴──────────┴──────────┘");

        if let Some((name, stats)) = stages.iter().max_by(|a, b| a.1 .2.total_cmp(&b.1 .2)) {
            tracing::info!("Bottleneck: {} ({:.0} µs p95)", name, stats.2);
        }
    }

    fn print_row(name: &str, stats: (f64, f64, f64, f64)) {
        tracing::info!(
            "│ {:<15} │ {:>6.0} µs │ {:>6.0} µs │ {:>6.0} µs │ {:>6.0} µs │",
            name,
            stats.0,
            stats.1,
            stats.2,
            stats.3
        );
    }
}
