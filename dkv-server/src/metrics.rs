//! # Server Metrics
//!
//! Provide windowed rate and latency accumulators plus uptime counters for
//! the statistics page.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events cheaply; no
//!    lock is ever taken on the request path.
//! 2. **Ring of Seconds**: Each accumulator is a fixed ring of per-second
//!    slots. The writer side only touches the slot under the cursor; the
//!    ticking side moves the cursor and clears the slot it lands on.
//! 3. **Single Rotator**: Only the scheduler calls `rotate`, so the cursor has
//!    one writer and needs no compare-and-swap.
//!
//! ## Layout
//!
//! ```text
//! window = 4, ticks = 6
//!
//!   slots:  [ s0 ][ s1 ][ s2 ][ s3 ][ s4 ]
//!                          ▲
//!                        cursor (current second, still filling)
//!   completed, newest first: s1, s0, s4, s3
//! ```
//!
//! ## Notes
//! - A `record` racing a `rotate` lands in either the closing or the opening
//!   second; both are acceptable for diagnostics.
//! - `Ordering::Relaxed` is used for slot data because no cross-field
//!   ordering is needed, only eventual visibility.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Default accumulator window in seconds.
pub const DEFAULT_WINDOW_SECS: usize = 60;

/// Values printed per line in an accumulator report.
pub const REPORT_COLUMNS: usize = 16;

/// Counters printed per line in the uptime table.
const STATISTICS_COLUMNS: usize = 5;

/// Nanoseconds per microsecond; latencies are recorded in nanoseconds.
const NANOS_PER_MICRO: u64 = 1_000;

/// How an accumulator is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportFormat {
    /// Unit shown in the header, e.g. "requests/s".
    pub unit: &'static str,
    /// Message used when the window holds no events.
    pub no_data: &'static str,
    /// Values per line.
    pub columns: usize,
    /// Each slot value is divided by this before printing.
    pub divider: u64,
    /// Print the per-event average of a slot instead of its sum.
    pub average: bool,
}

impl ReportFormat {
    /// Events per second.
    pub const REQUESTS_PER_SECOND: ReportFormat = ReportFormat {
        unit: "requests/s",
        no_data: "No requests",
        columns: REPORT_COLUMNS,
        divider: 1,
        average: false,
    };

    /// Loop iterations per second.
    pub const ITERATIONS_PER_SECOND: ReportFormat = ReportFormat {
        unit: "iterations/s",
        no_data: "No data",
        columns: REPORT_COLUMNS,
        divider: 1,
        average: false,
    };

    /// Mean latency per second in microseconds (input in nanoseconds).
    pub const LATENCY_MICROS: ReportFormat = ReportFormat {
        unit: "microseconds",
        no_data: "No requests",
        columns: REPORT_COLUMNS,
        divider: NANOS_PER_MICRO,
        average: true,
    };
}

#[derive(Debug, Default)]
struct Slot {
    sum: AtomicU64,
    count: AtomicU64,
}

impl Slot {
    fn clear(&self) {
        self.sum.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Sliding-window counter advanced once per tick.
///
/// Holds `window` completed seconds plus the second currently filling.
#[derive(Debug)]
pub struct Accumulator {
    name: String,
    slots: Box<[Slot]>,
    cursor: AtomicUsize,
    ticks: AtomicU64,
}

impl Accumulator {
    /// Creates an accumulator covering `window` seconds (at least one).
    pub fn new(name: impl Into<String>, window: usize) -> Self {
        let window = window.max(1);
        let slots = (0..=window).map(|_| Slot::default()).collect();
        Accumulator {
            name: name.into(),
            slots,
            cursor: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of completed seconds the accumulator can hold.
    pub fn window(&self) -> usize {
        self.slots.len() - 1
    }

    /// Number of rotations since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Adds `value` to the current second as one event.
    pub fn record(&self, value: u64) {
        let slot = &self.slots[self.cursor.load(Ordering::Acquire)];
        slot.sum.fetch_add(value, Ordering::Relaxed);
        slot.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Rate counters count events; `add(1)` per request.
    pub fn add(&self, n: u64) {
        self.record(n);
    }

    /// Closes the current second and opens a cleared one.
    ///
    /// The slot being opened is the oldest completed second, which is evicted.
    pub fn rotate(&self) {
        let next = (self.cursor.load(Ordering::Relaxed) + 1) % self.slots.len();
        self.slots[next].clear();
        self.cursor.store(next, Ordering::Release);
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed slots still inside the window, newest first.
    fn completed(&self) -> impl Iterator<Item = &Slot> {
        let len = self.slots.len();
        let cursor = self.cursor.load(Ordering::Acquire);
        let filled = self.ticks().min(self.window() as u64) as usize;
        (1..=filled).map(move |back| &self.slots[(cursor + len - back) % len])
    }

    /// True when any completed second in the window saw an event.
    pub fn has_data(&self) -> bool {
        self.completed()
            .any(|slot| slot.count.load(Ordering::Relaxed) > 0)
    }

    /// Per-second values of the completed window, newest first.
    ///
    /// Each value is the slot sum, or the per-event mean when `average` is set,
    /// divided by `divider`. Empty seconds yield zero.
    pub fn window_values(&self, divider: u64, average: bool) -> Vec<u64> {
        let divider = divider.max(1);
        self.completed()
            .map(|slot| {
                let sum = slot.sum.load(Ordering::Relaxed);
                let count = slot.count.load(Ordering::Relaxed);
                let value = if average {
                    sum.checked_div(count).unwrap_or(0)
                } else {
                    sum
                };
                value / divider
            })
            .collect()
    }

    /// Renders the window as text.
    ///
    /// ```text
    /// rate_query                   (requests/s):
    ///       12       15        9 ...
    /// ```
    pub fn report(&self, format: &ReportFormat) -> String {
        let mut out = String::new();
        if !self.has_data() {
            let _ = writeln!(
                out,
                "{:<28}{} in the last {} seconds",
                self.name,
                format.no_data,
                self.window()
            );
            return out;
        }

        let _ = writeln!(out, "{:<28} ({}):", self.name, format.unit);
        let values = self.window_values(format.divider, format.average);
        for row in values.chunks(format.columns.max(1)) {
            for value in row {
                let _ = write!(out, "{:>8} ", value);
            }
            out.push('\n');
        }
        out
    }
}

/// Low-resolution uptime counters, one writer loop each.
#[derive(Debug, Default)]
pub struct Statistics {
    /// Fires of the 100 ms liveness timer.
    pub timer_100ms: AtomicU64,
    /// Fires of the 1 s rotation ticker.
    pub tick_1s: AtomicU64,
    /// Iterations of the 10 ms sleep loop.
    pub sleep_10ms: AtomicU64,
}

impl Statistics {
    /// Point-in-time `(name, value)` pairs in display order.
    pub fn snapshot(&self) -> [(&'static str, u64); 3] {
        [
            ("timer_100ms", self.timer_100ms.load(Ordering::Relaxed)),
            ("tick_1s", self.tick_1s.load(Ordering::Relaxed)),
            ("sleep_10ms", self.sleep_10ms.load(Ordering::Relaxed)),
        ]
    }

    /// Renders the counters as a table of `name value` cells.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for row in self.snapshot().chunks(STATISTICS_COLUMNS) {
            for (name, value) in row {
                let _ = write!(out, "{:<20} {:>14} ", name, value);
            }
            out.push('\n');
        }
        out
    }
}

/// Request kinds tracked by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Query,
    Sample,
    Statistics,
    /// Any path the dispatcher does not recognize.
    Other,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Query,
        Operation::Sample,
        Operation::Statistics,
        Operation::Other,
    ];

    /// Resolves a normalized (lower-case, no leading slash) path.
    pub fn from_path(path: &str) -> Self {
        match path {
            "query" => Operation::Query,
            "sample" => Operation::Sample,
            "statistics" | "" | "stat" => Operation::Statistics,
            _ => Operation::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Query => "query",
            Operation::Sample => "sample",
            Operation::Statistics => "statistics",
            Operation::Other => "other",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Rate and latency pair for one operation.
#[derive(Debug)]
pub struct OperationMetrics {
    pub rate: Accumulator,
    pub latency: Accumulator,
}

impl OperationMetrics {
    fn new(op: Operation, window: usize) -> Self {
        OperationMetrics {
            rate: Accumulator::new(format!("rate_{}", op.name()), window),
            latency: Accumulator::new(format!("latency_{}", op.name()), window),
        }
    }
}

/// All accumulators and counters owned by the server.
#[derive(Debug)]
pub struct ServerMetrics {
    operations: [OperationMetrics; 4],
    /// Iterations of the post-population pressure loop.
    pub tight_loop: Accumulator,
    pub statistics: Statistics,
}

impl ServerMetrics {
    pub fn new(window: usize) -> Self {
        ServerMetrics {
            operations: Operation::ALL.map(|op| OperationMetrics::new(op, window)),
            tight_loop: Accumulator::new("rate_tight_loop", window),
            statistics: Statistics::default(),
        }
    }

    pub fn operation(&self, op: Operation) -> &OperationMetrics {
        &self.operations[op.index()]
    }

    /// Counts one request of kind `op` that took `elapsed`.
    pub fn record(&self, op: Operation, elapsed: Duration) {
        let metrics = self.operation(op);
        metrics.rate.add(1);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        metrics.latency.record(nanos);
    }

    /// Advances every accumulator by one second.
    pub fn rotate_all(&self) {
        for metrics in &self.operations {
            metrics.rate.rotate();
            metrics.latency.rotate();
        }
        self.tight_loop.rotate();
    }

    /// Renders rates, then the tight-loop rate, then latencies.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for metrics in &self.operations {
            out.push_str(&metrics.rate.report(&ReportFormat::REQUESTS_PER_SECOND));
            out.push('\n');
        }
        out.push_str(&self.tight_loop.report(&ReportFormat::ITERATIONS_PER_SECOND));
        out.push('\n');
        for metrics in &self.operations {
            out.push_str(&metrics.latency.report(&ReportFormat::LATENCY_MICROS));
            out.push('\n');
        }
        out
    }
}
