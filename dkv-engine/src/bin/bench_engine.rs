//! # Engine Benchmark Harness
//!
//! Purpose: Measure the sharded engine under the server's real access pattern:
//! one or more writers bulk-loading while readers hammer existing keys.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Use fixed PRNG seeds for stable comparisons.
//! 2. **Allocation Control**: Pre-build keys/values so setup stays off the hot path.
//! 3. **Mixed Phases**: Report read-only, write-only, and concurrent phases
//!    separately so contention shows up as a delta.
//!
//! Usage: `bench_engine [keys] [ops_per_thread] [readers] [writers]`

use std::env;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;

use dkv_common::DkvResult;
use dkv_engine::{KVEngine, MemoryEngine};

const DEFAULT_KEY_COUNT: usize = 1 << 16;
const DEFAULT_OP_COUNT: usize = 1_000_000;
const DEFAULT_READERS: usize = 4;
const DEFAULT_WRITERS: usize = 1;

struct BenchConfig {
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    readers: usize,
    writers: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let readers = parse_usize(args.next(), DEFAULT_READERS).max(1);
        let writers = parse_usize(args.next(), DEFAULT_WRITERS).max(1);

        let key_count = requested_keys.max(1).next_power_of_two();

        BenchConfig {
            key_count,
            key_mask: key_count - 1,
            op_count,
            readers,
            writers,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

/// Tiny deterministic PRNG; keeps the workload reproducible across runs.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn build_keys(count: usize, seed: u64) -> Vec<String> {
    let mut rng = XorShift64::new(seed);
    (0..count).map(|i| format!("{:x}-{i}", rng.next_u64())).collect()
}

fn report(label: &str, ops: usize, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!(
        "{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)"
    );
}

fn main() {
    if let Err(err) = run() {
        eprintln!("bench_engine failed: {err}");
        std::process::exit(1);
    }
}

fn run_readers(
    engine: &Arc<MemoryEngine>,
    keys: &Arc<Vec<String>>,
    config: &BenchConfig,
) -> Vec<thread::JoinHandle<usize>> {
    (0..config.readers)
        .map(|reader| {
            let engine = Arc::clone(engine);
            let keys = Arc::clone(keys);
            let mask = config.key_mask;
            let ops = config.op_count;
            thread::spawn(move || {
                let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0 ^ reader as u64);
                let mut hits = 0;
                for _ in 0..ops {
                    if let Ok(Some(value)) = engine.get(&keys[rng.next_index(mask)]) {
                        hits += 1;
                        black_box(value);
                    }
                }
                hits
            })
        })
        .collect()
}

fn run() -> DkvResult<()> {
    let config = BenchConfig::from_args();
    let engine = Arc::new(MemoryEngine::new());
    let keys = Arc::new(build_keys(config.key_count, 0xA5A5_A5A5_A5A5_A5A5));

    println!(
        "keys={}, ops/thread={}, readers={}, writers={}, shards={}",
        config.key_count,
        config.op_count,
        config.readers,
        config.writers,
        engine.shard_count()
    );

    let start = Instant::now();
    for key in keys.iter() {
        engine.put(key.clone(), Bytes::from(key.clone().into_bytes()))?;
    }
    report("LOAD", config.key_count, start.elapsed());

    let start = Instant::now();
    let mut hits = 0;
    for handle in run_readers(&engine, &keys, &config) {
        hits += handle.join().unwrap_or(0);
    }
    report("GET", config.op_count * config.readers, start.elapsed());
    println!("hits={hits}");

    // Readers and writers share the engine; writers overwrite existing keys.
    let start = Instant::now();
    let writers: Vec<_> = (0..config.writers)
        .map(|writer| {
            let engine = Arc::clone(&engine);
            let keys = Arc::clone(&keys);
            let mask = config.key_mask;
            let ops = config.op_count;
            thread::spawn(move || -> DkvResult<()> {
                let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321 ^ writer as u64);
                for _ in 0..ops {
                    let key = &keys[rng.next_index(mask)];
                    engine.put(key.clone(), Bytes::from(key.clone().into_bytes()))?;
                }
                Ok(())
            })
        })
        .collect();
    let readers = run_readers(&engine, &keys, &config);

    for handle in writers {
        if let Ok(result) = handle.join() {
            result?;
        }
    }
    for handle in readers {
        let _ = handle.join();
    }
    report(
        "MIXED",
        config.op_count * (config.readers + config.writers),
        start.elapsed(),
    );

    Ok(())
}
