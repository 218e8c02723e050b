//! # Population Worker
//!
//! Fill an engine with synthetic entries while the server is already serving.
//!
//! ## Design Principles
//! 1. **Dedicated Thread**: Generation is CPU bound, so it runs on its own OS
//!    thread instead of an async worker.
//! 2. **Fail Stop**: There is no partial-population recovery; any failure ends
//!    the process and a restart repopulates from scratch.
//! 3. **Observable Progress**: A shared `PopulationProgress` lets the
//!    statistics page and tests see how far the load has come.
//!
//! ## Lifecycle
//!
//! ```text
//! spawn ─► seed "magic" ─► insert N random entries ─► done = true
//!                                                       │
//!                                         tight_loop? ──┴─► on_iteration(); sleep(1µs) ─┐
//!                                                            ▲                          │
//!                                                            └──────────────────────────┘
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::Rng;
use tracing::{error, info};

use dkv_common::{DkvResult, MAGIC_KEY, MAGIC_VALUE};

use crate::engine::KVEngine;

/// Log a progress line every this many inserts.
pub const PROGRESS_INTERVAL: usize = 1_000_000;

/// Pause between tight-loop iterations.
const TIGHT_LOOP_PAUSE: Duration = Duration::from_micros(1);

/// Settings for a population run.
#[derive(Debug, Clone)]
pub struct PopulationConfig {
    /// Number of random entries to insert.
    pub count: usize,
    /// Keep the thread spinning after population to load the scheduler.
    pub tight_loop: bool,
}

/// Outcome of a finished population run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationReport {
    pub inserted: usize,
    pub elapsed: Duration,
}

/// Progress shared between the worker and its observers.
#[derive(Debug, Default)]
pub struct PopulationProgress {
    target: AtomicUsize,
    inserted: AtomicUsize,
    done: AtomicBool,
}

impl PopulationProgress {
    pub fn new(target: usize) -> Self {
        PopulationProgress {
            target: AtomicUsize::new(target),
            inserted: AtomicUsize::new(0),
            done: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> usize {
        self.target.load(Ordering::Relaxed)
    }

    pub fn inserted(&self) -> usize {
        self.inserted.load(Ordering::Relaxed)
    }

    /// True once every entry has been inserted.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Inserts the sentinel entry used for liveness probes.
pub fn seed_magic<E: KVEngine + ?Sized>(engine: &E) -> DkvResult<()> {
    engine.put(MAGIC_KEY.to_string(), Bytes::from_static(MAGIC_VALUE))
}

/// Inserts `count` random entries into `engine`.
///
/// Keys are random `u64`s in lower-case hex and each value is a fresh copy of
/// its key. Duplicate keys are possible and simply overwrite.
///
/// **Input**: engine, entry count, random source, progress sink.
/// **Output**: `PopulationReport` with the number of inserts and elapsed time.
pub fn populate<E, R>(
    engine: &E,
    count: usize,
    rng: &mut R,
    progress: &PopulationProgress,
) -> DkvResult<PopulationReport>
where
    E: KVEngine + ?Sized,
    R: Rng,
{
    let start = Instant::now();
    for i in 0..count {
        let key = format!("{:x}", rng.gen::<u64>());
        let value = Bytes::from(key.clone().into_bytes());
        engine.put(key, value)?;

        let inserted = i + 1;
        progress.inserted.store(inserted, Ordering::Relaxed);
        if inserted % PROGRESS_INTERVAL == 0 {
            info!(inserted, total = count, "population progress");
        }
    }

    Ok(PopulationReport {
        inserted: count,
        elapsed: start.elapsed(),
    })
}

/// Handle for the background population thread.
///
/// The thread is detached and has no stop signal: with `tight_loop` enabled
/// it runs until the process exits. Completion is observed through
/// `PopulationProgress::is_done`.
pub struct PopulationWorker {
    progress: Arc<PopulationProgress>,
}

impl PopulationWorker {
    /// Starts population on a dedicated thread.
    ///
    /// `progress` is updated as entries land; `on_iteration` is invoked once
    /// per tight-loop iteration and never runs when `config.tight_loop` is
    /// false.
    pub fn spawn<E, F>(
        engine: Arc<E>,
        config: PopulationConfig,
        progress: Arc<PopulationProgress>,
        on_iteration: F,
    ) -> DkvResult<Self>
    where
        E: KVEngine + ?Sized + 'static,
        F: Fn() + Send + 'static,
    {
        let progress_thread = Arc::clone(&progress);

        std::thread::Builder::new()
            .name("dkv-populate".to_string())
            .spawn(move || {
                info!(entries = config.count, "populating map");
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> DkvResult<PopulationReport> {
                    seed_magic(engine.as_ref())?;
                    populate(
                        engine.as_ref(),
                        config.count,
                        &mut rand::thread_rng(),
                        &progress_thread,
                    )
                }));

                match outcome {
                    Ok(Ok(report)) => {
                        info!(
                            inserted = report.inserted,
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "map populated"
                        );
                    }
                    Ok(Err(err)) => {
                        error!(%err, "population failed");
                        std::process::exit(1);
                    }
                    Err(_) => {
                        error!("population worker panicked");
                        std::process::exit(1);
                    }
                }
                progress_thread.mark_done();

                if config.tight_loop {
                    loop {
                        on_iteration();
                        std::thread::sleep(TIGHT_LOOP_PAUSE);
                    }
                }
            })?;

        Ok(PopulationWorker { progress })
    }

    /// Shared progress for observers.
    pub fn progress(&self) -> Arc<PopulationProgress> {
        Arc::clone(&self.progress)
    }
}
