//! Process-wide server state.
//!
//! One `ServerContext` is built at startup and shared through `Arc` with the
//! HTTP handlers, the scheduler loops, and the population worker.

use std::sync::Arc;

use dkv_engine::{MemoryEngine, PopulationProgress};

use crate::config::ServerConfig;
use crate::memory::MemoryProbe;
use crate::metrics::ServerMetrics;

pub struct ServerContext {
    pub config: ServerConfig,
    pub engine: Arc<MemoryEngine>,
    pub metrics: ServerMetrics,
    pub memory: MemoryProbe,
    pub population: Arc<PopulationProgress>,
}

impl ServerContext {
    /// Builds the store, accumulators, and probes for `config`.
    ///
    /// Shards are pre-sized for the configured population so the loader does
    /// not rehash under readers.
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let engine = Arc::new(MemoryEngine::with_shard_count_and_capacity(
            config.shards,
            config.big_map_size,
        ));
        let metrics = ServerMetrics::new(config.window);
        let population = Arc::new(PopulationProgress::new(config.big_map_size));

        Arc::new(ServerContext {
            config,
            engine,
            metrics,
            memory: MemoryProbe::new(),
            population,
        })
    }
}
