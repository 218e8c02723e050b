//! # DiagKV Engine
//!
//! Storage backends and the synthetic population worker.
//!
//! - `engine`: the `KVEngine` trait every backend implements.
//! - `memory`: sharded in-memory backend.
//! - `populate`: bulk loader that fills a backend with random entries.

pub mod engine;
pub mod memory;
pub mod populate;

pub use engine::KVEngine;
pub use memory::MemoryEngine;
pub use populate::{
    populate, seed_magic, PopulationConfig, PopulationProgress, PopulationReport,
    PopulationWorker,
};
