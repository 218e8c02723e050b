//! # DiagKV Server
//!
//! HTTP diagnostics over a concurrently populated in-memory store.
//!
//! - `config`: command-line/env configuration and validation.
//! - `context`: the process-wide state shared by every task.
//! - `metrics`: windowed rate/latency accumulators and uptime counters.
//! - `memory`: resident-memory probe for the statistics page.
//! - `scheduler`: periodic rotation and liveness loops.
//! - `server`: request dispatch and startup wiring.

pub mod config;
pub mod context;
pub mod memory;
pub mod metrics;
pub mod scheduler;
pub mod server;

pub use config::{Config, ServerConfig};
pub use context::ServerContext;
pub use server::{launch, router, Running};
