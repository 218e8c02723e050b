// dkv-common - Shared error and entry definitions for DiagKV
//
// Used by both the storage engine and the HTTP server

pub mod error;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use types::*;
