//! getstats server library
//!
//! Exposes the internal modules for the binary and the integration tests.

pub mod config;
pub mod ingest;
pub mod server;
pub mod sqlite_persistence;
pub mod stats_store;

// Re-export commonly used types for convenience
pub use ingest::{IngestQueue, IngestStats, WriterOptions};
pub use server::{run_server, RequestsLoggingLevel, ServerConfig};
pub use stats_store::{open_stats_db, STATS_TABLE};
