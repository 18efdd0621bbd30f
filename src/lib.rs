// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod agent;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod merge;
pub mod model;
pub mod sentiment;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::agent::{AgentClient, CliAgent, DynAgent, Reply, StaticAgent};
pub use crate::config::PipelineConfig;
pub use crate::error::{AgentError, FetchError};
pub use crate::ingest::{CycleReport, Pipeline, Scope};
