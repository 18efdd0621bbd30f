pub mod pipeline;

pub use pipeline::{AgentConfig, EmptyResultPolicy, PipelineConfig};
