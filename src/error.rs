//! Error taxonomy for the agent boundary and the fetcher boundary.
//!
//! Both enums expose a stable `kind()` string that ends up in logs, metrics
//! labels, and `fetch_status.json`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent executable not found: {program}")]
    Unavailable { program: String },

    #[error("agent timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("agent exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("agent i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Unavailable { .. } | AgentError::Io(_) => "agent_unavailable",
            AgentError::Timeout { .. } => "agent_timeout",
            AgentError::NonZeroExit { .. } => "agent_nonzero_exit",
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("partial data: row {row} is missing `{field}`")]
    PartialData { row: usize, field: &'static str },

    #[error("implausible data: {0}")]
    Implausible(String),

    #[error("agent returned an empty result")]
    Empty,
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Agent(e) => e.kind(),
            FetchError::Malformed(_) => "malformed_response",
            FetchError::PartialData { .. } => "partial_data",
            FetchError::Implausible(_) => "implausible",
            FetchError::Empty => "empty",
        }
    }
}
