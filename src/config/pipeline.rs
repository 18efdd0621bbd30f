// src/config/pipeline.rs
use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::clock::Bucketing;

pub const ENV_CONFIG_PATH: &str = "POLITICAL_PULSE_CONFIG";
const ENV_DATA_DIR: &str = "PULSE_DATA_DIR";
const ENV_AGENT_BIN: &str = "PULSE_AGENT_BIN";
const ENV_AGENT_TIMEOUT: &str = "PULSE_AGENT_TIMEOUT_SECS";
const ENV_TIMEZONE: &str = "PULSE_TIMEZONE";

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POPULATION_CAP: u64 = 50_000;
const DEFAULT_LOCK_STALE_SECS: u64 = 900;

/// How long a cycle waits for the shared status-file lock.
pub const STATUS_LOCK_WAIT: Duration = Duration::from_secs(10);
/// Slack on top of the longest legitimate hold, for file I/O and merging.
const LOCK_STALE_MARGIN_SECS: u64 = 60;

/// What to do when the agent answers with a well-formed but empty array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResultPolicy {
    /// Treat as "no update": the section keeps its previous content.
    #[default]
    Retain,
    /// Treat as a legitimate zero and replace the section.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "--print".to_string(),
                "--dangerously-skip-permissions".to_string(),
                "--max-turns".to_string(),
                "5".to_string(),
            ],
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub agent: AgentConfig,
    /// IANA zone the upstream timestamps live in.
    pub timezone: String,
    pub bucket: Bucketing,
    /// No single count may exceed the size of the tracked population.
    pub population_cap: u64,
    pub empty_result: EmptyResultPolicy,
    pub lock_stale_secs: u64,
    pub gap_fill_limit: usize,
    pub metrics_textfile: Option<PathBuf>,
    pub aggregates_interval_secs: u64,
    pub live_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            agent: AgentConfig::default(),
            timezone: "America/New_York".to_string(),
            bucket: Bucketing::Daily,
            population_cap: DEFAULT_POPULATION_CAP,
            empty_result: EmptyResultPolicy::Retain,
            lock_stale_secs: DEFAULT_LOCK_STALE_SECS,
            gap_fill_limit: 31,
            metrics_textfile: None,
            aggregates_interval_secs: 300,
            live_interval_secs: 120,
        }
    }
}

impl PipelineConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: PipelineConfig = if ext == "json" {
            serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        };
        cfg.finish()
    }

    /// Load using env var + fallbacks, then apply environment overrides:
    /// 1) $POLITICAL_PULSE_CONFIG
    /// 2) config/pipeline.toml
    /// 3) config/pipeline.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else if Path::new("config/pipeline.toml").exists() {
            Self::load_from(Path::new("config/pipeline.toml"))?
        } else if Path::new("config/pipeline.json").exists() {
            Self::load_from(Path::new("config/pipeline.json"))?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var(ENV_DATA_DIR) {
            if !v.trim().is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var(ENV_AGENT_BIN) {
            if !v.trim().is_empty() {
                self.agent.program = v;
            }
        }
        if let Ok(v) = std::env::var(ENV_AGENT_TIMEOUT) {
            self.agent.timeout_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_AGENT_TIMEOUT} must be an integer, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var(ENV_TIMEZONE) {
            if !v.trim().is_empty() {
                self.timezone = v.trim().to_string();
            }
        }
        self.finish()
    }

    /// Sanitize values and validate the time zone.
    fn finish(mut self) -> Result<Self> {
        if self.agent.timeout_secs == 0 {
            self.agent.timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        if self.population_cap == 0 {
            self.population_cap = DEFAULT_POPULATION_CAP;
        }
        if self.aggregates_interval_secs == 0 {
            self.aggregates_interval_secs = 300;
        }
        if self.live_interval_secs == 0 {
            self.live_interval_secs = 120;
        }
        self.agent.program = self.agent.program.trim().to_string();
        if self.agent.program.is_empty() {
            self.agent.program = AgentConfig::default().program;
        }
        // A live cycle must never look stale to a concurrent one.
        let floor = self.min_lock_stale_secs();
        if self.lock_stale_secs < floor {
            tracing::warn!(
                target: "config",
                configured = self.lock_stale_secs,
                raised_to = floor,
                "lock_stale_secs below the longest cycle; raised"
            );
            self.lock_stale_secs = floor;
        }
        self.tz()?;
        Ok(self)
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone {:?}: {e}", self.timezone))
    }

    /// Longest a healthy cycle holds a lock: one agent call (sections run
    /// concurrently), the status-lock wait, and a margin.
    pub fn min_lock_stale_secs(&self) -> u64 {
        self.agent
            .timeout_secs
            .saturating_add(STATUS_LOCK_WAIT.as_secs())
            .saturating_add(LOCK_STALE_MARGIN_SECS)
    }

    /// Configs built in code skip `finish`, so the floor applies here too.
    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs.max(self.min_lock_stale_secs()))
    }
}
