//! Agent client: the only place that talks to the external query agent.
//!
//! One call spawns exactly one process. There are no retries here; the next
//! scheduled cycle is the retry. On timeout the child is killed and reaped
//! before the error is returned, so a hung agent never outlives its cycle.
//!
//! On unix the agent runs as the leader of its own process group, and the
//! whole group is killed on timeout or cancellation. Helpers it forked
//! (tool servers, shells) go with it unless they moved to a new session.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::pipeline::AgentConfig;
use crate::error::AgentError;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 400;

#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Send `prompt`, wait at most `timeout`, return whatever was printed.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, AgentError>;
    /// Implementation name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynAgent = Arc<dyn AgentClient>;

/// Runs the agent CLI as `<program> <args..> [--model m] <prompt>`.
#[derive(Debug, Clone)]
pub struct CliAgent {
    program: String,
    args: Vec<String>,
    model: Option<String>,
}

impl CliAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(cfg.program.clone(), cfg.args.clone()).with_model(cfg.model.clone())
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(m) = &self.model {
            cmd.arg("--model").arg(m);
        }
        cmd.arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kills the agent's process group when dropped. Disarmed once the agent
/// exits by itself.
struct GroupKill(Option<u32>);

impl GroupKill {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(pgid) = self.0.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes no pointers; the id names a group this process
    // created with process_group(0).
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            warn!(target: "agent", pgid, error = %e, "failed to kill agent process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut r) = pipe {
        r.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn excerpt(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim()
        .chars()
        .take(STDERR_EXCERPT)
        .collect()
}

#[async_trait]
impl AgentClient for CliAgent {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, AgentError> {
        let started = Instant::now();
        let mut child = self.command(prompt).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::Unavailable {
                    program: self.program.clone(),
                }
            } else {
                AgentError::Io(e)
            }
        })?;

        let mut group = GroupKill(child.id());
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let run = async {
            tokio::try_join!(child.wait(), drain(stdout), drain(stderr))
        };
        let outcome = tokio::time::timeout(timeout, run).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        histogram!("pulse_agent_duration_ms").record(elapsed_ms as f64);

        match outcome {
            Ok(Ok((status, out, err))) => {
                group.disarm();
                debug!(
                    target: "agent",
                    elapsed_ms,
                    code = ?status.code(),
                    stdout_bytes = out.len(),
                    stderr_bytes = err.len(),
                    "agent finished"
                );
                if !status.success() {
                    return Err(AgentError::NonZeroExit {
                        code: status.code(),
                        stderr: excerpt(&err),
                    });
                }
                Ok(String::from_utf8_lossy(&out).into_owned())
            }
            Ok(Err(e)) => Err(AgentError::Io(e)),
            Err(_) => {
                drop(group);
                if let Err(e) = child.kill().await {
                    warn!(target: "agent", error = %e, "failed to kill timed-out agent");
                }
                Err(AgentError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "cli"
    }
}

/// Canned behaviour for one prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Timeout,
    NonZeroExit(i32),
    Unavailable,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

/// Scripted agent: the first route whose marker occurs in the prompt
/// decides the reply. Unrouted prompts behave like a missing executable.
#[derive(Debug, Default)]
pub struct StaticAgent {
    routes: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
}

impl StaticAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, marker: impl Into<String>, reply: Reply) -> Self {
        self.routes.push((marker.into(), reply));
        self
    }

    /// First line of every prompt seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AgentClient for StaticAgent {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.lines().next().unwrap_or_default().to_string());
        }
        let reply = self
            .routes
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, r)| r.clone())
            .unwrap_or(Reply::Unavailable);
        match reply {
            Reply::Text(s) => Ok(s),
            Reply::Timeout => Err(AgentError::Timeout {
                seconds: timeout.as_secs(),
            }),
            Reply::NonZeroExit(code) => Err(AgentError::NonZeroExit {
                code: Some(code),
                stderr: String::new(),
            }),
            Reply::Unavailable => Err(AgentError::Unavailable {
                program: "static".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
