// tests/agent_cli.rs
#![cfg(unix)]

use std::time::{Duration, Instant};

use political_pulse::{AgentClient, AgentError, CliAgent};

/// `sh -c <script> agent <prompt>`: the prompt arrives as `$1`.
fn sh(script: &str) -> CliAgent {
    CliAgent::new("/bin/sh", vec!["-c".into(), script.into(), "agent".into()])
}

#[tokio::test]
async fn prompt_is_passed_as_last_argument() {
    let agent = sh(r#"printf '[{"echo": "%s"}]' "$1""#);
    let out = agent
        .invoke("Trending political queries", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(out, r#"[{"echo": "Trending political queries"}]"#);
}

#[tokio::test]
async fn large_output_is_drained_without_deadlock() {
    let agent = sh("head -c 200000 /dev/zero | tr '\\0' 'x'");
    let out = agent.invoke("p", Duration::from_secs(10)).await.unwrap();
    assert_eq!(out.len(), 200_000);
}

#[tokio::test]
async fn nonzero_exit_carries_code_and_stderr() {
    let agent = sh("echo 'rate limited' >&2; exit 3");
    match agent.invoke("p", Duration::from_secs(5)).await {
        Err(AgentError::NonZeroExit { code, stderr }) => {
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "rate limited");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn missing_binary_is_unavailable() {
    let agent = CliAgent::new("/nonexistent/political-agent", vec![]);
    let err = agent
        .invoke("p", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Unavailable { .. }));
    assert_eq!(err.kind(), "agent_unavailable");
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("agent.pid");
    let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
    let agent = sh(&script);

    let started = Instant::now();
    let err = agent
        .invoke("p", Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let alive = std::process::Command::new("kill")
        .args(["-0", pid.trim()])
        .status()
        .unwrap()
        .success();
    assert!(!alive, "agent process {} still running", pid.trim());
}

/// Running and not a zombie waiting for its new parent to reap it.
fn is_running(pid: &str) -> bool {
    let stat = std::path::Path::new("/proc").join(pid).join("stat");
    if std::path::Path::new("/proc/self/stat").exists() {
        return std::fs::read_to_string(stat)
            .map(|s| {
                s.rsplit_once(") ")
                    .and_then(|(_, rest)| rest.chars().next())
                    .is_some_and(|state| state != 'Z' && state != 'X')
            })
            .unwrap_or(false);
    }
    std::process::Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn timeout_also_kills_processes_the_agent_forked() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("helper.pid");
    let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
    let agent = sh(&script);

    let err = agent
        .invoke("p", Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Timeout { .. }));

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    let deadline = Instant::now() + Duration::from_secs(3);
    while is_running(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!is_running(pid), "helper process {pid} outlived the agent");
}
