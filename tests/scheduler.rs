// tests/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use political_pulse::ingest::prompts::{CATEGORIES_TITLE, LIVE_TITLE, TRENDING_TITLE};
use political_pulse::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use political_pulse::store::{LIVE_FILE, POLITICAL_FILE, STATUS_FILE};
use political_pulse::{Pipeline, PipelineConfig, Reply, StaticAgent};
use tokio::sync::oneshot;

#[tokio::test]
async fn both_cadences_run_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let live = serde_json::json!([
        {"time": Utc::now().to_rfc3339(), "query": "Senate vote", "source": "search", "category": "Congress"}
    ])
    .to_string();
    let agent = StaticAgent::new()
        .route(CATEGORIES_TITLE, Reply::text(include_str!("fixtures/categories_seed.txt")))
        .route(TRENDING_TITLE, Reply::text(include_str!("fixtures/trending_seed.txt")))
        .route(LIVE_TITLE, Reply::text(live));
    let agent = Arc::new(agent);
    let cfg = PipelineConfig {
        data_dir: dir.path().to_path_buf(),
        ..PipelineConfig::default()
    };
    let pipeline = Arc::new(Pipeline::new(cfg, agent.clone()).unwrap());

    let sched = SchedulerCfg {
        aggregates_every: Duration::from_millis(120),
        live_every: Duration::from_millis(50),
    };
    let (tx, rx) = oneshot::channel();
    let handle = spawn_scheduler(pipeline, sched, rx);

    tokio::time::sleep(Duration::from_millis(400)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    for name in [POLITICAL_FILE, LIVE_FILE, STATUS_FILE] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }
    let calls = agent.calls();
    let live_calls = calls.iter().filter(|c| *c == LIVE_TITLE).count();
    let cat_calls = calls.iter().filter(|c| *c == CATEGORIES_TITLE).count();
    assert!(cat_calls >= 1);
    assert!(live_calls >= 2);
    // No lock files left behind once the loop exits.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".lock"))
        .collect();
    assert!(leftovers.is_empty());
}
