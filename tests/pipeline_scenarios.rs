// tests/pipeline_scenarios.rs
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use political_pulse::ingest::prompts::{CATEGORIES_TITLE, LIVE_TITLE, TRENDING_TITLE};
use political_pulse::model::{CategoryId, Section, SectionOutcome};
use political_pulse::store::{LIVE_FILE, POLITICAL_FILE, STATUS_FILE};
use political_pulse::config::EmptyResultPolicy;
use political_pulse::{Pipeline, PipelineConfig, Reply, Scope, StaticAgent};

const CATEGORIES_SEED: &str = include_str!("fixtures/categories_seed.txt");
const TRENDING_SEED: &str = include_str!("fixtures/trending_seed.txt");
const LIVE_SEED: &str = include_str!("fixtures/live_seed.txt");
const CATEGORIES_A: &str = include_str!("fixtures/categories_scenario_a.txt");
const LIVE_A: &str = include_str!("fixtures/live_scenario_a.txt");

fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, min, 0).unwrap()
}

fn pipeline(dir: &Path, agent: StaticAgent) -> (Pipeline, Arc<StaticAgent>) {
    pipeline_with(dir, agent, EmptyResultPolicy::Retain)
}

fn pipeline_with(
    dir: &Path,
    agent: StaticAgent,
    empty_result: EmptyResultPolicy,
) -> (Pipeline, Arc<StaticAgent>) {
    let cfg = PipelineConfig {
        data_dir: dir.to_path_buf(),
        empty_result,
        ..PipelineConfig::default()
    };
    let agent = Arc::new(agent);
    (Pipeline::new(cfg, agent.clone()).unwrap(), agent)
}

fn all_ok() -> StaticAgent {
    StaticAgent::new()
        .route(CATEGORIES_TITLE, Reply::text(CATEGORIES_SEED))
        .route(TRENDING_TITLE, Reply::text(TRENDING_SEED))
        .route(LIVE_TITLE, Reply::text(LIVE_SEED))
}

fn all_fail() -> StaticAgent {
    StaticAgent::new()
        .route(CATEGORIES_TITLE, Reply::Timeout)
        .route(TRENDING_TITLE, Reply::text("I could not reach the database."))
        .route(LIVE_TITLE, Reply::NonZeroExit(1))
}

async fn seed(dir: &Path) {
    let (p, _) = pipeline(dir, all_ok());
    let report = p.run_cycle_at(Scope::All, at(15, 15, 0)).await.unwrap();
    assert!(report.political_written && report.live_written);
}

fn json(dir: &Path, name: &str) -> serde_json::Value {
    serde_json::from_slice(&fs::read(dir.join(name)).unwrap()).unwrap()
}

#[tokio::test]
async fn scenario_a_partial_success() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let before = json(dir.path(), POLITICAL_FILE);

    let agent = StaticAgent::new()
        .route(CATEGORIES_TITLE, Reply::text(CATEGORIES_A))
        .route(TRENDING_TITLE, Reply::Timeout)
        .route(LIVE_TITLE, Reply::text(LIVE_A));
    let (p, _) = pipeline(dir.path(), agent);
    let report = p.run_cycle_at(Scope::All, at(16, 15, 0)).await.unwrap();

    assert_eq!(report.sections[&Section::Categories].outcome, SectionOutcome::Ok);
    assert_eq!(
        report.sections[&Section::Trending].kind.as_deref(),
        Some("agent_timeout")
    );
    assert_eq!(report.sections[&Section::Live].rows, 2);

    let data = p.store().load_political().unwrap();
    assert_eq!(data.snapshot.categories.len(), 1);
    assert_eq!(
        data.snapshot.categories[0].category_id,
        CategoryId::PresidentialPolitics
    );
    assert_eq!(data.snapshot.categories[0].engagement_count, 150);
    assert_eq!(data.snapshot.categories[0].unique_users, 45);

    let after = json(dir.path(), POLITICAL_FILE);
    assert_eq!(after["trending"], before["trending"]);
    assert_eq!(after["categories"][0]["category_id"], "presidential_politics");

    let live = p.store().load_live().unwrap();
    assert_eq!(live.events.len(), 2);
    assert_eq!(live.events[0].query, "Debate tonight");
    assert_eq!(live.events[1].time, at(16, 14, 30));

    assert_eq!(data.history.len(), 2);
    let today = data.history.last().unwrap();
    assert!(!today.is_placeholder);
    assert_eq!(today.total_engagements, 150);
    assert_eq!(data.snapshot.window_label, "Oct 16 · Last 24h");
}

#[tokio::test]
async fn scenario_b_consecutive_total_failures() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let seeded = p_load(dir.path());
    let live_before = fs::read(dir.path().join(LIVE_FILE)).unwrap();

    let cycles = [
        (at(16, 15, 0), "Oct 16 · Last 24h"),
        (at(16, 15, 5), "Oct 16 · Last 24h"),
        (at(18, 15, 0), "Oct 18 · Last 24h"),
    ];
    for (now, label) in cycles {
        let (p, _) = pipeline(dir.path(), all_fail());
        let report = p.run_cycle_at(Scope::All, now).await.unwrap();
        assert!(!report.any_success());
        assert!(!report.live_written);

        let data = p.store().load_political().unwrap();
        assert_eq!(data.snapshot.window_label, label);
        assert_eq!(data.snapshot.categories, seeded.snapshot.categories);
        assert_eq!(data.snapshot.trending, seeded.snapshot.trending);
        assert_eq!(data.snapshot.generated_at, seeded.snapshot.generated_at);
    }

    let data = p_load(dir.path());
    // Oct 15 (real), then one placeholder each for Oct 16, 17 and 18.
    assert_eq!(data.history.len(), 4);
    assert!(data.history[1..].iter().all(|p| p.is_placeholder));
    assert!(data.history[1..]
        .iter()
        .all(|p| p.total_engagements == data.history[0].total_engagements));
    assert!(data
        .history
        .windows(2)
        .all(|w| w[0].bucket_time < w[1].bucket_time));
    assert_eq!(fs::read(dir.path().join(LIVE_FILE)).unwrap(), live_before);
}

fn p_load(dir: &Path) -> political_pulse::model::PoliticalData {
    political_pulse::store::StateStore::new(dir)
        .load_political()
        .unwrap()
}

#[tokio::test]
async fn total_failure_changes_only_dates_and_history() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let before = json(dir.path(), POLITICAL_FILE);
    let live_before = fs::read(dir.path().join(LIVE_FILE)).unwrap();

    let (p, _) = pipeline(dir.path(), all_fail());
    p.run_cycle_at(Scope::All, at(16, 9, 0)).await.unwrap();

    let after = json(dir.path(), POLITICAL_FILE);
    for key in ["categories", "trending", "generated_at", "schema_version"] {
        assert_eq!(after[key], before[key], "{key} changed");
    }
    assert_ne!(after["window_label"], before["window_label"]);
    assert_ne!(after["today_start"], before["today_start"]);
    assert_eq!(
        after["history"].as_array().unwrap().len(),
        before["history"].as_array().unwrap().len() + 1
    );
    assert_eq!(fs::read(dir.path().join(LIVE_FILE)).unwrap(), live_before);

    let status = p.store().load_status().unwrap();
    assert_eq!(status.last_attempt_at, Some(at(16, 9, 0)));
    assert_eq!(status.last_success_at, Some(at(15, 15, 0)));
    assert_eq!(
        status.sections[&Section::Categories].kind.as_deref(),
        Some("agent_timeout")
    );
    assert_eq!(
        status.sections[&Section::Trending].kind.as_deref(),
        Some("malformed_response")
    );
    assert_eq!(
        status.sections[&Section::Live].kind.as_deref(),
        Some("agent_nonzero_exit")
    );
}

#[tokio::test]
async fn identical_responses_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;
    let political = fs::read(dir.path().join(POLITICAL_FILE)).unwrap();
    let live = fs::read(dir.path().join(LIVE_FILE)).unwrap();

    let (p, _) = pipeline(dir.path(), all_ok());
    let report = p.run_cycle_at(Scope::All, at(15, 15, 5)).await.unwrap();
    assert!(report.any_success());
    assert!(!report.political_written);
    assert!(!report.live_written);
    assert_eq!(fs::read(dir.path().join(POLITICAL_FILE)).unwrap(), political);
    assert_eq!(fs::read(dir.path().join(LIVE_FILE)).unwrap(), live);
}

#[tokio::test]
async fn one_history_point_per_bucket_touched() {
    let dir = tempfile::tempdir().unwrap();
    // Local (New York) days: Oct 14, 14, 14, 15, 15, 15, 16.
    let times = [
        at(14, 10, 0),
        at(14, 12, 0),
        at(14, 23, 0),
        at(15, 5, 0),
        at(15, 20, 0),
        at(16, 3, 0),
        at(16, 15, 0),
    ];
    for (i, now) in times.into_iter().enumerate() {
        let agent = if i % 2 == 0 { all_ok() } else { all_fail() };
        let (p, _) = pipeline(dir.path(), agent);
        p.run_cycle_at(Scope::Aggregates, now).await.unwrap();
    }
    let data = p_load(dir.path());
    assert_eq!(data.history.len(), 3);
    assert!(data
        .history
        .windows(2)
        .all(|w| w[0].bucket_time < w[1].bucket_time));
    assert!(data.history.iter().all(|p| !p.is_placeholder));
    assert!(data.history[0].sentiment.is_some());
}

#[tokio::test]
async fn live_scope_touches_only_the_live_feed() {
    let dir = tempfile::tempdir().unwrap();
    let (p, agent) = pipeline(dir.path(), all_ok());
    let report = p.run_cycle_at(Scope::Live, at(15, 15, 0)).await.unwrap();
    assert!(report.live_written);
    assert!(report.history_len.is_none());
    assert!(!dir.path().join(POLITICAL_FILE).exists());
    assert_eq!(agent.calls(), vec![LIVE_TITLE.to_string()]);

    let status = p.store().load_status().unwrap();
    assert_eq!(status.sections.len(), 1);
    assert!(status.digests.contains_key(LIVE_FILE));
    assert!(dir.path().join(STATUS_FILE).exists());
}

#[tokio::test]
async fn held_lock_skips_that_cadence() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("{POLITICAL_FILE}.lock")), b"1 busy").unwrap();
    let (p, agent) = pipeline(dir.path(), all_ok());
    let report = p.run_cycle_at(Scope::All, at(15, 15, 0)).await.unwrap();

    assert_eq!(report.locked_out, vec![Section::Categories, Section::Trending]);
    assert!(report.live_written);
    assert!(!dir.path().join(POLITICAL_FILE).exists());
    assert!(!agent.calls().iter().any(|c| c == CATEGORIES_TITLE));
    // The foreign lock is left alone.
    assert!(dir.path().join(format!("{POLITICAL_FILE}.lock")).exists());
    assert!(!dir.path().join(format!("{LIVE_FILE}.lock")).exists());
}

#[tokio::test]
async fn stale_events_from_a_wrong_filter_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let old = serde_json::json!([
        {"time": (at(16, 15, 0) - Duration::days(5)).to_rfc3339(), "query": "old", "source": "search", "category": "Elections"}
    ])
    .to_string();
    let agent = StaticAgent::new().route(LIVE_TITLE, Reply::text(old));
    let (p, _) = pipeline(dir.path(), agent);
    let report = p.run_cycle_at(Scope::Live, at(16, 15, 0)).await.unwrap();
    assert_eq!(
        report.sections[&Section::Live].kind.as_deref(),
        Some("implausible")
    );
    assert!(!report.live_written);
}

#[tokio::test]
async fn checklist_brackets_do_not_wipe_trending() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path()).await;

    let reply = "Checklist:\n- [ ] verify filters\nResults:\n[{\"query\":\"NATO summit\",\"topic\":\"NATO\",\"count\":31,\"source\":\"search\",\"category\":\"Foreign Policy\",\"trend\":\"up\"}]";
    let agent = StaticAgent::new()
        .route(CATEGORIES_TITLE, Reply::text(CATEGORIES_SEED))
        .route(TRENDING_TITLE, Reply::text(reply));
    let (p, _) = pipeline_with(dir.path(), agent, EmptyResultPolicy::Replace);
    let report = p.run_cycle_at(Scope::Aggregates, at(15, 15, 10)).await.unwrap();

    assert_eq!(report.sections[&Section::Trending].outcome, SectionOutcome::Ok);
    let data = p_load(dir.path());
    assert_eq!(data.snapshot.trending.len(), 1);
    assert_eq!(data.snapshot.trending[0].count, 31);
}
