// src/ingest/mod.rs
pub mod fetchers;
pub mod normalize;
pub mod parse;
pub mod plausibility;
pub mod prompts;
pub mod relevance;
pub mod scheduler;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::agent::{CliAgent, DynAgent};
use crate::clock::QueryWindow;
use crate::config::pipeline::{PipelineConfig, STATUS_LOCK_WAIT};
use crate::history::HistoryTracker;
use crate::ingest::fetchers::{
    fetch_section, CategoryCountsFetcher, FetchContext, LiveEventsFetcher, Outcome,
    TrendingFetcher,
};
use crate::ingest::plausibility::Limits;
use crate::merge::{merge_live, merge_political, AggregatesUpdate};
use crate::model::{Section, SectionOutcome, SectionStatus};
use crate::sentiment::SentimentAnalyzer;
use crate::store::{StateStore, LIVE_FILE, POLITICAL_FILE, STATUS_FILE};
use crate::telemetry;

/// One-time metrics registration (so series show up in the textfile).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pulse_cycles_total", "Ingestion cycles run, by scope.");
        describe_counter!(
            "pulse_fetch_success_total",
            "Sections fetched and validated successfully."
        );
        describe_counter!(
            "pulse_fetch_failures_total",
            "Section fetches that fell back to previous content, by error kind."
        );
        describe_counter!(
            "pulse_rows_dropped_total",
            "Rows rejected by plausibility checks."
        );
        describe_histogram!("pulse_agent_duration_ms", "Agent call wall time in milliseconds.");
        describe_gauge!("pulse_history_points", "Points in the persisted history.");
        describe_gauge!("pulse_last_cycle_ts", "Unix ts when the last cycle finished.");
    });
}

/// Which cadence a cycle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Scope {
    /// Categories, trending and live events.
    #[default]
    All,
    /// Categories and trending (`political_data.json`).
    Aggregates,
    /// Live events (`live_feed.json`).
    Live,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Aggregates => "aggregates",
            Scope::Live => "live",
        }
    }

    pub fn includes_aggregates(&self) -> bool {
        matches!(self, Scope::All | Scope::Aggregates)
    }

    pub fn includes_live(&self) -> bool {
        matches!(self, Scope::All | Scope::Live)
    }
}

/// What a cycle did, for the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Status of every section attempted this cycle.
    pub sections: BTreeMap<Section, SectionStatus>,
    pub political_written: bool,
    pub live_written: bool,
    pub history_len: Option<usize>,
    /// Sections not run because another writer held their lock.
    pub locked_out: Vec<Section>,
}

impl CycleReport {
    pub fn any_success(&self) -> bool {
        self.sections
            .values()
            .any(|s| s.outcome == SectionOutcome::Ok)
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    tz: Tz,
    agent: DynAgent,
    store: StateStore,
    tracker: HistoryTracker,
    limits: Limits,
    sentiment: SentimentAnalyzer,
}

impl Pipeline {
    pub fn new(cfg: PipelineConfig, agent: DynAgent) -> Result<Self> {
        let tz = cfg.tz()?;
        Ok(Self {
            tracker: HistoryTracker::new(cfg.bucket, tz, cfg.gap_fill_limit),
            limits: Limits::new(cfg.population_cap),
            store: StateStore::new(cfg.data_dir.clone()),
            sentiment: SentimentAnalyzer::new(),
            tz,
            agent,
            cfg,
        })
    }

    /// Pipeline backed by the agent CLI named in the config.
    pub fn from_config(cfg: PipelineConfig) -> Result<Self> {
        let agent: DynAgent = Arc::new(CliAgent::from_config(&cfg.agent));
        Self::new(cfg, agent)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub async fn run_cycle(&self, scope: Scope) -> Result<CycleReport> {
        self.run_cycle_at(scope, Utc::now()).await
    }

    /// One full cycle: lock, load, fetch (concurrently, fail-soft), merge,
    /// record history, commit. Only configuration, lock and I/O problems
    /// surface as `Err`; agent trouble is reported per section.
    pub async fn run_cycle_at(&self, scope: Scope, now: DateTime<Utc>) -> Result<CycleReport> {
        ensure_metrics_described();
        self.store.ensure_dir()?;
        let stale = self.cfg.lock_stale_after();
        let mut report = CycleReport::default();

        let agg_lock = if scope.includes_aggregates() {
            self.store.lock(POLITICAL_FILE, stale, Duration::ZERO).await?
        } else {
            None
        };
        let live_lock = if scope.includes_live() {
            self.store.lock(LIVE_FILE, stale, Duration::ZERO).await?
        } else {
            None
        };
        if scope.includes_aggregates() && agg_lock.is_none() {
            warn!(target: "ingest", "aggregates cycle already in progress; skipping");
            report.locked_out.extend([Section::Categories, Section::Trending]);
        }
        if scope.includes_live() && live_lock.is_none() {
            warn!(target: "ingest", "live cycle already in progress; skipping");
            report.locked_out.push(Section::Live);
        }
        let do_agg = agg_lock.is_some();
        let do_live = live_lock.is_some();
        if !do_agg && !do_live {
            return Ok(report);
        }

        let prev_political = if do_agg {
            Some(self.store.load_political()?)
        } else {
            None
        };
        let prev_live = if do_live {
            Some(self.store.load_live()?)
        } else {
            None
        };

        let window = QueryWindow::new(now, self.tz, self.cfg.bucket);
        let ctx = FetchContext {
            window,
            limits: self.limits,
            timeout: self.cfg.agent.timeout(),
            empty_policy: self.cfg.empty_result,
        };
        let agent = self.agent.as_ref();

        // All three resolve (fresh, failed or skipped) before any merge.
        let (categories, trending, live) = tokio::join!(
            async {
                if do_agg {
                    fetch_section(&CategoryCountsFetcher, agent, &ctx).await
                } else {
                    Outcome::Skipped
                }
            },
            async {
                if do_agg {
                    fetch_section(&TrendingFetcher, agent, &ctx).await
                } else {
                    Outcome::Skipped
                }
            },
            async {
                if do_live {
                    fetch_section(&LiveEventsFetcher, agent, &ctx).await
                } else {
                    Outcome::Skipped
                }
            },
        );

        if do_agg {
            report.sections.insert(Section::Categories, categories.status());
            report.sections.insert(Section::Trending, trending.status());
        }
        if do_live {
            report.sections.insert(Section::Live, live.status());
        }

        // Taken before any data file is touched so the commit below has no
        // await points.
        let status_lock = self.store.lock(STATUS_FILE, stale, STATUS_LOCK_WAIT).await?;

        let mut digests: Vec<(&'static str, String)> = Vec::new();

        if let Some(prev) = prev_political {
            let sentiment = trending
                .fresh()
                .and_then(|items| self.sentiment.score_items(items));
            let update = AggregatesUpdate {
                categories: categories.into_fresh(),
                trending: trending.into_fresh(),
                sentiment,
            };
            let merged = merge_political(&prev, update, &window, &self.tracker);
            if merged.is_dirty(&prev) {
                digests.push((POLITICAL_FILE, self.store.save_political(&merged.data)?));
                report.political_written = true;
            }
            report.history_len = Some(merged.data.history.len());
            gauge!("pulse_history_points").set(merged.data.history.len() as f64);
        }

        if let Some(prev) = prev_live {
            if let Some(next) = merge_live(&prev, live.into_fresh(), now) {
                digests.push((LIVE_FILE, self.store.save_live(&next)?));
                report.live_written = true;
            }
        }

        match status_lock {
            Some(_guard) => {
                let mut status = self.store.load_status()?;
                status.last_attempt_at = Some(now);
                if report.any_success() {
                    status.last_success_at = Some(now);
                }
                for (section, st) in &report.sections {
                    status.sections.insert(*section, st.clone());
                }
                for (file, digest) in digests {
                    status.digests.insert(file.to_string(), digest);
                }
                self.store.save_status(&status)?;
            }
            None => warn!(target: "ingest", "status file busy; fetch status not updated"),
        }

        counter!("pulse_cycles_total", "scope" => scope.as_str()).increment(1);
        gauge!("pulse_last_cycle_ts").set(now.timestamp() as f64);
        if let Some(path) = &self.cfg.metrics_textfile {
            if let Err(e) = telemetry::write_textfile(path) {
                warn!(target: "ingest", error = ?e, "metrics textfile not written");
            }
        }

        info!(
            target: "ingest",
            scope = scope.as_str(),
            ok = report
                .sections
                .values()
                .filter(|s| s.outcome == SectionOutcome::Ok)
                .count(),
            failed = report
                .sections
                .values()
                .filter(|s| s.outcome == SectionOutcome::Failed)
                .count(),
            political_written = report.political_written,
            live_written = report.live_written,
            "cycle finished"
        );
        Ok(report)
    }
}
