// src/ingest/fetchers.rs
//! The three per-query fetchers.
//!
//! `fetch_section` is the fail-soft boundary: every error below it (agent,
//! parse, validation) becomes `Outcome::Failed` plus one warning, and never
//! reaches the caller as an `Err`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Deserialize;
use tracing::{info, warn};

use crate::agent::AgentClient;
use crate::clock::{parse_timestamp, QueryWindow};
use crate::config::pipeline::EmptyResultPolicy;
use crate::error::FetchError;
use crate::ingest::normalize::{normalize_category, normalize_text, query_key};
use crate::ingest::parse::{lenient_count, parse_rows, RowSchema};
use crate::ingest::plausibility::Limits;
use crate::ingest::prompts;
use crate::ingest::relevance::check_relevance;
use crate::model::{
    CategoryCount, CategoryId, ItemSource, LiveEvent, LiveSource, Section, SectionOutcome,
    SectionStatus, Trend, TrendingItem, MAX_LIVE_EVENTS, MAX_TRENDING,
};

/// Trending items kept per subreddit so one community cannot flood the list.
const MAX_PER_SUBREDDIT: usize = 2;

/// Query prefix compared when deduplicating live events.
const LIVE_DEDUP_CHARS: usize = 60;

/// Everything a fetcher needs besides the agent.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext {
    pub window: QueryWindow,
    pub limits: Limits,
    pub timeout: Duration,
    pub empty_policy: EmptyResultPolicy,
}

/// A validated section payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished<T> {
    pub value: T,
    pub rows: usize,
    /// Rows rejected by plausibility or relevance checks.
    pub dropped: usize,
}

pub trait QueryFetcher {
    type Row: RowSchema;
    type Output;
    const SECTION: Section;

    fn prompt(&self, window: &QueryWindow) -> String;

    /// Turn parsed rows into the section payload. `rows` may be empty only
    /// when the empty-result policy allows it.
    fn finish(
        &self,
        rows: Vec<Self::Row>,
        ctx: &FetchContext,
    ) -> Result<Finished<Self::Output>, FetchError>;
}

/// What one section produced this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Fresh { value: T, rows: usize },
    Failed(&'static str),
    /// Not attempted (outside the cycle's scope).
    Skipped,
}

impl<T> Outcome<T> {
    pub fn fresh(&self) -> Option<&T> {
        match self {
            Outcome::Fresh { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn into_fresh(self) -> Option<T> {
        match self {
            Outcome::Fresh { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Outcome::Fresh { .. })
    }

    pub fn status(&self) -> SectionStatus {
        match self {
            Outcome::Fresh { rows, .. } => SectionStatus {
                outcome: SectionOutcome::Ok,
                kind: None,
                rows: *rows,
            },
            Outcome::Failed(kind) => SectionStatus {
                outcome: SectionOutcome::Failed,
                kind: Some((*kind).to_string()),
                rows: 0,
            },
            Outcome::Skipped => SectionStatus {
                outcome: SectionOutcome::Skipped,
                kind: None,
                rows: 0,
            },
        }
    }
}

/// Run one fetcher end to end. Never fails; see module docs.
pub async fn fetch_section<F>(
    fetcher: &F,
    agent: &dyn AgentClient,
    ctx: &FetchContext,
) -> Outcome<F::Output>
where
    F: QueryFetcher + Sync,
{
    let section = F::SECTION.as_str();
    let started = Instant::now();
    match try_fetch(fetcher, agent, ctx).await {
        Ok(done) => {
            counter!("pulse_fetch_success_total", "section" => section).increment(1);
            if done.dropped > 0 {
                counter!("pulse_rows_dropped_total", "section" => section)
                    .increment(done.dropped as u64);
            }
            info!(
                target: "ingest",
                section,
                rows = done.rows,
                dropped = done.dropped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "section fetched"
            );
            Outcome::Fresh {
                value: done.value,
                rows: done.rows,
            }
        }
        Err(e) => {
            let kind = e.kind();
            counter!("pulse_fetch_failures_total", "section" => section, "kind" => kind)
                .increment(1);
            warn!(
                target: "ingest",
                section,
                kind,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "fetch failed; previous content retained"
            );
            Outcome::Failed(kind)
        }
    }
}

async fn try_fetch<F: QueryFetcher + Sync>(
    fetcher: &F,
    agent: &dyn AgentClient,
    ctx: &FetchContext,
) -> Result<Finished<F::Output>, FetchError> {
    let prompt = fetcher.prompt(&ctx.window);
    let raw = agent.invoke(&prompt, ctx.timeout).await?;
    let rows = parse_rows::<F::Row>(&raw)?;
    if rows.is_empty() && ctx.empty_policy == EmptyResultPolicy::Retain {
        return Err(FetchError::Empty);
    }
    fetcher.finish(rows, ctx)
}

// ------------------------------------------------------------
// Category counts
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CategoryRow {
    #[serde(alias = "category", alias = "category_id")]
    policy_category: String,
    #[serde(deserialize_with = "lenient_count")]
    engagement_count: u64,
    #[serde(deserialize_with = "lenient_count")]
    unique_users: u64,
}

impl RowSchema for CategoryRow {
    const REQUIRED: &'static [&'static [&'static str]] = &[
        &["policy_category", "category", "category_id"],
        &["engagement_count"],
        &["unique_users"],
    ];
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryCountsFetcher;

impl QueryFetcher for CategoryCountsFetcher {
    type Row = CategoryRow;
    type Output = Vec<CategoryCount>;
    const SECTION: Section = Section::Categories;

    fn prompt(&self, window: &QueryWindow) -> String {
        prompts::categories_prompt(window)
    }

    /// Rows mapping to the same category are summed. One implausible
    /// aggregate rejects the whole section.
    fn finish(
        &self,
        rows: Vec<CategoryRow>,
        ctx: &FetchContext,
    ) -> Result<Finished<Vec<CategoryCount>>, FetchError> {
        let mut by_id: HashMap<CategoryId, CategoryCount> = HashMap::new();
        for row in rows {
            let id = normalize_category(&row.policy_category);
            let entry = by_id.entry(id).or_insert(CategoryCount {
                category_id: id,
                engagement_count: 0,
                unique_users: 0,
            });
            entry.engagement_count = entry.engagement_count.saturating_add(row.engagement_count);
            entry.unique_users = entry.unique_users.saturating_add(row.unique_users);
        }

        let mut out: Vec<CategoryCount> = by_id.into_values().collect();
        for c in &out {
            ctx.limits.check_category(c).map_err(FetchError::Implausible)?;
        }
        out.sort_by(|a, b| {
            b.engagement_count
                .cmp(&a.engagement_count)
                .then(a.category_id.cmp(&b.category_id))
        });
        Ok(Finished {
            rows: out.len(),
            value: out,
            dropped: 0,
        })
    }
}

// ------------------------------------------------------------
// Trending items
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TrendingRow {
    #[serde(alias = "title")]
    query: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(alias = "engagement_count", deserialize_with = "lenient_count")]
    count: u64,
    source: String,
    #[serde(default)]
    subreddit: Option<String>,
    #[serde(alias = "policy_category", alias = "category_id")]
    category: String,
    #[serde(default)]
    trend: Option<String>,
}

impl RowSchema for TrendingRow {
    const REQUIRED: &'static [&'static [&'static str]] = &[
        &["query", "title"],
        &["count", "engagement_count"],
        &["source"],
        &["category", "policy_category", "category_id"],
    ];
}

fn clean_subreddit(raw: Option<String>) -> Option<String> {
    raw.map(|s| {
        let t = s.trim();
        t.strip_prefix("r/").unwrap_or(t).to_string()
    })
    .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrendingFetcher;

impl QueryFetcher for TrendingFetcher {
    type Row = TrendingRow;
    type Output = Vec<TrendingItem>;
    const SECTION: Section = Section::Trending;

    fn prompt(&self, window: &QueryWindow) -> String {
        prompts::trending_prompt(window)
    }

    fn finish(
        &self,
        rows: Vec<TrendingRow>,
        ctx: &FetchContext,
    ) -> Result<Finished<Vec<TrendingItem>>, FetchError> {
        let total = rows.len();
        let mut dropped = 0usize;
        let mut items: Vec<TrendingItem> = Vec::with_capacity(total);
        let mut index_by_key: HashMap<String, usize> = HashMap::new();

        for (i, row) in rows.into_iter().enumerate() {
            let source = ItemSource::parse(&row.source).ok_or_else(|| {
                FetchError::Malformed(format!("row {i}: unknown source {:?}", row.source))
            })?;
            let trend = match row.trend.as_deref() {
                None => Trend::Stable,
                Some(t) => Trend::parse(t).ok_or_else(|| {
                    FetchError::Malformed(format!("row {i}: unknown trend {t:?}"))
                })?,
            };
            let query = normalize_text(&row.query);
            let subject = format!("{query} {}", row.topic.as_deref().unwrap_or_default());
            if let Err(reason) = check_relevance(&subject, &row.category) {
                tracing::debug!(target: "ingest", row = i, %reason, "off-topic trending row dropped");
                dropped += 1;
                continue;
            }
            let topic = row
                .topic
                .as_deref()
                .map(normalize_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| query.clone());
            let item = TrendingItem {
                query,
                topic,
                count: row.count,
                source,
                subreddit: clean_subreddit(row.subreddit),
                category_id: normalize_category(&row.category),
                trend,
            };
            if let Err(reason) = ctx.limits.check_trending(&item) {
                tracing::debug!(target: "ingest", row = i, %reason, "trending row dropped");
                dropped += 1;
                continue;
            }

            // Same query twice: keep the first entry, with the larger count.
            let key = query_key(&item.query);
            match index_by_key.get(&key) {
                Some(&at) => items[at].count = items[at].count.max(item.count),
                None => {
                    index_by_key.insert(key, items.len());
                    items.push(item);
                }
            }
        }

        if total > 0 && items.is_empty() {
            return Err(FetchError::Implausible(format!(
                "all {total} trending rows rejected"
            )));
        }

        // Stable: equal counts keep first-seen order.
        items.sort_by(|a, b| b.count.cmp(&a.count));

        let mut per_sub: HashMap<String, usize> = HashMap::new();
        items.retain(|it| match &it.subreddit {
            Some(sub) => {
                let n = per_sub.entry(sub.to_lowercase()).or_insert(0);
                *n += 1;
                *n <= MAX_PER_SUBREDDIT
            }
            None => true,
        });
        items.truncate(MAX_TRENDING);

        Ok(Finished {
            rows: items.len(),
            value: items,
            dropped,
        })
    }
}

// ------------------------------------------------------------
// Live events
// ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LiveRow {
    #[serde(alias = "event_time", alias = "timestamp")]
    time: String,
    #[serde(alias = "title")]
    query: String,
    source: String,
    #[serde(default)]
    subreddit: Option<String>,
    #[serde(alias = "policy_category", alias = "category_id")]
    category: String,
}

impl RowSchema for LiveRow {
    const REQUIRED: &'static [&'static [&'static str]] = &[
        &["time", "event_time", "timestamp"],
        &["query", "title"],
        &["source"],
        &["category", "policy_category", "category_id"],
    ];
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveEventsFetcher;

impl QueryFetcher for LiveEventsFetcher {
    type Row = LiveRow;
    type Output = Vec<LiveEvent>;
    const SECTION: Section = Section::Live;

    fn prompt(&self, window: &QueryWindow) -> String {
        prompts::live_prompt(window)
    }

    fn finish(
        &self,
        rows: Vec<LiveRow>,
        ctx: &FetchContext,
    ) -> Result<Finished<Vec<LiveEvent>>, FetchError> {
        let total = rows.len();
        let now = ctx.window.now();
        let tz = ctx.window.tz();
        let mut dropped = 0usize;
        let mut seen: HashSet<(i64, String)> = HashSet::new();
        let mut events: Vec<LiveEvent> = Vec::with_capacity(total);

        for (i, row) in rows.into_iter().enumerate() {
            let time = parse_timestamp(&row.time, tz).ok_or_else(|| {
                FetchError::Malformed(format!("row {i}: unreadable time {:?}", row.time))
            })?;
            let source = LiveSource::parse(&row.source).ok_or_else(|| {
                FetchError::Malformed(format!("row {i}: unknown source {:?}", row.source))
            })?;
            let query = normalize_text(&row.query);
            if let Err(reason) = check_relevance(&query, &row.category) {
                tracing::debug!(target: "ingest", row = i, %reason, "off-topic live row dropped");
                dropped += 1;
                continue;
            }
            let ev = LiveEvent {
                time,
                query,
                source,
                subreddit: clean_subreddit(row.subreddit),
                category_id: normalize_category(&row.category),
            };
            if let Err(reason) = ctx.limits.check_event(&ev, now) {
                tracing::debug!(target: "ingest", row = i, %reason, "live row dropped");
                dropped += 1;
                continue;
            }
            let key: String = query_key(&ev.query).chars().take(LIVE_DEDUP_CHARS).collect();
            if seen.insert((ev.time.timestamp(), key)) {
                events.push(ev);
            }
        }

        if total > 0 && events.is_empty() && dropped > 0 {
            return Err(FetchError::Implausible(format!(
                "all {total} live rows rejected"
            )));
        }

        events.sort_by(|a, b| b.time.cmp(&a.time));
        events.truncate(MAX_LIVE_EVENTS);

        Ok(Finished {
            rows: events.len(),
            value: events,
            dropped,
        })
    }
}
