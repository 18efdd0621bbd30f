// src/ingest/plausibility.rs
//! Semantic checks on rows that already passed shape validation.
//!
//! The agent has been seen dropping filter clauses and substituting columns,
//! which produces well-formed JSON with impossible numbers. Nothing here
//! trusts that the agent executed what the prompt asked for.

use chrono::{DateTime, Duration, Utc};

use crate::model::{CategoryCount, LiveEvent, TrendingItem};

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Size of the tracked population; no count may exceed it.
    pub population_cap: u64,
    /// How far in the future an event timestamp may sit (clock skew).
    pub max_future_skew: Duration,
    /// Oldest event accepted into the live feed.
    pub max_event_age: Duration,
}

impl Limits {
    pub fn new(population_cap: u64) -> Self {
        Self {
            population_cap,
            max_future_skew: Duration::minutes(5),
            max_event_age: Duration::hours(48),
        }
    }

    pub fn check_category(&self, c: &CategoryCount) -> Result<(), String> {
        if c.engagement_count > self.population_cap {
            return Err(format!(
                "{}: engagement_count {} exceeds population cap {}",
                c.category_id, c.engagement_count, self.population_cap
            ));
        }
        if c.unique_users > c.engagement_count {
            return Err(format!(
                "{}: unique_users {} exceeds engagement_count {}",
                c.category_id, c.unique_users, c.engagement_count
            ));
        }
        Ok(())
    }

    pub fn check_trending(&self, t: &TrendingItem) -> Result<(), String> {
        if t.query.is_empty() {
            return Err("empty query".to_string());
        }
        if t.count > self.population_cap {
            return Err(format!(
                "{:?}: count {} exceeds population cap {}",
                t.query, t.count, self.population_cap
            ));
        }
        Ok(())
    }

    pub fn check_event(&self, e: &LiveEvent, now: DateTime<Utc>) -> Result<(), String> {
        if e.query.is_empty() {
            return Err("empty query".to_string());
        }
        if e.time > now + self.max_future_skew {
            return Err(format!("event time {} is in the future", e.time));
        }
        if e.time < now - self.max_event_age {
            return Err(format!("event time {} is older than the feed window", e.time));
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(50_000)
    }
}
