//! One engagement point per time bucket, never regressing.
//!
//! The tracker is invoked on every aggregates cycle regardless of fetch
//! outcome. A bucket that has no real data yet receives a placeholder that
//! carries the last known real total forward, so the dashboard chart never
//! shows a hole or a drop to zero because the agent was down.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::clock::Bucketing;
use crate::model::HistoryPoint;

/// What this cycle learned, if anything.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    /// Real total engagements; `None` when the categories fetch failed.
    pub total: Option<u64>,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryChange {
    /// Points appended (gap placeholders included).
    pub appended: usize,
    /// The current bucket's existing point was modified.
    pub updated: bool,
}

impl HistoryChange {
    pub fn is_noop(&self) -> bool {
        self.appended == 0 && !self.updated
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryTracker {
    bucketing: Bucketing,
    tz: Tz,
    gap_fill_limit: usize,
}

impl HistoryTracker {
    pub fn new(bucketing: Bucketing, tz: Tz, gap_fill_limit: usize) -> Self {
        Self {
            bucketing,
            tz,
            gap_fill_limit,
        }
    }

    /// Apply one cycle's observation to `history`.
    ///
    /// `fallback_total` is used as the carried-forward total when the
    /// history holds no point yet (normally the persisted categories sum).
    pub fn record(
        &self,
        history: &mut Vec<HistoryPoint>,
        now: DateTime<Utc>,
        obs: Observation,
        fallback_total: u64,
    ) -> HistoryChange {
        let bucket = self.bucketing.bucket_start(now, self.tz);
        let carried = last_known_total(history).unwrap_or(fallback_total);

        if let Some(point) = history.last_mut().filter(|p| p.bucket_time == bucket) {
            return HistoryChange {
                appended: 0,
                updated: update_point(point, obs),
            };
        }

        let last_bucket = history.last().map(|p| p.bucket_time);
        match last_bucket {
            Some(last) if last > bucket => {
                warn!(
                    target: "history",
                    %last, %bucket,
                    "clock is behind the newest history point; leaving history unchanged"
                );
                HistoryChange::default()
            }
            _ => {
                let mut appended = 0usize;
                if let Some(last) = last_bucket {
                    let mut b = self.bucketing.next_bucket(last, self.tz);
                    while b < bucket && appended < self.gap_fill_limit {
                        history.push(HistoryPoint {
                            bucket_time: b,
                            total_engagements: carried,
                            sentiment: None,
                            is_placeholder: true,
                        });
                        appended += 1;
                        b = self.bucketing.next_bucket(b, self.tz);
                    }
                    if b < bucket {
                        warn!(
                            target: "history",
                            limit = self.gap_fill_limit,
                            "history gap exceeds fill limit; rest of the gap left empty"
                        );
                    }
                }
                history.push(HistoryPoint {
                    bucket_time: bucket,
                    total_engagements: obs.total.unwrap_or(carried),
                    sentiment: obs.sentiment,
                    is_placeholder: obs.total.is_none(),
                });
                appended += 1;
                debug!(target: "history", appended, %bucket, "history extended");
                HistoryChange {
                    appended,
                    updated: false,
                }
            }
        }
    }
}

fn update_point(point: &mut HistoryPoint, obs: Observation) -> bool {
    let mut changed = false;
    if let Some(total) = obs.total {
        if point.total_engagements != total || point.is_placeholder {
            point.total_engagements = total;
            point.is_placeholder = false;
            changed = true;
        }
    }
    if let Some(s) = obs.sentiment {
        if point.sentiment != Some(s) {
            point.sentiment = Some(s);
            changed = true;
        }
    }
    changed
}

/// Total of the newest real point, else of the newest point at all.
pub fn last_known_total(history: &[HistoryPoint]) -> Option<u64> {
    history
        .iter()
        .rev()
        .find(|p| !p.is_placeholder)
        .or_else(|| history.last())
        .map(|p| p.total_engagements)
}

/// Restore the ordering invariant on a history read from disk: sorted by
/// bucket, one point per bucket (a real point wins over a placeholder,
/// otherwise the later entry wins). Returns how many entries were dropped.
pub fn canonicalize(history: &mut Vec<HistoryPoint>) -> usize {
    let before = history.len();
    history.sort_by_key(|p| p.bucket_time);
    let mut out: Vec<HistoryPoint> = Vec::with_capacity(history.len());
    for p in history.drain(..) {
        match out.last_mut() {
            Some(prev) if prev.bucket_time == p.bucket_time => {
                if !(p.is_placeholder && !prev.is_placeholder) {
                    *prev = p;
                }
            }
            _ => out.push(p),
        }
    }
    *history = out;
    before - history.len()
}
