//! State merger: fold one cycle's section outcomes into the persisted state.
//!
//! Per section, fresh data replaces what was stored and a failed fetch keeps
//! it untouched. The date fields and the history tracker run regardless.
//! `generated_at` only moves when a section's content actually changed, so
//! feeding the same response twice leaves the snapshot as it was.

use chrono::{DateTime, Utc};

use crate::clock::QueryWindow;
use crate::history::{HistoryChange, HistoryTracker, Observation};
use crate::model::{
    sum_engagements, CategoryCount, LiveEvent, LiveFeedState, PoliticalData, TrendingItem,
    SCHEMA_VERSION,
};

/// Fresh payloads for the aggregates file; `None` means "fetch failed".
#[derive(Debug, Clone, Default)]
pub struct AggregatesUpdate {
    pub categories: Option<Vec<CategoryCount>>,
    pub trending: Option<Vec<TrendingItem>>,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PoliticalMerge {
    pub data: PoliticalData,
    /// Categories or trending differ from what was stored.
    pub content_changed: bool,
    pub history: HistoryChange,
}

impl PoliticalMerge {
    /// Anything at all differs from the previous file.
    pub fn is_dirty(&self, prev: &PoliticalData) -> bool {
        self.data != *prev
    }
}

pub fn merge_political(
    prev: &PoliticalData,
    update: AggregatesUpdate,
    window: &QueryWindow,
    tracker: &HistoryTracker,
) -> PoliticalMerge {
    let mut data = prev.clone();
    data.schema_version = SCHEMA_VERSION;
    let snap = &mut data.snapshot;
    let mut content_changed = false;

    let real_total = update.categories.as_deref().map(sum_engagements);
    if let Some(categories) = update.categories {
        if categories != snap.categories {
            snap.categories = categories;
            content_changed = true;
        }
    }
    if let Some(trending) = update.trending {
        if trending != snap.trending {
            snap.trending = trending;
            content_changed = true;
        }
    }
    if content_changed {
        snap.generated_at = Some(window.now());
    }

    snap.window_label = window.window_label();
    snap.today_start = Some(window.today_start());

    let history = tracker.record(
        &mut data.history,
        window.now(),
        Observation {
            total: real_total,
            sentiment: update.sentiment,
        },
        prev.snapshot.total_engagements(),
    );

    PoliticalMerge {
        data,
        content_changed,
        history,
    }
}

/// Merge the live feed. Returns `None` when nothing should be written.
pub fn merge_live(
    prev: &LiveFeedState,
    events: Option<Vec<LiveEvent>>,
    now: DateTime<Utc>,
) -> Option<LiveFeedState> {
    let events = events?;
    if events == prev.events && prev.schema_version == SCHEMA_VERSION {
        return None;
    }
    Some(LiveFeedState {
        schema_version: SCHEMA_VERSION,
        generated_at: Some(now),
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Bucketing;
    use crate::model::{CategoryId, ItemSource, LiveSource, Trend};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 15, 0, 0).unwrap()
    }

    fn window(at: DateTime<Utc>) -> QueryWindow {
        QueryWindow::new(at, chrono_tz::America::New_York, Bucketing::Daily)
    }

    fn tracker() -> HistoryTracker {
        HistoryTracker::new(Bucketing::Daily, chrono_tz::America::New_York, 31)
    }

    fn cat(id: CategoryId, n: u64) -> CategoryCount {
        CategoryCount {
            category_id: id,
            engagement_count: n,
            unique_users: n / 3,
        }
    }

    fn item(q: &str) -> TrendingItem {
        TrendingItem {
            query: q.into(),
            topic: q.into(),
            count: 7,
            source: ItemSource::Search,
            subreddit: None,
            category_id: CategoryId::GeneralPolitics,
            trend: Trend::Stable,
        }
    }

    fn seeded() -> PoliticalData {
        let mut d = PoliticalData::default();
        d.snapshot.categories = vec![cat(CategoryId::ForeignPolicy, 90)];
        d.snapshot.trending = vec![item("nato summit")];
        d.snapshot.generated_at = Some(now() - Duration::days(1));
        d.snapshot.window_label = "Oct 15 · Last 24h".into();
        d
    }

    #[test]
    fn failed_sections_are_retained_and_dates_refresh() {
        let prev = seeded();
        let m = merge_political(&prev, AggregatesUpdate::default(), &window(now()), &tracker());
        assert!(!m.content_changed);
        assert_eq!(m.data.snapshot.categories, prev.snapshot.categories);
        assert_eq!(m.data.snapshot.trending, prev.snapshot.trending);
        assert_eq!(m.data.snapshot.generated_at, prev.snapshot.generated_at);
        assert_eq!(m.data.snapshot.window_label, "Oct 16 · Last 24h");
        assert_eq!(m.data.history.len(), 1);
        assert!(m.data.history[0].is_placeholder);
        assert_eq!(m.data.history[0].total_engagements, 90);
    }

    #[test]
    fn sections_replace_independently() {
        let prev = seeded();
        let upd = AggregatesUpdate {
            categories: Some(vec![cat(CategoryId::PresidentialPolitics, 150)]),
            trending: None,
            sentiment: None,
        };
        let m = merge_political(&prev, upd, &window(now()), &tracker());
        assert!(m.content_changed);
        assert_eq!(
            m.data.snapshot.categories[0].category_id,
            CategoryId::PresidentialPolitics
        );
        assert_eq!(m.data.snapshot.trending, prev.snapshot.trending);
        assert_eq!(m.data.snapshot.generated_at, Some(now()));
        assert!(!m.data.history[0].is_placeholder);
        assert_eq!(m.data.history[0].total_engagements, 150);
    }

    #[test]
    fn identical_input_is_idempotent() {
        let upd = AggregatesUpdate {
            categories: Some(vec![cat(CategoryId::PresidentialPolitics, 150)]),
            trending: Some(vec![item("debate")]),
            sentiment: Some(52.5),
        };
        let first = merge_political(&seeded(), upd.clone(), &window(now()), &tracker());
        let later = window(now() + Duration::minutes(5));
        let second = merge_political(&first.data, upd, &later, &tracker());
        assert!(!second.content_changed);
        assert!(second.history.is_noop());
        assert!(!second.is_dirty(&first.data));
    }

    #[test]
    fn live_feed_only_written_when_events_change() {
        let prev = LiveFeedState::default();
        assert!(merge_live(&prev, None, now()).is_none());
        let ev = LiveEvent {
            time: now(),
            query: "vote".into(),
            source: LiveSource::Search,
            subreddit: None,
            category_id: CategoryId::ElectionsVoting,
        };
        let next = merge_live(&prev, Some(vec![ev.clone()]), now()).unwrap();
        assert_eq!(next.generated_at, Some(now()));
        assert!(merge_live(&next, Some(vec![ev]), now()).is_none());
    }
}
