// src/ingest/prompts.rs
//! Prompt templates for the three queries. Each starts with a fixed title
//! line so transcripts (and scripted agents in tests) can tell them apart.

use crate::clock::QueryWindow;
use crate::model::CategoryId;

pub const CATEGORIES_TITLE: &str = "Political engagement by category";
pub const TRENDING_TITLE: &str = "Trending political queries";
pub const LIVE_TITLE: &str = "Live political events";

const JSON_ONLY: &str =
    "Respond ONLY with a raw JSON array (no markdown, no explanation). Return [] if nothing matched.";

fn category_list() -> String {
    CategoryId::ALL
        .iter()
        .map(|c| c.label())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn categories_prompt(w: &QueryWindow) -> String {
    format!(
        "{CATEGORIES_TITLE}\n\
         Count political search queries and political Reddit posts by users aged 18 to 29 \
         since {since} ({tz}). Assign each to the ONE most relevant category from this exact \
         list: {cats}. Sum engagement_count and unique_users per category.\n\
         Fields: policy_category (string), engagement_count (integer), unique_users (integer).\n\
         {JSON_ONLY}",
        since = w.since(),
        tz = w.tz().name(),
        cats = category_list(),
    )
}

pub fn trending_prompt(w: &QueryWindow) -> String {
    format!(
        "{TRENDING_TITLE}\n\
         List the top political search queries and Reddit post titles by users aged 18 to 29 \
         since {since} ({tz}), most engaged first, at most 60 rows.\n\
         Fields: query (string), topic (short string), count (integer), \
         source (\"search\"|\"reddit\"|\"news\"), subreddit (string or null), \
         category (one of: {cats}), trend (\"up\"|\"down\"|\"stable\").\n\
         {JSON_ONLY}",
        since = w.since(),
        tz = w.tz().name(),
        cats = category_list(),
    )
}

pub fn live_prompt(w: &QueryWindow) -> String {
    format!(
        "{LIVE_TITLE}\n\
         List individual political searches and Reddit posts by users aged 18 to 29 since \
         {since} ({tz}), newest first, at most 120 rows.\n\
         Fields: time (ISO 8601), query (string), source (\"search\"|\"reddit\"), \
         subreddit (string or null), category (one of: {cats}).\n\
         {JSON_ONLY}",
        since = w.since(),
        tz = w.tz().name(),
        cats = category_list(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Bucketing;
    use chrono::{TimeZone, Utc};

    #[test]
    fn prompts_carry_title_window_and_categories() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 15, 0, 0).unwrap();
        let w = QueryWindow::new(now, chrono_tz::America::New_York, Bucketing::Daily);
        for (p, title) in [
            (categories_prompt(&w), CATEGORIES_TITLE),
            (trending_prompt(&w), TRENDING_TITLE),
            (live_prompt(&w), LIVE_TITLE),
        ] {
            assert!(p.starts_with(title));
            assert!(p.contains("2026-10-15T11:00:00"));
            assert!(p.contains("Elections & Voting"));
        }
    }
}
