//! Calendar arithmetic in the data's home time zone.
//!
//! The upstream tables store naive Eastern-Time timestamps, so "today",
//! bucket boundaries and the 24h query window are all computed in a
//! configurable IANA zone rather than in UTC.

use chrono::{
    DateTime, Duration, DurationRound, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Width of one history bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucketing {
    /// One calendar day in the configured zone.
    #[default]
    Daily,
    /// One clock hour.
    Hourly,
}

impl Bucketing {
    /// Start of the bucket containing `at`, as a UTC instant.
    pub fn bucket_start(&self, at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match self {
            Bucketing::Daily => {
                local_midnight(tz, at.with_timezone(&tz).date_naive()).with_timezone(&Utc)
            }
            Bucketing::Hourly => at.duration_trunc(Duration::hours(1)).unwrap_or(at),
        }
    }

    /// Start of the bucket following the one that starts at `bucket`.
    /// Always strictly later than `bucket`.
    pub fn next_bucket(&self, bucket: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match self {
            Bucketing::Daily => {
                let day = bucket.with_timezone(&tz).date_naive();
                match day.succ_opt() {
                    Some(next) => local_midnight(tz, next).with_timezone(&Utc),
                    None => bucket + Duration::days(1),
                }
            }
            Bucketing::Hourly => bucket + Duration::hours(1),
        }
    }
}

/// First valid local instant of `date` in `tz` (skips DST gaps at midnight).
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    let mut t = date.and_time(NaiveTime::MIN);
    for _ in 0..4 {
        if let Some(dt) = tz.from_local_datetime(&t).earliest() {
            return dt;
        }
        t += Duration::minutes(30);
    }
    tz.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Everything a cycle needs to know about "now".
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    now: DateTime<Utc>,
    tz: Tz,
    bucketing: Bucketing,
}

impl QueryWindow {
    pub fn new(now: DateTime<Utc>, tz: Tz, bucketing: Bucketing) -> Self {
        Self { now, tz, bucketing }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn bucketing(&self) -> Bucketing {
        self.bucketing
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.tz)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }

    /// Local midnight of the current day, with its UTC offset.
    pub fn today_start(&self) -> DateTime<FixedOffset> {
        let start = local_midnight(self.tz, self.today());
        start.with_timezone(&start.offset().fix())
    }

    pub fn window_label(&self) -> String {
        format!("{} · Last 24h", self.today().format("%b %-d"))
    }

    /// Naive local timestamp 24h ago, the lower bound used in prompts.
    pub fn since(&self) -> String {
        (self.local_now().naive_local() - Duration::hours(24))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    pub fn bucket(&self) -> DateTime<Utc> {
        self.bucketing.bucket_start(self.now, self.tz)
    }
}

/// Parse an agent-supplied timestamp. RFC 3339 is taken as-is; naive
/// timestamps are interpreted in `tz`.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}
