//! # Data model
//! Typed shapes for everything the pipeline persists: category aggregates,
//! trending items, live events, history points, and the two dashboard files
//! (`political_data.json`, `live_feed.json`) plus the operator status file.
//!
//! Field order in these structs is the on-disk order; serialization is
//! deterministic so that an unchanged state re-serializes byte-identically.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Version stamped into every persisted file.
pub const SCHEMA_VERSION: u32 = 1;

/// Upper bound on `trending` entries in a snapshot.
pub const MAX_TRENDING: usize = 40;

/// Upper bound on `events` in the live feed.
pub const MAX_LIVE_EVENTS: usize = 50;

/// One of the 11 canonical policy categories shown on the dashboard.
///
/// Declaration order is the canonical display order and is used as the
/// tie-break when two categories carry the same engagement count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryId {
    PresidentialPolitics,
    GeneralPolitics,
    ElectionsVoting,
    ForeignPolicy,
    ImmigrationPolicy,
    LegislativePolitics,
    EconomicPolicy,
    HealthcarePolicy,
    EducationPolicy,
    EnvironmentalPolicy,
    CivilRights,
}

impl CategoryId {
    pub const ALL: [CategoryId; 11] = [
        CategoryId::PresidentialPolitics,
        CategoryId::GeneralPolitics,
        CategoryId::ElectionsVoting,
        CategoryId::ForeignPolicy,
        CategoryId::ImmigrationPolicy,
        CategoryId::LegislativePolitics,
        CategoryId::EconomicPolicy,
        CategoryId::HealthcarePolicy,
        CategoryId::EducationPolicy,
        CategoryId::EnvironmentalPolicy,
        CategoryId::CivilRights,
    ];

    /// Stable identifier as written to disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryId::PresidentialPolitics => "presidential_politics",
            CategoryId::GeneralPolitics => "general_politics",
            CategoryId::ElectionsVoting => "elections_voting",
            CategoryId::ForeignPolicy => "foreign_policy",
            CategoryId::ImmigrationPolicy => "immigration_policy",
            CategoryId::LegislativePolitics => "legislative_politics",
            CategoryId::EconomicPolicy => "economic_policy",
            CategoryId::HealthcarePolicy => "healthcare_policy",
            CategoryId::EducationPolicy => "education_policy",
            CategoryId::EnvironmentalPolicy => "environmental_policy",
            CategoryId::CivilRights => "civil_rights",
        }
    }

    /// Human label, also the exact wording used in agent prompts.
    pub fn label(&self) -> &'static str {
        match self {
            CategoryId::PresidentialPolitics => "Presidential Politics",
            CategoryId::GeneralPolitics => "General Politics",
            CategoryId::ElectionsVoting => "Elections & Voting",
            CategoryId::ForeignPolicy => "Foreign Policy",
            CategoryId::ImmigrationPolicy => "Immigration Policy",
            CategoryId::LegislativePolitics => "Legislative Politics",
            CategoryId::EconomicPolicy => "Economic Policy",
            CategoryId::HealthcarePolicy => "Healthcare Policy",
            CategoryId::EducationPolicy => "Education Policy",
            CategoryId::EnvironmentalPolicy => "Environmental Policy",
            CategoryId::CivilRights => "Civil Rights",
        }
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trending item was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Search,
    Reddit,
    News,
}

impl ItemSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Some(ItemSource::Search),
            "reddit" => Some(ItemSource::Reddit),
            "news" => Some(ItemSource::News),
            _ => None,
        }
    }
}

/// Where a live event was observed (news has no per-user event stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveSource {
    Search,
    Reddit,
}

impl LiveSource {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Some(LiveSource::Search),
            "reddit" => Some(LiveSource::Reddit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl Trend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "rising" => Some(Trend::Up),
            "down" | "falling" => Some(Trend::Down),
            "stable" | "flat" => Some(Trend::Stable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category_id: CategoryId,
    pub engagement_count: u64,
    pub unique_users: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingItem {
    pub query: String,
    pub topic: String,
    pub count: u64,
    pub source: ItemSource,
    pub subreddit: Option<String>,
    pub category_id: CategoryId,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub time: DateTime<Utc>,
    pub query: String,
    pub source: LiveSource,
    pub subreddit: Option<String>,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub bucket_time: DateTime<Utc>,
    pub total_engagements: u64,
    pub sentiment: Option<f64>,
    pub is_placeholder: bool,
}

/// Current dashboard state as produced by the latest (possibly partial) cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub categories: Vec<CategoryCount>,
    #[serde(default)]
    pub trending: Vec<TrendingItem>,
    #[serde(default)]
    pub window_label: String,
    #[serde(default)]
    pub today_start: Option<DateTime<FixedOffset>>,
}

impl Snapshot {
    pub fn total_engagements(&self) -> u64 {
        sum_engagements(&self.categories)
    }
}

pub fn sum_engagements(categories: &[CategoryCount]) -> u64 {
    categories
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.engagement_count))
}

/// On-disk shape of `political_data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliticalData {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(flatten)]
    pub snapshot: Snapshot,
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
}

impl Default for PoliticalData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            snapshot: Snapshot::default(),
            history: Vec::new(),
        }
    }
}

/// On-disk shape of `live_feed.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveFeedState {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<LiveEvent>,
}

impl Default for LiveFeedState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: None,
            events: Vec::new(),
        }
    }
}

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The three independently fetched sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Categories,
    Trending,
    Live,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Categories => "categories",
            Section::Trending => "trending",
            Section::Live => "live",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionOutcome {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStatus {
    pub outcome: SectionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub rows: usize,
}

/// On-disk shape of `fetch_status.json`, the operator-facing freshness record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStatus {
    #[serde(default = "schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sections: BTreeMap<Section, SectionStatus>,
    /// sha256 of the last committed bytes, keyed by file name.
    #[serde(default)]
    pub digests: BTreeMap<String, String>,
}

impl Default for FetchStatus {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            last_attempt_at: None,
            last_success_at: None,
            sections: BTreeMap::new(),
            digests: BTreeMap::new(),
        }
    }
}
