// src/ingest/normalize.rs
//! Free text coming back from the agent, made canonical.
//!
//! `normalize_category` is total: whatever label the agent invents, the
//! result is one of the 11 dashboard categories, falling back to
//! `general_politics`.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;

use crate::model::CategoryId;

/// Longest query text kept on a trending item or live event.
pub const MAX_QUERY_CHARS: usize = 160;

/// Jaro-Winkler similarity needed before a misspelled label is accepted.
const FUZZY_THRESHOLD: f64 = 0.92;

/// Loose labels the agent is known to produce, already folded.
const ALIASES: &[(&str, CategoryId)] = &[
    ("presidential", CategoryId::PresidentialPolitics),
    ("president", CategoryId::PresidentialPolitics),
    ("white house", CategoryId::PresidentialPolitics),
    ("executive", CategoryId::PresidentialPolitics),
    ("trump", CategoryId::PresidentialPolitics),
    ("politics", CategoryId::GeneralPolitics),
    ("political", CategoryId::GeneralPolitics),
    ("government", CategoryId::GeneralPolitics),
    ("government and accountability", CategoryId::GeneralPolitics),
    ("other", CategoryId::GeneralPolitics),
    ("elections", CategoryId::ElectionsVoting),
    ("election", CategoryId::ElectionsVoting),
    ("voting", CategoryId::ElectionsVoting),
    ("elections and political figures", CategoryId::ElectionsVoting),
    ("foreign", CategoryId::ForeignPolicy),
    ("foreign policy and world", CategoryId::ForeignPolicy),
    ("international", CategoryId::ForeignPolicy),
    ("geopolitics", CategoryId::ForeignPolicy),
    ("immigration", CategoryId::ImmigrationPolicy),
    ("border", CategoryId::ImmigrationPolicy),
    ("immigration and civil liberties", CategoryId::ImmigrationPolicy),
    ("legislative", CategoryId::LegislativePolitics),
    ("congress", CategoryId::LegislativePolitics),
    ("senate", CategoryId::LegislativePolitics),
    ("legislation", CategoryId::LegislativePolitics),
    ("economy", CategoryId::EconomicPolicy),
    ("economic", CategoryId::EconomicPolicy),
    ("economics", CategoryId::EconomicPolicy),
    ("finance", CategoryId::EconomicPolicy),
    ("fiscal", CategoryId::EconomicPolicy),
    ("economic inequality", CategoryId::EconomicPolicy),
    ("corporate power and consumers", CategoryId::EconomicPolicy),
    ("trade", CategoryId::EconomicPolicy),
    ("healthcare", CategoryId::HealthcarePolicy),
    ("health", CategoryId::HealthcarePolicy),
    ("medical", CategoryId::HealthcarePolicy),
    ("health policy", CategoryId::HealthcarePolicy),
    ("education", CategoryId::EducationPolicy),
    ("schools", CategoryId::EducationPolicy),
    ("student", CategoryId::EducationPolicy),
    ("environment", CategoryId::EnvironmentalPolicy),
    ("environmental", CategoryId::EnvironmentalPolicy),
    ("climate", CategoryId::EnvironmentalPolicy),
    ("energy", CategoryId::EnvironmentalPolicy),
    ("environment and science", CategoryId::EnvironmentalPolicy),
    ("civil rights", CategoryId::CivilRights),
    ("civil liberties", CategoryId::CivilRights),
    ("social justice", CategoryId::CivilRights),
    ("criminal justice", CategoryId::CivilRights),
    ("culture and media", CategoryId::CivilRights),
];

/// Folded canonical spellings: label ("elections and voting") and id
/// ("elections voting") for every category.
static CANONICAL: Lazy<Vec<(String, CategoryId)>> = Lazy::new(|| {
    CategoryId::ALL
        .iter()
        .flat_map(|id| [(fold(id.label()), *id), (fold(id.as_str()), *id)])
        .collect()
});

/// Lowercase, `&` spelled out, punctuation and `_` to spaces, single spaced.
pub fn fold(s: &str) -> String {
    let lower = s.to_lowercase().replace('&', " and ");
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map any label to a canonical category. Never fails.
pub fn normalize_category(raw: &str) -> CategoryId {
    match_category(raw).unwrap_or(CategoryId::GeneralPolitics)
}

/// The category `raw` names, if it names one at all. `None` is the case
/// `normalize_category` files under `general_politics` by default.
pub fn match_category(raw: &str) -> Option<CategoryId> {
    let folded = fold(raw);
    if folded.is_empty() {
        return None;
    }

    let candidates = || {
        CANONICAL
            .iter()
            .map(|(k, id)| (k.as_str(), *id))
            .chain(ALIASES.iter().copied())
    };

    if let Some((_, id)) = candidates().find(|(k, _)| *k == folded) {
        return Some(id);
    }

    // Whole-word containment, canonical labels before aliases.
    let padded = format!(" {folded} ");
    if let Some((_, id)) = candidates().find(|(k, _)| padded.contains(&format!(" {k} "))) {
        return Some(id);
    }

    let best = candidates()
        .map(|(k, id)| (strsim::jaro_winkler(k, &folded), id))
        .fold(None::<(f64, CategoryId)>, |acc, (score, id)| match acc {
            Some((s, _)) if s >= score => acc,
            _ => Some((score, id)),
        });
    best.filter(|(score, _)| *score >= FUZZY_THRESHOLD)
        .map(|(_, id)| id)
}

/// Normalize query text: decode entities, drop markup, collapse whitespace,
/// trim trailing sentence punctuation, cap the length.
pub fn normalize_text(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, " ");
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    let mut out = re_ws.replace_all(&quoted, " ").trim().to_string();

    while out.ends_with(['!', '?', '.', ',']) {
        out.pop();
    }

    if out.chars().count() > MAX_QUERY_CHARS {
        out = out.chars().take(MAX_QUERY_CHARS).collect();
        out.truncate(out.trim_end().len());
    }
    out
}

/// Key used to detect the same query phrased with different case/spacing.
pub fn query_key(normalized: &str) -> String {
    normalized.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_labels_and_ids_map_directly() {
        for id in CategoryId::ALL {
            assert_eq!(normalize_category(id.label()), id);
            assert_eq!(normalize_category(id.as_str()), id);
        }
        assert_eq!(
            normalize_category("Presidential Politics"),
            CategoryId::PresidentialPolitics
        );
    }

    #[test]
    fn aliases_and_containment() {
        assert_eq!(normalize_category("White House"), CategoryId::PresidentialPolitics);
        assert_eq!(normalize_category("BORDER"), CategoryId::ImmigrationPolicy);
        assert_eq!(
            normalize_category("Environment & Science"),
            CategoryId::EnvironmentalPolicy
        );
        assert_eq!(
            normalize_category("Border wall funding"),
            CategoryId::ImmigrationPolicy
        );
        assert_eq!(normalize_category("Education"), CategoryId::EducationPolicy);
    }

    #[test]
    fn misspellings_are_caught_by_similarity() {
        assert_eq!(normalize_category("Forein Policy"), CategoryId::ForeignPolicy);
        assert_eq!(normalize_category("Helthcare Policy"), CategoryId::HealthcarePolicy);
    }

    #[test]
    fn unknown_and_empty_fall_back_to_general() {
        assert_eq!(normalize_category(""), CategoryId::GeneralPolitics);
        assert_eq!(normalize_category("   ###  "), CategoryId::GeneralPolitics);
        assert_eq!(normalize_category("Sports"), CategoryId::GeneralPolitics);
        assert_eq!(match_category("Sports"), None);
        assert_eq!(match_category("Politics"), Some(CategoryId::GeneralPolitics));
    }

    #[test]
    fn normalize_text_cleans_markup_and_caps() {
        assert_eq!(
            normalize_text("  <b>Tariffs</b>&nbsp;on   China?? "),
            "Tariffs on China"
        );
        assert_eq!(normalize_text("\u{201C}DOGE\u{201D} cuts"), "\"DOGE\" cuts");
        let long = "a ".repeat(200);
        assert!(normalize_text(&long).chars().count() <= MAX_QUERY_CHARS);
    }
}
