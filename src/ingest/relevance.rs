// src/ingest/relevance.rs
//! Is a trending row or live event about politics at all?
//!
//! The agent has been seen returning celebrity and sports queries despite
//! the prompt's filter. A row survives when its text names a political
//! subject, or when its category label resolves to a specific policy area.
//! Blocked phrases are checked first and win over everything else.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::normalize::match_category;
use crate::model::CategoryId;

/// Enough on their own.
const STRONG: &[&str] = &[
    "trump", "white house", "maga", "executive order",
    "congress", "senate", "house of representatives", "filibuster", "legislation",
    "democrat", "democrats", "republican", "republicans",
    "doge", "elon musk", "federal worker", "federal workers", "federal employee",
    "federal employees", "federal budget", "government efficiency", "spending cut",
    "spending cuts",
    "tariff", "tariffs", "trade war", "inflation", "unemployment",
    "immigration", "deportation", "deportations", "ice raid", "ice raids", "daca",
    "undocumented", "migrant", "migrants",
    "healthcare", "medicare", "medicaid", "obamacare", "aca", "abortion",
    "gun control", "gun violence", "second amendment", "supreme court",
    "social security", "student debt", "climate change", "climate policy",
    "deficit", "debt ceiling", "appropriations", "shutdown",
    "state of the union", "sotu", "address to congress",
    "biden", "kamala", "harris", "rubio", "noem", "hegseth", "gabbard", "patel",
    "sanction", "sanctions",
];

/// Foreign subjects, political only next to a `CONTEXT` word.
const COUNTRY: &[&str] = &[
    "ukraine", "russia", "nato", "china", "taiwan", "iran", "israel", "gaza",
    "middle east", "north korea",
];

const CONTEXT: &[&str] = &[
    "war", "missile", "military", "soldier", "soldiers", "bomb", "attack", "policy",
    "aid", "deal", "treaty", "alliance", "conflict", "nuclear", "diplomat", "minister",
    "president", "election", "coup", "protest", "weapon", "weapons", "troops", "invasion",
    "occupied", "ceasefire", "parliament", "foreign", "bilateral", "summit", "tariff",
    "tariffs", "trade", "sanction", "sanctions",
];

/// Royals, South Korea and gossip that trip the country list.
const BLOCKED: &[&str] = &[
    "prince andrew", "prince william", "prince harry", "royal family", "buckingham",
    "king charles", "south korea", "yoon suk", "korean president", "epstein",
    "blondie in china", "white girl in china",
];

fn word_set(cell: &'static OnceCell<Regex>, words: &[&str]) -> &'static Regex {
    cell.get_or_init(|| {
        let alts: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
        Regex::new(&format!(r"\b(?:{})\b", alts.join("|"))).unwrap()
    })
}

/// Lowercase ASCII letters separated by single spaces.
fn clean(text: &str) -> String {
    static RE_NON_ALPHA: OnceCell<Regex> = OnceCell::new();
    let re = RE_NON_ALPHA.get_or_init(|| Regex::new(r"[^a-z]+").unwrap());
    re.replace_all(&text.to_lowercase(), " ").trim().to_string()
}

/// `Ok` when the row is political; the error names why it was not.
pub fn check_relevance(text: &str, category_label: &str) -> Result<(), String> {
    static RE_STRONG: OnceCell<Regex> = OnceCell::new();
    static RE_COUNTRY: OnceCell<Regex> = OnceCell::new();
    static RE_CONTEXT: OnceCell<Regex> = OnceCell::new();
    static RE_BLOCKED: OnceCell<Regex> = OnceCell::new();

    let cleaned = clean(text);
    if let Some(hit) = word_set(&RE_BLOCKED, BLOCKED).find(&cleaned) {
        return Err(format!("blocked phrase {:?}", hit.as_str()));
    }
    if word_set(&RE_STRONG, STRONG).is_match(&cleaned) {
        return Ok(());
    }
    if word_set(&RE_COUNTRY, COUNTRY).is_match(&cleaned)
        && word_set(&RE_CONTEXT, CONTEXT).is_match(&cleaned)
    {
        return Ok(());
    }
    // Catch-all labels ("Politics", "Other") say nothing about the row.
    match match_category(category_label) {
        Some(id) if id != CategoryId::GeneralPolitics => Ok(()),
        _ => Err(format!(
            "no political subject and no specific category ({category_label:?})"
        )),
    }
}
