use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::model::{ItemSource, TrendingItem};

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

/// Lexicon sentiment over political query text, reported on a 0..=100 scale
/// where 50 is neutral.
#[derive(Debug, Clone, Default)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    #[inline]
    fn entry_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (raw score, token count).
    ///
    /// Two-word phrases are matched before single words so "trade war" is not
    /// counted twice. A negator in the 1..=3 preceding tokens flips the sign.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        let mut i = 0;
        while i < tokens.len() {
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));

            let (base, width) = match tokens.get(i + 1) {
                Some(next) => {
                    let phrase = format!("{} {}", tokens[i], next);
                    match self.entry_score(&phrase) {
                        0 => (self.entry_score(&tokens[i]), 1),
                        s => (s, 2),
                    }
                }
                None => (self.entry_score(&tokens[i]), 1),
            };

            if base != 0 {
                score += if negated { -base } else { base };
            }
            i += width;
        }

        (score, tokens.len())
    }

    /// 0..=100 score for one trending item.
    pub fn score_item(&self, item: &TrendingItem) -> f64 {
        let text = if item.topic.eq_ignore_ascii_case(&item.query) {
            item.query.clone()
        } else {
            format!("{} {}", item.topic, item.query)
        };
        let (raw, _) = self.score_text(&text);
        (50.0 + 5.0 * raw as f64).clamp(0.0, 100.0)
    }

    /// Engagement-weighted score over a cycle's trending items, rounded to one
    /// decimal. `None` when there is nothing to weigh.
    pub fn score_items(&self, items: &[TrendingItem]) -> Option<f64> {
        let mut total_w = 0.0f64;
        let mut total_s = 0.0f64;
        for it in items {
            let w = it.count as f64 * source_weight(it.source);
            total_w += w;
            total_s += self.score_item(it) * w;
        }
        if total_w <= 0.0 {
            return None;
        }
        Some((total_s / total_w * 10.0).round() / 10.0)
    }
}

/// A Reddit post signals more deliberate engagement than a search.
fn source_weight(source: ItemSource) -> f64 {
    match source {
        ItemSource::Reddit => 1.5,
        ItemSource::Search | ItemSource::News => 1.0,
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn" | "wasn" | "aren" | "cannot" | "without"
    )
}
