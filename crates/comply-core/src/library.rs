//! # Answer Library Matching
//!
//! Scores reusable library answers against an incoming questionnaire
//! question and ranks the candidates.
//!
//! Text is lowercased and split on non-alphanumeric characters; stop words
//! are dropped before token overlap is measured. An entry with key phrases
//! scores `0.6·phrase_ratio + 0.4·jaccard`, otherwise `jaccard` alone.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default cut-off below which suggestions are discarded.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.2;

/// Number of suggestions returned when the caller gives no limit.
pub const DEFAULT_SUGGESTION_LIMIT: usize = 5;
/// Upper bound on `limit` accepted from callers.
pub const MAX_SUGGESTION_LIMIT: usize = 20;

const PHRASE_WEIGHT: f64 = 0.6;
const TOKEN_WEIGHT: f64 = 0.4;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "has", "have",
    "how", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "will", "with", "you", "your",
];

/// Lowercase `text` and collapse every run of non-alphanumeric characters
/// into a single space.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn tokens(normalized: &str) -> BTreeSet<&str> {
    normalized
        .split(' ')
        .filter(|word| !word.is_empty() && !STOP_WORDS.contains(word))
        .collect()
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Match strength in `[0, 1]` between a question and a library entry.
pub fn score_match(question: &str, entry_question: &str, key_phrases: &[String]) -> f64 {
    let question = normalize(question);
    let entry_question = normalize(entry_question);
    let overlap = jaccard(&tokens(&question), &tokens(&entry_question));

    let phrases: Vec<String> = key_phrases
        .iter()
        .map(|p| normalize(p))
        .filter(|p| !p.is_empty())
        .collect();
    if phrases.is_empty() {
        return overlap;
    }

    // Pad with spaces so phrases only match on word boundaries.
    let haystack = format!(" {question} ");
    let hits = phrases
        .iter()
        .filter(|p| haystack.contains(&format!(" {p} ")))
        .count();
    let phrase_ratio = hits as f64 / phrases.len() as f64;

    PHRASE_WEIGHT * phrase_ratio + TOKEN_WEIGHT * overlap
}

/// A library entry with its confidence for one question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    /// Library entry identifier.
    pub entry_id: Uuid,
    /// `match × entry.confidence_score`.
    pub confidence: f64,
    /// How often the entry has been applied.
    pub usage_count: i64,
}

/// Drop candidates below `min_confidence`, order the rest, and keep at most
/// `limit`.
///
/// Order: confidence descending, then usage count descending, then entry id.
pub fn rank_suggestions(
    candidates: impl IntoIterator<Item = ScoredEntry>,
    min_confidence: f64,
    limit: usize,
) -> Vec<ScoredEntry> {
    let mut ranked: Vec<ScoredEntry> = candidates
        .into_iter()
        .filter(|c| c.confidence > 0.0 && c.confidence >= min_confidence)
        .collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.usage_count.cmp(&a.usage_count))
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_questions_score_one_without_phrases() {
        let q = "Do you encrypt customer data at rest?";
        assert!((score_match(q, q, &[]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_questions_score_zero() {
        assert_eq!(score_match("Is MFA enforced?", "Describe your backup schedule", &[]), 0.0);
    }

    #[test]
    fn stop_words_do_not_count() {
        // Only "the"/"is" overlap, both stop words.
        assert_eq!(score_match("Is the vault sealed?", "Where is the office?", &[]), 0.0);
    }

    #[test]
    fn key_phrases_weigh_sixty_percent() {
        let score = score_match(
            "Is data encrypted at rest using AES?",
            "Completely different wording",
            &phrases(&["encrypted at rest", "key rotation"]),
        );
        // One of two phrases hit, no token overlap.
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn phrases_match_whole_words_only() {
        let score = score_match("Do you run pentests?", "x", &phrases(&["pen"]));
        assert_eq!(score, 0.0);
    }

    #[test]
    fn ranking_orders_by_confidence_then_usage_then_id() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let d = Uuid::from_u128(4);
        let ranked = rank_suggestions(
            [
                ScoredEntry { entry_id: c, confidence: 0.5, usage_count: 1 },
                ScoredEntry { entry_id: b, confidence: 0.5, usage_count: 1 },
                ScoredEntry { entry_id: a, confidence: 0.5, usage_count: 9 },
                ScoredEntry { entry_id: d, confidence: 0.9, usage_count: 0 },
            ],
            DEFAULT_MIN_CONFIDENCE,
            10,
        );
        let ids: Vec<Uuid> = ranked.iter().map(|s| s.entry_id).collect();
        assert_eq!(ids, vec![d, a, b, c]);
    }

    #[test]
    fn ranking_applies_threshold_and_limit() {
        let candidates = (0..10u128).map(|i| ScoredEntry {
            entry_id: Uuid::from_u128(i),
            confidence: i as f64 / 10.0,
            usage_count: 0,
        });
        let ranked = rank_suggestions(candidates, 0.2, 3);
        assert_eq!(ranked.len(), 3);
        assert!((ranked[0].confidence - 0.9).abs() < 1e-9);
        assert!(ranked.iter().all(|s| s.confidence >= 0.2));
    }

    proptest::proptest! {
        #[test]
        fn score_stays_in_unit_interval(q in "[a-z ]{0,40}", e in "[a-z ]{0,40}", p in "[a-z ]{0,12}") {
            let s = score_match(&q, &e, &[p]);
            proptest::prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}
