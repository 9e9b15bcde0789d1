//! Fuzzy ranking of search candidates.
//!
//! The search dispatcher decides *which* entities are candidates; this
//! module decides their order. Two scoring strategies exist:
//!
//! - **Weighted ratio** (`fuzzy` feature): compares the query against the
//!   entity's name and description as one text, taking the best of a plain
//!   edit-distance ratio, token-sorted and token-set ratios, and best-window
//!   partial ratios. Tolerant of word order and of the query being a
//!   fragment of a longer text. Scores run 0 to 100.
//! - **Sequence ratio**: longest-common-block similarity of the query
//!   against the name and against the description separately, combined as
//!   `max(name * 1.2, description) * 100`. Cheaper and cruder, and biased
//!   towards name matches.
//!
//! One scorer is chosen at startup and used for every ranking call.

use crate::types::Entity;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Weight applied to name similarity by the sequence-ratio scorer.
pub const NAME_WEIGHT: f64 = 1.2;

/// Configured scoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerChoice {
    /// Weighted ratio when compiled in, otherwise sequence ratio
    #[default]
    Auto,
    /// Weighted ratio; degrades with a warning when not compiled in
    Weighted,
    /// Always sequence ratio
    Sequence,
}

impl FromStr for ScorerChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ScorerChoice::Auto),
            "weighted" => Ok(ScorerChoice::Weighted),
            "sequence" => Ok(ScorerChoice::Sequence),
            _ => Err(format!("Unknown scorer: {}", s)),
        }
    }
}

impl fmt::Display for ScorerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerChoice::Auto => write!(f, "auto"),
            ScorerChoice::Weighted => write!(f, "weighted"),
            ScorerChoice::Sequence => write!(f, "sequence"),
        }
    }
}

/// A similarity strategy. Higher scores mean more relevant.
pub trait Scorer: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Score one candidate. Never fails; text-less candidates score 0.
    fn score(&self, query: &str, entity: &Entity) -> f64;
}

/// Resolve a configured choice to a scorer.
pub fn select_scorer(choice: ScorerChoice) -> Arc<dyn Scorer> {
    let scorer: Arc<dyn Scorer> = match (choice, preferred_scorer()) {
        (ScorerChoice::Sequence, _) => Arc::new(SequenceRatio),
        (_, Some(preferred)) => preferred,
        (ScorerChoice::Weighted, None) => {
            warn!("Weighted-ratio scorer not built in; falling back to sequence ratio");
            Arc::new(SequenceRatio)
        }
        (ScorerChoice::Auto, None) => {
            info!("Fuzzy matching not built in; using sequence ratio");
            Arc::new(SequenceRatio)
        }
    };
    info!(scorer = scorer.name(), "Ranking scorer selected");
    scorer
}

#[cfg(feature = "fuzzy")]
fn preferred_scorer() -> Option<Arc<dyn Scorer>> {
    Some(Arc::new(WeightedRatio))
}

#[cfg(not(feature = "fuzzy"))]
fn preferred_scorer() -> Option<Arc<dyn Scorer>> {
    None
}

/// A candidate with its score.
#[derive(Debug, Clone)]
pub struct RankedEntity {
    /// The ranked entity
    pub entity: Entity,

    /// Relevance score (higher is more relevant)
    pub score: f64,
}

/// Orders candidates by similarity to a query.
#[derive(Clone)]
pub struct Ranker {
    scorer: Arc<dyn Scorer>,
    parallel_threshold: usize,
}

impl fmt::Debug for Ranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ranker")
            .field("scorer", &self.scorer.name())
            .field("parallel_threshold", &self.parallel_threshold)
            .finish()
    }
}

impl Ranker {
    /// Create a ranker around a scorer
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Ranker {
            scorer,
            parallel_threshold: 1000,
        }
    }

    /// Create a ranker from a configured choice
    pub fn from_choice(choice: ScorerChoice) -> Self {
        Self::new(select_scorer(choice))
    }

    /// Score on the rayon pool once there are at least `threshold` candidates.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold.max(1);
        self
    }

    /// Name of the active scorer
    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// Score every candidate, sort best first and keep `top_n`.
    ///
    /// The sort is stable, so equal scores keep their candidate order. A blank
    /// query scores everything 0 and so leaves the order untouched.
    pub fn rank(&self, query: &str, candidates: Vec<Entity>, top_n: usize) -> Vec<RankedEntity> {
        let query = query.trim();
        let score = |entity: &Entity| {
            if query.is_empty() {
                0.0
            } else {
                self.scorer.score(query, entity)
            }
        };

        let scores: Vec<f64> = if candidates.len() >= self.parallel_threshold {
            candidates.par_iter().map(score).collect()
        } else {
            candidates.iter().map(score).collect()
        };

        let mut ranked: Vec<RankedEntity> = candidates
            .into_iter()
            .zip(scores)
            .map(|(entity, score)| RankedEntity { entity, score })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(top_n);
        ranked
    }
}

// === Sequence Ratio ===

/// Longest-common-block similarity, name-weighted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceRatio;

impl Scorer for SequenceRatio {
    fn name(&self) -> &'static str {
        "sequence-ratio"
    }

    fn score(&self, query: &str, entity: &Entity) -> f64 {
        let query: Vec<char> = query.to_lowercase().chars().collect();
        let against = |text: &str| {
            let text: Vec<char> = text.to_lowercase().chars().collect();
            sequence_ratio(&query, &text)
        };
        let name = against(&entity.name);
        let description = against(entity.description.as_deref().unwrap_or(""));
        (name * NAME_WEIGHT).max(description) * 100.0
    }
}

/// `2 * matched / (len(a) + len(b))`, where `matched` counts characters in
/// the recursively found longest common blocks. Two empty inputs are
/// identical (1.0); one empty input shares nothing (0.0).
pub fn sequence_ratio(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(a, b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest block common to `a[alo..ahi]` and `b[blo..bhi]`; among equals,
/// the one that ends earliest in `a`, then in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo + 1;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width];
    let mut cur = vec![0usize; width];
    for i in alo..ahi {
        for j in blo..bhi {
            let k = if a[i] == b[j] { prev[j - blo] + 1 } else { 0 };
            cur[j - blo + 1] = k;
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

// === Weighted Ratio ===

/// Word-order and fragment tolerant fuzzy score over name and description.
#[cfg(feature = "fuzzy")]
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRatio;

#[cfg(feature = "fuzzy")]
impl Scorer for WeightedRatio {
    fn name(&self) -> &'static str {
        "weighted-ratio"
    }

    fn score(&self, query: &str, entity: &Entity) -> f64 {
        weighted::wratio(
            &weighted::normalize(query),
            &weighted::normalize(&entity.ranking_text()),
        )
    }
}

#[cfg(feature = "fuzzy")]
pub(crate) mod weighted {
    use std::collections::BTreeSet;

    const UNBASE_SCALE: f64 = 0.95;

    /// Lower-case, non-alphanumerics to spaces, trimmed.
    pub(crate) fn normalize(s: &str) -> String {
        s.chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_lowercase().next().unwrap_or(c)
                } else {
                    ' '
                }
            })
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    pub(crate) fn ratio(a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 100.0;
        }
        strsim::normalized_levenshtein(a, b) * 100.0
    }

    /// Best ratio of the shorter string against every same-length window
    /// of the longer one.
    pub(crate) fn partial_ratio(a: &str, b: &str) -> f64 {
        let (short, long) = if char_len(a) <= char_len(b) {
            (a, b)
        } else {
            (b, a)
        };
        let short_len = char_len(short);
        if short_len == 0 {
            return 0.0;
        }
        let long_chars: Vec<char> = long.chars().collect();
        if short_len == long_chars.len() {
            return ratio(short, long);
        }

        let mut best: f64 = 0.0;
        for window in long_chars.windows(short_len) {
            let window: String = window.iter().collect();
            best = best.max(ratio(short, &window));
            if best >= 100.0 {
                break;
            }
        }
        best
    }

    fn tokens(s: &str) -> BTreeSet<&str> {
        s.split_whitespace().collect()
    }

    fn sorted_tokens(s: &str) -> String {
        let mut words: Vec<&str> = s.split_whitespace().collect();
        words.sort_unstable();
        words.join(" ")
    }

    fn join(words: &BTreeSet<&str>) -> String {
        words.iter().copied().collect::<Vec<_>>().join(" ")
    }

    fn combine(head: &str, tail: &str) -> String {
        match (head.is_empty(), tail.is_empty()) {
            (true, _) => tail.to_string(),
            (_, true) => head.to_string(),
            _ => format!("{} {}", head, tail),
        }
    }

    fn token_set_ratio(a: &str, b: &str) -> f64 {
        let (ta, tb) = (tokens(a), tokens(b));
        let common: BTreeSet<&str> = ta.intersection(&tb).copied().collect();
        let only_a: BTreeSet<&str> = ta.difference(&tb).copied().collect();
        let only_b: BTreeSet<&str> = tb.difference(&ta).copied().collect();

        if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
            return 100.0;
        }

        let sect = join(&common);
        let with_a = combine(&sect, &join(&only_a));
        let with_b = combine(&sect, &join(&only_b));
        ratio(&sect, &with_a)
            .max(ratio(&sect, &with_b))
            .max(ratio(&with_a, &with_b))
    }

    fn token_ratio(a: &str, b: &str) -> f64 {
        ratio(&sorted_tokens(a), &sorted_tokens(b)).max(token_set_ratio(a, b))
    }

    fn partial_token_ratio(a: &str, b: &str) -> f64 {
        let (ta, tb) = (tokens(a), tokens(b));
        if ta.intersection(&tb).next().is_some() {
            return 100.0;
        }
        let only_a: BTreeSet<&str> = ta.difference(&tb).copied().collect();
        let only_b: BTreeSet<&str> = tb.difference(&ta).copied().collect();
        partial_ratio(&sorted_tokens(a), &sorted_tokens(b))
            .max(partial_ratio(&join(&only_a), &join(&only_b)))
    }

    /// Weighted ratio of two normalized strings, 0 to 100.
    pub(crate) fn wratio(a: &str, b: &str) -> f64 {
        let (len_a, len_b) = (char_len(a), char_len(b));
        if len_a == 0 || len_b == 0 {
            return 0.0;
        }

        let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;
        let mut best = ratio(a, b);

        if len_ratio < 1.5 {
            return best.max(token_ratio(a, b) * UNBASE_SCALE);
        }

        let partial_scale = if len_ratio < 8.0 { 0.9 } else { 0.6 };
        best = best.max(partial_ratio(a, b) * partial_scale);
        best.max(partial_token_ratio(a, b) * UNBASE_SCALE * partial_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityId, StoredMetadata};
    use chrono::Utc;

    fn entity(id: i64, name: &str, description: Option<&str>) -> Entity {
        let now = Utc::now();
        Entity {
            id: EntityId(id),
            kind: "person".to_string(),
            name: name.to_string(),
            slug: crate::types::slugify(name),
            description: description.map(str::to_string),
            tags: None,
            metadata: StoredMetadata::Valid(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn ids(ranked: &[RankedEntity]) -> Vec<i64> {
        ranked.iter().map(|r| r.entity.id.as_i64()).collect()
    }

    #[test]
    fn test_sequence_ratio_known_values() {
        assert_eq!(sequence_ratio(&chars("abcd"), &chars("abcd")), 1.0);
        assert_eq!(sequence_ratio(&chars(""), &chars("")), 1.0);
        assert_eq!(sequence_ratio(&chars("abc"), &chars("")), 0.0);
        assert_eq!(sequence_ratio(&chars("abc"), &chars("xyz")), 0.0);
        // "abcd" vs "bcde": one block "bcd" -> 2 * 3 / 8
        assert_eq!(sequence_ratio(&chars("abcd"), &chars("bcde")), 0.75);
        // Blocks "a" and "c" on either side of the mismatch
        assert!((sequence_ratio(&chars("abc"), &chars("axc")) - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_sequence_scorer_prefers_name() {
        let scorer = SequenceRatio;
        let by_name = entity(1, "ada", Some("something else entirely"));
        let by_description = entity(2, "zzz", Some("ada"));

        let name_score = scorer.score("ada", &by_name);
        let description_score = scorer.score("ada", &by_description);
        assert!((name_score - 120.0).abs() < 1e-9);
        assert!((description_score - 100.0).abs() < 1e-9);
        assert!(name_score > description_score);
    }

    #[test]
    fn test_sequence_scorer_case_folds() {
        let scorer = SequenceRatio;
        let e = entity(1, "ALICE", None);
        assert!((scorer.score("alice", &e) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_alice_over_bob_sequence() {
        let ranker = Ranker::new(Arc::new(SequenceRatio));
        let candidates = vec![entity(2, "Bob Jones", None), entity(1, "Alice Smith", None)];
        let ranked = ranker.rank("Alice", candidates, 10);
        assert_eq!(ids(&ranked), vec![1, 2]);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_rank_is_stable_and_truncates() {
        let ranker = Ranker::new(Arc::new(SequenceRatio));
        let candidates = vec![
            entity(1, "qqq", None),
            entity(2, "match", None),
            entity(3, "rrr", None),
            entity(4, "sss", None),
        ];
        let ranked = ranker.rank("match", candidates, 3);
        assert_eq!(ids(&ranked), vec![2, 1, 3]);
        assert_eq!(ranked[1].score, 0.0);
    }

    #[test]
    fn test_rank_blank_query_keeps_order() {
        let ranker = Ranker::new(Arc::new(SequenceRatio));
        let candidates = vec![entity(3, "c", None), entity(1, "a", None), entity(2, "b", None)];
        let ranked = ranker.rank("   ", candidates, 10);
        assert_eq!(ids(&ranked), vec![3, 1, 2]);
        assert!(ranked.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_rank_parallel_matches_sequential() {
        let candidates: Vec<Entity> = (0..50)
            .map(|i| entity(i, &format!("entity number {}", i), Some("filler")))
            .collect();
        let sequential = Ranker::new(Arc::new(SequenceRatio)).rank("number 42", candidates.clone(), 5);
        let parallel = Ranker::new(Arc::new(SequenceRatio))
            .with_parallel_threshold(1)
            .rank("number 42", candidates, 5);
        assert_eq!(ids(&sequential), ids(&parallel));
        assert_eq!(sequential[0].entity.id.as_i64(), 42);
    }

    #[test]
    fn test_scorer_choice_parse() {
        assert_eq!("auto".parse::<ScorerChoice>().unwrap(), ScorerChoice::Auto);
        assert_eq!("Weighted".parse::<ScorerChoice>().unwrap(), ScorerChoice::Weighted);
        assert_eq!("sequence".parse::<ScorerChoice>().unwrap(), ScorerChoice::Sequence);
        assert!("other".parse::<ScorerChoice>().is_err());
    }

    #[test]
    fn test_select_sequence() {
        assert_eq!(select_scorer(ScorerChoice::Sequence).name(), "sequence-ratio");
    }

    #[cfg(feature = "fuzzy")]
    mod fuzzy {
        use super::*;

        #[test]
        fn test_select_auto_prefers_weighted() {
            assert_eq!(select_scorer(ScorerChoice::Auto).name(), "weighted-ratio");
            assert_eq!(select_scorer(ScorerChoice::Weighted).name(), "weighted-ratio");
        }

        #[test]
        fn test_wratio_basics() {
            assert_eq!(weighted::wratio("", "anything"), 0.0);
            assert_eq!(weighted::wratio("same text", "same text"), 100.0);
            // Word order does not matter much
            assert!(weighted::wratio("lovelace ada", "ada lovelace") >= 90.0);
            // A fragment of a longer text scores highly
            assert!(weighted::wratio("lovelace", "ada lovelace mathematician") >= 80.0);
        }

        #[test]
        fn test_normalize() {
            assert_eq!(weighted::normalize("  Ada, LOVELACE! "), "ada  lovelace");
        }

        #[test]
        fn test_partial_ratio() {
            assert_eq!(weighted::partial_ratio("alice", "alice smith"), 100.0);
            assert_eq!(weighted::partial_ratio("", "alice"), 0.0);
        }

        #[test]
        fn test_rank_alice_over_bob_weighted() {
            let ranker = Ranker::new(Arc::new(WeightedRatio));
            let candidates = vec![entity(2, "Bob Jones", None), entity(1, "Alice Smith", None)];
            let ranked = ranker.rank("Alice", candidates, 10);
            assert_eq!(ids(&ranked), vec![1, 2]);
            assert!(ranked[0].score > ranked[1].score);
        }

        #[test]
        fn test_weighted_uses_description() {
            let scorer = WeightedRatio;
            let described = entity(1, "Ada", Some("analytical engine programmer"));
            let bare = entity(2, "Ada", None);
            assert!(scorer.score("engine", &described) > scorer.score("engine", &bare));
        }
    }
}
