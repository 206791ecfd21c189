//! Tiered fuzzy scoring for file search.
//!
//! Each tier owns a disjoint score band, so an exact match always beats a
//! prefix match, which always beats a substring match, which always beats a
//! scattered subsequence match.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

pub const EXACT_SCORE: f64 = 1000.0;
const PREFIX_BASE: f64 = 800.0;
const SUBSTRING_BASE: f64 = 600.0;
const SUBSEQUENCE_BASE: f64 = 100.0;
const SUBSEQUENCE_SKIM_MAX: f64 = 300.0;
/// Width of the shorter-text bonus inside each band.
const LENGTH_BONUS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Subsequence,
    Substring,
    Prefix,
    Exact,
}

pub struct FuzzyScorer {
    matcher: SkimMatcherV2,
}

impl std::fmt::Debug for FuzzyScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzyScorer").finish()
    }
}

impl Default for FuzzyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzyScorer {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default().ignore_case(),
        }
    }

    pub fn score(&self, text: &str, query: &str) -> f64 {
        self.score_with_tier(text, query)
            .map(|(score, _)| score)
            .unwrap_or(0.0)
    }

    /// Score plus the tier that produced it; `None` when the query does not match.
    pub fn score_with_tier(&self, text: &str, query: &str) -> Option<(f64, MatchTier)> {
        if query.is_empty() || text.is_empty() {
            return None;
        }

        let text_lower = text.to_lowercase();
        let query_lower = query.to_lowercase();
        let text_len = text_lower.chars().count() as f64;
        let query_len = query_lower.chars().count() as f64;
        // In [0, 1): shorter texts relative to the query score higher
        let coverage = (query_len / text_len).min(1.0);

        if text_lower == query_lower {
            return Some((EXACT_SCORE, MatchTier::Exact));
        }
        if text_lower.starts_with(&query_lower) {
            return Some((PREFIX_BASE + 100.0 * coverage, MatchTier::Prefix));
        }
        if let Some(position) = text_lower.find(&query_lower) {
            let early = 1.0 - (position as f64 / text_lower.len() as f64);
            let score = SUBSTRING_BASE + LENGTH_BONUS * coverage + 49.0 * early;
            return Some((score, MatchTier::Substring));
        }

        let skim = self.matcher.fuzzy_match(text, query)?;
        let skim = (skim as f64).clamp(0.0, SUBSEQUENCE_SKIM_MAX);
        let score = SUBSEQUENCE_BASE + skim + LENGTH_BONUS * coverage;
        Some((score, MatchTier::Subsequence))
    }
}

/// Convenience wrapper around a throwaway [`FuzzyScorer`].
pub fn score(text: &str, query: &str) -> f64 {
    FuzzyScorer::new().score(text, query)
}
