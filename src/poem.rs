//! Poem and quality records.
//!
//! A [`Poem`] is the artifact flowing from the generator through the evaluator
//! and refiner chain. Its attached [`Quality`] is produced by the evaluator
//! and replaced (never mutated in place) whenever a dimension is re-checked.
//!
//! Verse indexing: `verses` stores hemistichs in reading order — the opening
//! hemistich of bait 1, its closing hemistich, and so on. Bait indices are
//! 1-based in every user-facing summary.

use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;

/// A candidate or finished poem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poem {
    /// Hemistichs in reading order; even length in the finished state.
    pub verses: Vec<String>,
    /// Provider of the LLM that produced these verses.
    pub provider: String,
    /// Model identifier of the producing LLM.
    pub model: String,
    /// Immutable copy of the constraints at generation time.
    pub constraints: Constraints,
    /// Attached by the evaluator; `None` until the first evaluation.
    pub quality: Option<Quality>,
}

impl Poem {
    /// Build a poem from raw verses and the producing adapter's identity.
    #[must_use]
    pub fn new(
        verses: Vec<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        constraints: Constraints,
    ) -> Self {
        Self {
            verses,
            provider: provider.into(),
            model: model.into(),
            constraints,
            quality: None,
        }
    }

    /// Number of complete baits (pairs of hemistichs).
    #[must_use]
    pub fn bait_count(&self) -> usize {
        self.verses.len() / 2
    }

    /// Iterate over `(opening, closing)` hemistich pairs.
    ///
    /// A trailing unpaired hemistich (malformed generation output) is not
    /// yielded; the line-count dimension flags it instead.
    pub fn baits(&self) -> impl Iterator<Item = (&str, &str)> {
        self.verses
            .chunks_exact(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }

    /// The poem as display text, one hemistich per line.
    #[must_use]
    pub fn text(&self) -> String {
        self.verses.join("\n")
    }

    /// Overall score if evaluated, else 0.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.quality.as_ref().map_or(0.0, |q| q.overall_score)
    }

    /// Replace the attached quality, consuming self.
    #[must_use]
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }
}

/// The four validation dimensions of a quality assessment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Prosody,
    Rhyme,
    LineCount,
    Diacritics,
}

impl Dimension {
    /// All dimensions, in scoring-weight order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Prosody,
        Dimension::Rhyme,
        Dimension::LineCount,
        Dimension::Diacritics,
    ];

    /// Stable identifier used in summaries and capture payloads.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Prosody => "prosody",
            Dimension::Rhyme => "rhyme",
            Dimension::LineCount => "line_count",
            Dimension::Diacritics => "diacritics",
        }
    }
}

/// Why a dimension contributed a zero score without a real verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionDefect {
    /// The constraint set names no recognized meter, so prosody cannot run.
    BahrUnknown,
    /// The judge's reply could not be parsed.
    ParseError,
}

/// Verdict for a single bait within one dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaitResult {
    /// 1-based bait index.
    pub bait_index: usize,
    pub is_valid: bool,
    /// Judge-provided detail, e.g. the detected tafeelat pattern.
    pub detail: Option<String>,
}

/// Outcome of one validation dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionResult {
    pub is_valid: bool,
    /// Per-bait verdicts; empty for whole-poem checks that did not run.
    #[serde(default)]
    pub baits: Vec<BaitResult>,
    /// Human-readable summary with 1-based bait indices.
    pub summary: String,
    /// Present when the dimension degraded to zero without a verdict.
    pub defect: Option<DimensionDefect>,
}

impl DimensionResult {
    /// A passing result with no per-bait detail.
    #[must_use]
    pub fn valid(summary: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            baits: Vec::new(),
            summary: summary.into(),
            defect: None,
        }
    }

    /// A failing result with no per-bait detail.
    #[must_use]
    pub fn invalid(summary: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            baits: Vec::new(),
            summary: summary.into(),
            defect: None,
        }
    }

    /// A zero-contribution result caused by a defect rather than a verdict.
    #[must_use]
    pub fn defective(defect: DimensionDefect, summary: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            baits: Vec::new(),
            summary: summary.into(),
            defect: Some(defect),
        }
    }

    /// Fraction of baits that passed, in `[0, 1]`.
    ///
    /// Whole-poem results (no per-bait data) score 1 when valid, 0 otherwise.
    #[must_use]
    pub fn valid_ratio(&self) -> f64 {
        if self.defect.is_some() {
            return 0.0;
        }
        if self.baits.is_empty() {
            return if self.is_valid { 1.0 } else { 0.0 };
        }
        let valid = self.baits.iter().filter(|b| b.is_valid).count();
        valid as f64 / self.baits.len() as f64
    }

    /// 1-based indices of failing baits.
    #[must_use]
    pub fn invalid_bait_indices(&self) -> Vec<usize> {
        self.baits
            .iter()
            .filter(|b| !b.is_valid)
            .map(|b| b.bait_index)
            .collect()
    }
}

/// Quality assessment attached to a poem by the evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    /// Weighted mean of the four dimensions, in `[0, 1]`.
    pub overall_score: f64,
    /// Bait count at evaluation time; equals `verses.len() / 2`.
    pub total_baits: usize,
    pub prosody: DimensionResult,
    pub rhyme: DimensionResult,
    pub line_count: DimensionResult,
    pub diacritics: DimensionResult,
    /// Issues surfaced by any dimension, including degradation notes.
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Derived from configured thresholds at evaluation time.
    pub is_acceptable: bool,
}

impl Quality {
    /// The result for one dimension.
    #[must_use]
    pub fn dimension(&self, dim: Dimension) -> &DimensionResult {
        match dim {
            Dimension::Prosody => &self.prosody,
            Dimension::Rhyme => &self.rhyme,
            Dimension::LineCount => &self.line_count,
            Dimension::Diacritics => &self.diacritics,
        }
    }

    /// Replace the result for one dimension (used by partial re-evaluation).
    pub fn set_dimension(&mut self, dim: Dimension, result: DimensionResult) {
        match dim {
            Dimension::Prosody => self.prosody = result,
            Dimension::Rhyme => self.rhyme = result,
            Dimension::LineCount => self.line_count = result,
            Dimension::Diacritics => self.diacritics = result,
        }
    }

    /// One-line summary for logs and the harmony compiler.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "score {:.2} ({} baits; prosody {}, rhyme {}, line count {}, diacritics {})",
            self.overall_score,
            self.total_baits,
            mark(self.prosody.is_valid),
            mark(self.rhyme.is_valid),
            mark(self.line_count.is_valid),
            mark(self.diacritics.is_valid),
        )
    }
}

fn mark(valid: bool) -> &'static str {
    if valid { "ok" } else { "invalid" }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_poem() -> Poem {
        Poem::new(
            vec![
                "صدر البيت الأول".to_string(),
                "عجز البيت الأول".to_string(),
                "صدر البيت الثاني".to_string(),
                "عجز البيت الثاني".to_string(),
            ],
            "mock",
            "mock-model",
            Constraints::default(),
        )
    }

    #[test]
    fn bait_pairing() {
        let poem = sample_poem();
        assert_eq!(poem.bait_count(), 2);
        let baits: Vec<_> = poem.baits().collect();
        assert_eq!(baits[0].0, "صدر البيت الأول");
        assert_eq!(baits[1].1, "عجز البيت الثاني");
    }

    #[test]
    fn odd_verse_is_not_a_bait() {
        let mut poem = sample_poem();
        poem.verses.push("شطر يتيم".to_string());
        assert_eq!(poem.bait_count(), 2);
        assert_eq!(poem.baits().count(), 2);
    }

    #[test]
    fn valid_ratio_counts_baits() {
        let result = DimensionResult {
            is_valid: false,
            baits: vec![
                BaitResult { bait_index: 1, is_valid: true, detail: None },
                BaitResult { bait_index: 2, is_valid: false, detail: None },
            ],
            summary: String::new(),
            defect: None,
        };
        assert!((result.valid_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.invalid_bait_indices(), vec![2]);
    }

    #[test]
    fn defective_dimension_scores_zero() {
        let result = DimensionResult::defective(DimensionDefect::ParseError, "judge reply unusable");
        assert_eq!(result.valid_ratio(), 0.0);
    }
}
