//! Weighted scoring and acceptance thresholds.

use crate::config::{EvaluationThresholds, ScoringWeights};
use crate::poem::DimensionResult;

/// Weighted mean of the four dimension ratios, normalized into `[0, 1]`.
#[must_use]
pub fn overall_score(
    weights: &ScoringWeights,
    prosody: &DimensionResult,
    rhyme: &DimensionResult,
    line_count: &DimensionResult,
    diacritics: &DimensionResult,
) -> f64 {
    let weight_sum = weights.prosody + weights.rhyme + weights.line_count + weights.diacritics;
    if weight_sum <= 0.0 {
        return 0.0;
    }
    let weighted = weights.prosody * prosody.valid_ratio()
        + weights.rhyme * rhyme.valid_ratio()
        + weights.line_count * line_count.valid_ratio()
        + weights.diacritics * diacritics.valid_ratio();
    (weighted / weight_sum).clamp(0.0, 1.0)
}

/// Acceptance: overall above the floor, and prosody/rhyme individually above
/// theirs.
#[must_use]
pub fn is_acceptable(
    thresholds: &EvaluationThresholds,
    overall: f64,
    prosody: &DimensionResult,
    rhyme: &DimensionResult,
) -> bool {
    overall >= thresholds.min_overall
        && prosody.valid_ratio() >= thresholds.min_prosody
        && rhyme.valid_ratio() >= thresholds.min_rhyme
}
