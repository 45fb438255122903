//! Per-backend confidence scoring.
//!
//! A single backend's answer is scored from three observable signals, each recorded
//! as a named component of the result's [`ConfidenceBreakdown`]:
//!
//! | component          | weight | score                                              |
//! |--------------------|--------|----------------------------------------------------|
//! | `sum_consistency`  | 0.5    | 1.0 on exact match with the reported valid total   |
//! | `cross_validation` | 0.3    | numeral-vs-words agreement rate                    |
//! | `completeness`     | 0.2    | entries read / entries expected for the form type  |
//!
//! Missing signals score a neutral 0.5 so that a backend which cannot read written
//! words is not punished as hard as one that reads them and disagrees.

use crate::form_type::{CONSTITUENCY_ENTRIES, PARTY_LIST_ENTRIES};
use crate::types::{BallotExtractionResult, ConfidenceBreakdown, FormCategory};

pub const SUM_CONSISTENCY_WEIGHT: f64 = 0.5;
pub const CROSS_VALIDATION_WEIGHT: f64 = 0.3;
pub const COMPLETENESS_WEIGHT: f64 = 0.2;

const NEUTRAL: f64 = 0.5;

/// Agreement between the vote-map sum and the reported valid total.
///
/// Falls off linearly with the relative error.
pub fn sum_consistency(result: &BallotExtractionResult) -> f64 {
    let sum = result.vote_sum();
    match result.totals.valid {
        Some(valid) if valid == sum => 1.0,
        Some(0) => 0.0,
        Some(valid) => {
            let diff = valid.abs_diff(sum) as f64;
            (1.0 - diff / valid as f64).max(0.0)
        }
        None => NEUTRAL,
    }
}

/// Fraction of expected entries that were read, capped at 1.0.
pub fn completeness(result: &BallotExtractionResult) -> f64 {
    let expected = result
        .form_type
        .map(|hint| hint.expected_entries())
        .unwrap_or(match result.category {
            FormCategory::Constituency => CONSTITUENCY_ENTRIES,
            FormCategory::PartyList => PARTY_LIST_ENTRIES,
        });
    if expected == 0 {
        return 1.0;
    }
    (result.votes().len() as f64 / expected as f64).min(1.0)
}

/// Build the confidence breakdown for a single-backend result.
pub fn breakdown(result: &BallotExtractionResult) -> ConfidenceBreakdown {
    let mut breakdown = ConfidenceBreakdown::default();
    breakdown.push("sum_consistency", sum_consistency(result), SUM_CONSISTENCY_WEIGHT);
    breakdown.push(
        "cross_validation",
        result.cross_validation_rate().unwrap_or(NEUTRAL),
        CROSS_VALIDATION_WEIGHT,
    );
    breakdown.push("completeness", completeness(result), COMPLETENESS_WEIGHT);
    breakdown
}

/// Refresh the computed total, breakdown and scalar confidence in place.
pub fn score_result(result: &mut BallotExtractionResult) {
    result.recompute_total();
    result.confidence_breakdown = breakdown(result);
    result.confidence = result.confidence_breakdown.weighted_score();
}
