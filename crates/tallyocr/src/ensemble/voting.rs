//! Consensus voting over per-backend results.
//!
//! Every vote-map key is decided independently by majority. Inputs are first ranked by
//! confidence (descending, then backend name ascending) so the outcome never depends on
//! the order in which backends finished. The top-ranked input is the *reference*: its
//! non-numeric fields are adopted and its value wins a tied vote when it is among the
//! tied values. Otherwise the tie goes to the highest-ranked input holding a tied value.

use crate::types::{BallotExtractionResult, EnsembleDetail, VoteMap};
use ahash::AHashMap;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Weight of the reference backend's own confidence in the blended score.
pub const REFERENCE_WEIGHT: f64 = 0.6;
/// Weight of the mean per-key agreement in the blended score.
pub const AGREEMENT_WEIGHT: f64 = 0.4;

/// Backend label carried by merged results.
pub const ENSEMBLE_BACKEND: &str = "ensemble";

/// Outcome of voting on one key.
#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyVote<T> {
    value: T,
    agreement: f64,
}

/// Sort inputs into voting rank order.
fn rank(results: &mut [BallotExtractionResult]) {
    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.backend.cmp(&b.backend))
    });
}

/// Majority vote over the present values, in rank order.
///
/// `reference` is the reference input's value, if it has one.
fn majority<T>(values: &[T], reference: Option<T>) -> Option<KeyVote<T>>
where
    T: Copy + Eq + std::hash::Hash,
{
    if values.is_empty() {
        return None;
    }

    let mut counts: AHashMap<T, usize> = AHashMap::with_capacity(values.len());
    for value in values {
        *counts.entry(*value).or_insert(0) += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    let is_tied = |value: &T| counts.get(value) == Some(&top);

    let value = match reference.filter(|r| is_tied(r)) {
        Some(value) => value,
        None => *values.iter().find(|v| is_tied(*v))?,
    };

    Some(KeyVote {
        value,
        agreement: top as f64 / values.len() as f64,
    })
}

/// Vote one map (candidate or party) across the ranked inputs.
fn vote_map(
    ranked: &[BallotExtractionResult],
    select: impl Fn(&BallotExtractionResult) -> &VoteMap,
) -> (VoteMap, BTreeMap<u32, f64>) {
    let keys: BTreeSet<u32> = ranked.iter().flat_map(|r| select(r).keys().copied()).collect();
    let reference = &ranked[0];

    let mut consensus = VoteMap::new();
    let mut agreement = BTreeMap::new();
    for key in keys {
        let values: Vec<u64> = ranked.iter().filter_map(|r| select(r).get(&key).copied()).collect();
        if let Some(vote) = majority(&values, select(reference).get(&key).copied()) {
            consensus.insert(key, vote.value);
            agreement.insert(key, vote.agreement);
        }
    }
    (consensus, agreement)
}

/// Vote a reported total. Inputs that did not report it abstain.
fn vote_total(ranked: &[BallotExtractionResult], select: impl Fn(&BallotExtractionResult) -> Option<u64>) -> Option<u64> {
    let values: Vec<u64> = ranked.iter().filter_map(&select).collect();
    majority(&values, select(&ranked[0])).map(|vote| vote.value)
}

/// Merge several backend results into one.
///
/// Returns `None` for no input and the input itself, untouched, for exactly one.
pub fn vote(mut results: Vec<BallotExtractionResult>) -> Option<BallotExtractionResult> {
    match results.len() {
        0 => return None,
        1 => return results.pop(),
        _ => {}
    }

    rank(&mut results);
    let ranked = results;

    let (candidate_votes, candidate_agreement) = vote_map(&ranked, |r| &r.candidate_votes);
    let (party_votes, party_agreement) = vote_map(&ranked, |r| &r.party_votes);

    let agreements: Vec<f64> = candidate_agreement
        .values()
        .chain(party_agreement.values())
        .copied()
        .collect();
    let mean_agreement = if agreements.is_empty() {
        0.0
    } else {
        agreements.iter().sum::<f64>() / agreements.len() as f64
    };

    let reference = &ranked[0];
    let reference_confidence = reference.confidence;
    let confidence = (REFERENCE_WEIGHT * reference_confidence + AGREEMENT_WEIGHT * mean_agreement).clamp(0.0, 1.0);

    let mut merged = reference.clone();
    merged.backend = ENSEMBLE_BACKEND.to_string();
    merged.candidate_votes = candidate_votes;
    merged.party_votes = party_votes;
    merged.totals.valid = vote_total(&ranked, |r| r.totals.valid);
    merged.totals.invalid = vote_total(&ranked, |r| r.totals.invalid);
    merged.totals.no_vote = vote_total(&ranked, |r| r.totals.no_vote);
    merged.recompute_total();

    merged.confidence = confidence;
    merged.confidence_breakdown = Default::default();
    merged
        .confidence_breakdown
        .push("reference_confidence", reference_confidence, REFERENCE_WEIGHT);
    merged.confidence_breakdown.push("agreement", mean_agreement, AGREEMENT_WEIGHT);

    merged.ensemble = Some(EnsembleDetail {
        backends: ranked.iter().map(|r| r.backend.clone()).collect(),
        reference_backend: reference.backend.clone(),
        candidate_agreement,
        party_agreement,
        mean_agreement,
    });

    tracing::debug!(
        inputs = ranked.len(),
        reference = %reference.backend,
        mean_agreement,
        confidence,
        "Consensus vote complete"
    );

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormCategory;

    fn result(backend: &str, confidence: f64, votes: &[(u32, u64)]) -> BallotExtractionResult {
        let mut result = BallotExtractionResult::new("page-1.png", backend, FormCategory::Constituency);
        result.candidate_votes.extend(votes.iter().copied());
        result.confidence = confidence;
        result.recompute_total();
        result
    }

    #[test]
    fn test_majority_unique_mode() {
        let vote = majority(&[153u64, 153, 150], Some(153)).unwrap();
        assert_eq!(vote.value, 153);
        assert!((vote.agreement - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_prefers_reference() {
        let vote = majority(&[10u64, 12], Some(12)).unwrap();
        assert_eq!(vote.value, 12);
        assert!((vote.agreement - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tie_without_reference_value_uses_rank_order() {
        // Reference lacks the key: the first-ranked holder wins.
        let vote = majority(&[7u64, 9], None).unwrap();
        assert_eq!(vote.value, 7);
    }

    #[test]
    fn test_tie_between_confidence_broken_by_name() {
        let a = result("b-backend", 0.5, &[(1, 10)]);
        let b = result("a-backend", 0.5, &[(1, 11)]);
        let merged = vote(vec![a, b]).unwrap();
        assert_eq!(merged.ensemble.as_ref().unwrap().reference_backend, "a-backend");
        assert_eq!(merged.candidate_votes[&1], 11);
    }

    #[test]
    fn test_key_missing_from_some_inputs() {
        let a = result("a", 0.9, &[(1, 10), (2, 5)]);
        let b = result("b", 0.8, &[(1, 10)]);
        let merged = vote(vec![a, b]).unwrap();

        assert_eq!(merged.candidate_votes, VoteMap::from([(1, 10), (2, 5)]));
        let detail = merged.ensemble.unwrap();
        assert_eq!(detail.candidate_agreement[&2], 1.0);
        assert_eq!(merged.totals.computed, 15);
    }

    #[test]
    fn test_reported_totals_voted() {
        let mut a = result("a", 0.9, &[(1, 10)]);
        let mut b = result("b", 0.8, &[(1, 10)]);
        let mut c = result("c", 0.7, &[(1, 10)]);
        a.totals.valid = Some(11);
        b.totals.valid = Some(10);
        c.totals.valid = Some(10);
        c.totals.invalid = Some(2);

        let merged = vote(vec![a, b, c]).unwrap();
        assert_eq!(merged.totals.valid, Some(10));
        assert_eq!(merged.totals.invalid, Some(2));
        assert_eq!(merged.totals.no_vote, None);
    }

    #[test]
    fn test_empty_vote_maps_score_zero_agreement() {
        let a = result("a", 0.5, &[]);
        let b = result("b", 0.5, &[]);
        let merged = vote(vec![a, b]).unwrap();
        assert!((merged.confidence - 0.3).abs() < 1e-9);
        assert_eq!(merged.ensemble.unwrap().mean_agreement, 0.0);
    }

    #[test]
    fn test_no_input_is_absent() {
        assert!(vote(Vec::new()).is_none());
    }
}
