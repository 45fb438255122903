//! Ensemble dispatch and consensus voting tests.

mod support;

use std::path::Path;
use support::{MockBackend, Outcome, as_backend, ballot};
use tallyocr::ensemble::vote;
use tallyocr::{BallotExtractor, EnsembleExtractor, FormTypeHint, VoteMap, infer_from_path};

fn three_readings() -> Vec<tallyocr::BallotExtractionResult> {
    vec![
        ballot("openrouter:a", 0.9, &[(1, 153), (2, 4), (3, 95)], None),
        ballot("nim:b", 0.6, &[(1, 153), (2, 4), (3, 90)], None),
        ballot("tesseract", 0.5, &[(1, 150), (2, 4), (3, 95)], None),
    ]
}

#[test]
fn test_majority_vote_worked_example() {
    let merged = vote(three_readings()).unwrap();

    assert_eq!(merged.candidate_votes, VoteMap::from([(1, 153), (2, 4), (3, 95)]));
    assert_eq!(merged.totals.computed, 252);
    assert!((merged.confidence - 0.851).abs() < 1e-3, "confidence {}", merged.confidence);
    assert_eq!(merged.backend, "ensemble");

    let detail = merged.ensemble.unwrap();
    assert_eq!(detail.reference_backend, "openrouter:a");
    assert_eq!(detail.backends, vec!["openrouter:a", "nim:b", "tesseract"]);
    assert_eq!(detail.candidate_agreement[&2], 1.0);
    assert!((detail.candidate_agreement[&1] - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_vote_is_order_independent() {
    let readings = three_readings();
    let expected = vote(readings.clone()).unwrap();

    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    for order in orders {
        let permuted = order.iter().map(|&i| readings[i].clone()).collect();
        assert_eq!(vote(permuted).unwrap(), expected, "order {:?}", order);
    }
}

#[test]
fn test_merged_total_matches_vote_map() {
    let mut readings = three_readings();
    readings[1].candidate_votes.insert(4, 12);
    readings[2].totals.valid = Some(999);

    let merged = vote(readings).unwrap();
    assert_eq!(merged.totals.computed, merged.candidate_votes.values().sum::<u64>());
    assert_eq!(merged.candidate_votes.get(&4), Some(&12));
}

#[tokio::test]
async fn test_single_available_backend_is_passthrough() {
    let reading = ballot("tesseract", 0.42, &[(1, 10), (2, 20)], Some(31));
    let only = MockBackend::new("tesseract", Outcome::Votes(reading.clone()));
    let offline = MockBackend::unavailable("openrouter:m");

    let ensemble = EnsembleExtractor::new(vec![as_backend(&only), as_backend(&offline)]);
    let result = ensemble.extract(Path::new("page-1.png"), None).await.unwrap().unwrap();

    assert_eq!(result, reading);
    assert_eq!(offline.calls(), 0);
}

#[tokio::test]
async fn test_ensemble_votes_over_backends() {
    let backends: Vec<_> = three_readings()
        .into_iter()
        .map(|r| MockBackend::new(&r.backend.clone(), Outcome::Votes(r)))
        .collect();
    let failing = MockBackend::new("anthropic:c", Outcome::Crash);

    let mut all: Vec<_> = backends.iter().map(as_backend).collect();
    all.push(as_backend(&failing));
    let ensemble = EnsembleExtractor::new(all);

    let result = ensemble.extract(Path::new("page-1.png"), None).await.unwrap().unwrap();
    assert_eq!(result.candidate_votes, VoteMap::from([(1, 153), (2, 4), (3, 95)]));
    assert_eq!(result.ensemble.unwrap().backends.len(), 3);
    assert!(backends.iter().all(|b| b.calls() == 1));
}

#[tokio::test]
async fn test_party_list_path_inferred_without_backend_calls() {
    let path = Path::new("/scans/เขต 2/ส.ส.5ทับ17 (บช)/page-1.png");
    assert_eq!(infer_from_path(path), Some(FormTypeHint::Form5_17PartyList));

    let backend = MockBackend::new("tesseract", Outcome::Decline);
    let ensemble = EnsembleExtractor::new(vec![as_backend(&backend)]);
    ensemble.extract(path, None).await.unwrap();

    assert_eq!(backend.calls(), 1, "only the extraction call itself");
    assert_eq!(backend.seen()[0].form_type, Some(FormTypeHint::Form5_17PartyList));
}

#[tokio::test]
async fn test_explicit_hint_wins_over_path() {
    let backend = MockBackend::new("tesseract", Outcome::Decline);
    let ensemble = EnsembleExtractor::new(vec![as_backend(&backend)]);
    ensemble
        .extract(Path::new("ส.ส.5ทับ17 (บช)/page-1.png"), Some(FormTypeHint::Form5_16))
        .await
        .unwrap();
    assert_eq!(backend.seen()[0].form_type, Some(FormTypeHint::Form5_16));
}

#[tokio::test]
async fn test_all_backends_failing_is_absence() {
    let ensemble = EnsembleExtractor::new(vec![
        as_backend(&MockBackend::new("tesseract", Outcome::Decline)),
        as_backend(&MockBackend::new("trocr", Outcome::Crash)),
    ]);
    assert!(ensemble.extract(Path::new("page-1.png"), None).await.unwrap().is_none());

    let ensemble = EnsembleExtractor::new(vec![as_backend(&MockBackend::unavailable("tesseract"))]);
    assert!(ensemble.extract(Path::new("page-1.png"), None).await.unwrap().is_none());
}
