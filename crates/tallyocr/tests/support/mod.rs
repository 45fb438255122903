//! Shared mock backends for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tallyocr::backends::{ExtractOptions, RecognitionBackend};
use tallyocr::types::{BallotExtractionResult, FormCategory};
use tallyocr::{Result, TallyError, TransportKind};

/// What a [`MockBackend`] does when called.
#[derive(Debug, Clone)]
pub enum Outcome {
    Votes(BallotExtractionResult),
    Decline,
    Transient,
    Crash,
}

pub struct MockBackend {
    name: String,
    available: bool,
    outcome: Outcome,
    calls: AtomicUsize,
    seen: Mutex<Vec<ExtractOptions>>,
}

impl MockBackend {
    pub fn new(name: &str, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            available: true,
            outcome,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn unavailable(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            available: false,
            outcome: Outcome::Decline,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ExtractOptions> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RecognitionBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn extract(&self, _image: &Path, options: &ExtractOptions) -> Result<Option<BallotExtractionResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(*options);
        match &self.outcome {
            Outcome::Votes(result) => Ok(Some(result.clone())),
            Outcome::Decline => Ok(None),
            Outcome::Transient => Err(TallyError::transport(
                TransportKind::HttpStatus(503),
                self.name.clone(),
                "service unavailable",
            )),
            Outcome::Crash => Err(TallyError::backend(self.name.clone(), "engine crashed")),
        }
    }
}

/// Constituency result with the given votes, confidence and reported valid total.
pub fn ballot(backend: &str, confidence: f64, votes: &[(u32, u64)], valid: Option<u64>) -> BallotExtractionResult {
    let mut result = BallotExtractionResult::new("page-1.png", backend, FormCategory::Constituency);
    result.candidate_votes.extend(votes.iter().copied());
    result.totals.valid = valid;
    result.confidence = confidence;
    result.recompute_total();
    result
}

pub fn as_backend(backend: &Arc<MockBackend>) -> Arc<dyn RecognitionBackend> {
    Arc::clone(backend) as Arc<dyn RecognitionBackend>
}
