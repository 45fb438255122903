use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::form_type::FormTypeHint;

/// Ballot position (or party number) to vote count.
///
/// Ordered so that serialized output and voting diagnostics are stable.
pub type VoteMap = BTreeMap<u32, u64>;

/// Which ballot a tally form reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormCategory {
    /// Single-member-district ballot: votes per candidate position.
    #[default]
    Constituency,
    /// Party-list ballot: votes per party number.
    PartyList,
}

/// Aggregate totals printed on the form, plus the total computed from the vote map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTotals {
    /// Valid-ballot total as written on the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<u64>,
    /// Invalid (spoiled) ballots as written on the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<u64>,
    /// "No vote" ballots as written on the form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_vote: Option<u64>,
    /// Sum of the active vote map. Always derived, never read off the page.
    pub computed: u64,
}

/// One named, weighted contribution to a confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponent {
    pub name: String,
    pub score: f64,
    pub weight: f64,
}

/// Structured explanation of a scalar confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub components: Vec<ConfidenceComponent>,
}

impl ConfidenceBreakdown {
    pub fn push(&mut self, name: impl Into<String>, score: f64, weight: f64) {
        self.components.push(ConfidenceComponent {
            name: name.into(),
            score,
            weight,
        });
    }

    /// Weighted mean of the components, clamped to `[0, 1]`.
    ///
    /// Returns 0.0 when there are no components or all weights are zero.
    pub fn weighted_score(&self) -> f64 {
        let total_weight: f64 = self.components.iter().map(|c| c.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self.components.iter().map(|c| c.score * c.weight).sum();
        (weighted / total_weight).clamp(0.0, 1.0)
    }

    pub fn get(&self, name: &str) -> Option<&ConfidenceComponent> {
        self.components.iter().find(|c| c.name == name)
    }
}

/// Diagnostics attached to a result produced by consensus voting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDetail {
    /// Backends whose results took part in the vote, in confidence order.
    pub backends: Vec<String>,
    /// Backend whose non-numeric fields were adopted.
    pub reference_backend: String,
    /// Agreement rate per candidate position.
    pub candidate_agreement: BTreeMap<u32, f64>,
    /// Agreement rate per party number.
    pub party_agreement: BTreeMap<u32, f64>,
    /// Mean agreement over every voted key.
    pub mean_agreement: f64,
}

/// Structured vote counts read from one tally-form image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallotExtractionResult {
    /// Image the result was read from.
    pub source_image: String,
    /// Backend (or `ensemble`) that produced the result.
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_type: Option<FormTypeHint>,
    pub category: FormCategory,
    /// Form code text as printed on the page (for example `ส.ส. 5/18`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_code: Option<String>,
    /// 1-based page number inside the source document.
    pub page: u32,
    pub candidate_votes: VoteMap,
    pub party_votes: VoteMap,
    /// Per-entry agreement between the numeral and the written-words count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cross_validation: BTreeMap<u32, bool>,
    pub totals: VoteTotals,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    pub confidence_breakdown: ConfidenceBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<EnsembleDetail>,
}

impl BallotExtractionResult {
    pub fn new(source_image: impl Into<String>, backend: impl Into<String>, category: FormCategory) -> Self {
        Self {
            source_image: source_image.into(),
            backend: backend.into(),
            form_type: None,
            category,
            form_code: None,
            page: 1,
            candidate_votes: VoteMap::new(),
            party_votes: VoteMap::new(),
            cross_validation: BTreeMap::new(),
            totals: VoteTotals::default(),
            confidence: 0.0,
            confidence_breakdown: ConfidenceBreakdown::default(),
            ensemble: None,
        }
    }

    /// The vote map that matters for this form's category.
    pub fn votes(&self) -> &VoteMap {
        match self.category {
            FormCategory::Constituency => &self.candidate_votes,
            FormCategory::PartyList => &self.party_votes,
        }
    }

    pub fn votes_mut(&mut self) -> &mut VoteMap {
        match self.category {
            FormCategory::Constituency => &mut self.candidate_votes,
            FormCategory::PartyList => &mut self.party_votes,
        }
    }

    pub fn vote_sum(&self) -> u64 {
        self.votes().values().sum()
    }

    /// Refresh `totals.computed` from the active vote map.
    pub fn recompute_total(&mut self) {
        self.totals.computed = self.vote_sum();
    }

    /// `true` when a valid total is reported and the vote map sums to it exactly.
    pub fn is_self_consistent(&self) -> bool {
        self.totals.valid == Some(self.vote_sum())
    }

    /// Fraction of cross-validated entries whose numeral matched the written words.
    ///
    /// `None` when the backend produced no cross-validation data.
    pub fn cross_validation_rate(&self) -> Option<f64> {
        if self.cross_validation.is_empty() {
            return None;
        }
        let agreed = self.cross_validation.values().filter(|ok| **ok).count();
        Some(agreed as f64 / self.cross_validation.len() as f64)
    }
}

/// Outcome of one backend call inside an ensemble dispatch.
#[derive(Debug, Clone)]
pub struct BackendResult {
    pub backend: String,
    pub success: bool,
    pub elapsed: Duration,
    pub result: Option<BallotExtractionResult>,
    pub error: Option<String>,
}

/// A batch item that produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub successes: Vec<BallotExtractionResult>,
    pub failures: Vec<BatchFailure>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    /// Completed items per second of wall time.
    pub throughput_per_sec: f64,
    /// Number of cooperative resource-reclamation passes performed.
    pub reclamation_events: usize,
}

impl BatchResult {
    pub(crate) fn record_success(&mut self, result: BallotExtractionResult) {
        self.succeeded += 1;
        self.successes.push(result);
    }

    pub(crate) fn record_failure(&mut self, path: PathBuf, error: String) {
        self.failed += 1;
        self.failures.push(BatchFailure { path, error });
    }

    pub(crate) fn finalize(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
        let completed = (self.succeeded + self.failed) as f64;
        self.throughput_per_sec = if self.elapsed_secs > 0.0 {
            completed / self.elapsed_secs
        } else {
            0.0
        };
    }
}
