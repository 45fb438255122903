//! Two-pass self-correction.
//!
//! Pass 1 runs only the cheap local engines. When their answer is trustworthy it is
//! returned immediately and no cloud call is made. Otherwise pass 2 escalates: the form
//! type is re-checked, preprocessing is forced to [`PreprocessMode::Aggressive`] and the
//! full backend set runs. The better of the two passes is kept.

use crate::Result;
use crate::core::config::CorrectionConfig;
use crate::core::extractor::BallotExtractor;
use crate::ensemble::EnsembleExtractor;
use crate::form_type::{CONSTITUENCY_ENTRIES, FormTypeHint, infer_from_path};
use crate::image::PreprocessMode;
use crate::types::BallotExtractionResult;
use async_trait::async_trait;
use std::path::Path;

/// Minimum numeral/words agreement for a result without a reported total.
pub const MIN_CROSS_VALIDATION_RATE: f64 = 0.5;

/// Whether a result can be accepted without escalation.
///
/// Trustworthy when the vote map sums exactly to the reported valid total. With no
/// valid total on the form, a result is trustworthy when at least half of its
/// cross-validated entries agree and its computed total matches the vote map.
///
/// Exact-sum acceptance is weak evidence on forms with very few entries: two misread
/// counts can still add up. It is kept because it is the strongest check available
/// without a second engine.
pub fn is_trustworthy(result: &BallotExtractionResult) -> bool {
    let sum = result.vote_sum();
    match result.totals.valid {
        Some(valid) => valid == sum,
        None => {
            result
                .cross_validation_rate()
                .is_some_and(|rate| rate >= MIN_CROSS_VALIDATION_RATE)
                && result.totals.computed == sum
        }
    }
}

/// Re-derive the form type ahead of the escalated pass.
///
/// Starts from the caller's hint, then path inference, then pass 1's own tag. If pass 1
/// read more than twice the constituency entry count, the page is a party-list layout
/// whatever the path said.
pub fn reverify_form_type(
    path: &Path,
    hint: Option<FormTypeHint>,
    first_pass: Option<&BallotExtractionResult>,
) -> Option<FormTypeHint> {
    let base = hint
        .or_else(|| infer_from_path(path))
        .or_else(|| first_pass.and_then(|r| r.form_type))?;

    let entries = first_pass.map(|r| r.votes().len()).unwrap_or(0);
    if entries > CONSTITUENCY_ENTRIES * 2 && !base.is_party_list() {
        tracing::info!(
            from = %base,
            entries,
            "Layout looks like a party list, switching form type"
        );
        return Some(base.as_party_list());
    }
    Some(base)
}

/// Wraps two ensembles: a local-only first pass and an escalated second pass.
#[derive(Debug, Clone)]
pub struct SelfCorrectionController {
    first_pass: EnsembleExtractor,
    second_pass: EnsembleExtractor,
    reverify: bool,
}

impl SelfCorrectionController {
    /// Derive both passes from one ensemble.
    ///
    /// Pass 1 keeps the backends named in `config.pass1_backends`; pass 2 keeps
    /// `config.pass2_backends`, or all of them when unset.
    pub fn new(ensemble: &EnsembleExtractor, config: &CorrectionConfig) -> Self {
        let first_pass = ensemble
            .subset(&config.pass1_backends)
            .with_preprocessing(PreprocessMode::Standard);
        let second_pass = match &config.pass2_backends {
            Some(names) => ensemble.subset(names),
            None => ensemble.clone(),
        }
        .with_preprocessing(PreprocessMode::Aggressive);

        Self::from_parts(first_pass, second_pass, config.reverify_form_type)
    }

    pub fn from_parts(first_pass: EnsembleExtractor, second_pass: EnsembleExtractor, reverify: bool) -> Self {
        Self {
            first_pass,
            second_pass,
            reverify,
        }
    }

    /// Pick between the two passes.
    fn resolve(
        first: Option<BallotExtractionResult>,
        second: Option<BallotExtractionResult>,
    ) -> Option<BallotExtractionResult> {
        match (first, second) {
            (first, None) => first,
            (None, second) => second,
            (Some(first), Some(second)) => {
                if is_trustworthy(&second) || second.confidence > first.confidence {
                    Some(second)
                } else {
                    Some(first)
                }
            }
        }
    }
}

#[async_trait]
impl BallotExtractor for SelfCorrectionController {
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    async fn extract(&self, path: &Path, hint: Option<FormTypeHint>) -> Result<Option<BallotExtractionResult>> {
        let first = match self
            .first_pass
            .extract_with_options(path, hint, self.first_pass.preprocessing())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "First pass failed");
                None
            }
        };

        if let Some(result) = first.as_ref().filter(|r| is_trustworthy(r)) {
            tracing::debug!(confidence = result.confidence, "First pass trusted");
            return Ok(first);
        }

        let escalated_hint = if self.reverify {
            reverify_form_type(path, hint, first.as_ref())
        } else {
            hint
        };
        tracing::info!(
            first_pass = first.is_some(),
            form_type = ?escalated_hint,
            "Escalating to second pass"
        );

        let second = match self
            .second_pass
            .extract_with_options(path, escalated_hint, PreprocessMode::Aggressive)
            .await
        {
            Ok(result) => result,
            Err(e) if first.is_some() => {
                tracing::warn!(error = %e, "Second pass failed, keeping first pass");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self::resolve(first, second))
    }

    fn reclaim_resources(&self) {
        self.first_pass.reclaim_resources();
        self.second_pass.reclaim_resources();
    }
}
