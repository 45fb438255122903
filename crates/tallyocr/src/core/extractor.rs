//! Main extraction entry points.
//!
//! This module provides the [`BallotExtractor`] seam shared by the ensemble and the
//! self-correction controller, plus the top-level helpers that wire a
//! [`TallyConfig`] into a ready-to-run extractor.
//!
//! # Example
//!
//! ```rust,no_run
//! use tallyocr::core::config::{Credentials, TallyConfig};
//! use tallyocr::core::extractor::extract_ballot;
//!
//! # async fn example() -> tallyocr::Result<()> {
//! let config = TallyConfig::default();
//! let credentials = Credentials::from_env();
//! if let Some(result) = extract_ballot("scans/ส.ส.5ทับ18/page-1.png", None, &config, &credentials).await? {
//!     println!("{:?} (confidence {:.2})", result.votes(), result.confidence);
//! }
//! # Ok(())
//! # }
//! ```

use crate::Result;
use crate::backends::registry::BackendRegistry;
use crate::batch::{BatchOptions, BatchProcessor, ProgressObserver};
use crate::core::config::{Credentials, TallyConfig};
use crate::correction::SelfCorrectionController;
use crate::ensemble::EnsembleExtractor;
use crate::form_type::FormTypeHint;
use crate::types::{BallotExtractionResult, BatchResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Anything that turns one tally-form image into one result (or an explicit absence).
///
/// `Ok(None)` means every backend declined. `Err` is reserved for faults; the batch
/// processor retries the transient ones.
#[async_trait]
pub trait BallotExtractor: Send + Sync {
    async fn extract(&self, path: &Path, hint: Option<FormTypeHint>) -> Result<Option<BallotExtractionResult>>;

    /// Drop cached buffers and engine state. Called periodically by long batch runs.
    fn reclaim_resources(&self) {}
}

/// Build the extractor described by `config`.
///
/// The backend set comes from `config.backends`. With self-correction enabled the
/// ensemble is wrapped in a [`SelfCorrectionController`].
pub fn build_extractor(config: &TallyConfig, credentials: &Credentials) -> Result<Arc<dyn BallotExtractor>> {
    config.validate()?;

    let registry = BackendRegistry::from_config(config, credentials)?;
    let ensemble = EnsembleExtractor::from_registry(&registry);

    if config.correction.enabled {
        Ok(Arc::new(SelfCorrectionController::new(&ensemble, &config.correction)))
    } else {
        Ok(Arc::new(ensemble))
    }
}

/// Extract vote counts from a single image.
///
/// # Errors
///
/// Returns `TallyError::Configuration` for an invalid config and transport errors that
/// survived every backend. `Ok(None)` when no backend produced a result.
pub async fn extract_ballot(
    path: impl AsRef<Path>,
    hint: Option<FormTypeHint>,
    config: &TallyConfig,
    credentials: &Credentials,
) -> Result<Option<BallotExtractionResult>> {
    let extractor = build_extractor(config, credentials)?;
    extractor.extract(path.as_ref(), hint).await
}

/// Extract vote counts from many images concurrently.
///
/// Worker count, rate limit, retry policy and reclamation interval come from
/// `config.batch` and `config.retry`. Per-item failures are recorded in the returned
/// [`BatchResult`]; they never abort the run.
pub async fn batch_extract_ballots(
    paths: Vec<PathBuf>,
    config: &TallyConfig,
    credentials: &Credentials,
    observer: Option<Arc<dyn ProgressObserver>>,
) -> Result<BatchResult> {
    let extractor = build_extractor(config, credentials)?;
    let mut processor = BatchProcessor::new(extractor, BatchOptions::from_config(config));
    if let Some(observer) = observer {
        processor = processor.with_observer(observer);
    }
    Ok(processor.run(paths).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_extractor_rejects_invalid_config() {
        let mut config = TallyConfig::default();
        config.batch.workers = 0;
        assert!(build_extractor(&config, &Credentials::default()).is_err());
    }

    #[tokio::test]
    async fn test_extract_without_available_backends_is_absent() {
        let mut config = TallyConfig::default();
        config.backends = "openrouter:google/gemma-3-27b-it:free".to_string();

        let result = extract_ballot("page-1.png", None, &config, &Credentials::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
