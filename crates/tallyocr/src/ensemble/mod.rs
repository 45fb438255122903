//! Ensemble extraction.
//!
//! [`EnsembleExtractor`] runs every available backend on one image concurrently and
//! reconciles their outputs with [`voting::vote`]. The form type is resolved before any
//! backend runs: an explicit hint wins, otherwise it is inferred from path text.
//!
//! Backends that decline or fail are dropped from the vote. An image for which no
//! backend produced anything is an explicit absence, never a fabricated result.

pub mod voting;

pub use voting::vote;

use crate::backends::spec::name_matches;
use crate::backends::{BackendRegistry, ExtractOptions, RecognitionBackend};
use crate::core::extractor::BallotExtractor;
use crate::form_type::{FormTypeHint, infer_from_path};
use crate::image::PreprocessMode;
use crate::types::{BackendResult, BallotExtractionResult};
use crate::{Result, TallyError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Concurrent multi-backend extractor.
#[derive(Clone, Default)]
pub struct EnsembleExtractor {
    backends: Vec<Arc<dyn RecognitionBackend>>,
    preprocessing: PreprocessMode,
}

impl std::fmt::Debug for EnsembleExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleExtractor")
            .field("backends", &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>())
            .field("preprocessing", &self.preprocessing)
            .finish()
    }
}

impl EnsembleExtractor {
    pub fn new(backends: Vec<Arc<dyn RecognitionBackend>>) -> Self {
        Self {
            backends,
            preprocessing: PreprocessMode::Standard,
        }
    }

    /// Every backend of the registry, in registration order.
    pub fn from_registry(registry: &BackendRegistry) -> Self {
        Self::new(registry.backends())
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessMode) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// A copy restricted to backends matching any selector (full name or kind).
    pub fn subset(&self, selectors: &[String]) -> Self {
        Self {
            backends: self
                .backends
                .iter()
                .filter(|b| selectors.iter().any(|s| name_matches(b.name(), s)))
                .cloned()
                .collect(),
            preprocessing: self.preprocessing,
        }
    }

    pub fn backends(&self) -> &[Arc<dyn RecognitionBackend>] {
        &self.backends
    }

    pub fn available_backends(&self) -> Vec<Arc<dyn RecognitionBackend>> {
        self.backends.iter().filter(|b| b.is_available()).cloned().collect()
    }

    pub fn preprocessing(&self) -> PreprocessMode {
        self.preprocessing
    }

    /// Extract one image with an explicit preprocessing mode.
    ///
    /// # Errors
    ///
    /// Individual backend failures are logged and dropped. An error is returned only
    /// when no backend produced a result and at least one failed transiently, so that
    /// the batch processor can retry the image.
    #[tracing::instrument(skip(self), fields(backends = self.backends.len()))]
    pub async fn extract_with_options(
        &self,
        path: &Path,
        hint: Option<FormTypeHint>,
        preprocessing: PreprocessMode,
    ) -> Result<Option<BallotExtractionResult>> {
        let available = self.available_backends();
        if available.is_empty() {
            tracing::debug!("No available backends");
            return Ok(None);
        }

        let form_type = hint.or_else(|| infer_from_path(path));
        if hint.is_none() && form_type.is_some() {
            tracing::debug!(form_type = ?form_type, "Form type inferred from path");
        }
        let options = ExtractOptions::new(form_type, preprocessing);

        if let [backend] = available.as_slice() {
            return match backend.extract(path, &options).await {
                Ok(result) => Ok(result),
                Err(e) if e.is_transient() => Err(e),
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "Backend failed");
                    Ok(None)
                }
            };
        }

        let (outcomes, transient_error) = dispatch(available, path, options).await;
        let results: Vec<BallotExtractionResult> = outcomes.into_iter().filter_map(|o| o.result).collect();

        if results.is_empty() {
            return match transient_error {
                Some(e) => Err(e),
                None => Ok(None),
            };
        }
        Ok(vote(results))
    }
}

/// Run every backend concurrently and wait for all of them.
///
/// Returns one [`BackendResult`] per backend (in completion order) and the first
/// transient error seen.
async fn dispatch(
    backends: Vec<Arc<dyn RecognitionBackend>>,
    path: &Path,
    options: ExtractOptions,
) -> (Vec<BackendResult>, Option<TallyError>) {
    let mut tasks = JoinSet::new();
    for backend in backends {
        let path: PathBuf = path.to_path_buf();
        tasks.spawn(async move {
            let started = Instant::now();
            let outcome = backend.extract(&path, &options).await;
            (backend.name().to_string(), started.elapsed(), outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    let mut transient_error = None;

    while let Some(task_result) = tasks.join_next().await {
        let (backend, elapsed, outcome) = match task_result {
            Ok(completed) => completed,
            Err(join_err) => {
                tracing::warn!(error = %join_err, "Backend task panicked");
                continue;
            }
        };

        let entry = match outcome {
            Ok(result) => {
                tracing::debug!(
                    backend = %backend,
                    elapsed_ms = elapsed.as_millis() as u64,
                    produced = result.is_some(),
                    "Backend finished"
                );
                BackendResult {
                    backend,
                    success: result.is_some(),
                    elapsed,
                    result,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "Backend failed");
                let message = e.to_string();
                if e.is_transient() && transient_error.is_none() {
                    transient_error = Some(e);
                }
                BackendResult {
                    backend,
                    success: false,
                    elapsed,
                    result: None,
                    error: Some(message),
                }
            }
        };
        outcomes.push(entry);
    }

    (outcomes, transient_error)
}

#[async_trait]
impl BallotExtractor for EnsembleExtractor {
    async fn extract(&self, path: &Path, hint: Option<FormTypeHint>) -> Result<Option<BallotExtractionResult>> {
        self.extract_with_options(path, hint, self.preprocessing).await
    }

    fn reclaim_resources(&self) {
        for backend in &self.backends {
            backend.release_resources();
        }
    }
}
