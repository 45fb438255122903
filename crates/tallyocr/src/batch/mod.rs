//! Concurrent batch extraction.
//!
//! A bounded pool of tokio tasks (gated by a [`Semaphore`]) shares one
//! [`RateLimiter`]. Each item is retried on transient failures per the
//! [`RetryPolicy`], and outcomes are reported in completion order. Every
//! `reclaim_every` completions the extractor is asked to drop cached state.
//!
//! Per-item failures never abort the run: they are recorded in the [`BatchResult`].

pub mod rate_limit;
pub mod retry;

pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

use crate::core::config::TallyConfig;
use crate::core::extractor::BallotExtractor;
use crate::types::{BallotExtractionResult, BatchResult};
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Failure reason recorded when an image yields no result at all.
pub const NO_RESULT: &str = "no backend produced a result";

/// Hooks invoked by [`BatchProcessor::run`]. All methods default to no-ops.
///
/// `index` is the 1-based completion position, not the input position.
pub trait ProgressObserver: Send + Sync {
    fn on_batch_start(&self, _total: usize) {}

    fn on_item_done(&self, _index: usize, _total: usize, _path: &Path, _result: &BallotExtractionResult) {}

    fn on_item_failed(&self, _index: usize, _total: usize, _path: &Path, _error: &str) {}

    fn on_batch_done(&self, _successes: usize, _failures: usize) {}
}

/// Tuning for one batch run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    pub workers: usize,
    pub rate_limit_per_sec: f64,
    /// Completions between reclamation passes. Zero disables reclamation.
    pub reclaim_every: usize,
    pub retry: RetryPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&TallyConfig::default())
    }
}

impl BatchOptions {
    pub fn from_config(config: &TallyConfig) -> Self {
        Self {
            workers: config.batch.workers,
            rate_limit_per_sec: config.batch.rate_limit_per_sec,
            reclaim_every: config.batch.reclaim_every,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// Runs one extractor over many images.
pub struct BatchProcessor {
    extractor: Arc<dyn BallotExtractor>,
    options: BatchOptions,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl BatchProcessor {
    pub fn new(extractor: Arc<dyn BallotExtractor>, options: BatchOptions) -> Self {
        Self {
            extractor,
            options,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Process every path and wait for all of them.
    #[tracing::instrument(skip(self, paths), fields(total = paths.len(), workers = self.options.workers))]
    pub async fn run(&self, paths: Vec<PathBuf>) -> BatchResult {
        let total = paths.len();
        let started = Instant::now();
        if let Some(observer) = &self.observer {
            observer.on_batch_start(total);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let limiter = Arc::new(RateLimiter::new(self.options.rate_limit_per_sec));
        let retry = self.options.retry;

        let mut tasks = JoinSet::new();
        let mut task_paths = AHashMap::with_capacity(total);

        for path in paths {
            let extractor = Arc::clone(&self.extractor);
            let semaphore = Arc::clone(&semaphore);
            let limiter = Arc::clone(&limiter);
            let task_path = path.clone();

            let handle = tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = retry.run(&limiter, || extractor.extract(&task_path, None)).await;
                (task_path, outcome)
            });
            task_paths.insert(handle.id(), path);
        }

        let mut batch = BatchResult {
            total,
            ..Default::default()
        };
        let mut completed = 0usize;

        while let Some(joined) = tasks.join_next_with_id().await {
            completed += 1;

            match joined {
                Ok((_, (path, Ok(Some(result))))) => {
                    tracing::debug!(path = %path.display(), confidence = result.confidence, "Item extracted");
                    if let Some(observer) = &self.observer {
                        observer.on_item_done(completed, total, &path, &result);
                    }
                    batch.record_success(result);
                }
                Ok((_, (path, Ok(None)))) => self.fail(&mut batch, completed, total, path, NO_RESULT.to_string()),
                Ok((_, (path, Err(e)))) => self.fail(&mut batch, completed, total, path, e.to_string()),
                Err(join_err) => {
                    let path = task_paths.remove(&join_err.id()).unwrap_or_default();
                    self.fail(&mut batch, completed, total, path, format!("Task panicked: {}", join_err));
                }
            }

            let reclaim_every = self.options.reclaim_every;
            if reclaim_every > 0 && completed % reclaim_every == 0 {
                tracing::debug!(completed, "Reclaiming backend resources");
                self.extractor.reclaim_resources();
                batch.reclamation_events += 1;
            }
        }

        batch.finalize(started.elapsed());
        tracing::info!(
            succeeded = batch.succeeded,
            failed = batch.failed,
            elapsed_secs = batch.elapsed_secs,
            throughput = batch.throughput_per_sec,
            "Batch complete"
        );
        if let Some(observer) = &self.observer {
            observer.on_batch_done(batch.succeeded, batch.failed);
        }
        batch
    }

    fn fail(&self, batch: &mut BatchResult, index: usize, total: usize, path: PathBuf, error: String) {
        tracing::warn!(path = %path.display(), error = %error, "Item failed");
        if let Some(observer) = &self.observer {
            observer.on_item_failed(index, total, &path, &error);
        }
        batch.record_failure(path, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_type::FormTypeHint;
    use crate::types::FormCategory;
    use crate::{Result, TallyError};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ByName;

    #[async_trait]
    impl BallotExtractor for ByName {
        async fn extract(&self, path: &Path, _: Option<FormTypeHint>) -> Result<Option<BallotExtractionResult>> {
            let name = path.to_string_lossy();
            if name.contains("blank") {
                return Ok(None);
            }
            if name.contains("broken") {
                return Err(TallyError::validation("unreadable image"));
            }
            let mut result = BallotExtractionResult::new(name.to_string(), "stub", FormCategory::Constituency);
            result.candidate_votes.insert(1, 10);
            Ok(Some(result))
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressObserver for Recorder {
        fn on_batch_start(&self, total: usize) {
            self.events.lock().push(format!("start {}", total));
        }

        fn on_item_done(&self, index: usize, total: usize, _: &Path, _: &BallotExtractionResult) {
            self.events.lock().push(format!("done {}/{}", index, total));
        }

        fn on_item_failed(&self, index: usize, total: usize, _: &Path, error: &str) {
            self.events.lock().push(format!("failed {}/{}: {}", index, total, error));
        }

        fn on_batch_done(&self, successes: usize, failures: usize) {
            self.events.lock().push(format!("end {} {}", successes, failures));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_recorded() {
        let recorder = Arc::new(Recorder::default());
        let processor = BatchProcessor::new(Arc::new(ByName), BatchOptions::default()).with_observer(recorder.clone());

        let paths = vec![
            PathBuf::from("page-1.png"),
            PathBuf::from("blank/page-2.png"),
            PathBuf::from("broken/page-3.png"),
        ];
        let result = processor.run(paths).await;

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 2);
        assert!(result.failures.iter().any(|f| f.error == NO_RESULT));
        assert!(result.failures.iter().any(|f| f.error.contains("unreadable image")));

        let events = recorder.events.lock();
        assert_eq!(events.first().map(String::as_str), Some("start 3"));
        assert_eq!(events.last().map(String::as_str), Some("end 1 2"));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch() {
        let processor = BatchProcessor::new(Arc::new(ByName), BatchOptions::default());
        let result = processor.run(Vec::new()).await;
        assert_eq!(result.total, 0);
        assert_eq!(result.reclamation_events, 0);
    }

    #[test]
    fn test_options_from_config() {
        let options = BatchOptions::default();
        assert_eq!(options.workers, 5);
        assert_eq!(options.reclaim_every, 50);
        assert_eq!(options.retry.max_attempts, 3);
    }
}
