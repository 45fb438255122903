//! Handwriting backend.
//!
//! Tally forms carry the vote counts as handwritten digits in the rightmost column.
//! This backend crops that column, binarizes it, splits it into rows with a projection
//! profile and hands the row images to a line recognizer (a seq2seq handwriting model
//! run as a local subprocess). Row `i` (top to bottom) is read as position `i + 1`.

use crate::backends::subprocess::{command_exists, run_command};
use crate::backends::{ExtractOptions, RecognitionBackend};
use crate::core::config::HandwritingConfig;
use crate::form_type::FormTypeHint;
use crate::image::{PreprocessMode, RegionCropper, page_number_from_path, preprocess, segment_rows};
use crate::scoring::score_result;
use crate::text::parse_count;
use crate::types::BallotExtractionResult;
use crate::{Result, TallyError};
use async_trait::async_trait;
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "trocr";

/// Reads one text line per row image.
#[async_trait]
pub trait LineRecognizer: Send + Sync {
    /// Recognize every row. The output has one entry per input row, in order.
    async fn recognize(&self, rows: Vec<GrayImage>) -> Result<Vec<String>>;

    fn is_ready(&self) -> bool;

    fn hint(&self) -> String {
        "handwriting recognizer is not installed".to_string()
    }
}

/// Runs an external recognizer: `<command> <model_dir> <rows_dir>`.
///
/// Rows are written as `row-000.png`, `row-001.png`, ... and the command prints one
/// line per image in file-name order.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    command: String,
    model_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandRecognizer {
    pub fn new(command: impl Into<String>, model_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            model_dir,
            timeout,
        }
    }
}

#[async_trait]
impl LineRecognizer for CommandRecognizer {
    async fn recognize(&self, rows: Vec<GrayImage>) -> Result<Vec<String>> {
        let Some(model_dir) = self.model_dir.clone() else {
            return Err(TallyError::MissingDependency(
                "handwriting.model_dir is not configured".to_string(),
            ));
        };
        let expected = rows.len();

        let rows_dir = tokio::task::spawn_blocking(move || -> Result<tempfile::TempDir> {
            let dir = tempfile::Builder::new().prefix("tallyocr-rows-").tempdir()?;
            for (index, row) in rows.iter().enumerate() {
                row.save(dir.path().join(format!("row-{:03}.png", index)))?;
            }
            Ok(dir)
        })
        .await
        .map_err(|e| TallyError::image_processing(format!("Row export task failed: {}", e)))??;

        let args = [model_dir.into_os_string(), rows_dir.path().as_os_str().to_owned()];
        let stdout = run_command(NAME, &self.command, args, self.timeout).await?;

        let mut lines: Vec<String> = stdout.lines().map(|line| line.trim().to_string()).collect();
        if lines.len() != expected {
            tracing::debug!(
                expected,
                received = lines.len(),
                "Recognizer line count does not match row count"
            );
        }
        lines.resize(expected, String::new());
        Ok(lines)
    }

    fn is_ready(&self) -> bool {
        command_exists(&self.command) && self.model_dir.as_deref().is_some_and(Path::is_dir)
    }

    fn hint(&self) -> String {
        format!(
            "Install '{}' and point handwriting.model_dir at the model weights",
            self.command
        )
    }
}

/// Column crop + row segmentation + line recognizer.
#[derive(Clone)]
pub struct HandwritingBackend {
    recognizer: Arc<dyn LineRecognizer>,
    min_row_height: u32,
}

impl std::fmt::Debug for HandwritingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandwritingBackend")
            .field("min_row_height", &self.min_row_height)
            .finish_non_exhaustive()
    }
}

impl HandwritingBackend {
    pub fn from_config(config: &HandwritingConfig, timeout: Duration) -> Self {
        let recognizer = CommandRecognizer::new(config.command.clone(), config.model_dir.clone(), timeout);
        Self::with_recognizer(Arc::new(recognizer), config.min_row_height)
    }

    pub fn with_recognizer(recognizer: Arc<dyn LineRecognizer>, min_row_height: u32) -> Self {
        Self {
            recognizer,
            min_row_height,
        }
    }

    /// Crop, binarize and split the vote column into row images.
    fn column_rows(image: &Path, hint: FormTypeHint, min_row_height: u32) -> Result<Vec<GrayImage>> {
        let column = RegionCropper::for_hint(hint).vote_column(image)?;
        let binary = preprocess(&column, PreprocessMode::Aggressive).to_luma8();
        let width = binary.width();

        Ok(segment_rows(&binary, min_row_height)
            .into_iter()
            .map(|span| image::imageops::crop_imm(&binary, 0, span.top, width, span.height()).to_image())
            .collect())
    }
}

#[async_trait]
impl RecognitionBackend for HandwritingBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.recognizer.is_ready()
    }

    fn availability_hint(&self) -> String {
        self.recognizer.hint()
    }

    #[tracing::instrument(skip(self, options), fields(backend = NAME))]
    async fn extract(&self, image: &Path, options: &ExtractOptions) -> Result<Option<BallotExtractionResult>> {
        if !self.is_available() {
            tracing::debug!("Handwriting recognizer not ready, declining");
            return Ok(None);
        }

        // Rows are numbered from the top of the column, which is only the ballot
        // position on page 1. Continuation pages start at an unknown position.
        let page = page_number_from_path(image);
        if page > 1 {
            tracing::debug!(page, "Continuation page, row numbers are not ballot positions, declining");
            return Ok(None);
        }

        // Without a hint the constituency layout is the better guess for the column.
        let hint = options.form_type.unwrap_or(FormTypeHint::Form5_18);
        let path = image.to_path_buf();
        let min_row_height = self.min_row_height;
        let rows = tokio::task::spawn_blocking(move || Self::column_rows(&path, hint, min_row_height))
            .await
            .map_err(|e| TallyError::image_processing(format!("Segmentation task failed: {}", e)))??;

        if rows.is_empty() {
            tracing::debug!("No handwritten rows found");
            return Ok(None);
        }
        tracing::debug!(rows = rows.len(), "Segmented vote column");

        let lines = self.recognizer.recognize(rows).await?;

        let category = options.form_type.map(|h| h.category()).unwrap_or_default();
        let mut result = BallotExtractionResult::new(image.display().to_string(), NAME, category);
        result.form_type = options.form_type;
        result.page = page;

        let votes = result.votes_mut();
        for (index, line) in lines.iter().enumerate() {
            if let Some(count) = parse_count(line) {
                votes.insert(index as u32 + 1, count);
            }
        }
        if result.votes().is_empty() {
            tracing::debug!("Recognizer output held no counts");
            return Ok(None);
        }

        score_result(&mut result);
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};
    use parking_lot::Mutex;

    struct FixedRecognizer {
        lines: Vec<&'static str>,
        seen_rows: Mutex<usize>,
    }

    #[async_trait]
    impl LineRecognizer for FixedRecognizer {
        async fn recognize(&self, rows: Vec<GrayImage>) -> Result<Vec<String>> {
            *self.seen_rows.lock() = rows.len();
            Ok(self.lines.iter().map(|s| s.to_string()).collect())
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    /// White page with three dark bands inside the vote column.
    fn write_form(dir: &Path, name: &str) -> PathBuf {
        let (width, height) = (400u32, 1000u32);
        let mut page = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
        for band in [400u32, 500, 600] {
            for y in band..band + 30 {
                for x in 345..395 {
                    page.put_pixel(x, y, image::Rgb([0, 0, 0]));
                }
            }
        }
        let path = dir.join(name);
        page.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_rows_become_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_form(dir.path(), "page-1.png");

        let recognizer = Arc::new(FixedRecognizer {
            lines: vec!["153", "สี่", "๙๕"],
            seen_rows: Mutex::new(0),
        });
        let backend = HandwritingBackend::with_recognizer(recognizer.clone(), 12);
        let options = ExtractOptions::new(Some(FormTypeHint::Form5_18), PreprocessMode::Standard);

        let result = backend.extract(&path, &options).await.unwrap().unwrap();
        assert_eq!(*recognizer.seen_rows.lock(), 3);
        assert_eq!(result.candidate_votes.get(&1), Some(&153));
        assert_eq!(result.candidate_votes.get(&2), Some(&4));
        assert_eq!(result.candidate_votes.get(&3), Some(&95));
        assert_eq!(result.totals.computed, 252);
        assert_eq!(result.backend, "trocr");
    }

    #[tokio::test]
    async fn test_continuation_page_declines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_form(dir.path(), "page-2.png");

        let recognizer = Arc::new(FixedRecognizer {
            lines: vec!["12", "7", "30"],
            seen_rows: Mutex::new(0),
        });
        let backend = HandwritingBackend::with_recognizer(recognizer.clone(), 12);
        let options = ExtractOptions::new(Some(FormTypeHint::Form5_18PartyList), PreprocessMode::Standard);

        assert!(backend.extract(&path, &options).await.unwrap().is_none());
        assert_eq!(*recognizer.seen_rows.lock(), 0);
    }

    #[tokio::test]
    async fn test_blank_column_declines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-1.png");
        GrayImage::from_pixel(400, 1000, Luma([255])).save(&path).unwrap();

        let backend = HandwritingBackend::with_recognizer(
            Arc::new(FixedRecognizer {
                lines: vec![],
                seen_rows: Mutex::new(0),
            }),
            12,
        );
        let result = backend.extract(&path, &ExtractOptions::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unconfigured_recognizer_unavailable() {
        let backend = HandwritingBackend::from_config(&HandwritingConfig::default(), Duration::from_secs(5));
        assert!(!backend.is_available());
        assert!(backend.availability_hint().contains("model_dir"));
    }
}
