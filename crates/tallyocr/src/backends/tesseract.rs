//! Tesseract OCR backend.
//!
//! Runs the `tesseract` binary on the (preprocessed) page and recovers vote counts from
//! the plain-text output with line heuristics. A table row on a tally form reads
//! `<position> <name> <count digits> (<count words>)`, so the first number on a line is
//! the position, the last is the count, and a parenthesised word group, when present,
//! cross-validates the count. Summary lines are recognised by their Thai labels.

use crate::backends::subprocess::{command_exists, run_command};
use crate::backends::{ExtractOptions, RecognitionBackend};
use crate::core::config::TesseractConfig;
use crate::form_type::{CONSTITUENCY_ENTRIES, PARTY_LIST_ENTRIES};
use crate::image::{PreprocessMode, encode_png, page_number_from_path, preprocess};
use crate::scoring::score_result;
use crate::text::{extract_numbers, normalize_digits, parse_number_words};
use crate::types::{BallotExtractionResult, FormCategory, VoteMap};
use crate::{Result, TallyError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

const NAME: &str = "tesseract";

static FORM_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"5\s*/\s*1[678]").expect("Form code regex pattern is valid and should compile"));
static PARENTHESISED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("Parenthesised group regex pattern is valid and should compile"));

/// Counts recovered from OCR text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTally {
    pub votes: VoteMap,
    pub cross_validation: BTreeMap<u32, bool>,
    pub valid: Option<u64>,
    pub invalid: Option<u64>,
    pub no_vote: Option<u64>,
}

/// Recover counts from Tesseract's text output.
///
/// Positions above `max_position` are rejected as misreads, as are repeated positions
/// (the first occurrence wins).
pub fn parse_ocr_text(text: &str, max_position: u32) -> ParsedTally {
    let mut parsed = ParsedTally::default();

    for raw_line in text.lines() {
        let line = normalize_digits(raw_line.trim());
        if line.is_empty() || line.contains("ส.ส") || FORM_CODE.is_match(&line) {
            continue;
        }
        let numbers = extract_numbers(&line);
        let Some(&last) = numbers.last() else {
            continue;
        };

        if line.contains("บัตรเสีย") {
            parsed.invalid.get_or_insert(last);
            continue;
        }
        if line.contains("ไม่เลือก") {
            parsed.no_vote.get_or_insert(last);
            continue;
        }
        if line.contains("บัตรดี") || line.contains("รวม") {
            parsed.valid.get_or_insert(last);
            continue;
        }

        if numbers.len() < 2 {
            continue;
        }
        let Ok(position) = u32::try_from(numbers[0]) else {
            continue;
        };
        if position == 0 || position > max_position || parsed.votes.contains_key(&position) {
            continue;
        }

        parsed.votes.insert(position, last);
        if let Some(words) = PARENTHESISED
            .captures(&line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_number_words(m.as_str()))
        {
            parsed.cross_validation.insert(position, words == last);
        }
    }

    parsed
}

/// Tesseract subprocess backend.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    binary: String,
    language: String,
    psm: u8,
    timeout: Duration,
}

impl TesseractBackend {
    pub fn from_config(config: &TesseractConfig, timeout: Duration) -> Self {
        Self {
            binary: config.binary.clone(),
            language: config.language.clone(),
            psm: config.psm,
            timeout,
        }
    }

    async fn run_ocr(&self, image: &Path, mode: PreprocessMode) -> Result<String> {
        let source = image.to_path_buf();
        let prepared = tokio::task::spawn_blocking(move || -> Result<tempfile::NamedTempFile> {
            let page = image::open(&source)?;
            let bytes = encode_png(&preprocess(&page, mode))?;
            let mut file = tempfile::Builder::new().prefix("tallyocr-").suffix(".png").tempfile()?;
            std::io::Write::write_all(&mut file, &bytes)?;
            Ok(file)
        })
        .await
        .map_err(|e| TallyError::image_processing(format!("Preprocess task failed: {}", e)))??;

        let psm = self.psm.to_string();
        let args: [&OsStr; 6] = [
            prepared.path().as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(&self.language),
            OsStr::new("--psm"),
            OsStr::new(&psm),
        ];
        run_command(NAME, &self.binary, args, self.timeout).await
    }
}

#[async_trait]
impl RecognitionBackend for TesseractBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }

    fn availability_hint(&self) -> String {
        format!(
            "Install tesseract with the '{}' language data, or set tesseract.binary",
            self.language
        )
    }

    #[tracing::instrument(skip(self, options), fields(backend = NAME))]
    async fn extract(&self, image: &Path, options: &ExtractOptions) -> Result<Option<BallotExtractionResult>> {
        if !self.is_available() {
            tracing::debug!("tesseract binary not found, declining");
            return Ok(None);
        }

        let text = self.run_ocr(image, options.preprocessing).await?;

        let category = options.form_type.map(|hint| hint.category());
        let max_position = match category {
            Some(FormCategory::Constituency) => (CONSTITUENCY_ENTRIES * 4) as u32,
            _ => PARTY_LIST_ENTRIES as u32,
        };
        let parsed = parse_ocr_text(&text, max_position);
        if parsed.votes.is_empty() {
            tracing::debug!("No vote rows recognised");
            return Ok(None);
        }

        let category = category.unwrap_or(if parsed.votes.len() > CONSTITUENCY_ENTRIES * 2 {
            FormCategory::PartyList
        } else {
            FormCategory::Constituency
        });

        let mut result = BallotExtractionResult::new(image.display().to_string(), NAME, category);
        result.form_type = options.form_type;
        result.page = page_number_from_path(image);
        *result.votes_mut() = parsed.votes;
        result.cross_validation = parsed.cross_validation;
        result.totals.valid = parsed.valid;
        result.totals.invalid = parsed.invalid;
        result.totals.no_vote = parsed.no_vote;
        score_result(&mut result);

        Ok(Some(result))
    }
}
