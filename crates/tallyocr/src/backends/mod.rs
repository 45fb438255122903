//! Recognition backends.
//!
//! A backend turns one page image into a [`BallotExtractionResult`]. Four kinds ship
//! with the crate:
//!
//! - [`openai_compat::CloudVisionBackend`] - any OpenAI-compatible vision endpoint
//!   (OpenRouter, NVIDIA NIM)
//! - [`anthropic::AnthropicVisionBackend`] - the Anthropic Messages API
//! - [`tesseract::TesseractBackend`] - Tesseract OCR with heuristic number parsing
//! - [`handwriting::HandwritingBackend`] - row segmentation plus a local seq2seq
//!   handwriting recognizer
//!
//! Backends are built from a selection string (see [`spec`]) into a
//! [`registry::BackendRegistry`] and handed to the ensemble.

#[cfg(feature = "cloud")]
pub mod anthropic;
#[cfg(feature = "cloud")]
pub mod cloud;
pub mod handwriting;
#[cfg(feature = "cloud")]
pub mod openai_compat;
pub mod prompt;
pub mod registry;
pub mod response;
pub mod spec;
pub mod subprocess;
pub mod tesseract;

pub use registry::BackendRegistry;
pub use spec::{BackendKind, BackendSpec, parse_backend_list};

use crate::Result;
use crate::form_type::FormTypeHint;
use crate::image::PreprocessMode;
use crate::types::BallotExtractionResult;
use async_trait::async_trait;
use std::path::Path;

/// Per-call options threaded from the ensemble into every backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Resolved form type. Enables region cropping and sets the expected entry count.
    pub form_type: Option<FormTypeHint>,
    pub preprocessing: PreprocessMode,
}

impl ExtractOptions {
    pub fn new(form_type: Option<FormTypeHint>, preprocessing: PreprocessMode) -> Self {
        Self {
            form_type,
            preprocessing,
        }
    }
}

/// Uniform contract for every recognition engine.
///
/// # Contract
///
/// - [`is_available`](Self::is_available) is a local check only (credential present,
///   binary on `PATH`, model directory exists). It never touches the network.
/// - [`extract`](Self::extract) returns `Ok(None)` whenever the backend *declines*:
///   unavailable, nothing recognisable on the page, or a response it cannot parse.
///   `Err` is reserved for transport faults and engine crashes. Callers decide whether
///   to retry; backends never retry internally.
///
/// # Thread Safety
///
/// Backends are shared across concurrent batch workers and must be `Send + Sync`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use std::path::Path;
/// use tallyocr::Result;
/// use tallyocr::backends::{ExtractOptions, RecognitionBackend};
/// use tallyocr::types::{BallotExtractionResult, FormCategory};
///
/// struct FixedBackend;
///
/// #[async_trait]
/// impl RecognitionBackend for FixedBackend {
///     fn name(&self) -> &str {
///         "fixed"
///     }
///
///     fn is_available(&self) -> bool {
///         true
///     }
///
///     async fn extract(&self, image: &Path, _options: &ExtractOptions) -> Result<Option<BallotExtractionResult>> {
///         let mut result =
///             BallotExtractionResult::new(image.display().to_string(), self.name(), FormCategory::Constituency);
///         result.candidate_votes.insert(1, 153);
///         Ok(Some(result))
///     }
/// }
/// ```
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Stable identifier. Cloud backends encode the model id (`openrouter:<model>`).
    fn name(&self) -> &str;

    /// Whether the backend can run at all on this machine.
    fn is_available(&self) -> bool;

    /// Human-readable explanation when [`is_available`](Self::is_available) is false.
    fn availability_hint(&self) -> String {
        format!("{} is not available", self.name())
    }

    /// Read vote counts from one page image.
    async fn extract(&self, image: &Path, options: &ExtractOptions) -> Result<Option<BallotExtractionResult>>;

    /// Drop cached engine state. Called by the batch processor every few dozen items.
    fn release_resources(&self) {}
}
