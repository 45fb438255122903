//! tallyocr - vote-count extraction from photographed ballot tally forms
//!
//! tallyocr reads handwritten vote counts off Thai election tally forms (ส.ส. 5/16,
//! 5/17, 5/18 and their party-list variants). Several recognition engines run on each
//! page and their answers are reconciled by per-entry majority vote.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tallyocr::{Credentials, TallyConfig, extract_ballot};
//!
//! # async fn example() -> tallyocr::Result<()> {
//! let config = TallyConfig::discover()?.unwrap_or_default();
//! let credentials = Credentials::from_env();
//!
//! match extract_ballot("scans/ส.ส.5ทับ18/page-1.png", None, &config, &credentials).await? {
//!     Some(result) => println!("{:?} total {}", result.votes(), result.totals.computed),
//!     None => println!("no backend could read the page"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Backends** (`backends`): cloud vision models, Tesseract and a local handwriting
//!   recognizer behind one [`RecognitionBackend`] trait
//! - **Ensemble** (`ensemble`): concurrent dispatch plus consensus voting
//! - **Self-correction** (`correction`): local first pass, escalated second pass
//! - **Batch** (`batch`): worker pool, shared rate limiter, retry, progress hooks
//! - **Image** (`image`): region cropping, preprocessing, row segmentation
//!
//! # Features
//!
//! - `cloud` (default): OpenRouter, NVIDIA NIM and Anthropic vision backends

#![deny(unsafe_code)]

pub mod backends;
pub mod batch;
pub mod core;
pub mod correction;
pub mod ensemble;
pub mod error;
pub mod form_type;
pub mod image;
pub mod scoring;
pub mod text;
pub mod types;

pub use error::{Result, TallyError, TransportKind};
pub use types::*;

pub use backends::{BackendRegistry, ExtractOptions, RecognitionBackend};
pub use batch::{BatchOptions, BatchProcessor, ProgressObserver, RateLimiter, RetryPolicy};
pub use core::config::{Credentials, TallyConfig};
pub use core::extractor::{BallotExtractor, batch_extract_ballots, build_extractor, extract_ballot};
pub use correction::SelfCorrectionController;
pub use ensemble::EnsembleExtractor;
pub use form_type::{FilingCategory, FormTypeHint, infer_from_path};
pub use image::PreprocessMode;
