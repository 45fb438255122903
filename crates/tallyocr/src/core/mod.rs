//! Core extraction plumbing.
//!
//! This module contains the pieces every extraction path goes through:
//!
//! - [`config`] - [`TallyConfig`](config::TallyConfig) loading and validation
//! - [`extractor`] - the [`BallotExtractor`](extractor::BallotExtractor) seam and the
//!   top-level `extract_ballot` / `batch_extract_ballots` entry points
//! - [`io`] - file helpers

pub mod config;
pub mod extractor;
pub mod io;

pub use config::{Credentials, TallyConfig};
pub use extractor::{BallotExtractor, batch_extract_ballots, build_extractor, extract_ballot};
