//! Text helpers shared by the recognition backends.

pub mod thai;

pub use thai::{extract_numbers, normalize_digits, parse_count, parse_number_words};
