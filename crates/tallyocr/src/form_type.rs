//! Tally-form type tags and zero-cost inference from file paths.
//!
//! Thai election tally forms come in three filing categories (ส.ส. 5/16, 5/17 and
//! 5/18), each printed in a single-member-district layout and a party-list layout
//! marked `(บช)`. The type decides which crop template is used and how many entries
//! a backend should expect.
//!
//! Scanned files are usually organised in folders whose names already carry the form
//! code, so [`infer_from_path`] resolves the type from path text alone, with no image
//! decoding and no backend calls.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::FormCategory;

/// Number of parties on a party-list ballot.
pub const PARTY_LIST_ENTRIES: usize = 57;

/// Typical number of candidates on a single-member-district ballot.
pub const CONSTITUENCY_ENTRIES: usize = 6;

/// Filing category of a tally form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingCategory {
    #[serde(rename = "5/16")]
    Form5_16,
    #[serde(rename = "5/17")]
    Form5_17,
    #[serde(rename = "5/18")]
    Form5_18,
}

impl FilingCategory {
    pub fn code(&self) -> &'static str {
        match self {
            FilingCategory::Form5_16 => "5/16",
            FilingCategory::Form5_17 => "5/17",
            FilingCategory::Form5_18 => "5/18",
        }
    }
}

/// Form type tag threaded through cropping, prompting and backend dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormTypeHint {
    #[serde(rename = "5/16")]
    Form5_16,
    #[serde(rename = "5/16(บช)")]
    Form5_16PartyList,
    #[serde(rename = "5/17")]
    Form5_17,
    #[serde(rename = "5/17(บช)")]
    Form5_17PartyList,
    #[serde(rename = "5/18")]
    Form5_18,
    #[serde(rename = "5/18(บช)")]
    Form5_18PartyList,
}

impl FormTypeHint {
    pub const ALL: [FormTypeHint; 6] = [
        FormTypeHint::Form5_16,
        FormTypeHint::Form5_16PartyList,
        FormTypeHint::Form5_17,
        FormTypeHint::Form5_17PartyList,
        FormTypeHint::Form5_18,
        FormTypeHint::Form5_18PartyList,
    ];

    pub fn new(filing: FilingCategory, party_list: bool) -> Self {
        match (filing, party_list) {
            (FilingCategory::Form5_16, false) => FormTypeHint::Form5_16,
            (FilingCategory::Form5_16, true) => FormTypeHint::Form5_16PartyList,
            (FilingCategory::Form5_17, false) => FormTypeHint::Form5_17,
            (FilingCategory::Form5_17, true) => FormTypeHint::Form5_17PartyList,
            (FilingCategory::Form5_18, false) => FormTypeHint::Form5_18,
            (FilingCategory::Form5_18, true) => FormTypeHint::Form5_18PartyList,
        }
    }

    pub fn filing(&self) -> FilingCategory {
        match self {
            FormTypeHint::Form5_16 | FormTypeHint::Form5_16PartyList => FilingCategory::Form5_16,
            FormTypeHint::Form5_17 | FormTypeHint::Form5_17PartyList => FilingCategory::Form5_17,
            FormTypeHint::Form5_18 | FormTypeHint::Form5_18PartyList => FilingCategory::Form5_18,
        }
    }

    pub fn is_party_list(&self) -> bool {
        matches!(
            self,
            FormTypeHint::Form5_16PartyList | FormTypeHint::Form5_17PartyList | FormTypeHint::Form5_18PartyList
        )
    }

    pub fn category(&self) -> FormCategory {
        if self.is_party_list() {
            FormCategory::PartyList
        } else {
            FormCategory::Constituency
        }
    }

    /// Expected number of vote entries on the form.
    pub fn expected_entries(&self) -> usize {
        if self.is_party_list() {
            PARTY_LIST_ENTRIES
        } else {
            CONSTITUENCY_ENTRIES
        }
    }

    /// Same filing category, party-list layout.
    pub fn as_party_list(&self) -> Self {
        Self::new(self.filing(), true)
    }

    /// Code as printed on the form, e.g. `5/17(บช)`.
    pub fn code(&self) -> String {
        if self.is_party_list() {
            format!("{}(บช)", self.filing().code())
        } else {
            self.filing().code().to_string()
        }
    }

    /// Parse a code such as `5/18`, `5/18(บช)` or `5-18-party`.
    pub fn parse(code: &str) -> Option<Self> {
        let normalized = code.trim().to_lowercase();
        let party_list = normalized.contains("บช") || normalized.contains("party");
        let filing = if normalized.contains("16") {
            FilingCategory::Form5_16
        } else if normalized.contains("17") {
            FilingCategory::Form5_17
        } else if normalized.contains("18") {
            FilingCategory::Form5_18
        } else {
            return None;
        };
        Some(Self::new(filing, party_list))
    }
}

impl std::fmt::Display for FormTypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One row of the path signal table: every substring must be present.
struct PathSignal {
    required: &'static [&'static str],
    hint: FormTypeHint,
}

const fn signal(required: &'static [&'static str], hint: FormTypeHint) -> PathSignal {
    PathSignal { required, hint }
}

/// Ordered signal table. Party-list rules come first so that a path naming both the
/// filing category and the party-list marker never falls through to the plain form.
static PATH_SIGNALS: &[PathSignal] = &[
    signal(&["(บช)", "5ทับ16"], FormTypeHint::Form5_16PartyList),
    signal(&["(บช)", "5ทับ17"], FormTypeHint::Form5_17PartyList),
    signal(&["(บช)", "5ทับ18"], FormTypeHint::Form5_18PartyList),
    signal(&["บัญชีรายชื่อ", "5ทับ16"], FormTypeHint::Form5_16PartyList),
    signal(&["บัญชีรายชื่อ", "5ทับ17"], FormTypeHint::Form5_17PartyList),
    signal(&["บัญชีรายชื่อ", "5ทับ18"], FormTypeHint::Form5_18PartyList),
    signal(&["(บช)", "5_16"], FormTypeHint::Form5_16PartyList),
    signal(&["(บช)", "5_17"], FormTypeHint::Form5_17PartyList),
    signal(&["(บช)", "5_18"], FormTypeHint::Form5_18PartyList),
    signal(&["5ทับ16"], FormTypeHint::Form5_16),
    signal(&["5ทับ17"], FormTypeHint::Form5_17),
    signal(&["5ทับ18"], FormTypeHint::Form5_18),
    signal(&["5_16"], FormTypeHint::Form5_16),
    signal(&["5_17"], FormTypeHint::Form5_17),
    signal(&["5_18"], FormTypeHint::Form5_18),
];

/// Whether `needle` occurs in `text` as a whole code.
///
/// A needle starting (or ending) with a digit must not be glued to another digit, so
/// `5_16` matches `form_5_16` but not the `2025_16` of a date.
fn contains_code(text: &str, needle: &str) -> bool {
    let leading_digit = needle.starts_with(|c: char| c.is_ascii_digit());
    let trailing_digit = needle.ends_with(|c: char| c.is_ascii_digit());

    text.match_indices(needle).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + needle.len()..].chars().next();
        !(leading_digit && before.is_some_and(|c| c.is_ascii_digit()))
            && !(trailing_digit && after.is_some_and(|c| c.is_ascii_digit()))
    })
}

/// Infer the form type from path text using the fixed signal table.
///
/// The first rule whose codes all occur in the path wins. Returns `None` when no
/// rule matches. Never touches the file.
pub fn infer_from_path(path: &Path) -> Option<FormTypeHint> {
    let text = path.to_string_lossy();
    PATH_SIGNALS
        .iter()
        .find(|rule| rule.required.iter().all(|needle| contains_code(&text, needle)))
        .map(|rule| rule.hint)
}
