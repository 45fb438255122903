//! Parsing of structured model output into [`BallotExtractionResult`].
//!
//! Vision models are asked for JSON but routinely wrap it in a Markdown fence or add a
//! sentence before it. [`extract_json_block`] recovers the object; anything that still
//! fails to parse is a semantic failure and yields `None`, never an error.

use crate::backends::ExtractOptions;
use crate::form_type::{CONSTITUENCY_ENTRIES, FormTypeHint};
use crate::scoring::score_result;
use crate::text::{parse_count, parse_number_words};
use crate::types::{BallotExtractionResult, FormCategory};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(alias = "number", alias = "party_number")]
    position: u32,
    #[serde(default)]
    votes: Option<Value>,
    #[serde(default, alias = "votes_words")]
    votes_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    form_code: Option<String>,
    #[serde(default)]
    entries: Vec<RawEntry>,
    #[serde(default)]
    valid_votes: Option<Value>,
    #[serde(default)]
    invalid_votes: Option<Value>,
    #[serde(default)]
    no_votes: Option<Value>,
}

/// Locate the JSON object in a model reply.
///
/// Prefers a fenced ```` ```json ```` block, then falls back to the span from the first
/// `{` to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```") {
        let after_fence = &text[start + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            let candidate = body[..end].trim();
            if candidate.starts_with('{') {
                return Some(candidate);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Count from a JSON number or a string of digits / Thai words.
fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => parse_count(s),
        _ => None,
    }
}

/// Decide the form type and category for a parsed response.
fn resolve_form_type(
    hint: Option<FormTypeHint>,
    form_code: Option<&str>,
    entries: usize,
) -> (Option<FormTypeHint>, FormCategory) {
    let form_type = hint.or_else(|| form_code.and_then(FormTypeHint::parse));
    let category = match form_type {
        Some(form_type) => form_type.category(),
        None if entries > CONSTITUENCY_ENTRIES * 2 => FormCategory::PartyList,
        None => FormCategory::Constituency,
    };
    (form_type, category)
}

/// Parse a model reply into a scored result.
///
/// Entries with an unreadable count are skipped. Returns `None` when the reply holds
/// no JSON object, does not match the expected shape, or carries no usable entry.
pub fn parse_response(
    text: &str,
    source_image: &str,
    backend: &str,
    page: u32,
    options: &ExtractOptions,
) -> Option<BallotExtractionResult> {
    let json = extract_json_block(text)?;
    let raw: RawResponse = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(backend, error = %e, "Model reply is not the expected JSON shape");
            return None;
        }
    };

    let (form_type, category) = resolve_form_type(options.form_type, raw.form_code.as_deref(), raw.entries.len());

    let mut result = BallotExtractionResult::new(source_image, backend, category);
    result.form_type = form_type;
    result.form_code = raw.form_code.filter(|code| !code.trim().is_empty());
    result.page = page;

    for entry in &raw.entries {
        let words = entry.votes_text.as_deref().and_then(parse_number_words);
        let votes = entry.votes.as_ref().and_then(count_from_value).or(words);
        let Some(votes) = votes else {
            continue;
        };

        result.votes_mut().insert(entry.position, votes);
        if let Some(words) = words {
            result.cross_validation.insert(entry.position, words == votes);
        }
    }

    if result.votes().is_empty() {
        return None;
    }

    result.totals.valid = raw.valid_votes.as_ref().and_then(count_from_value);
    result.totals.invalid = raw.invalid_votes.as_ref().and_then(count_from_value);
    result.totals.no_vote = raw.no_votes.as_ref().and_then(count_from_value);

    score_result(&mut result);
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"Here is the data:
```json
{
  "form_code": "5/18",
  "entries": [
    {"position": 1, "votes": 153, "votes_text": "หนึ่งร้อยห้าสิบสาม"},
    {"position": 2, "votes": "๔", "votes_text": "สี่"},
    {"position": 3, "votes": 95, "votes_text": "เก้าสิบ"}
  ],
  "valid_votes": 252,
  "invalid_votes": "3"
}
```"#;

    #[test]
    fn test_extract_json_block_fenced_and_bare() {
        assert!(extract_json_block(REPLY).unwrap().starts_with('{'));
        assert_eq!(extract_json_block("noise {\"a\": 1} trailing"), Some("{\"a\": 1}"));
        assert_eq!(extract_json_block("no json here"), None);
    }

    #[test]
    fn test_parse_full_reply() {
        let result = parse_response(REPLY, "page-1.png", "openrouter:m", 1, &ExtractOptions::default()).unwrap();

        assert_eq!(result.form_type, Some(FormTypeHint::Form5_18));
        assert_eq!(result.category, FormCategory::Constituency);
        assert_eq!(result.candidate_votes.get(&2), Some(&4));
        assert_eq!(result.totals.valid, Some(252));
        assert_eq!(result.totals.invalid, Some(3));
        assert_eq!(result.totals.computed, 252);
        assert_eq!(result.cross_validation.get(&1), Some(&true));
        assert_eq!(result.cross_validation.get(&3), Some(&false));
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn test_hint_overrides_form_code() {
        let options = ExtractOptions {
            form_type: Some(FormTypeHint::Form5_18PartyList),
            ..Default::default()
        };
        let result = parse_response(REPLY, "page-1.png", "nim:m", 1, &options).unwrap();
        assert_eq!(result.category, FormCategory::PartyList);
        assert_eq!(result.party_votes.len(), 3);
        assert!(result.candidate_votes.is_empty());
    }

    #[test]
    fn test_words_only_entry() {
        let reply = r#"{"entries": [{"position": 4, "votes_text": "สิบเอ็ด"}]}"#;
        let result = parse_response(reply, "p.png", "anthropic:m", 1, &ExtractOptions::default()).unwrap();
        assert_eq!(result.candidate_votes.get(&4), Some(&11));
    }

    #[test]
    fn test_malformed_reply_is_none() {
        let options = ExtractOptions::default();
        assert!(parse_response("I cannot read this image.", "p.png", "b", 1, &options).is_none());
        assert!(parse_response("{\"entries\": \"oops\"}", "p.png", "b", 1, &options).is_none());
        assert!(parse_response("{\"entries\": []}", "p.png", "b", 1, &options).is_none());
    }
}
