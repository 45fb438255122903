//! Instructions sent to vision models.

use crate::form_type::FormTypeHint;

const RESPONSE_SCHEMA: &str = r#"{
  "form_code": "5/18",
  "entries": [
    {"position": 1, "votes": 153, "votes_text": "หนึ่งร้อยห้าสิบสาม"}
  ],
  "valid_votes": 252,
  "invalid_votes": 3,
  "no_votes": 1
}"#;

/// Build the extraction prompt for one request.
///
/// `cropped` tells the model it is looking at region crops rather than a full page.
pub fn build_prompt(hint: Option<FormTypeHint>, page: u32, cropped: bool) -> String {
    let mut prompt = String::from(
        "You are reading a Thai election vote tally form (ส.ส. 5/16, 5/17 or 5/18). \
         Read every handwritten vote count exactly as written. Counts are written twice: \
         as digits (Thai ๐-๙ or Arabic) and in Thai words. Do not guess or correct values.\n",
    );

    match hint {
        Some(hint) if hint.is_party_list() => prompt.push_str(&format!(
            "This is a party-list form ({}). Entries are party numbers 1-{}.\n",
            hint.code(),
            hint.expected_entries()
        )),
        Some(hint) => prompt.push_str(&format!(
            "This is a constituency form ({}). Entries are candidate ballot positions.\n",
            hint.code()
        )),
        None => prompt.push_str("Identify the form code printed in the top-right corner.\n"),
    }

    if cropped {
        if page <= 1 {
            prompt.push_str(
                "You are given two crops of page 1: the summary box with the printed totals, \
                 then the vote-count column. Row order in the column is the entry number.\n",
            );
        } else {
            prompt.push_str(&format!(
                "You are given the vote-count column of continuation page {}. Row order \
                 continues the numbering from the previous page.\n",
                page
            ));
        }
    } else if page > 1 {
        prompt.push_str(&format!(
            "This is continuation page {}. It has no summary box.\n",
            page
        ));
    }

    prompt.push_str(
        "Respond with JSON only, no commentary, using this shape (omit totals that are \
         not visible):\n",
    );
    prompt.push_str(RESPONSE_SCHEMA);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_party_list_prompt_mentions_entry_count() {
        let prompt = build_prompt(Some(FormTypeHint::Form5_18PartyList), 1, true);
        assert!(prompt.contains("party-list"));
        assert!(prompt.contains("1-57"));
        assert!(prompt.contains("summary box"));
    }

    #[test]
    fn test_continuation_prompt() {
        let prompt = build_prompt(Some(FormTypeHint::Form5_16), 3, true);
        assert!(prompt.contains("continuation page 3"));
        assert!(!prompt.contains("summary box with"));
    }

    #[test]
    fn test_prompt_always_carries_schema() {
        assert!(build_prompt(None, 1, false).contains("\"entries\""));
    }
}
