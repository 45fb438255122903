//! Thai numerals and Thai number words.
//!
//! Tally forms carry each count twice: as digits (Thai ๐-๙ or Arabic 0-9) and as
//! words (`หนึ่งร้อยห้าสิบสาม`). Parsing both lets backends cross-validate every
//! entry.

const THAI_ZERO: u32 = 0x0E50;
const THAI_NINE: u32 = 0x0E59;

/// Replace Thai digits with ASCII digits, leaving every other character untouched.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if (THAI_ZERO..=THAI_NINE).contains(&code) {
                char::from_digit(code - THAI_ZERO, 10).unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// All digit runs in `text` (Thai or ASCII), with thousands separators removed.
pub fn extract_numbers(text: &str) -> Vec<u64> {
    let normalized = normalize_digits(text);
    let mut numbers = Vec::new();
    let mut current = String::new();

    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == ',' && !current.is_empty() && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            continue;
        } else if !current.is_empty() {
            if let Ok(n) = current.parse() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if let Ok(n) = current.parse() {
        numbers.push(n);
    }
    numbers
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Digit(u64),
    /// `ยี่`, only valid before `สิบ`.
    Twenty,
    /// `เอ็ด`, a trailing one.
    TrailingOne,
    Multiplier(u64),
    Million,
    Ignored,
}

// Matched greedily by longest spelling.
static WORDS: &[(&str, Token)] = &[
    ("ศูนย์", Token::Digit(0)),
    ("หนึ่ง", Token::Digit(1)),
    ("สอง", Token::Digit(2)),
    ("สาม", Token::Digit(3)),
    ("สี่", Token::Digit(4)),
    ("ห้า", Token::Digit(5)),
    ("หก", Token::Digit(6)),
    ("เจ็ด", Token::Digit(7)),
    ("แปด", Token::Digit(8)),
    ("เก้า", Token::Digit(9)),
    ("ยี่", Token::Twenty),
    ("เอ็ด", Token::TrailingOne),
    ("สิบ", Token::Multiplier(10)),
    ("ร้อย", Token::Multiplier(100)),
    ("พัน", Token::Multiplier(1_000)),
    ("หมื่น", Token::Multiplier(10_000)),
    ("แสน", Token::Multiplier(100_000)),
    ("ล้าน", Token::Million),
    ("คะแนน", Token::Ignored),
    ("ถ้วน", Token::Ignored),
];

fn tokenize(text: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == '(' || c == ')');
        if trimmed.is_empty() {
            break;
        }
        let (word, token) = WORDS
            .iter()
            .filter(|(word, _)| trimmed.starts_with(*word))
            .max_by_key(|(word, _)| word.len())?;
        tokens.push(*token);
        rest = &trimmed[word.len()..];
    }

    Some(tokens)
}

/// Parse Thai number words into an integer.
///
/// Returns `None` for empty input, unknown words, or malformed sequences such as two
/// digit words in a row.
pub fn parse_number_words(text: &str) -> Option<u64> {
    let tokens = tokenize(text)?;
    if tokens.iter().all(|t| matches!(t, Token::Ignored)) {
        return None;
    }

    let mut millions: u64 = 0;
    let mut current: u64 = 0;
    let mut pending: Option<u64> = None;

    for token in tokens {
        match token {
            Token::Digit(d) => {
                if pending.is_some() {
                    return None;
                }
                pending = Some(d);
            }
            Token::Twenty => {
                if pending.is_some() {
                    return None;
                }
                pending = Some(2);
            }
            Token::TrailingOne => {
                if pending.is_some() {
                    return None;
                }
                current += 1;
            }
            Token::Multiplier(m) => {
                current += pending.take().unwrap_or(1) * m;
            }
            Token::Million => {
                let value = current + pending.take().unwrap_or(0);
                millions = (millions + value.max(1)) * 1_000_000;
                current = 0;
            }
            Token::Ignored => {}
        }
    }

    Some(millions + current + pending.unwrap_or(0))
}

/// Parse a count written either as digits or as Thai words.
///
/// Digits win when both are present, since the numeral column is the primary field.
pub fn parse_count(text: &str) -> Option<u64> {
    extract_numbers(text)
        .first()
        .copied()
        .or_else(|| parse_number_words(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_digits() {
        assert_eq!(normalize_digits("๑๕๓"), "153");
        assert_eq!(normalize_digits("รวม ๒๕๒ คะแนน"), "รวม 252 คะแนน");
    }

    #[test]
    fn test_extract_numbers() {
        assert_eq!(extract_numbers("1 นายก 153"), vec![1, 153]);
        assert_eq!(extract_numbers("รวม ๑,๒๓๔"), vec![1234]);
        assert_eq!(extract_numbers("ไม่มีตัวเลข"), Vec::<u64>::new());
    }

    #[test]
    fn test_simple_words() {
        assert_eq!(parse_number_words("ศูนย์"), Some(0));
        assert_eq!(parse_number_words("สี่"), Some(4));
        assert_eq!(parse_number_words("สิบ"), Some(10));
        assert_eq!(parse_number_words("สิบเอ็ด"), Some(11));
        assert_eq!(parse_number_words("ยี่สิบ"), Some(20));
        assert_eq!(parse_number_words("ยี่สิบเอ็ด"), Some(21));
    }

    #[test]
    fn test_compound_words() {
        assert_eq!(parse_number_words("หนึ่งร้อยห้าสิบสาม"), Some(153));
        assert_eq!(parse_number_words("เก้าสิบห้า"), Some(95));
        assert_eq!(parse_number_words("สองร้อยห้าสิบสอง"), Some(252));
        assert_eq!(parse_number_words("หนึ่งพันสองร้อยสามสิบสี่"), Some(1234));
        assert_eq!(parse_number_words("ร้อยเอ็ด"), Some(101));
        assert_eq!(parse_number_words("หนึ่งหมื่นห้าพัน"), Some(15_000));
        assert_eq!(parse_number_words("สองล้านสามแสน"), Some(2_300_000));
    }

    #[test]
    fn test_ignored_words_and_spacing() {
        assert_eq!(parse_number_words("หนึ่ง ร้อย ห้า สิบ สาม คะแนน"), Some(153));
        assert_eq!(parse_number_words("(สี่คะแนนถ้วน)"), Some(4));
    }

    #[test]
    fn test_malformed_words() {
        assert_eq!(parse_number_words(""), None);
        assert_eq!(parse_number_words("คะแนน"), None);
        assert_eq!(parse_number_words("หนึ่งสอง"), None);
        assert_eq!(parse_number_words("hello"), None);
    }

    #[test]
    fn test_parse_count_prefers_digits() {
        assert_eq!(parse_count("๑๕๓ (หนึ่งร้อยห้าสิบสาม)"), Some(153));
        assert_eq!(parse_count("หนึ่งร้อยห้าสิบสาม"), Some(153));
        assert_eq!(parse_count("???"), None);
    }
}
