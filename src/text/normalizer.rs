//! Script text to radio-phonetic text
//!
//! Converts raw announcement scripts into the spoken form a radio station
//! would use: isolated uppercase letters become ICAO phonetic words, digit
//! runs become per-digit readings, and a `|`-delimited script is split into
//! an English and a localized (Mandarin) segment.
//!
//! The localized digit vocabulary uses the aviation readings 幺 for 1 and
//! 拐 for 7, which are unambiguous over a noisy channel where the generic
//! words would collide.

use regex::Regex;
use std::sync::OnceLock;

/// ICAO spelling alphabet, indexed by letter offset from 'A'
const ICAO_ALPHABET: [&str; 26] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliett",
    "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo", "Sierra", "Tango",
    "Uniform", "Victor", "Whiskey", "X-ray", "Yankee", "Zulu",
];

/// English aviation digit readings (9 reads "niner")
const ENGLISH_DIGITS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "niner",
];

/// Mandarin aviation digit readings (1 reads 幺, 7 reads 拐)
const MANDARIN_DIGITS: [&str; 10] = ["洞", "幺", "两", "三", "四", "五", "六", "拐", "八", "九"];

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").unwrap())
}

/// One station script after normalization, tagged by language layout.
///
/// Produced once per raw script and consumed uniformly by the transmit
/// loop; the localized segment, when present, is spoken first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedScript {
    EnglishOnly(String),
    Bilingual { english: String, localized: String },
}

impl NormalizedScript {
    pub fn english(&self) -> &str {
        match self {
            NormalizedScript::EnglishOnly(text) => text,
            NormalizedScript::Bilingual { english, .. } => english,
        }
    }

    pub fn localized(&self) -> Option<&str> {
        match self {
            NormalizedScript::EnglishOnly(_) => None,
            NormalizedScript::Bilingual { localized, .. } => Some(localized),
        }
    }
}

/// Normalize a raw script, splitting a single `|`-delimited payload into
/// its English and localized halves. Anything without exactly one `|` is
/// treated as English only.
pub fn normalize_script(raw: &str) -> NormalizedScript {
    let parts: Vec<&str> = raw.split('|').collect();
    if parts.len() == 2 {
        NormalizedScript::Bilingual {
            english: normalize_segment(parts[0].trim(), false),
            localized: normalize_segment(parts[1].trim(), true),
        }
    } else {
        NormalizedScript::EnglishOnly(normalize_segment(raw.trim(), false))
    }
}

/// Normalize one single-language segment.
///
/// The input is trimmed and a trailing space appended so a trailing digit
/// or letter run hits the same boundary rule as an interior one.
pub fn normalize_segment(text: &str, localized: bool) -> String {
    let text = format!("{} ", text.trim());
    let text = expand_letters(&text);
    expand_digits(&text, localized)
}

/// Replace every uppercase ASCII letter that has whitespace on both sides
/// with its ICAO phonetic word. Letters embedded in a word are untouched.
fn expand_letters(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        let isolated = c.is_ascii_uppercase()
            && i > 0
            && chars[i - 1].is_whitespace()
            && chars.get(i + 1).is_some_and(|n| n.is_whitespace());
        if isolated {
            out.push_str(ICAO_ALPHABET[(c as u8 - b'A') as usize]);
        } else {
            out.push(c);
        }
    }
    out
}

/// Replace every maximal ASCII digit run with its space-joined per-digit
/// reading, padded with one space on each side.
fn expand_digits(text: &str, localized: bool) -> String {
    let vocabulary = if localized {
        &MANDARIN_DIGITS
    } else {
        &ENGLISH_DIGITS
    };
    digit_run_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let spoken: Vec<&str> = caps[0]
                .bytes()
                .map(|b| vocabulary[(b - b'0') as usize])
                .collect();
            format!(" {} ", spoken.join(" "))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_isolated_letter_becomes_phonetic() {
        assert_eq!(normalize_segment("RWY A CLSD", false), "RWY Alpha CLSD ");
    }

    #[test]
    fn test_consecutive_isolated_letters_all_expand() {
        assert_eq!(
            normalize_segment("TWY A B CLSD", false),
            "TWY Alpha Bravo CLSD "
        );
    }

    #[test]
    fn test_letters_inside_words_are_untouched() {
        let out = normalize_segment("INFORMATION KILO", false);
        assert_eq!(out, "INFORMATION KILO ");
    }

    #[test]
    fn test_trailing_letter_expands_via_appended_space() {
        assert_eq!(normalize_segment("INFORMATION K", false), "INFORMATION Kilo ");
    }

    #[test]
    fn test_english_digits() {
        let out = normalize_segment("118", false);
        assert_eq!(out.trim(), "one one eight");
    }

    #[test]
    fn test_niner_for_nine() {
        let out = normalize_segment("QNH 1019", false);
        assert_eq!(out.trim(), "QNH  one zero one niner");
    }

    #[test]
    fn test_mandarin_digits_disambiguate_one_and_seven() {
        let out = normalize_segment("17", true);
        assert_eq!(out.trim(), "幺 拐");
        let out = normalize_segment("02", true);
        assert_eq!(out.trim(), "洞 两");
    }

    #[test]
    fn test_digits_embedded_in_word_still_expand() {
        let out = normalize_segment("QNH1013", false);
        assert_eq!(out.trim(), "QNH one zero one three");
    }

    #[test]
    fn test_bilingual_split() {
        let script = normalize_script("ILS RWY 02 | 盲降 02 跑道");
        match &script {
            NormalizedScript::Bilingual { english, localized } => {
                assert!(english.contains("zero two"));
                assert!(localized.contains("洞 两"));
                assert!(localized.contains("跑道"));
            }
            other => panic!("expected bilingual script, got {:?}", other),
        }
        assert!(script.localized().is_some());
    }

    #[test]
    fn test_no_separator_is_english_only() {
        let script = normalize_script("EXPECT ILS APPROACH");
        assert_eq!(script, NormalizedScript::EnglishOnly("EXPECT ILS APPROACH ".into()));
        assert!(script.localized().is_none());
    }

    #[test]
    fn test_multiple_separators_fall_back_to_english_only() {
        let script = normalize_script("A | B | C");
        assert!(matches!(script, NormalizedScript::EnglishOnly(_)));
    }

    proptest! {
        #[test]
        fn prop_no_ascii_digits_survive(input in "[A-Z0-9 ]{0,40}") {
            let out = normalize_segment(&input, false);
            prop_assert!(!out.bytes().any(|b| b.is_ascii_digit()));
        }

        #[test]
        fn prop_deterministic(input in ".{0,40}") {
            prop_assert_eq!(
                normalize_segment(&input, true),
                normalize_segment(&input, true)
            );
        }
    }
}
