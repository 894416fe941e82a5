//! Meetei Mayek and Roman transliteration for Manipuri.
//!
//! The Roman side is a lowercase ISO-style romanization: consonant clusters such as `kh`,
//! `ng` and `th` are single letters, vowels are `a aa e ei i o ou u`. A consonant with no
//! following vowel becomes its final (lonsum) form when the script has one, otherwise the
//! letter is closed with the apun sign. Characters outside the mapping pass through.


use serde::{Deserialize, Serialize};
use std::fmt;

const ATIYA: char = '\u{ABD1}';
const INDEPENDENT_I: char = '\u{ABCF}';
const INDEPENDENT_U: char = '\u{ABCE}';
const LONSUM_I: char = '\u{ABE2}';
const NUNG: char = '\u{ABEA}';
const CHEIKHEI: char = '\u{ABEB}';
const LUM_IYEK: char = '\u{ABEC}';
const APUN: char = '\u{ABED}';
const DIGIT_ZERO: u32 = 0xABF0;

/// Longest spellings first so prefix matching is greedy
const CONSONANTS: &[(&str, char)] = &[
    ("kh", '\u{ABC8}'),
    ("ng", '\u{ABC9}'),
    ("ch", '\u{ABC6}'),
    ("th", '\u{ABCA}'),
    ("ph", '\u{ABD0}'),
    ("jh", '\u{ABD3}'),
    ("gh", '\u{ABD8}'),
    ("dh", '\u{ABD9}'),
    ("bh", '\u{ABDA}'),
    ("k", '\u{ABC0}'),
    ("s", '\u{ABC1}'),
    ("l", '\u{ABC2}'),
    ("m", '\u{ABC3}'),
    ("p", '\u{ABC4}'),
    ("n", '\u{ABC5}'),
    ("t", '\u{ABC7}'),
    ("w", '\u{ABCB}'),
    ("y", '\u{ABCC}'),
    ("h", '\u{ABCD}'),
    ("g", '\u{ABD2}'),
    ("r", '\u{ABD4}'),
    ("b", '\u{ABD5}'),
    ("j", '\u{ABD6}'),
    ("d", '\u{ABD7}'),
];

const LONSUMS: &[(&str, char)] = &[
    ("k", '\u{ABDB}'),
    ("l", '\u{ABDC}'),
    ("m", '\u{ABDD}'),
    ("p", '\u{ABDE}'),
    ("n", '\u{ABDF}'),
    ("t", '\u{ABE0}'),
    ("ng", '\u{ABE1}'),
];

/// The inherent vowel `a` has no sign
const VOWELS: &[(&str, Option<char>)] = &[
    ("aa", Some('\u{ABE5}')),
    ("ei", Some('\u{ABE9}')),
    ("ou", Some('\u{ABE7}')),
    ("a", None),
    ("e", Some('\u{ABE6}')),
    ("i", Some('\u{ABE4}')),
    ("o", Some('\u{ABE3}')),
    ("u", Some('\u{ABE8}')),
];

/// Writing system of a piece of Manipuri text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Roman,
    MeeteiMayek,
}

impl fmt::Display for Script {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roman => write!(f, "roman"),
            Self::MeeteiMayek => write!(f, "meetei_mayek"),
        }
    }
}

#[inline]
pub fn transliterate(text: &str, from: Script, to: Script) -> String {
    match (from, to) {
        (Script::Roman, Script::MeeteiMayek) => to_script(text),
        (Script::MeeteiMayek, Script::Roman) => to_roman(text),
        _ => text.to_string(),
    }
}

#[inline]
pub fn is_meetei_mayek(c: char) -> bool {
    ('\u{ABC0}'..='\u{ABFF}').contains(&c)
}

/// Romanized Manipuri to Meetei Mayek. ASCII letters are lowercased first.
#[inline]
pub fn to_script(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(lower.len() * 3);
    let mut rest = lower.as_str();
    let mut after_vowel = false;

    while let Some(c) = rest.chars().next() {
        if let Some((roman, letter)) = longest_match(CONSONANTS, rest) {
            rest = &rest[roman.len()..];

            if let Some((vowel, sign)) = longest_match(VOWELS, rest) {
                rest = &rest[vowel.len()..];
                out.push(letter);
                out.extend(sign);
                after_vowel = true;
            } else {
                match lonsum(roman) {
                    Some(final_form) => out.push(final_form),
                    None => {
                        out.push(letter);
                        out.push(APUN);
                    }
                }
                after_vowel = false;
            }
            continue;
        }

        if let Some((vowel, sign)) = longest_match(VOWELS, rest) {
            rest = &rest[vowel.len()..];
            match (vowel, sign) {
                ("i", _) if after_vowel => out.push(LONSUM_I),
                ("i", _) => out.push(INDEPENDENT_I),
                ("u", _) => out.push(INDEPENDENT_U),
                (_, sign) => {
                    out.push(ATIYA);
                    out.extend(sign);
                }
            }
            after_vowel = true;
            continue;
        }

        rest = &rest[c.len_utf8()..];
        after_vowel = false;
        out.push(match c {
            '0'..='9' => char::from_u32(DIGIT_ZERO + (c as u32 - '0' as u32)).unwrap_or(c),
            '.' => CHEIKHEI,
            other => other,
        });
    }

    out
}

/// Meetei Mayek to Romanized Manipuri
#[inline]
pub fn to_roman(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(roman) = consonant_roman(c) {
            match chars.peek().copied() {
                Some(next) if next == APUN => {
                    chars.next();
                    out.push_str(roman);
                }
                Some(next) => match sign_roman(next) {
                    Some(vowel) => {
                        chars.next();
                        out.push_str(roman);
                        out.push_str(vowel);
                    }
                    None => {
                        out.push_str(roman);
                        out.push('a');
                    }
                },
                None => {
                    out.push_str(roman);
                    out.push('a');
                }
            }
            continue;
        }

        if c == ATIYA {
            match chars.peek().copied().and_then(sign_roman) {
                Some(vowel) => {
                    chars.next();
                    out.push_str(vowel);
                }
                None => out.push('a'),
            }
            continue;
        }

        match c {
            INDEPENDENT_I | LONSUM_I => out.push('i'),
            INDEPENDENT_U => out.push('u'),
            NUNG => out.push_str("ng"),
            CHEIKHEI => out.push('.'),
            APUN | LUM_IYEK => {}
            _ => {
                if let Some(roman) = lonsum_roman(c).or_else(|| sign_roman(c)) {
                    out.push_str(roman);
                } else if let Some(digit) = meetei_digit(c) {
                    out.push(digit);
                } else {
                    out.push(c);
                }
            }
        }
    }

    out
}

fn longest_match<T: Copy>(table: &[(&'static str, T)], text: &str) -> Option<(&'static str, T)> {
    table
        .iter()
        .filter(|(roman, _)| text.starts_with(roman))
        .max_by_key(|(roman, _)| roman.len())
        .copied()
}

fn lonsum(roman: &str) -> Option<char> {
    LONSUMS
        .iter()
        .find(|(r, _)| *r == roman)
        .map(|(_, c)| *c)
}

fn consonant_roman(c: char) -> Option<&'static str> {
    CONSONANTS
        .iter()
        .find(|(_, letter)| *letter == c)
        .map(|(roman, _)| *roman)
}

fn lonsum_roman(c: char) -> Option<&'static str> {
    LONSUMS
        .iter()
        .find(|(_, final_form)| *final_form == c)
        .map(|(roman, _)| *roman)
}

fn sign_roman(c: char) -> Option<&'static str> {
    VOWELS
        .iter()
        .find(|(_, sign)| *sign == Some(c))
        .map(|(roman, _)| *roman)
}

fn meetei_digit(c: char) -> Option<char> {
    let offset = (c as u32).checked_sub(DIGIT_ZERO)?;
    if offset < 10 {
        char::from_digit(offset, 10)
    } else {
        None
    }
}
