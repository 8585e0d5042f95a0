//! Arabic text helpers shared by the rhyme resolver and the evaluator.
//!
//! The rhyme letter (rowi) is always stored in base form: hamza carriers
//! collapse to the bare hamza, alif variants to the bare alif, and ta marbuta
//! to ha. Diacritic handling is limited to detection and stripping — actual
//! vocalization judgments are delegated to the LLM.

use miette::Diagnostic;
use thiserror::Error;

/// Rejection of a rhyme letter, with candidate suggestions so a higher level
/// can retry.
#[derive(Debug, Error, Diagnostic)]
pub enum RhymeError {
    #[error("`{letter}` is not a usable rhyme letter; common rowis: {}", .suggestions.join("، "))]
    #[diagnostic(
        code(qasida::rhyme::invalid_letter),
        help("The rowi must be a single base-form Arabic consonant.")
    )]
    InvalidLetter {
        letter: String,
        suggestions: Vec<String>,
    },
}

/// Frequent rowi letters, offered as suggestions when a letter is rejected.
pub const COMMON_ROWI_LETTERS: [char; 8] = ['ب', 'د', 'ر', 'ل', 'م', 'ن', 'ق', 'ع'];

/// Validate and normalize a candidate rhyme letter.
///
/// Accepts a single Arabic letter (possibly a hamza carrier or other
/// normalizable form) and returns its base form; everything else fails with
/// suggestions.
pub fn validate_rhyme_letter(raw: &str) -> Result<char, RhymeError> {
    let trimmed = strip_diacritics(raw.trim());
    let mut chars = trimmed.chars();
    let (first, rest) = (chars.next(), chars.next());
    match (first, rest) {
        (Some(ch), None) if is_arabic_letter(ch) => Ok(normalize_rhyme_letter(ch)),
        _ => Err(RhymeError::InvalidLetter {
            letter: raw.trim().to_string(),
            suggestions: COMMON_ROWI_LETTERS.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

/// Harakat and related combining marks (fathatan through sukun, plus shadda
/// and the dagger alif).
const DIACRITICS: [char; 10] = [
    '\u{064B}', // fathatan
    '\u{064C}', // dammatan
    '\u{064D}', // kasratan
    '\u{064E}', // fatha
    '\u{064F}', // damma
    '\u{0650}', // kasra
    '\u{0651}', // shadda
    '\u{0652}', // sukun
    '\u{0653}', // madda above
    '\u{0670}', // dagger alif
];

/// Returns `true` for any Arabic vocalization mark.
#[must_use]
pub fn is_diacritic(ch: char) -> bool {
    DIACRITICS.contains(&ch)
}

/// Remove all vocalization marks from `text`.
#[must_use]
pub fn strip_diacritics(text: &str) -> String {
    text.chars().filter(|c| !is_diacritic(*c)).collect()
}

/// Returns `true` when `text` carries at least one vocalization mark.
#[must_use]
pub fn has_diacritics(text: &str) -> bool {
    text.chars().any(is_diacritic)
}

/// Collapse a letter to the base form used for rhyme identity.
///
/// Hamza carriers (أ إ ؤ ئ آ) map to the bare hamza, alif maqsura to the bare
/// alif, and ta marbuta to ha. Letters outside these classes pass through.
///
/// # Examples
///
/// ```
/// use qasida::utils::arabic::normalize_rhyme_letter;
///
/// assert_eq!(normalize_rhyme_letter('ؤ'), 'ء');
/// assert_eq!(normalize_rhyme_letter('ى'), 'ا');
/// assert_eq!(normalize_rhyme_letter('ة'), 'ه');
/// assert_eq!(normalize_rhyme_letter('ق'), 'ق');
/// ```
#[must_use]
pub fn normalize_rhyme_letter(ch: char) -> char {
    match ch {
        'أ' | 'إ' | 'ؤ' | 'ئ' | 'آ' => 'ء',
        'ى' => 'ا',
        'ة' => 'ه',
        other => other,
    }
}

/// Returns `true` for characters in the Arabic letter block.
#[must_use]
pub fn is_arabic_letter(ch: char) -> bool {
    matches!(ch, '\u{0621}'..='\u{064A}' | '\u{0671}'..='\u{06D3}')
}

/// Last whitespace-separated word of a verse, with diacritics intact.
///
/// Used by the rhyme evaluator to inspect the terminal sound complex of each
/// closing hemistich.
#[must_use]
pub fn last_word(verse: &str) -> Option<&str> {
    verse.split_whitespace().last()
}

/// The rhyme letter actually carried by a verse: the last Arabic letter of its
/// last word, normalized to base form.
#[must_use]
pub fn trailing_rhyme_letter(verse: &str) -> Option<char> {
    let word = last_word(verse)?;
    word.chars()
        .rev()
        .find(|c| is_arabic_letter(*c))
        .map(normalize_rhyme_letter)
}
