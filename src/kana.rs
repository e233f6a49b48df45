//! Katakana folding and kana classification tables.
//!
//! The reading handed to the segmenter is pure katakana: hiragana is shifted
//! into the katakana block, loose voicing marks are merged into the
//! precomposed letter, and iteration marks are expanded.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::unit::MouthShape;

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

const UNVOICED: &str = "カキクケコサシスセソタチツテトハヒフヘホウワヰヱヲヽ";
const VOICED: &str = "ガギグゲゴザジズゼゾダヂヅデドバビブベボヴヷヸヹヺヾ";
const SEMI_BASE: &str = "ハヒフヘホ";
const SEMI_VOICED: &str = "パピプペポ";

const SMALL: &str = "ァィゥェォャュョヮヵヶ";
const SMALL_FULL: &str = "アイウエオヤユヨワカケ";

const COLUMN_A: &str = "アァカガサザタダナハバパマヤャラワヮヵヷ";
const COLUMN_I: &str = "イィキギシジチヂニヒビピミリヰヸ";
const COLUMN_U: &str = "ウゥクグスズツヅヌフブプムユュルヴ";
const COLUMN_E: &str = "エェケゲセゼテデネヘベペメレヱヹヶ";
const COLUMN_O: &str = "オォコゴソゾトドノホボポモヨョロヲヺ";

fn zip_map(from: &str, to: &str) -> HashMap<char, char> {
    from.chars().zip(to.chars()).collect()
}

static VOICED_MAP: Lazy<HashMap<char, char>> = Lazy::new(|| zip_map(UNVOICED, VOICED));
static SEMI_VOICED_MAP: Lazy<HashMap<char, char>> = Lazy::new(|| zip_map(SEMI_BASE, SEMI_VOICED));
static SMALL_MAP: Lazy<HashMap<char, char>> = Lazy::new(|| zip_map(SMALL, SMALL_FULL));

static COLUMN_MAP: Lazy<HashMap<char, MouthShape>> = Lazy::new(|| {
    [
        (COLUMN_A, MouthShape::A),
        (COLUMN_I, MouthShape::I),
        (COLUMN_U, MouthShape::U),
        (COLUMN_E, MouthShape::E),
        (COLUMN_O, MouthShape::O),
    ]
    .iter()
    .flat_map(|(letters, shape)| letters.chars().map(move |c| (c, *shape)))
    .collect()
});

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Hiragana → katakana; other characters are returned unchanged.
pub fn hiragana_to_katakana(c: char) -> char {
    match c {
        'ぁ'..='ゖ' | 'ゝ' | 'ゞ' => char::from_u32(c as u32 + 0x60).unwrap_or(c),
        _ => c,
    }
}

/// Katakana letters, small letters, the long-sound mark and the katakana
/// iteration marks.
pub fn is_katakana(c: char) -> bool {
    matches!(c, 'ァ'..='ヺ' | 'ー' | 'ヽ' | 'ヾ')
}

/// Voiced form (`カ` → `ガ`), if the letter has one.
pub fn voiced(c: char) -> Option<char> {
    VOICED_MAP.get(&c).copied()
}

/// Semi-voiced form (`ハ` → `パ`), if the letter has one.
pub fn semi_voiced(c: char) -> Option<char> {
    SEMI_VOICED_MAP.get(&c).copied()
}

pub fn is_small(c: char) -> bool {
    SMALL_MAP.contains_key(&c)
}

/// Small kana → full-size kana; other characters are returned unchanged.
pub fn to_full_size(c: char) -> char {
    SMALL_MAP.get(&c).copied().unwrap_or(c)
}

/// Vowel column of a katakana letter.
///
/// `ン`, `ッ`, `ー` and non-kana characters have no column.
pub fn vowel_of(c: char) -> Option<MouthShape> {
    COLUMN_MAP.get(&c).copied()
}

/// Every letter that has a vowel column.
pub fn column_letters() -> impl Iterator<Item = char> {
    COLUMN_MAP.keys().copied()
}

// ─────────────────────────────────────────────────────────────────────────────
// Folding
// ─────────────────────────────────────────────────────────────────────────────

fn is_voicing_mark(c: char) -> bool {
    matches!(c, '゛' | '\u{3099}' | 'ﾞ')
}

fn is_semi_voicing_mark(c: char) -> bool {
    matches!(c, '゜' | '\u{309A}' | 'ﾟ')
}

/// Fold a reading into katakana.
///
/// - hiragana becomes katakana
/// - a letter followed by a voicing / semi-voicing mark (spacing, combining or
///   half-width) becomes the precomposed letter; marks with nothing to attach
///   to are dropped
/// - `ヽ` repeats the preceding katakana, `ヾ` repeats its voiced form; with
///   no preceding katakana the mark is kept as is.  After `ー` the long sound
///   repeats.
pub fn fold_katakana(text: &str) -> String {
    let mut out: Vec<char> = Vec::with_capacity(text.len() / 3);

    for c in text.chars().map(hiragana_to_katakana) {
        if is_voicing_mark(c) || is_semi_voicing_mark(c) {
            let merged = out.last().copied().and_then(|prev| {
                if is_voicing_mark(c) { voiced(prev) } else { semi_voiced(prev) }
            });
            if let Some(merged) = merged {
                if let Some(last) = out.last_mut() {
                    *last = merged;
                }
            }
            continue;
        }

        let prev = out.last().copied().filter(|p| is_katakana(*p));
        match (c, prev) {
            ('ヽ', Some(prev)) => out.push(prev),
            ('ヾ', Some(prev)) => out.push(voiced(prev).unwrap_or(prev)),
            _ => out.push(c),
        }
    }

    out.into_iter().collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
