//! Lip-sync segmenter — katakana reading → [`LipSyncUnit`] sequence.
//!
//! Passes, in order:
//! 1. small kana join their base letter (`キャ`, `ファ`) or become full size
//! 2. a vowel letter continuing the previous column becomes `ー`
//! 3. (optional) repeated H-row letters become `ー`
//! 4. every remaining token is looked up in the unit table
//! 5. long sounds, glottal stops and sustains inherit the previous shape
//!
//! Characters with no table entry map to a closed mouth of one unit length.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{
    kana,
    unit::{LinkType, LipSyncUnit, MouthShape},
};

// ─────────────────────────────────────────────────────────────────────────────
// Unit table — first matching rule wins
// ─────────────────────────────────────────────────────────────────────────────

const LONG_SOUND: char = 'ー';

const H_ROW: &str = "ハヒフヘホ";

enum Letters {
    Listed(&'static str),
    /// Every letter that has a vowel column.
    AnyColumn,
}

enum RuleShape {
    /// Shape of the letter's vowel column.
    Column,
    Closed,
}

struct Rule {
    letters: Letters,
    shape: RuleShape,
    link: LinkType,
    length_percent: u32,
}

const fn rule(letters: Letters, shape: RuleShape, link: LinkType, length_percent: u32) -> Rule {
    Rule { letters, shape, link, length_percent }
}

const RULES: &[Rule] = &[
    // Lips meet before M, B, P, V.
    rule(Letters::Listed("マミムメモバビブベボパピプペポヴ"), RuleShape::Column, LinkType::PreClose, 100),
    rule(Letters::Listed("ワヰヱヲヷヸヹヺ"), RuleShape::Column, LinkType::PreHalfClose, 100),
    rule(Letters::AnyColumn, RuleShape::Column, LinkType::Normal, 100),
    rule(Letters::Listed("ー〜～~"), RuleShape::Closed, LinkType::LongSound, 100),
    rule(Letters::Listed("ッ"), RuleShape::Closed, LinkType::Tsu, 100),
    rule(Letters::Listed("…⋯"), RuleShape::Closed, LinkType::Keep, 100),
    rule(Letters::Listed("‥"), RuleShape::Closed, LinkType::Keep, 50),
    rule(Letters::Listed("ン"), RuleShape::Closed, LinkType::Normal, 100),
    rule(Letters::Listed("。．！？!?.\n"), RuleShape::Closed, LinkType::Normal, 150),
    rule(Letters::Listed("、，,\u{3000} \t\r"), RuleShape::Closed, LinkType::Normal, 100),
    rule(
        Letters::Listed("・「」『』（）()【】〈〉《》〔〕［］\"'“”‘’"),
        RuleShape::Closed,
        LinkType::Normal,
        50,
    ),
];

static UNIT_TABLE: Lazy<HashMap<char, LipSyncUnit>> = Lazy::new(|| {
    let mut table = HashMap::new();
    for rule in RULES {
        let letters: Vec<char> = match rule.letters {
            Letters::Listed(s) => s.chars().collect(),
            Letters::AnyColumn => kana::column_letters().collect(),
        };
        for c in letters {
            let shape = match rule.shape {
                RuleShape::Column => kana::vowel_of(c).unwrap_or(MouthShape::Closed),
                RuleShape::Closed => MouthShape::Closed,
            };
            table
                .entry(c)
                .or_insert_with(|| LipSyncUnit::new(shape, rule.link, rule.length_percent));
        }
    }
    table
});

/// Unit for a single character.
pub fn char_to_unit(c: char) -> LipSyncUnit {
    UNIT_TABLE
        .get(&c)
        .copied()
        .unwrap_or(LipSyncUnit::new(MouthShape::Closed, LinkType::Normal, 100))
}

fn row_link(c: char) -> LinkType {
    char_to_unit(c).link
}

// ─────────────────────────────────────────────────────────────────────────────
// Folding passes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Char(char),
    /// A base letter and a small kana sounded as one.
    Joined { shape: MouthShape, link: LinkType },
}

fn is_long_sound(c: char) -> bool {
    char_to_unit(c).link == LinkType::LongSound
}

/// Link of the joined sound, if `small` joins `base`.
///
/// Glides out of ウ / フ keep the lips rounded into the vowel.
fn join_link(base: char, small: char) -> Option<LinkType> {
    let joins = match small {
        'ャ' | 'ュ' | 'ョ' => "キギシジチヂニヒビピミリフヴテデ".contains(base),
        'ァ' | 'ィ' | 'ゥ' | 'ェ' | 'ォ' => {
            "ウフヴツクグスズトドルム".contains(base)
                || (small == 'ィ' && "テデ".contains(base))
                || (small == 'ェ' && "キギシジチヂニヒビピミリイ".contains(base))
        }
        'ヮ' => "クグ".contains(base),
        _ => false,
    };
    if !joins {
        return None;
    }
    Some(if "ウフ".contains(base) { LinkType::PreHalfClose } else { row_link(base) })
}

fn fold_small_kana(reading: &str) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::with_capacity(reading.len() / 3);
    for c in reading.chars() {
        if !kana::is_small(c) {
            tokens.push(Token::Char(c));
            continue;
        }
        let joined = match (tokens.last(), kana::vowel_of(c)) {
            (Some(Token::Char(base)), Some(shape)) => {
                join_link(*base, c).map(|link| Token::Joined { shape, link })
            }
            _ => None,
        };
        match joined {
            Some(token) => {
                if let Some(last) = tokens.last_mut() {
                    *last = token;
                }
            }
            None => tokens.push(Token::Char(kana::to_full_size(c))),
        }
    }
    tokens
}

fn fold_vowel_runs(tokens: &mut [Token]) {
    let mut column: Option<MouthShape> = None;
    for token in tokens.iter_mut() {
        match *token {
            Token::Char(c) if is_long_sound(c) => {}
            Token::Char(c @ ('ア' | 'イ' | 'ウ' | 'エ' | 'オ')) if column == kana::vowel_of(c) => {
                *token = Token::Char(LONG_SOUND);
            }
            Token::Char(c) => column = kana::vowel_of(c),
            Token::Joined { shape, .. } => column = Some(shape),
        }
    }
}

fn fold_h_row(tokens: &mut [Token]) {
    let mut head: Option<char> = None;
    for token in tokens.iter_mut() {
        match (*token, head) {
            (Token::Char(c), Some(h)) if c == h => *token = Token::Char(LONG_SOUND),
            (Token::Char(c), Some(_)) if is_long_sound(c) => {}
            (Token::Char(c), _) if H_ROW.contains(c) => head = Some(c),
            _ => head = None,
        }
    }
}

/// Long sounds, glottal stops and sustains take the previous unit's shape,
/// unless the previous unit is a glottal stop / sustain of the other kind.
/// Closed units always link normally.
fn inherit_shapes(units: &mut [LipSyncUnit]) {
    let mut prev: Option<LipSyncUnit> = None;
    for unit in units.iter_mut() {
        if !unit.link.has_single_sound() {
            if let Some(p) = prev {
                let broken =
                    matches!(p.link, LinkType::Tsu | LinkType::Keep) && p.link != unit.link;
                if !broken {
                    unit.shape = p.shape;
                }
            }
        }
        if unit.shape == MouthShape::Closed {
            unit.link = LinkType::Normal;
        }
        prev = Some(*unit);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmenter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Fold repeated H-row letters (`ハハハ`) into long sounds.
    pub fold_h_row: bool,
}

/// Katakana reading → lip-sync units.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    pub config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn segment(&self, reading: &str) -> Vec<LipSyncUnit> {
        let mut tokens = fold_small_kana(reading);
        fold_vowel_runs(&mut tokens);
        if self.config.fold_h_row {
            fold_h_row(&mut tokens);
        }

        let mut units: Vec<LipSyncUnit> = tokens
            .into_iter()
            .map(|token| match token {
                Token::Char(c) => char_to_unit(c),
                Token::Joined { shape, link } => LipSyncUnit::new(shape, link, 100),
            })
            .collect();
        inherit_shapes(&mut units);
        units
    }
}

/// Segment with the default configuration.
pub fn reading_to_units(reading: &str) -> Vec<LipSyncUnit> {
    Segmenter::default().segment(reading)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use LinkType::*;
    use MouthShape::*;

    fn u(shape: MouthShape, link: LinkType, length_percent: u32) -> LipSyncUnit {
        LipSyncUnit::new(shape, link, length_percent)
    }

    #[test]
    fn test_empty() {
        assert!(reading_to_units("").is_empty());
    }

    #[test]
    fn test_plain_vowels() {
        assert_eq!(
            reading_to_units("アイウエオ"),
            vec![u(A, Normal, 100), u(I, Normal, 100), u(U, Normal, 100), u(E, Normal, 100), u(O, Normal, 100)]
        );
    }

    #[test]
    fn test_long_sound_inherits() {
        assert_eq!(reading_to_units("アー"), vec![u(A, Normal, 100), u(A, LongSound, 100)]);
        assert_eq!(reading_to_units("アア"), vec![u(A, Normal, 100), u(A, LongSound, 100)]);
        assert_eq!(
            reading_to_units("カーア"),
            vec![u(A, Normal, 100), u(A, LongSound, 100), u(A, LongSound, 100)]
        );
    }

    #[test]
    fn test_row_links() {
        assert_eq!(reading_to_units("マ"), vec![u(A, PreClose, 100)]);
        assert_eq!(reading_to_units("ボ"), vec![u(O, PreClose, 100)]);
        assert_eq!(reading_to_units("ワ"), vec![u(A, PreHalfClose, 100)]);
        assert_eq!(reading_to_units("ン"), vec![u(Closed, Normal, 100)]);
    }

    #[test]
    fn test_small_kana_join() {
        assert_eq!(reading_to_units("キャ"), vec![u(A, Normal, 100)]);
        assert_eq!(reading_to_units("ミョ"), vec![u(O, PreClose, 100)]);
        assert_eq!(reading_to_units("ファ"), vec![u(A, PreHalfClose, 100)]);
        assert_eq!(reading_to_units("ティ"), vec![u(I, Normal, 100)]);
    }

    #[test]
    fn test_small_kana_split() {
        // カ + small ア: the small letter becomes full size, then continues
        // the A column as a long sound.
        assert_eq!(reading_to_units("カァ"), vec![u(A, Normal, 100), u(A, LongSound, 100)]);
        assert_eq!(reading_to_units("ォ"), vec![u(O, Normal, 100)]);
    }

    #[test]
    fn test_tsu_and_keep() {
        assert_eq!(reading_to_units("アッ"), vec![u(A, Normal, 100), u(A, Tsu, 100)]);
        assert_eq!(
            reading_to_units("アッー"),
            vec![u(A, Normal, 100), u(A, Tsu, 100), u(Closed, Normal, 100)]
        );
        assert_eq!(
            reading_to_units("ア……"),
            vec![u(A, Normal, 100), u(A, Keep, 100), u(A, Keep, 100)]
        );
        assert_eq!(reading_to_units("ア‥"), vec![u(A, Normal, 100), u(A, Keep, 50)]);
        assert_eq!(reading_to_units("ッア"), vec![u(Closed, Normal, 100), u(A, Normal, 100)]);
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(reading_to_units("。"), vec![u(Closed, Normal, 150)]);
        assert_eq!(reading_to_units("、"), vec![u(Closed, Normal, 100)]);
        assert_eq!(reading_to_units("「"), vec![u(Closed, Normal, 50)]);
        assert_eq!(reading_to_units("漢"), vec![u(Closed, Normal, 100)]);
        assert_eq!(reading_to_units("😀"), vec![u(Closed, Normal, 100)]);
    }

    #[test]
    fn test_closed_long_sound_is_normal() {
        assert_eq!(
            reading_to_units("。ー"),
            vec![u(Closed, Normal, 150), u(Closed, Normal, 100)]
        );
    }

    #[test]
    fn test_h_row_folding() {
        let folding = Segmenter::new(SegmenterConfig { fold_h_row: true });
        assert_eq!(
            folding.segment("ハハハ"),
            vec![u(A, Normal, 100), u(A, LongSound, 100), u(A, LongSound, 100)]
        );
        assert_eq!(
            folding.segment("ヒーヒ"),
            vec![u(I, Normal, 100), u(I, LongSound, 100), u(I, LongSound, 100)]
        );
        assert_eq!(reading_to_units("ハハハ"), vec![u(A, Normal, 100); 3]);
    }

    #[test]
    fn test_table_priority() {
        // Listed before the generic column rule.
        assert_eq!(char_to_unit('マ').link, PreClose);
        assert_eq!(char_to_unit('カ').link, Normal);
    }
}
