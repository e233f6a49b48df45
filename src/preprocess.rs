//! Text preprocessing pipeline — raw text → reading string.
//!
//! Converts raw input text (with numbers, Latin letters, symbols, kanji, …)
//! into a katakana reading that the lip-sync segmenter can consume.
//!
//! Order of the passes:
//! 1. numerals → hiragana readings (`1200` → `せんにひゃく`)
//! 2. half-width → full-width, then letters / symbols → hiragana spellings
//! 3. ideograph runs → external reading oracle (pass-through on failure)
//! 4. hiragana → katakana, voicing marks and iteration marks folded

use std::collections::HashMap;

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::{kana, phonemize::{self, ReadingOracle}};

// ─────────────────────────────────────────────────────────────────────────────
// Number → reading
// ─────────────────────────────────────────────────────────────────────────────

const DIGITS: [&str; 10] = [
    "ぜろ", "いち", "に", "さん", "よん", "ご", "ろく", "なな", "はち", "きゅう",
];

/// Decimal digits that are followed by more digits are lengthened.
const DIGITS_LONG: [&str; 10] = [
    "ぜろ", "いち", "にー", "さん", "よん", "ごー", "ろく", "なな", "はち", "きゅう",
];

/// 4-digit group words: ones, 万, 億, 兆, 京, 垓, 𥝱, 穣, 溝, 澗, 正, 載, 極.
const GROUPS: [&str; 13] = [
    "", "まん", "おく", "ちょう", "けい", "がい", "じょ", "じょう", "こう", "かん", "せい",
    "さい", "ごく",
];

const GROUP_CHO: usize = 3;
const GROUP_KEI: usize = 4;

/// One spoken piece of a numeral reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumeralPiece {
    /// A digit reading, possibly in a contracted form (`いっ`, `はっ`, …).
    Digit(&'static str),
    /// 十, 百 or 千.
    Small(&'static str),
    /// 万, 億, 兆, …
    Group(&'static str),
}

impl NumeralPiece {
    pub fn text(self) -> &'static str {
        match self {
            NumeralPiece::Digit(s) | NumeralPiece::Small(s) | NumeralPiece::Group(s) => s,
        }
    }
}

/// Read one 4-digit group (`value < 10_000`) whose group index is `group`.
fn group_pieces(value: u32, group: usize, out: &mut Vec<NumeralPiece>) {
    use NumeralPiece::*;

    let thousands = (value / 1000) as usize;
    let hundreds = (value / 100 % 10) as usize;
    let tens = (value / 10 % 10) as usize;
    let ones = (value % 10) as usize;

    // 兆 and 京 start with a hard sound that contracts the preceding mora.
    let hard_group = group == GROUP_CHO || group == GROUP_KEI;

    match thousands {
        0 => {}
        1 if group == 0 => out.push(Small("せん")),
        1 => out.extend([Digit("いっ"), Small("せん")]),
        3 => out.extend([Digit("さん"), Small("ぜん")]),
        8 => out.extend([Digit("はっ"), Small("せん")]),
        d => out.extend([Digit(DIGITS[d]), Small("せん")]),
    }
    match hundreds {
        0 => {}
        1 => out.push(Small("ひゃく")),
        3 => out.extend([Digit("さん"), Small("びゃく")]),
        6 => out.extend([Digit("ろっ"), Small("ぴゃく")]),
        8 => out.extend([Digit("はっ"), Small("ぴゃく")]),
        d => out.extend([Digit(DIGITS[d]), Small("ひゃく")]),
    }
    if tens > 0 {
        if tens > 1 {
            out.push(Digit(DIGITS[tens]));
        }
        out.push(Small(if ones == 0 && hard_group { "じゅっ" } else { "じゅう" }));
    }
    if ones > 0 {
        let reading = match ones {
            1 if hard_group => "いっ",
            8 if hard_group => "はっ",
            6 if group == GROUP_KEI => "ろっ",
            d => DIGITS[d],
        };
        out.push(Digit(reading));
    }
    if value > 0 && group > 0 {
        out.push(Group(GROUPS[group]));
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Split an integer digit string (ASCII, no sign) into spoken pieces.
///
/// Groups that are all zeros emit nothing, so two group words never follow
/// each other directly.  Integers longer than the largest group are read
/// digit by digit.  `None` unless `digits` is a non-empty run of ASCII digits.
pub fn integer_pieces(digits: &str) -> Option<Vec<NumeralPiece>> {
    if !is_digits(digits) {
        return None;
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Some(vec![NumeralPiece::Digit(DIGITS[0])]);
    }
    if digits.len() > GROUPS.len() * 4 {
        return Some(
            digits
                .bytes()
                .map(|b| NumeralPiece::Digit(DIGITS[(b - b'0') as usize]))
                .collect(),
        );
    }

    let bytes = digits.as_bytes();
    let group_count = (bytes.len() + 3) / 4;
    let mut pieces = Vec::new();
    for g in (0..group_count).rev() {
        // Group g covers the digits [len - 4(g+1), len - 4g).
        let end = bytes.len() - 4 * g;
        let start = end.saturating_sub(4);
        let value = bytes[start..end]
            .iter()
            .fold(0u32, |acc, b| acc * 10 + (b - b'0') as u32);
        group_pieces(value, g, &mut pieces);
    }
    Some(pieces)
}

/// Read a number with an optional decimal part.
///
/// `None` unless `int_digits` (and `decimal_digits`, when non-empty) are
/// ASCII digits.
pub fn number_to_reading(int_digits: &str, decimal_digits: Option<&str>) -> Option<String> {
    let pieces = integer_pieces(int_digits)?;
    let Some(decimals) = decimal_digits.filter(|d| !d.is_empty()) else {
        return Some(pieces.iter().map(|p| p.text()).collect());
    };
    if !is_digits(decimals) {
        return None;
    }

    let mut pieces = if int_digits.trim_start_matches('0').is_empty() {
        vec![NumeralPiece::Digit("れい")]
    } else {
        pieces
    };
    // The mora before てん contracts.
    if let Some(last) = pieces.last_mut() {
        *last = match *last {
            NumeralPiece::Digit("いち") => NumeralPiece::Digit("いっ"),
            NumeralPiece::Digit("はち") => NumeralPiece::Digit("はっ"),
            NumeralPiece::Small("じゅう") => NumeralPiece::Small("じゅっ"),
            other => other,
        };
    }

    let mut reading: String = pieces.iter().map(|p| p.text()).collect();
    reading.push_str("てん");

    let count = decimals.len();
    for (i, b) in decimals.bytes().enumerate() {
        let d = (b - b'0') as usize;
        let last = i + 1 == count;
        // The final digit takes the short reading, except for exactly two
        // decimal places.
        reading.push_str(if last && count != 2 { DIGITS[d] } else { DIGITS_LONG[d] });
    }
    Some(reading)
}

/// Full-width digits and separators → ASCII.
fn ascii_digits(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ',' | '，'))
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            '．' => '.',
            other => other,
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes (lazily initialised once)
// ─────────────────────────────────────────────────────────────────────────────

/// Comma-grouped numbers first, then plain runs, then a lone zero.
/// A comma group must be exactly three digits (`1,2345` is not grouped).
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"[1-9１-９][0-9０-９]{0,2}(?:[,，][0-9０-９]{3}(?![0-9０-９]))+(?:[.．][0-9０-９]+)?",
        r"|[1-9１-９][0-9０-９]*(?:[.．][0-9０-９]+)?",
        r"|[0０](?:[.．][0-9０-９]+)?",
    ))
    .unwrap()
});

pub fn replace_numbers(text: &str) -> String {
    RE_NUMBER
        .replace_all(text, |caps: &Captures| {
            let raw = ascii_digits(&caps[0]);
            let reading = match raw.split_once('.') {
                Some((int_part, dec_part)) => number_to_reading(int_part, Some(dec_part)),
                None => number_to_reading(&raw, None),
            };
            reading.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Letters and symbols → reading
// ─────────────────────────────────────────────────────────────────────────────

/// Half-width characters that are never widened.
const NARROW_KEEP: &[char] = &[',', '.', '~', 'ﾞ', 'ﾟ'];

const HALF_KATAKANA: &str =
    "ｦｧｨｩｪｫｬｭｮｯｰｱｲｳｴｵｶｷｸｹｺｻｼｽｾｿﾀﾁﾂﾃﾄﾅﾆﾇﾈﾉﾊﾋﾌﾍﾎﾏﾐﾑﾒﾓﾔﾕﾖﾗﾘﾙﾚﾛﾜﾝ｡｢｣､･";
const FULL_KATAKANA: &str =
    "ヲァィゥェォャュョッーアイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワン。「」、・";

static HALF_TO_FULL_KANA: Lazy<HashMap<char, char>> =
    Lazy::new(|| HALF_KATAKANA.chars().zip(FULL_KATAKANA.chars()).collect());

const LETTER_READINGS: [&str; 26] = [
    "えー", "びー", "しー", "でぃー", "いー", "えふ", "じー", "えいち", "あい", "じぇー",
    "けー", "える", "えむ", "えぬ", "おー", "ぴー", "きゅー", "あーる", "えす", "てぃー",
    "ゆー", "ぶい", "だぶりゅー", "えっくす", "わい", "ぜっと",
];

const SYMBOL_READINGS: &[(char, &str)] = &[
    ('％', "ぱーせんと"),
    ('＆', "あんど"),
    ('＋', "ぷらす"),
    ('－', "まいなす"),
    ('−', "まいなす"),
    ('＝', "いこーる"),
    ('＠', "あっと"),
    ('＃', "しゃーぷ"),
    ('＄', "どる"),
    ('￥', "えん"),
    ('€', "ゆーろ"),
    ('£', "ぽんど"),
    ('＊', "あすたりすく"),
    ('×', "かける"),
    ('÷', "わる"),
    ('＜', "しょうなり"),
    ('＞', "だいなり"),
    ('／', "すらっしゅ"),
    ('℃', "ど"),
    ('°', "ど"),
    ('※', "こめじるし"),
    ('〒', "ゆうびん"),
];

/// Full-width letter / symbol → hiragana spelling.
static SYMBOL_TABLE: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    let upper = ('Ａ'..='Ｚ').zip(LETTER_READINGS);
    let lower = ('ａ'..='ｚ').zip(LETTER_READINGS);
    upper
        .chain(lower)
        .chain(SYMBOL_READINGS.iter().copied())
        .collect()
});

/// Widen one half-width character; anything else is returned unchanged.
pub fn widen_char(c: char) -> char {
    if NARROW_KEEP.contains(&c) {
        return c;
    }
    match c {
        ' ' => '\u{3000}',
        '!'..='~' => char::from_u32(c as u32 + 0xFEE0).unwrap_or(c),
        _ => HALF_TO_FULL_KANA.get(&c).copied().unwrap_or(c),
    }
}

/// Widen, then spell out letters and known symbols.
///
/// Characters outside the Basic Multilingual Plane become a full-width space.
pub fn read_symbols(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c as u32 > 0xFFFF {
            out.push('\u{3000}');
            continue;
        }
        let wide = widen_char(c);
        match SYMBOL_TABLE.get(&wide) {
            Some(reading) => out.push_str(reading),
            None => out.push(wide),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// TextPreprocessor — full pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the reading pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub read_numerals: bool,
    pub read_symbols: bool,
    pub lookup_readings: bool,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self { read_numerals: true, read_symbols: true, lookup_readings: true }
    }
}

/// Raw text → katakana reading.
#[derive(Debug, Clone, Default)]
pub struct TextPreprocessor {
    pub config: PreprocessorConfig,
}

impl TextPreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PreprocessorConfig) -> Self {
        Self { config }
    }

    /// Numerals and symbols only; no oracle, no katakana folding.
    pub fn process(&self, text: &str) -> String {
        let cfg = &self.config;
        let mut text = text.to_string();

        if cfg.read_numerals {
            text = replace_numbers(&text);
        }
        if cfg.read_symbols {
            text = read_symbols(&text);
        }

        text
    }

    /// The full reading: [`process`](Self::process), then the oracle, then
    /// katakana folding.
    ///
    /// The oracle is called on the current thread; see
    /// [`PinnedOracle`](crate::phonemize::PinnedOracle) for oracles that must
    /// always run on the same thread.
    pub fn reading(&self, text: &str, oracle: &dyn ReadingOracle) -> String {
        let text = self.process(text);
        let text = if self.config.lookup_readings {
            phonemize::apply_oracle(&text, oracle)
        } else {
            text
        };
        kana::fold_katakana(&text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phonemize::NullOracle;

    fn read(n: &str) -> String {
        number_to_reading(n, None).unwrap()
    }

    #[test]
    fn test_small_numbers() {
        assert_eq!(read("0"), "ぜろ");
        assert_eq!(read("1"), "いち");
        assert_eq!(read("10"), "じゅう");
        assert_eq!(read("11"), "じゅういち");
        assert_eq!(read("25"), "にじゅうご");
        assert_eq!(read("100"), "ひゃく");
        assert_eq!(read("1000"), "せん");
    }

    #[test]
    fn test_contracted_hundreds_and_thousands() {
        assert_eq!(read("300"), "さんびゃく");
        assert_eq!(read("600"), "ろっぴゃく");
        assert_eq!(read("800"), "はっぴゃく");
        assert_eq!(read("3000"), "さんぜん");
        assert_eq!(read("8000"), "はっせん");
        assert_eq!(read("1200"), "せんにひゃく");
    }

    #[test]
    fn test_big_groups() {
        assert_eq!(read("10000"), "いちまん");
        assert_eq!(read("100000"), "じゅうまん");
        assert_eq!(read("10000000"), "いっせんまん");
        assert_eq!(read("100000000"), "いちおく");
        assert_eq!(read("100010000"), "いちおくいちまん");
        assert_eq!(read("1000000000000"), "いっちょう");
        assert_eq!(read("8000000000000"), "はっちょう");
        assert_eq!(read("10000000000000"), "じゅっちょう");
        assert_eq!(read("10000000000000000"), "いっけい");
    }

    #[test]
    fn test_group_words_never_adjacent() {
        for n in 0..60 {
            for k in 1..=9 {
                let digits = format!("{}{}", k, "0".repeat(n));
                let pieces = integer_pieces(&digits).unwrap();
                for pair in pieces.windows(2) {
                    assert!(
                        !matches!(pair, [NumeralPiece::Group(_), NumeralPiece::Group(_)]),
                        "adjacent group words for {digits}: {pieces:?}"
                    );
                }
                assert!(!pieces.is_empty(), "empty reading for {digits}");
            }
        }
    }

    #[test]
    fn test_decimals() {
        let read = |i, d| number_to_reading(i, Some(d)).unwrap();
        assert_eq!(read("3", "14"), "さんてんいちよん");
        assert_eq!(read("0", "5"), "れいてんご");
        assert_eq!(read("1", "25"), "いってんにーごー");
        assert_eq!(read("1", "525"), "いってんごーにーご");
        assert_eq!(read("10", "2"), "じゅってんに");
        assert_eq!(read("8", "8"), "はってんはち");
    }

    #[test]
    fn test_non_digits_are_rejected() {
        assert_eq!(number_to_reading("1a", None), None);
        assert_eq!(number_to_reading("", None), None);
        assert_eq!(number_to_reading("１２", None), None);
        assert_eq!(number_to_reading("3", Some("1x")), None);
        assert_eq!(number_to_reading("3", Some("")).as_deref(), Some("さん"));
        assert!(integer_pieces("12-3").is_none());
        assert!(integer_pieces("٣").is_none());
    }

    #[test]
    fn test_replace_numbers_in_text() {
        assert_eq!(replace_numbers("りんご3こ"), "りんごさんこ");
        assert_eq!(replace_numbers("１２"), "じゅうに");
        assert_eq!(replace_numbers("1,000えん"), "せんえん");
        assert_eq!(replace_numbers("007"), "ぜろぜろなな");
        assert_eq!(replace_numbers("1,2345"), "いち,にせんさんびゃくよんじゅうご");
        assert_eq!(replace_numbers("2.5"), "にてんご");
    }

    #[test]
    fn test_widen() {
        assert_eq!(widen_char('A'), 'Ａ');
        assert_eq!(widen_char('%'), '％');
        assert_eq!(widen_char(' '), '\u{3000}');
        assert_eq!(widen_char(','), ',');
        assert_eq!(widen_char('.'), '.');
        assert_eq!(widen_char('~'), '~');
        assert_eq!(widen_char('ｱ'), 'ア');
        assert_eq!(widen_char('ﾞ'), 'ﾞ');
        assert_eq!(widen_char('あ'), 'あ');
    }

    #[test]
    fn test_read_symbols() {
        assert_eq!(read_symbols("Ａ"), "えー");
        assert_eq!(read_symbols("a"), "えー");
        assert_eq!(read_symbols("50%"), "５０ぱーせんと");
        assert_eq!(read_symbols("あ😀い"), "あ\u{3000}い");
        assert_eq!(read_symbols("漢"), "漢");
    }

    #[test]
    fn test_process_orders_numbers_before_symbols() {
        let pp = TextPreprocessor::new();
        assert_eq!(pp.process("50%"), "ごじゅうぱーせんと");
        assert_eq!(pp.process("AB"), "えーびー");
    }

    #[test]
    fn test_reading_without_oracle() {
        let pp = TextPreprocessor::new();
        assert_eq!(pp.reading("あいうえお", &NullOracle), "アイウエオ");
        assert_eq!(pp.reading("3", &NullOracle), "サン");
    }
}
