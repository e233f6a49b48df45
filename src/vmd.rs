//! VMD (Vocaloid Motion Data) morph-only writer and reader.
//!
//! ## Layout (all integers little-endian)
//!
//! | Field              | Size        | Value                                 |
//! |--------------------|-------------|---------------------------------------|
//! | magic              | 30          | `Vocaloid Motion Data 0002`, 0-padded |
//! | model name         | 20          | Shift_JIS, 0-padded                   |
//! | bone key count     | 4 (u32)     | always 0                              |
//! | morph key count    | 4 (u32)     | N                                     |
//! | morph key × N      | 23          | name 15 (Shift_JIS), frame u32, weight f32 |
//! | camera/light/shadow/IK counts | 4 × 4 | always 0                       |

use encoding_rs::SHIFT_JIS;

use crate::{
    codec::{put_padded, ByteReader, MotionWriter},
    error::Result,
    keyframe::KeyFrame,
};

pub const MAGIC: &[u8] = b"Vocaloid Motion Data 0002";
pub const MAGIC_LEN: usize = 30;
pub const MODEL_NAME_LEN: usize = 20;
pub const MORPH_NAME_LEN: usize = 15;
/// Bytes per morph key record.
pub const MORPH_RECORD_LEN: usize = MORPH_NAME_LEN + 4 + 4;

const FORMAT: &str = "VMD";

/// Shift_JIS bytes of `text`, at most `max_len` of them.
///
/// Truncation never splits a character; characters Shift_JIS cannot
/// express become `?`.
pub fn encode_name(text: &str, max_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_len);
    let mut utf8 = [0u8; 4];
    for c in text.chars() {
        let (bytes, _, had_errors) = SHIFT_JIS.encode(c.encode_utf8(&mut utf8));
        let bytes: &[u8] = if had_errors { b"?" } else { &bytes };
        if out.len() + bytes.len() > max_len {
            break;
        }
        out.extend_from_slice(bytes);
    }
    out
}

/// Decode a zero-padded Shift_JIS field.
pub fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let (text, _, _) = SHIFT_JIS.decode(&field[..end]);
    text.into_owned()
}

#[derive(Debug, Clone, Default)]
pub struct VmdWriter {
    pub model_name: String,
}

impl VmdWriter {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self { model_name: model_name.into() }
    }
}

impl MotionWriter for VmdWriter {
    fn format_name(&self) -> &'static str {
        FORMAT
    }

    fn max_frame(&self) -> u64 {
        u64::from(u32::MAX)
    }

    fn encode(&self, keys: &[KeyFrame]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            MAGIC_LEN + MODEL_NAME_LEN + 8 + keys.len() * MORPH_RECORD_LEN + 16,
        );

        put_padded(&mut buf, MAGIC, MAGIC_LEN);
        put_padded(&mut buf, &encode_name(&self.model_name, MODEL_NAME_LEN), MODEL_NAME_LEN);

        buf.extend_from_slice(&0u32.to_le_bytes()); // bones
        buf.extend_from_slice(&(keys.len() as u32).to_le_bytes());
        for key in keys {
            put_padded(&mut buf, &encode_name(&key.morph_name, MORPH_NAME_LEN), MORPH_NAME_LEN);
            buf.extend_from_slice(&(key.frame as u32).to_le_bytes());
            buf.extend_from_slice(&key.weight.to_le_bytes());
        }

        // camera, light, self shadow, IK
        for _ in 0..4 {
            buf.extend_from_slice(&0u32.to_le_bytes());
        }
        buf
    }
}

/// Morph keys read back from a VMD file.
#[derive(Debug, Clone, PartialEq)]
pub struct VmdMorphs {
    pub model_name: String,
    pub keys: Vec<KeyFrame>,
}

/// Parse a VMD file without bone keys, as written by [`VmdWriter`].
pub fn parse_morphs(data: &[u8]) -> Result<VmdMorphs> {
    let mut r = ByteReader::new(data, FORMAT);

    let magic = r.take(MAGIC_LEN)?;
    if !magic.starts_with(MAGIC) {
        return Err(r.malformed("bad magic"));
    }
    let model_name = decode_name(r.take(MODEL_NAME_LEN)?);

    let bones = r.u32()?;
    if bones != 0 {
        return Err(r.malformed(format!("{bones} bone keys present; only morph motions are read")));
    }

    let count = r.u32()? as usize;
    let mut keys = Vec::with_capacity(count.min(data.len() / MORPH_RECORD_LEN));
    for _ in 0..count {
        let morph_name = decode_name(r.take(MORPH_NAME_LEN)?);
        let frame = u64::from(r.u32()?);
        let weight = r.f32()?;
        keys.push(KeyFrame { morph_name, frame, weight });
    }

    Ok(VmdMorphs { model_name, keys })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LipSyncError;

    #[test]
    fn test_empty_file_layout() {
        let (bytes, count) = VmdWriter::new("").to_bytes(&[], 0).unwrap();
        assert_eq!(count, 0);
        assert_eq!(bytes.len(), MAGIC_LEN + MODEL_NAME_LEN + 8 + 16);
        assert_eq!(&bytes[..MAGIC.len()], MAGIC);
        assert!(bytes[MAGIC.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_single_key_bytes() {
        let keys = vec![KeyFrame::new("あ", 7, 0.5)];
        let (bytes, count) = VmdWriter::new("model").to_bytes(&keys, 0).unwrap();
        assert_eq!(count, 1);
        assert_eq!(bytes.len(), MAGIC_LEN + MODEL_NAME_LEN + 8 + MORPH_RECORD_LEN + 16);

        let record = &bytes[MAGIC_LEN + MODEL_NAME_LEN + 8..];
        // あ is 0x82 0xA0 in Shift_JIS.
        assert_eq!(&record[..3], &[0x82, 0xA0, 0x00]);
        assert_eq!(&record[15..19], &7u32.to_le_bytes());
        assert_eq!(&record[19..23], &0.5f32.to_le_bytes());
    }

    #[test]
    fn test_round_trip() {
        let keys = vec![
            KeyFrame::new("い", 30, 0.25),
            KeyFrame::new("あ", 12, 0.123_456_7),
            KeyFrame::new("あ", 40, 0.0),
        ];
        let (bytes, _) = VmdWriter::new("初音ミク").to_bytes(&keys, 10).unwrap();
        let parsed = parse_morphs(&bytes).unwrap();
        assert_eq!(parsed.model_name, "初音ミク");
        assert_eq!(
            parsed.keys,
            vec![
                KeyFrame::new("あ", 2, 0.123_456_7),
                KeyFrame::new("い", 20, 0.25),
                KeyFrame::new("あ", 30, 0.0),
            ]
        );
    }

    #[test]
    fn test_name_truncation_on_char_boundary() {
        // 8 two-byte characters = 16 bytes; only 7 fit in 15.
        let name = "あいうえおかきく";
        assert_eq!(encode_name(name, MORPH_NAME_LEN).len(), 14);
        assert_eq!(decode_name(&encode_name(name, MORPH_NAME_LEN)), "あいうえおかき");
    }

    #[test]
    fn test_unmappable_chars_become_question_marks() {
        assert_eq!(encode_name("a😀b", 15), b"a?b");
    }

    #[test]
    fn test_frame_out_of_range_writes_nothing() {
        let keys = vec![KeyFrame::new("あ", u64::from(u32::MAX) + 1, 1.0)];
        let mut out = Vec::new();
        let err = VmdWriter::default().write(&mut out, &keys, 0).unwrap_err();
        assert!(matches!(err, LipSyncError::FrameOutOfRange { format: "VMD", .. }), "got: {err}");
        assert!(out.is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(parse_morphs(b"short"), Err(LipSyncError::Malformed { .. })));
        let mut bytes = VmdWriter::default().to_bytes(&[], 0).unwrap().0;
        bytes[0] = b'X';
        assert!(parse_morphs(&bytes).is_err());
    }
}
