//! MVD (Motion Vector Data) morph writer and reader.
//!
//! ## Layout (all integers little-endian)
//!
//! ```text
//! header
//!   magic              30 bytes  "Motion Vector Data file", 0-padded
//!   version            f32       1.0
//!   encoding           u8        1 (UTF-8)
//!   model name         i32 length + UTF-8 bytes
//!   English model name i32 length + UTF-8 bytes
//!   fps                f32
//!   reserved           i32       0
//! name list block
//!   tag u8 0x00, minor u8 0x00, reserved i32 0, count i32
//!   count × { id i32, name i32 length + UTF-8 bytes }
//! morph block, one per id in id order
//!   tag u8 0x20, minor u8 0x00, id i32, item size i32 16, count i32, reserved i32 0
//!   count × { frame i32, weight f32, interpolation u8 × 4 }
//! end of file
//!   tag u8 0xFF, minor u8 0x00
//! ```
//!
//! Ids are assigned in order of first appearance in the frame-sorted keys.

use std::collections::HashMap;

use crate::{
    codec::{put_padded, ByteReader, MotionWriter},
    error::Result,
    keyframe::KeyFrame,
};

pub const MAGIC: &[u8] = b"Motion Vector Data file";
pub const MAGIC_LEN: usize = 30;
pub const VERSION: f32 = 1.0;
pub const ENCODING_UTF8: u8 = 1;

pub const TAG_NAME_LIST: u8 = 0x00;
pub const TAG_MORPH: u8 = 0x20;
pub const TAG_EOF: u8 = 0xFF;

/// Bytes per morph item: frame, weight, 4 interpolation bytes.
pub const MORPH_ITEM_LEN: i32 = 16;
/// Linear interpolation handles.
pub const LINEAR_INTERPOLATION: [u8; 4] = [20, 20, 107, 107];

const FORMAT: &str = "MVD";

fn put_string(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(&(text.len() as i32).to_le_bytes());
    buf.extend_from_slice(text.as_bytes());
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[derive(Debug, Clone)]
pub struct MvdWriter {
    pub model_name: String,
    pub english_model_name: String,
    pub fps: f32,
}

impl Default for MvdWriter {
    fn default() -> Self {
        Self { model_name: String::new(), english_model_name: String::new(), fps: 30.0 }
    }
}

impl MvdWriter {
    pub fn new(model_name: impl Into<String>, english_model_name: impl Into<String>, fps: f32) -> Self {
        Self { model_name: model_name.into(), english_model_name: english_model_name.into(), fps }
    }
}

/// Distinct names in first-appearance order, and each key's id.
fn assign_ids(keys: &[KeyFrame]) -> (Vec<&str>, Vec<usize>) {
    let mut names: Vec<&str> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let ids = keys
        .iter()
        .map(|k| {
            *index.entry(k.morph_name.as_str()).or_insert_with(|| {
                names.push(k.morph_name.as_str());
                names.len() - 1
            })
        })
        .collect();
    (names, ids)
}

impl MotionWriter for MvdWriter {
    fn format_name(&self) -> &'static str {
        FORMAT
    }

    fn max_frame(&self) -> u64 {
        i32::MAX as u64
    }

    fn encode(&self, keys: &[KeyFrame]) -> Vec<u8> {
        let (names, ids) = assign_ids(keys);
        let mut buf = Vec::with_capacity(64 + names.len() * 16 + keys.len() * 16);

        // ── Header ───────────────────────────────────────────────────────────
        put_padded(&mut buf, MAGIC, MAGIC_LEN);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.push(ENCODING_UTF8);
        put_string(&mut buf, &self.model_name);
        put_string(&mut buf, &self.english_model_name);
        buf.extend_from_slice(&self.fps.to_le_bytes());
        put_i32(&mut buf, 0);

        // ── Name list ────────────────────────────────────────────────────────
        buf.extend_from_slice(&[TAG_NAME_LIST, 0x00]);
        put_i32(&mut buf, 0);
        put_i32(&mut buf, names.len() as i32);
        for (id, name) in names.iter().enumerate() {
            put_i32(&mut buf, id as i32);
            put_string(&mut buf, name);
        }

        // ── Morph blocks ─────────────────────────────────────────────────────
        for id in 0..names.len() {
            let items: Vec<&KeyFrame> =
                keys.iter().zip(&ids).filter(|&(_, &i)| i == id).map(|(k, _)| k).collect();
            buf.extend_from_slice(&[TAG_MORPH, 0x00]);
            put_i32(&mut buf, id as i32);
            put_i32(&mut buf, MORPH_ITEM_LEN);
            put_i32(&mut buf, items.len() as i32);
            put_i32(&mut buf, 0);
            for key in items {
                put_i32(&mut buf, key.frame as i32);
                buf.extend_from_slice(&key.weight.to_le_bytes());
                buf.extend_from_slice(&LINEAR_INTERPOLATION);
            }
        }

        buf.extend_from_slice(&[TAG_EOF, 0x00]);
        buf
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reader
// ─────────────────────────────────────────────────────────────────────────────

/// Contents of an MVD file written by [`MvdWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct MvdMorphs {
    pub model_name: String,
    pub english_model_name: String,
    pub fps: f32,
    /// Keys grouped by morph id, each group in file order.
    pub keys: Vec<KeyFrame>,
}

fn read_string(r: &mut ByteReader<'_>) -> Result<String> {
    let len = r.i32()?;
    let len = usize::try_from(len).map_err(|_| r.malformed(format!("negative string length {len}")))?;
    let bytes = r.take(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| r.malformed("string is not UTF-8"))
}

fn read_count(r: &mut ByteReader<'_>) -> Result<usize> {
    let count = r.i32()?;
    usize::try_from(count).map_err(|_| r.malformed(format!("negative count {count}")))
}

pub fn parse_morphs(data: &[u8]) -> Result<MvdMorphs> {
    let mut r = ByteReader::new(data, FORMAT);

    if !r.take(MAGIC_LEN)?.starts_with(MAGIC) {
        return Err(r.malformed("bad magic"));
    }
    let _version = r.f32()?;
    if r.u8()? != ENCODING_UTF8 {
        return Err(r.malformed("only UTF-8 files are supported"));
    }
    let model_name = read_string(&mut r)?;
    let english_model_name = read_string(&mut r)?;
    let fps = r.f32()?;
    let _reserved = r.i32()?;

    let mut names: HashMap<i32, String> = HashMap::new();
    let mut keys = Vec::new();

    loop {
        let tag = r.u8()?;
        let _minor = r.u8()?;
        match tag {
            TAG_NAME_LIST => {
                let _reserved = r.i32()?;
                for _ in 0..read_count(&mut r)? {
                    let id = r.i32()?;
                    names.insert(id, read_string(&mut r)?);
                }
            }
            TAG_MORPH => {
                let id = r.i32()?;
                let item_len = r.i32()?;
                if item_len != MORPH_ITEM_LEN {
                    return Err(r.malformed(format!("unexpected morph item size {item_len}")));
                }
                let count = read_count(&mut r)?;
                let _reserved = r.i32()?;
                let name = names
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| r.malformed(format!("morph id {id} not in name list")))?;
                for _ in 0..count {
                    let frame = r.i32()?;
                    let weight = r.f32()?;
                    r.take(4)?;
                    let frame = u64::try_from(frame)
                        .map_err(|_| r.malformed(format!("negative frame {frame}")))?;
                    keys.push(KeyFrame { morph_name: name.clone(), frame, weight });
                }
            }
            TAG_EOF => break,
            other => return Err(r.malformed(format!("unknown block tag 0x{other:02X}"))),
        }
    }

    if !r.is_at_end() {
        return Err(r.malformed("trailing bytes after end tag"));
    }
    Ok(MvdMorphs { model_name, english_model_name, fps, keys })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LipSyncError;

    #[test]
    fn test_header_layout() {
        let writer = MvdWriter::new("ミク", "Miku", 30.0);
        let (bytes, _) = writer.to_bytes(&[], 0).unwrap();

        assert_eq!(&bytes[..MAGIC.len()], MAGIC);
        assert!(bytes[MAGIC.len()..MAGIC_LEN].iter().all(|&b| b == 0));
        assert_eq!(&bytes[30..34], &1.0f32.to_le_bytes());
        assert_eq!(bytes[34], 1);
        assert_eq!(&bytes[35..39], &6i32.to_le_bytes()); // "ミク" in UTF-8
        assert_eq!(&bytes[39..45], "ミク".as_bytes());
        assert_eq!(&bytes[45..49], &4i32.to_le_bytes());
        assert_eq!(&bytes[49..53], b"Miku");
        assert_eq!(&bytes[53..57], &30.0f32.to_le_bytes());
        assert_eq!(&bytes[57..61], &0i32.to_le_bytes());
        // empty name list, then end tag
        assert_eq!(&bytes[61..], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0]);
    }

    #[test]
    fn test_morph_block_layout() {
        let keys = vec![KeyFrame::new("あ", 3, 0.5)];
        let (bytes, count) = MvdWriter::default().to_bytes(&keys, 0).unwrap();
        assert_eq!(count, 1);

        // header: 30 + 4 + 1 + 4 + 4 + 4 + 4 = 51
        let list = &bytes[51..];
        assert_eq!(&list[..2], &[TAG_NAME_LIST, 0]);
        assert_eq!(&list[6..10], &1i32.to_le_bytes());
        assert_eq!(&list[10..14], &0i32.to_le_bytes());
        assert_eq!(&list[14..18], &3i32.to_le_bytes());
        assert_eq!(&list[18..21], "あ".as_bytes());

        let block = &list[21..];
        assert_eq!(&block[..2], &[TAG_MORPH, 0]);
        assert_eq!(&block[2..6], &0i32.to_le_bytes());
        assert_eq!(&block[6..10], &16i32.to_le_bytes());
        assert_eq!(&block[10..14], &1i32.to_le_bytes());
        assert_eq!(&block[14..18], &0i32.to_le_bytes());
        assert_eq!(&block[18..22], &3i32.to_le_bytes());
        assert_eq!(&block[22..26], &0.5f32.to_le_bytes());
        assert_eq!(&block[26..30], &LINEAR_INTERPOLATION);
        assert_eq!(&block[30..], &[TAG_EOF, 0]);
    }

    #[test]
    fn test_ids_follow_first_appearance() {
        let keys = vec![
            KeyFrame::new("い", 5, 1.0),
            KeyFrame::new("あ", 0, 0.0),
            KeyFrame::new("い", 1, 0.5),
        ];
        let sorted = crate::codec::prepare(&keys, 0, FORMAT, i32::MAX as u64).unwrap();
        let (names, ids) = assign_ids(&sorted);
        assert_eq!(names, vec!["あ", "い"]);
        assert_eq!(ids, vec![0, 1, 1]);
    }

    #[test]
    fn test_round_trip() {
        let keys = vec![
            KeyFrame::new("い", 15, 1.0),
            KeyFrame::new("あ", 10, 0.0),
            KeyFrame::new("い", 11, 0.5),
            KeyFrame::new("あ", 20, 0.75),
        ];
        let writer = MvdWriter::new("model", "model_en", 60.0);
        let (bytes, _) = writer.to_bytes(&keys, 10).unwrap();
        let parsed = parse_morphs(&bytes).unwrap();

        assert_eq!(parsed.model_name, "model");
        assert_eq!(parsed.english_model_name, "model_en");
        assert_eq!(parsed.fps, 60.0);
        assert_eq!(
            parsed.keys,
            vec![
                KeyFrame::new("あ", 0, 0.0),
                KeyFrame::new("あ", 10, 0.75),
                KeyFrame::new("い", 1, 0.5),
                KeyFrame::new("い", 5, 1.0),
            ]
        );
    }

    #[test]
    fn test_frame_limit() {
        let keys = vec![KeyFrame::new("あ", i32::MAX as u64 + 1, 1.0)];
        let err = MvdWriter::default().to_bytes(&keys, 0).unwrap_err();
        assert!(matches!(err, LipSyncError::FrameOutOfRange { format: "MVD", .. }), "got: {err}");
        assert!(MvdWriter::default().to_bytes(&keys, 1).is_ok());
    }

    #[test]
    fn test_parse_rejects_truncation() {
        let keys = vec![KeyFrame::new("あ", 3, 0.5)];
        let (bytes, _) = MvdWriter::default().to_bytes(&keys, 0).unwrap();
        let err = parse_morphs(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, LipSyncError::Malformed { format: "MVD", .. }), "got: {err}");
    }
}
