//! Shared contract of the motion file writers.
//!
//! Every writer goes through the same preparation:
//!   1. keys before `base_frame` are dropped
//!   2. the rest are rebased to `frame - base_frame`
//!   3. a stable sort by frame
//!   4. a range check against the format's largest frame
//!
//! The whole file is then built in memory and written with a single
//! `write_all`, so a range error never leaves a partial file behind.

use std::io::Write;

use crate::{
    error::{LipSyncError, Result},
    keyframe::KeyFrame,
};

pub trait MotionWriter {
    /// Short name used in errors (`"VMD"`, `"MVD"`).
    fn format_name(&self) -> &'static str;

    /// Largest frame number the format can store.
    fn max_frame(&self) -> u64;

    /// Serialise keys that already went through [`prepare`].
    fn encode(&self, keys: &[KeyFrame]) -> Vec<u8>;

    /// Complete file image for `key_frames`.
    fn to_bytes(&self, key_frames: &[KeyFrame], base_frame: u64) -> Result<(Vec<u8>, usize)> {
        let keys = prepare(key_frames, base_frame, self.format_name(), self.max_frame())?;
        Ok((self.encode(&keys), keys.len()))
    }

    /// Write the file to `out`.  Returns the number of keys written.
    fn write(&self, out: &mut dyn Write, key_frames: &[KeyFrame], base_frame: u64) -> Result<usize> {
        let (bytes, count) = self.to_bytes(key_frames, base_frame)?;
        out.write_all(&bytes)?;
        log::debug!("{}: {} keys, {} bytes", self.format_name(), count, bytes.len());
        Ok(count)
    }
}

/// Filter, rebase, sort and range-check `key_frames`.
pub fn prepare(
    key_frames: &[KeyFrame],
    base_frame: u64,
    format: &'static str,
    max_frame: u64,
) -> Result<Vec<KeyFrame>> {
    let mut keys: Vec<KeyFrame> = key_frames
        .iter()
        .filter(|k| k.frame >= base_frame)
        .map(|k| KeyFrame { frame: k.frame - base_frame, ..k.clone() })
        .collect();
    keys.sort_by_key(|k| k.frame);

    if let Some(last) = keys.last() {
        if last.frame > max_frame {
            return Err(LipSyncError::FrameOutOfRange { format, frame: last.frame, max: max_frame });
        }
    }
    Ok(keys)
}

// ─────────────────────────────────────────────────────────────────────────────
// Little-endian helpers
// ─────────────────────────────────────────────────────────────────────────────

/// `bytes` followed by zeros up to `len`.
pub(crate) fn put_padded(buf: &mut Vec<u8>, bytes: &[u8], len: usize) {
    let n = bytes.len().min(len);
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (len - n), 0);
}

/// Cursor over a byte slice; every read is bounds-checked.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    format: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], format: &'static str) -> Self {
        Self { data, pos: 0, format }
    }

    pub(crate) fn malformed(&self, reason: impl Into<String>) -> LipSyncError {
        LipSyncError::Malformed { format: self.format, reason: reason.into() }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.data.len()).ok_or_else(|| {
            self.malformed(format!("truncated at byte {} (wanted {} more)", self.pos, n))
        })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn k(name: &str, frame: u64) -> KeyFrame {
        KeyFrame::new(name, frame, 1.0)
    }

    #[test]
    fn test_prepare_filters_rebases_and_sorts() {
        let keys = vec![k("a", 12), k("b", 3), k("c", 10), k("d", 10)];
        let out = prepare(&keys, 5, "TEST", 100).unwrap();
        let got: Vec<(&str, u64)> = out.iter().map(|k| (k.morph_name.as_str(), k.frame)).collect();
        // Stable: c before d.
        assert_eq!(got, vec![("c", 5), ("d", 5), ("a", 7)]);
    }

    #[test]
    fn test_prepare_range_check() {
        let err = prepare(&[k("a", 101)], 0, "TEST", 100).unwrap_err();
        assert!(
            matches!(err, LipSyncError::FrameOutOfRange { frame: 101, max: 100, .. }),
            "got: {err}"
        );
        // Rebasing may bring a key back into range.
        assert_eq!(prepare(&[k("a", 101)], 1, "TEST", 100).unwrap().len(), 1);
    }

    #[test]
    fn test_put_padded() {
        let mut buf = Vec::new();
        put_padded(&mut buf, b"abc", 5);
        put_padded(&mut buf, b"abcdef", 2);
        assert_eq!(buf, b"abc\0\0ab");
    }

    #[test]
    fn test_reader_bounds() {
        let mut r = ByteReader::new(&[1, 0, 0, 0, 9], "TEST");
        assert_eq!(r.u32().unwrap(), 1);
        assert!(r.u32().is_err());
        assert_eq!(r.u8().unwrap(), 9);
        assert!(r.is_at_end());
    }
}
