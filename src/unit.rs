//! Mouth shapes, link types and the lip-sync unit built from them.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LipSyncError;

// ─────────────────────────────────────────────────────────────────────────────
// MouthShape
// ─────────────────────────────────────────────────────────────────────────────

/// One of the six visual mouth positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MouthShape {
    Closed,
    A,
    I,
    U,
    E,
    O,
}

impl MouthShape {
    /// Every shape, in index order.
    pub const ALL: [MouthShape; 6] = [
        MouthShape::Closed,
        MouthShape::A,
        MouthShape::I,
        MouthShape::U,
        MouthShape::E,
        MouthShape::O,
    ];

    /// The five shapes that are built directly from units.
    pub const VOWELS: [MouthShape; 5] =
        [MouthShape::A, MouthShape::I, MouthShape::U, MouthShape::E, MouthShape::O];

    /// Position in [`MouthShape::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MouthShape::Closed => "Closed",
            MouthShape::A => "A",
            MouthShape::I => "I",
            MouthShape::U => "U",
            MouthShape::E => "E",
            MouthShape::O => "O",
        }
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for MouthShape {
    type Error = LipSyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        MouthShape::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| LipSyncError::InvalidMouthShape(format!("{value} (expected 0..=5)")))
    }
}

impl FromStr for MouthShape {
    type Err = LipSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MouthShape::ALL
            .iter()
            .copied()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LipSyncError::InvalidMouthShape(format!("{s:?}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LinkType
// ─────────────────────────────────────────────────────────────────────────────

/// How a unit connects to the unit before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkType {
    Normal,
    /// Lips close fully before the sound (M, B, P, V rows).
    PreClose,
    /// Lips round/half close before the sound (W row, フ/ウ glides).
    PreHalfClose,
    /// Glottal stop (ッ).
    Tsu,
    /// Long vowel (ー).
    LongSound,
    /// Sustain (…).
    Keep,
}

impl LinkType {
    pub const ALL: [LinkType; 6] = [
        LinkType::Normal,
        LinkType::PreClose,
        LinkType::PreHalfClose,
        LinkType::Tsu,
        LinkType::LongSound,
        LinkType::Keep,
    ];

    /// `true` for the link types that carry a sound of their own.
    pub fn has_single_sound(self) -> bool {
        matches!(self, LinkType::Normal | LinkType::PreClose | LinkType::PreHalfClose)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Normal => "Normal",
            LinkType::PreClose => "PreClose",
            LinkType::PreHalfClose => "PreHalfClose",
            LinkType::Tsu => "Tsu",
            LinkType::LongSound => "LongSound",
            LinkType::Keep => "Keep",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for LinkType {
    type Error = LipSyncError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LinkType::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| LipSyncError::InvalidLinkType(format!("{value} (expected 0..=5)")))
    }
}

impl FromStr for LinkType {
    type Err = LipSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LinkType::ALL
            .iter()
            .copied()
            .find(|link| link.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LipSyncError::InvalidLinkType(format!("{s:?}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LipSyncUnit
// ─────────────────────────────────────────────────────────────────────────────

/// A relative-duration atom of mouth motion.
///
/// `length_percent` is relative to the unit length: `100` is one "ア".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LipSyncUnit {
    pub shape: MouthShape,
    pub link: LinkType,
    pub length_percent: u32,
}

impl LipSyncUnit {
    pub const fn new(shape: MouthShape, link: LinkType, length_percent: u32) -> Self {
        Self { shape, link, length_percent }
    }
}

impl fmt::Display for LipSyncUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}%", self.shape, self.link, self.length_percent)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_u8() {
        assert_eq!(MouthShape::try_from(0).unwrap(), MouthShape::Closed);
        assert_eq!(MouthShape::try_from(5).unwrap(), MouthShape::O);
        let err = MouthShape::try_from(6).unwrap_err();
        assert!(matches!(err, LipSyncError::InvalidMouthShape(_)), "got: {err}");
    }

    #[test]
    fn test_shape_from_str() {
        assert_eq!("a".parse::<MouthShape>().unwrap(), MouthShape::A);
        assert_eq!("Closed".parse::<MouthShape>().unwrap(), MouthShape::Closed);
        assert!("N".parse::<MouthShape>().is_err());
    }

    #[test]
    fn test_index_matches_all() {
        for (i, shape) in MouthShape::ALL.iter().enumerate() {
            assert_eq!(shape.index(), i);
        }
    }

    #[test]
    fn test_link_from_u8_and_str() {
        assert_eq!(LinkType::try_from(4).unwrap(), LinkType::LongSound);
        assert!(matches!(LinkType::try_from(9), Err(LipSyncError::InvalidLinkType(_))));
        assert_eq!("keep".parse::<LinkType>().unwrap(), LinkType::Keep);
    }

    #[test]
    fn test_single_sound() {
        assert!(LinkType::Normal.has_single_sound());
        assert!(LinkType::PreClose.has_single_sound());
        assert!(LinkType::PreHalfClose.has_single_sound());
        assert!(!LinkType::Tsu.has_single_sound());
        assert!(!LinkType::LongSound.has_single_sound());
        assert!(!LinkType::Keep.has_single_sound());
    }
}
