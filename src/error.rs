//! Typed failures of the lip-sync core.
//!
//! Configuration problems are reported when a stage is constructed, never
//! while it runs.  Oracle failures are not errors at all (they fall back to
//! the unconverted text), so they have no variant here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LipSyncError {
    /// A numeric setting is out of range (fps, unit length, overlap, …).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A raw value that does not name one of the six mouth shapes.
    #[error("invalid mouth shape: {0}")]
    InvalidMouthShape(String),

    /// A raw value that does not name one of the six link types.
    #[error("invalid link type: {0}")]
    InvalidLinkType(String),

    /// A rebased key frame does not fit the target format.
    #[error("frame {frame} exceeds the {format} limit of {max}")]
    FrameOutOfRange {
        format: &'static str,
        frame: u64,
        max: u64,
    },

    /// Motion file bytes that do not follow the expected layout.
    #[error("malformed {format} data: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LipSyncError>;

/// Shorthand for building a [`LipSyncError::Config`].
pub(crate) fn config_error(msg: impl Into<String>) -> LipSyncError {
    LipSyncError::Config(msg.into())
}
