//! Pipeline facade — text → reading → units → timelines → keyframes → file.
//!
//! Every stage is built (and validated) once in [`LipSyncPipeline::new`];
//! running the pipeline afterwards cannot fail except while writing.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};

use crate::{
    codec::MotionWriter,
    config::{LipSyncConfig, OutputConfig},
    error::LipSyncError,
    keyframe::{KeyFrame, KeyframeSampler},
    morph::{MorphMapper, MorphTimelineTable},
    mvd::MvdWriter,
    phonemize::{NullOracle, ReadingOracle},
    preprocess::TextPreprocessor,
    timeline::{TimelineBuilder, TimelineSet},
    tokenize::Segmenter,
    unit::LipSyncUnit,
    vmd::VmdWriter,
};

// ─────────────────────────────────────────────────────────────────────────────
// Output format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionFormat {
    Vmd,
    Mvd,
}

impl MotionFormat {
    /// Format named by a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            MotionFormat::Vmd => "vmd",
            MotionFormat::Mvd => "mvd",
        }
    }
}

impl fmt::Display for MotionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for MotionFormat {
    type Err = LipSyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vmd" => Ok(MotionFormat::Vmd),
            "mvd" => Ok(MotionFormat::Mvd),
            other => Err(LipSyncError::Config(format!("unknown motion format {other:?}"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LipSyncPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// All stages of one configured conversion.
pub struct LipSyncPipeline {
    preprocessor: TextPreprocessor,
    oracle: Box<dyn ReadingOracle + Send>,
    segmenter: Segmenter,
    builder: TimelineBuilder,
    mapper: MorphMapper,
    sampler: KeyframeSampler,
    output: OutputConfig,
    fps: f64,
}

impl LipSyncPipeline {
    /// Pipeline without a reading oracle: kanji pass through unread.
    pub fn new(config: LipSyncConfig) -> crate::Result<Self> {
        Self::with_oracle(config, Box::new(NullOracle))
    }

    /// Fails if any section of `config` is out of range.
    pub fn with_oracle(
        config: LipSyncConfig,
        oracle: Box<dyn ReadingOracle + Send>,
    ) -> crate::Result<Self> {
        let builder = TimelineBuilder::new(config.timeline)?;
        let mapper = MorphMapper::new(config.morph.preset, config.morph.split_e_to_ai)?;
        let sampler = KeyframeSampler::new(&config.sampler)?;
        Ok(Self {
            preprocessor: TextPreprocessor::with_config(config.reading),
            oracle,
            segmenter: Segmenter::new(config.segmenter),
            builder,
            mapper,
            sampler,
            output: config.output,
            fps: config.sampler.fps,
        })
    }

    /// Replace the reading oracle.
    pub fn set_oracle(&mut self, oracle: Box<dyn ReadingOracle + Send>) {
        self.oracle = oracle;
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }

    // ── Stages ────────────────────────────────────────────────────────────────

    /// Katakana reading of `text`.
    pub fn reading(&self, text: &str) -> String {
        self.preprocessor.reading(text, self.oracle.as_ref())
    }

    pub fn units(&self, text: &str) -> Vec<LipSyncUnit> {
        self.segmenter.segment(&self.reading(text))
    }

    pub fn timelines(&self, text: &str) -> TimelineSet {
        self.builder.build(&self.units(text))
    }

    pub fn morph_timelines(&self, text: &str) -> MorphTimelineTable {
        self.mapper.map(&self.timelines(text))
    }

    pub fn key_frames(&self, text: &str) -> Vec<KeyFrame> {
        self.sampler.sample(&self.morph_timelines(text))
    }

    /// Keyframes for a reading that is already katakana; no oracle call.
    pub fn key_frames_from_reading(&self, reading: &str) -> Vec<KeyFrame> {
        let units = self.segmenter.segment(reading);
        self.sampler.sample(&self.mapper.map(&self.builder.build(&units)))
    }

    // ── Output ────────────────────────────────────────────────────────────────

    fn writer(&self, format: MotionFormat) -> Box<dyn MotionWriter> {
        match format {
            MotionFormat::Vmd => Box::new(VmdWriter::new(self.output.model_name.clone())),
            MotionFormat::Mvd => Box::new(MvdWriter::new(
                self.output.model_name.clone(),
                self.output.english_model_name.clone(),
                self.fps as f32,
            )),
        }
    }

    /// Write already-sampled keyframes.  Returns the number of keys written.
    pub fn write_key_frames(
        &self,
        key_frames: &[KeyFrame],
        format: MotionFormat,
        out: &mut dyn Write,
    ) -> crate::Result<usize> {
        self.writer(format).write(out, key_frames, self.output.base_frame)
    }

    /// Convert `text` and write the motion to `out`.
    pub fn write_motion(
        &self,
        text: &str,
        format: MotionFormat,
        out: &mut dyn Write,
    ) -> crate::Result<usize> {
        self.write_key_frames(&self.key_frames(text), format, out)
    }

    /// Convert `text` and write it to `path`.
    ///
    /// The format comes from `format`, or from the file extension when
    /// `None`.  The file is written next to `path` under a temporary name
    /// and renamed over it only once complete.
    pub fn write_to_file(
        &self,
        text: &str,
        path: &Path,
        format: Option<MotionFormat>,
    ) -> Result<usize> {
        let format = match format {
            Some(f) => f,
            None => MotionFormat::from_path(path).with_context(|| {
                format!("Cannot tell the motion format of {}; use .vmd or .mvd", path.display())
            })?,
        };

        let key_frames = self.key_frames(text);
        let (bytes, count) = self
            .writer(format)
            .to_bytes(&key_frames, self.output.base_frame)
            .with_context(|| format!("Cannot encode {format} for {}", path.display()))?;

        let tmp = temp_path(path);
        std::fs::write(&tmp, &bytes)
            .with_context(|| format!("Cannot write {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            std::fs::remove_file(&tmp).ok();
            return Err(e).with_context(|| format!("Cannot replace {}", path.display()));
        }

        log::info!("saved {count} keys ({} bytes) to {}", bytes.len(), path.display());
        Ok(count)
    }
}

/// Sibling of `path` used while writing.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{phonemize::DictionaryOracle, unit::MouthShape, vmd};

    fn pipeline() -> LipSyncPipeline {
        LipSyncPipeline::new(LipSyncConfig::default()).unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(MotionFormat::from_path(Path::new("a/b.vmd")), Some(MotionFormat::Vmd));
        assert_eq!(MotionFormat::from_path(Path::new("b.MVD")), Some(MotionFormat::Mvd));
        assert_eq!(MotionFormat::from_path(Path::new("b.wav")), None);
        assert_eq!(MotionFormat::from_path(Path::new("noext")), None);
        assert!("bvh".parse::<MotionFormat>().is_err());
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let mut config = LipSyncConfig::default();
        config.sampler.fps = 0.0;
        assert!(LipSyncPipeline::new(config).is_err());
    }

    #[test]
    fn test_units_through_reading() {
        let units = pipeline().units("あー");
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.shape == MouthShape::A));
    }

    #[test]
    fn test_iteration_mark_after_long_sound() {
        let units = pipeline().units("あーゝ");
        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.shape == MouthShape::A), "{units:?}");
    }

    #[test]
    fn test_oracle_is_used() {
        let mut dict = DictionaryOracle::default();
        dict.insert("愛", "アイ");
        let p = LipSyncPipeline::with_oracle(LipSyncConfig::default(), Box::new(dict)).unwrap();
        assert_eq!(p.reading("愛"), "アイ");
        assert_eq!(pipeline().reading("愛"), "愛");
    }

    #[test]
    fn test_write_motion_vmd() {
        let mut out = Vec::new();
        let count = pipeline().write_motion("あ", MotionFormat::Vmd, &mut out).unwrap();
        let parsed = vmd::parse_morphs(&out).unwrap();
        assert_eq!(parsed.keys.len(), count);
        assert!(parsed.keys.iter().all(|k| k.morph_name == "あ"));
    }

    #[test]
    fn test_write_to_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.vmd");
        std::fs::write(&path, b"old").unwrap();

        let count = pipeline().write_to_file("あいう", &path, None).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(vmd::parse_morphs(&bytes).unwrap().keys.len(), count);
        assert!(!temp_path(&path).exists());

        let err = pipeline().write_to_file("あ", &dir.path().join("out.txt"), None).unwrap_err();
        assert!(format!("{err:#}").contains("motion format"));
    }

    #[test]
    fn test_failed_encode_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mvd");
        std::fs::write(&path, b"old").unwrap();

        let mut config = LipSyncConfig::default();
        config.sampler.begin_frame = i32::MAX as u64;
        let p = LipSyncPipeline::new(config).unwrap();
        assert!(p.write_to_file("あ", &path, None).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }
}
