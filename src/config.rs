//! JSON configuration for the whole conversion.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "timeline": { "overlap_percent": 50, "long_sound_end_weight": 1.0 },
//!   "morph":    { "split_e_to_ai": true },
//!   "sampler":  { "fps": 30, "unit_seconds": 0.15 },
//!   "output":   { "model_name": "初音ミク" }
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    keyframe::SamplerConfig,
    morph::MorphPreset,
    preprocess::PreprocessorConfig,
    timeline::TimelineConfig,
    tokenize::SegmenterConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphConfig {
    pub preset: MorphPreset,
    /// Route the `え` morph half to `あ`, half to `い`.
    pub split_e_to_ai: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Keys before this frame are dropped; the rest start from 0.
    pub base_frame: u64,
    pub model_name: String,
    /// MVD only.
    pub english_model_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LipSyncConfig {
    pub reading: PreprocessorConfig,
    pub segmenter: SegmenterConfig,
    pub timeline: TimelineConfig,
    pub morph: MorphConfig,
    pub sampler: SamplerConfig,
    pub output: OutputConfig,
}

impl LipSyncConfig {
    /// Range-check every numeric setting.
    pub fn validate(&self) -> Result<()> {
        self.timeline.validate()?;
        self.morph.preset.validate()?;
        self.sampler.validate()
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read configuration: {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("In {}", path.display()))
    }

    /// Frames per unit length.
    pub fn unit_frame_length(&self) -> f64 {
        self.sampler.unit_frame_length()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::MorphWeight;

    #[test]
    fn test_empty_json_is_default() {
        let config = LipSyncConfig::from_json("{}").unwrap();
        assert_eq!(config.timeline, TimelineConfig::default());
        assert_eq!(config.morph, MorphConfig::default());
        assert_eq!(config.sampler, SamplerConfig::default());
        assert!(config.timeline.edge_closed);
        assert!(config.sampler.edge_weight_zero);
        assert!(!config.segmenter.fold_h_row);
    }

    #[test]
    fn test_partial_sections() {
        let config = LipSyncConfig::from_json(
            r#"{
                "timeline": { "overlap_percent": 25 },
                "morph": { "split_e_to_ai": true, "preset": { "closed": [{ "morph_name": "ん", "weight": 1 }] } },
                "sampler": { "fps": 60 },
                "output": { "model_name": "ミク", "base_frame": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.timeline.overlap_percent, 25.0);
        assert_eq!(config.timeline.long_sound_end_weight, 1.0);
        assert!(config.morph.split_e_to_ai);
        assert_eq!(config.morph.preset.closed, vec![MorphWeight::new("ん", 1.0)]);
        assert_eq!(config.morph.preset.a, vec![MorphWeight::new("あ", 1.0)]);
        assert_eq!(config.output.base_frame, 5);
        approx::assert_relative_eq!(config.unit_frame_length(), 9.0, max_relative = 1e-12);
    }

    #[test]
    fn test_out_of_range_rejected() {
        for json in [
            r#"{ "timeline": { "overlap_percent": 0 } }"#,
            r#"{ "timeline": { "long_sound_end_weight": 2 } }"#,
            r#"{ "sampler": { "fps": 0 } }"#,
            r#"{ "sampler": { "unit_seconds": -1 } }"#,
            r#"{ "sampler": { "begin_frame": 18446744073709551615 } }"#,
            r#"{ "morph": { "preset": { "a": [{ "morph_name": "あ", "weight": 3 }] } } }"#,
        ] {
            assert!(LipSyncConfig::from_json(json).is_err(), "accepted {json}");
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lipsync.json");
        std::fs::write(&path, r#"{ "output": { "model_name": "テスト" } }"#).unwrap();
        let config = LipSyncConfig::load(&path).unwrap();
        assert_eq!(config.output.model_name, "テスト");

        let err = LipSyncConfig::load(Path::new("/nonexistent/kuchipaku.json")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot read configuration"));
    }

    #[test]
    fn test_serializes_back() {
        let json = serde_json::to_string(&LipSyncConfig::default()).unwrap();
        let back = LipSyncConfig::from_json(&json).unwrap();
        assert_eq!(back.morph, MorphConfig::default());
    }
}
