//! Keyframe sampler — morph timelines → frame-quantized keyframes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::{config_error, Result},
    morph::MorphTimelineTable,
    timeline::{place_to_units, Place},
};

/// Largest `begin_frame` accepted: the widest frame field of any motion format.
pub const MAX_BEGIN_FRAME: u64 = u32::MAX as u64;

/// One sampled morph weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    pub morph_name: String,
    pub frame: u64,
    pub weight: f32,
}

impl KeyFrame {
    pub fn new(morph_name: impl Into<String>, frame: u64, weight: f32) -> Self {
        Self { morph_name: morph_name.into(), frame, weight }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Output frame rate.
    pub fps: f64,
    /// Duration of one unit length (`ア`), in seconds.
    pub unit_seconds: f64,
    /// Frame that place 0 lands on.
    pub begin_frame: u64,
    /// Pin every morph to weight 0 at the first and last emitted frame.
    pub edge_weight_zero: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { fps: 30.0, unit_seconds: 0.15, begin_frame: 0, edge_weight_zero: true }
    }
}

impl SamplerConfig {
    /// Frames per unit length.
    pub fn unit_frame_length(&self) -> f64 {
        self.fps * self.unit_seconds
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(config_error(format!("fps must be positive, got {}", self.fps)));
        }
        if !(self.unit_seconds.is_finite() && self.unit_seconds > 0.0) {
            return Err(config_error(format!(
                "unit_seconds must be positive, got {}",
                self.unit_seconds
            )));
        }
        if self.begin_frame > MAX_BEGIN_FRAME {
            return Err(config_error(format!(
                "begin_frame must be at most {MAX_BEGIN_FRAME}, got {}",
                self.begin_frame
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct KeyframeSampler {
    begin_frame: u64,
    unit_frame_length: f64,
    edge_weight_zero: bool,
}

impl KeyframeSampler {
    pub fn new(config: &SamplerConfig) -> Result<Self> {
        config.validate()?;
        Self::with_unit_frame_length(
            config.begin_frame,
            config.unit_frame_length(),
            config.edge_weight_zero,
        )
    }

    /// Build from frames-per-unit directly.
    pub fn with_unit_frame_length(
        begin_frame: u64,
        unit_frame_length: f64,
        edge_weight_zero: bool,
    ) -> Result<Self> {
        if !(unit_frame_length.is_finite() && unit_frame_length > 0.0) {
            return Err(config_error(format!(
                "unit frame length must be positive, got {unit_frame_length}"
            )));
        }
        if begin_frame > MAX_BEGIN_FRAME {
            return Err(config_error(format!(
                "begin_frame must be at most {MAX_BEGIN_FRAME}, got {begin_frame}"
            )));
        }
        Ok(Self { begin_frame, unit_frame_length, edge_weight_zero })
    }

    pub fn unit_frame_length(&self) -> f64 {
        self.unit_frame_length
    }

    fn frame_of(&self, place: Place) -> u64 {
        let scaled = (place_to_units(place.max(0)) * self.unit_frame_length).round();
        self.begin_frame.saturating_add(scaled as u64)
    }

    /// Keyframes sorted by frame.  Frames of successive places strictly
    /// increase, even where rounding would merge them; places past the last
    /// representable frame are dropped.
    pub fn sample(&self, table: &MorphTimelineTable) -> Vec<KeyFrame> {
        let places: BTreeSet<Place> = table.values().flat_map(|t| t.places()).collect();

        let mut keys: Vec<KeyFrame> = Vec::new();
        let mut first_frame: Option<u64> = None;
        let mut last_frame: Option<u64> = None;

        for place in places {
            let mut frame = self.frame_of(place);
            if let Some(prev) = last_frame {
                let Some(next) = prev.checked_add(1) else {
                    log::warn!("sampler: frame limit reached; later places dropped");
                    break;
                };
                frame = frame.max(next);
            }
            first_frame.get_or_insert(frame);
            last_frame = Some(frame);

            for (name, timeline) in table {
                if timeline.has_point(place) {
                    let weight = timeline.weight_at(place) as f32;
                    keys.push(KeyFrame::new(name.clone(), frame, weight));
                }
            }
        }

        if let (true, Some(first), Some(last)) = (self.edge_weight_zero, first_frame, last_frame) {
            let mut edges: Vec<KeyFrame> = Vec::new();
            for name in table.keys() {
                for frame in [first, last] {
                    let present = keys.iter().chain(edges.iter()).any(|k: &KeyFrame| {
                        k.frame == frame && k.morph_name == *name
                    });
                    if !present {
                        edges.push(KeyFrame::new(name.clone(), frame, 0.0));
                    }
                }
            }
            keys.extend(edges);
        }

        keys.sort_by_key(|k| k.frame);
        log::debug!("sampler: {} keyframes over {} morphs", keys.len(), table.len());
        keys
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
