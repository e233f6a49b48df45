//! Morph mapper — mouth-shape timelines → named morph timelines.
//!
//! A [`MorphPreset`] routes each mouth shape to any number of morphs, each
//! with its own weight.  Several shapes may feed the same morph; their areas
//! simply accumulate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{config_error, Result},
    timeline::{Timeline, TimelineSet},
    unit::MouthShape,
};

/// Standard morph names of MMD-style models.
pub const DEFAULT_A_MORPH: &str = "あ";
pub const DEFAULT_I_MORPH: &str = "い";
pub const DEFAULT_U_MORPH: &str = "う";
pub const DEFAULT_E_MORPH: &str = "え";
pub const DEFAULT_O_MORPH: &str = "お";

/// Morph name → summed timeline, ordered by name.
pub type MorphTimelineTable = BTreeMap<String, Timeline>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphWeight {
    pub morph_name: String,
    pub weight: f64,
}

impl MorphWeight {
    pub fn new(morph_name: impl Into<String>, weight: f64) -> Self {
        Self { morph_name: morph_name.into(), weight }
    }
}

/// Shape → ordered list of weighted morphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphPreset {
    pub closed: Vec<MorphWeight>,
    pub a: Vec<MorphWeight>,
    pub i: Vec<MorphWeight>,
    pub u: Vec<MorphWeight>,
    pub e: Vec<MorphWeight>,
    pub o: Vec<MorphWeight>,
}

impl Default for MorphPreset {
    fn default() -> Self {
        let one = |name: &str| vec![MorphWeight::new(name, 1.0)];
        Self {
            closed: Vec::new(),
            a: one(DEFAULT_A_MORPH),
            i: one(DEFAULT_I_MORPH),
            u: one(DEFAULT_U_MORPH),
            e: one(DEFAULT_E_MORPH),
            o: one(DEFAULT_O_MORPH),
        }
    }
}

impl MorphPreset {
    /// A preset that routes nothing anywhere.
    pub fn empty() -> Self {
        Self {
            closed: Vec::new(),
            a: Vec::new(),
            i: Vec::new(),
            u: Vec::new(),
            e: Vec::new(),
            o: Vec::new(),
        }
    }

    pub fn entries(&self, shape: MouthShape) -> &[MorphWeight] {
        match shape {
            MouthShape::Closed => &self.closed,
            MouthShape::A => &self.a,
            MouthShape::I => &self.i,
            MouthShape::U => &self.u,
            MouthShape::E => &self.e,
            MouthShape::O => &self.o,
        }
    }

    fn entries_mut(&mut self, shape: MouthShape) -> &mut Vec<MorphWeight> {
        match shape {
            MouthShape::Closed => &mut self.closed,
            MouthShape::A => &mut self.a,
            MouthShape::I => &mut self.i,
            MouthShape::U => &mut self.u,
            MouthShape::E => &mut self.e,
            MouthShape::O => &mut self.o,
        }
    }

    /// Route `shape` to one more morph.
    pub fn push(&mut self, shape: MouthShape, morph_name: impl Into<String>, weight: f64) {
        self.entries_mut(shape).push(MorphWeight::new(morph_name, weight));
    }

    /// Every weight must be within `0..=1`.
    pub fn validate(&self) -> Result<()> {
        for shape in MouthShape::ALL {
            for entry in self.entries(shape) {
                if !(0.0..=1.0).contains(&entry.weight) {
                    return Err(config_error(format!(
                        "weight of morph {:?} for shape {shape} must be within 0..=1, got {}",
                        entry.morph_name, entry.weight
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Applies a preset to a [`TimelineSet`].
#[derive(Debug, Clone)]
pub struct MorphMapper {
    preset: MorphPreset,
    split_e_to_ai: bool,
}

impl MorphMapper {
    /// Fails if a preset weight is out of range.
    pub fn new(preset: MorphPreset, split_e_to_ai: bool) -> Result<Self> {
        preset.validate()?;
        Ok(Self { preset, split_e_to_ai })
    }

    pub fn preset(&self) -> &MorphPreset {
        &self.preset
    }

    /// With `split_e_to_ai`, anything routed to the default `え` morph goes
    /// at half weight to `あ` and `い` instead.
    pub fn map(&self, set: &TimelineSet) -> MorphTimelineTable {
        let mut table = MorphTimelineTable::new();

        for (shape, timeline) in set.iter() {
            for entry in self.preset.entries(shape) {
                if entry.morph_name.is_empty() {
                    continue;
                }
                let split = self.split_e_to_ai && entry.morph_name == DEFAULT_E_MORPH;
                for area in timeline.areas() {
                    if split {
                        let half = area.scaled(entry.weight * 0.5);
                        for target in [DEFAULT_A_MORPH, DEFAULT_I_MORPH] {
                            table.entry(target.to_string()).or_default().push(half.clone());
                        }
                    } else {
                        table
                            .entry(entry.morph_name.clone())
                            .or_default()
                            .push(area.scaled(entry.weight));
                    }
                }
            }
        }

        log::debug!("morph: {} morph timelines", table.len());
        table
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
