//! Timeline builder — lip-sync units → per-shape weight curves.
//!
//! ## Places
//! Time is measured in unit lengths (`ア` = 1.0) stored as fixed-point
//! micro-units ([`UNIT`] = 1.0).  A unit of `length_percent = p` spans
//! `p * 10_000` micro-units and ramps for `p * overlap_hundredths`, so every
//! place the builder computes is exact and collisions compare equal.
//!
//! ## Gestures
//! Each sounded unit, together with the long sounds / glottal stops /
//! sustains that follow it, becomes one [`KeyArea`]:
//!
//! ```text
//!  weight
//!   1 ┤    ┌──────────────┐
//!     │   /                \
//!   0 ┼──┴──────────────────┴──
//!      start  open   hold   close
//! ```
//!
//! The `Closed` timeline is never built this way; it is derived afterwards
//! as `max(0, 1 - Σ other shapes)`.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::{
    error::{config_error, Result},
    unit::{LinkType, LipSyncUnit, MouthShape},
};

/// One unit length, in micro-units.
pub const UNIT: i64 = 1_000_000;

/// Position in time, in micro-units of the unit length.
pub type Place = i64;

/// Derived weights below this are treated as exactly zero.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Place → unit lengths.
pub fn place_to_units(place: Place) -> f64 {
    place as f64 / UNIT as f64
}

/// Length of a unit, in micro-units.
pub fn unit_span(length_percent: u32) -> Place {
    i64::from(length_percent) * (UNIT / 100)
}

// ─────────────────────────────────────────────────────────────────────────────
// KeyArea / Timeline / TimelineSet
// ─────────────────────────────────────────────────────────────────────────────

/// A piecewise-linear weight curve: linear between points, zero outside.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyArea {
    points: BTreeMap<Place, f64>,
}

impl KeyArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point; on a collision the larger weight is kept.
    pub fn set_weight(&mut self, place: Place, weight: f64) {
        self.points
            .entry(place)
            .and_modify(|w| *w = w.max(weight))
            .or_insert(weight);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn begin(&self) -> Option<Place> {
        self.points.keys().next().copied()
    }

    pub fn end(&self) -> Option<Place> {
        self.points.keys().next_back().copied()
    }

    /// Points in ascending place order.
    pub fn points(&self) -> impl Iterator<Item = (Place, f64)> + '_ {
        self.points.iter().map(|(&p, &w)| (p, w))
    }

    /// Weight stored exactly at `place`, if there is a point there.
    pub fn point(&self, place: Place) -> Option<f64> {
        self.points.get(&place).copied()
    }

    /// Interpolated weight; `0.0` outside `[begin, end]`.
    pub fn weight_at(&self, place: Place) -> f64 {
        let before = self.points.range(..=place).next_back();
        let after = self.points.range(place..).next();
        match (before, after) {
            (Some((&p0, &w0)), Some((&p1, &w1))) => {
                if p0 == p1 {
                    w0
                } else {
                    let t = (place - p0) as f64 / (p1 - p0) as f64;
                    w0 + (w1 - w0) * t
                }
            }
            _ => 0.0,
        }
    }

    /// Copy with every weight multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> KeyArea {
        KeyArea {
            points: self.points.iter().map(|(&p, &w)| (p, w * factor)).collect(),
        }
    }

    fn set_edges(&mut self, weight: f64) {
        if let Some(w) = self.points.values_mut().next() {
            *w = weight;
        }
        if let Some(w) = self.points.values_mut().next_back() {
            *w = weight;
        }
    }
}

/// The key areas of one shape.  Overlapping areas add up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    areas: Vec<KeyArea>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finished area.  Areas with fewer than two points are dropped.
    pub fn push(&mut self, area: KeyArea) {
        if area.len() >= 2 {
            self.areas.push(area);
        }
    }

    pub fn areas(&self) -> &[KeyArea] {
        &self.areas
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Summed weight of every area; not clamped.
    pub fn weight_at(&self, place: Place) -> f64 {
        self.areas.iter().map(|a| a.weight_at(place)).sum()
    }

    /// Every place that carries a point, ascending and deduplicated.
    pub fn places(&self) -> BTreeSet<Place> {
        self.areas
            .iter()
            .flat_map(|a| a.points().map(|(p, _)| p))
            .collect()
    }

    /// `true` if some area has a point exactly at `place`.
    pub fn has_point(&self, place: Place) -> bool {
        self.areas.iter().any(|a| a.point(place).is_some())
    }
}

/// One timeline per mouth shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineSet {
    timelines: [Timeline; 6],
}

impl TimelineSet {
    pub fn get(&self, shape: MouthShape) -> &Timeline {
        &self.timelines[shape.index()]
    }

    fn get_mut(&mut self, shape: MouthShape) -> &mut Timeline {
        &mut self.timelines[shape.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (MouthShape, &Timeline)> {
        MouthShape::ALL.iter().map(move |&s| (s, self.get(s)))
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.iter().all(Timeline::is_empty)
    }
}

impl Index<MouthShape> for TimelineSet {
    type Output = Timeline;

    fn index(&self, shape: MouthShape) -> &Timeline {
        self.get(shape)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Weight a shape keeps when it links into the same shape again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkWeights {
    pub closed: f64,
    pub a: f64,
    pub i: f64,
    pub u: f64,
    pub e: f64,
    pub o: f64,
}

impl Default for LinkWeights {
    fn default() -> Self {
        Self { closed: 1.0, a: 0.7, i: 1.0, u: 0.9, e: 0.7, o: 0.7 }
    }
}

impl LinkWeights {
    pub fn get(&self, shape: MouthShape) -> f64 {
        match shape {
            MouthShape::Closed => self.closed,
            MouthShape::A => self.a,
            MouthShape::I => self.i,
            MouthShape::U => self.u,
            MouthShape::E => self.e,
            MouthShape::O => self.o,
        }
    }

    pub fn set(&mut self, shape: MouthShape, weight: f64) {
        let slot = match shape {
            MouthShape::Closed => &mut self.closed,
            MouthShape::A => &mut self.a,
            MouthShape::I => &mut self.i,
            MouthShape::U => &mut self.u,
            MouthShape::E => &mut self.e,
            MouthShape::O => &mut self.o,
        };
        *slot = weight;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Share of a unit spent ramping in / out, in percent (0.01 ..= 100).
    pub overlap_percent: f64,
    /// Weight at the end of a long sound (0 ..= 1).
    pub long_sound_end_weight: f64,
    /// Keep the closed mouth at the very start and end of each closed area.
    pub edge_closed: bool,
    pub link_weights: LinkWeights,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            overlap_percent: 50.0,
            long_sound_end_weight: 1.0,
            edge_closed: true,
            link_weights: LinkWeights::default(),
        }
    }
}

impl TimelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.01..=100.0).contains(&self.overlap_percent) {
            return Err(config_error(format!(
                "overlap_percent must be within 0.01..=100, got {}",
                self.overlap_percent
            )));
        }
        if !(0.0..=1.0).contains(&self.long_sound_end_weight) {
            return Err(config_error(format!(
                "long_sound_end_weight must be within 0..=1, got {}",
                self.long_sound_end_weight
            )));
        }
        for shape in MouthShape::ALL {
            let w = self.link_weights.get(shape);
            if !(0.0..=1.0).contains(&w) {
                return Err(config_error(format!(
                    "link weight for {shape} must be within 0..=1, got {w}"
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// A sounded unit plus its trailing continuations, laid out in time.
#[derive(Debug, Clone, Copy)]
struct Run {
    head: LipSyncUnit,
    start: Place,
    long: Place,
    tsu: Place,
    keep: Place,
}

impl Run {
    fn unit_end(&self) -> Place {
        self.start + unit_span(self.head.length_percent)
    }

    fn hold_end(&self) -> Place {
        self.unit_end() + self.long + self.tsu
    }

    fn end(&self) -> Place {
        self.hold_end() + self.keep
    }
}

fn half(len: Place) -> Place {
    (len + 1) / 2
}

fn layout_runs(units: &[LipSyncUnit]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut cursor: Place = 0;

    for unit in units {
        let span = unit_span(unit.length_percent);
        match runs.last_mut() {
            Some(run) if !unit.link.has_single_sound() && unit.shape != MouthShape::Closed => {
                match unit.link {
                    LinkType::LongSound => run.long += span,
                    LinkType::Tsu => run.tsu += span,
                    _ => run.keep += span,
                }
            }
            _ => runs.push(Run { head: *unit, start: cursor, long: 0, tsu: 0, keep: 0 }),
        }
        cursor += span;
    }
    runs
}

/// Builds a [`TimelineSet`] from lip-sync units.
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    config: TimelineConfig,
    overlap_hundredths: i64,
}

impl TimelineBuilder {
    /// Fails if the configuration is out of range.
    pub fn new(config: TimelineConfig) -> Result<Self> {
        config.validate()?;
        let overlap_hundredths = ((config.overlap_percent * 100.0).round() as i64).max(1);
        Ok(Self { config, overlap_hundredths })
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Ramp length of a unit.
    fn open_close(&self, unit: &LipSyncUnit) -> Place {
        i64::from(unit.length_percent) * self.overlap_hundredths
    }

    pub fn build(&self, units: &[LipSyncUnit]) -> TimelineSet {
        let runs = layout_runs(units);
        let mut set = TimelineSet::default();

        for (i, run) in runs.iter().enumerate() {
            let shape = run.head.shape;
            if shape == MouthShape::Closed {
                continue;
            }
            let prev = i.checked_sub(1).map(|j| &runs[j]);
            let next = runs.get(i + 1);
            let area = self.build_area(run, prev, next);
            set.get_mut(shape).push(area);
        }

        let closed = self.derive_closed(&set);
        *set.get_mut(MouthShape::Closed) = closed;

        log::debug!(
            "timeline: {} units, {} runs, {} areas",
            units.len(),
            runs.len(),
            set.iter().map(|(_, t)| t.areas().len()).sum::<usize>()
        );
        set
    }

    fn build_area(&self, run: &Run, prev: Option<&Run>, next: Option<&Run>) -> KeyArea {
        let shape = run.head.shape;
        let oc = self.open_close(&run.head);
        let hold_end = run.hold_end();
        let mut area = KeyArea::new();

        // (a) start
        let half_ramp = prev.is_some_and(|p| {
            p.head.shape != MouthShape::Closed
                && (p.head.shape == shape || run.head.link != LinkType::Normal)
        });
        let start = match prev {
            Some(p) if half_ramp => (run.start + half(self.open_close(&p.head))).min(hold_end),
            _ => run.start,
        };
        area.set_weight(start, 0.0);

        // (b) fully open
        area.set_weight((start + oc).min(hold_end), 1.0);

        // (c) hold
        let mut hold_weight = 1.0;
        if run.long > 0 {
            hold_weight = self.config.long_sound_end_weight;
            area.set_weight(run.unit_end() + run.long, hold_weight);
        }
        if run.tsu > 0 || run.long == 0 {
            area.set_weight(hold_end, hold_weight);
        }

        // (d) sustains only move the end
        let end = run.end();

        // (e) close
        let (place, weight) = match next {
            Some(n) if n.head.shape == shape && n.head.link == LinkType::Normal => {
                (end + half(oc), self.config.link_weights.get(shape) * hold_weight)
            }
            Some(n) if n.head.link != LinkType::Normal => (end + half(oc), 0.0),
            _ => (end + oc, 0.0),
        };
        area.set_weight(place, weight);
        area
    }

    fn derive_closed(&self, set: &TimelineSet) -> Timeline {
        let places: BTreeSet<Place> = MouthShape::VOWELS
            .iter()
            .flat_map(|&s| set.get(s).places())
            .collect();

        let points: Vec<(Place, f64)> = places
            .into_iter()
            .map(|p| {
                let open: f64 = MouthShape::VOWELS.iter().map(|&s| set.get(s).weight_at(p)).sum();
                let w = (1.0 - open).max(0.0);
                (p, if w < WEIGHT_EPSILON { 0.0 } else { w.min(1.0) })
            })
            .collect();

        let mut timeline = Timeline::new();
        let mut current = KeyArea::new();
        let finish = |area: KeyArea, timeline: &mut Timeline| {
            if area.points().any(|(_, w)| w > 0.0) {
                let mut area = area;
                if !self.config.edge_closed {
                    area.set_edges(0.0);
                }
                timeline.push(area);
            }
        };

        let mut i = 0;
        while i < points.len() {
            let (place, weight) = points[i];
            if weight == 0.0 {
                let last_zero = points[i..]
                    .iter()
                    .take_while(|(_, w)| *w == 0.0)
                    .count()
                    + i
                    - 1;
                current.set_weight(place, 0.0);
                if last_zero > i {
                    finish(std::mem::take(&mut current), &mut timeline);
                    current.set_weight(points[last_zero].0, 0.0);
                    i = last_zero + 1;
                    continue;
                }
            } else {
                current.set_weight(place, weight);
            }
            i += 1;
        }
        finish(current, &mut timeline);
        timeline
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
