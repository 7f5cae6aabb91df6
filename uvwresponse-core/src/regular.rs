//! Regular UVW readout with three strip families on a triangular node lattice.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]

use crate::error::{Error, Result};
use crate::geometry::{Direction, SectionBoundary, SectionTag, StripGeometry, StripId, Vec2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Configuration of a [`RegularGeometry`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegularGeometryConfig {
    /// Distance between parallel strips [mm].
    pub strip_pitch_mm: f64,
    /// Radius of the circular active area [mm].
    pub radius_mm: f64,
    /// Number of time cells of the electronics.
    pub n_timecells: i32,
    /// Sampling rate [MHz].
    pub sampling_rate_mhz: f64,
    /// Drift velocity [cm/us].
    pub drift_velocity_cm_per_us: f64,
    /// Lower edge of time cell 0 [mm]; `None` centres the drift axis on z=0.
    pub z_min_mm: Option<f64>,
    /// Along-axis coordinate [mm] where strips of each family split into two sections.
    pub section_splits_mm: [Option<f64>; 3],
}

impl Default for RegularGeometryConfig {
    fn default() -> Self {
        Self {
            strip_pitch_mm: 1.5,
            radius_mm: 100.0,
            n_timecells: 512,
            sampling_rate_mhz: 25.0,
            drift_velocity_cm_per_us: 0.65,
            z_min_mm: None,
            section_splits_mm: [None; 3],
        }
    }
}

impl RegularGeometryConfig {
    /// Sets the strip pitch.
    #[must_use]
    pub fn with_strip_pitch(mut self, pitch_mm: f64) -> Self {
        self.strip_pitch_mm = pitch_mm;
        self
    }

    /// Sets the active area radius.
    #[must_use]
    pub fn with_radius(mut self, radius_mm: f64) -> Self {
        self.radius_mm = radius_mm;
        self
    }

    /// Sets sampling rate and drift velocity.
    #[must_use]
    pub fn with_timing(mut self, sampling_rate_mhz: f64, drift_velocity_cm_per_us: f64) -> Self {
        self.sampling_rate_mhz = sampling_rate_mhz;
        self.drift_velocity_cm_per_us = drift_velocity_cm_per_us;
        self
    }

    /// Sets the number of time cells.
    #[must_use]
    pub fn with_timecells(mut self, n_timecells: i32) -> Self {
        self.n_timecells = n_timecells;
        self
    }

    /// Sets the lower edge of time cell 0.
    #[must_use]
    pub fn with_z_min(mut self, z_min_mm: f64) -> Self {
        self.z_min_mm = Some(z_min_mm);
        self
    }

    /// Splits every strip of `dir` into sections 0 and 1 at the given along-axis coordinate.
    #[must_use]
    pub fn with_section_split(mut self, dir: Direction, along_axis_mm: f64) -> Self {
        self.section_splits_mm[dir.index()] = Some(along_axis_mm);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for non-positive pitches, radius or timing values.
    pub fn validate(&self) -> Result<()> {
        if !is_positive(self.strip_pitch_mm) {
            return Err(Error::Config(format!(
                "strip pitch must be positive, got {}",
                self.strip_pitch_mm
            )));
        }
        if !is_positive(self.radius_mm - self.strip_pitch_mm) {
            return Err(Error::Config(format!(
                "active area radius {} must exceed the strip pitch",
                self.radius_mm
            )));
        }
        if self.n_timecells <= 0 {
            return Err(Error::Config(format!(
                "number of time cells must be positive, got {}",
                self.n_timecells
            )));
        }
        if !is_positive(self.sampling_rate_mhz) || !is_positive(self.drift_velocity_cm_per_us) {
            return Err(Error::Config(
                "sampling rate and drift velocity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Along-axis extent of one strip [mm].
#[derive(Clone, Copy, Debug)]
struct StripExtent {
    start: f64,
    end: f64,
}

/// Ideal UVW readout.
///
/// Strip axes of the U, V and W families point along 0, 120 and 240 degrees.
/// With a common strip pitch every pairwise crossing is a triple crossing node,
/// and nodes on one strip are one pad pitch (`2 * pitch / sqrt(3)`) apart.
/// A point belongs to the family whose nearest strip axis is closest in units
/// of the strip pitch. Strips start and end on crossing nodes inside the
/// circular active area.
#[derive(Clone, Debug)]
pub struct RegularGeometry {
    config: RegularGeometryConfig,
    unit: [Vec2; 3],
    pitch_axis: [Vec2; 3],
    pad_pitch: f64,
    timecell_width: f64,
    z_min: f64,
    number_offset: i32,
}

impl RegularGeometry {
    /// Builds the geometry.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: RegularGeometryConfig) -> Result<Self> {
        config.validate()?;
        let unit = [
            Vec2::new(1.0, 0.0),
            Vec2::new(-0.5, 0.5 * SQRT_3),
            Vec2::new(-0.5, -0.5 * SQRT_3),
        ];
        let pitch_axis = unit.map(Vec2::perpendicular);
        let pad_pitch = 2.0 * config.strip_pitch_mm / SQRT_3;
        let timecell_width = 10.0 * config.drift_velocity_cm_per_us / config.sampling_rate_mhz;
        let z_min = config
            .z_min_mm
            .unwrap_or(-0.5 * f64::from(config.n_timecells) * timecell_width);
        let number_offset = (config.radius_mm / config.strip_pitch_mm).ceil() as i32 + 1;
        Ok(Self {
            config,
            unit,
            pitch_axis,
            pad_pitch,
            timecell_width,
            z_min,
            number_offset,
        })
    }

    /// Geometry configuration.
    #[must_use]
    pub fn config(&self) -> &RegularGeometryConfig {
        &self.config
    }

    /// Strip number of the `k`-th strip axis (k = 0 passes through the origin).
    #[must_use]
    pub fn strip_number(&self, k: i32) -> i32 {
        k + self.number_offset
    }

    /// Position of the crossing node closest to `point`, ignoring the active area.
    #[must_use]
    pub fn nearest_node(&self, point: Vec2) -> Vec2 {
        let k = (point.dot(self.pitch_axis[0]) / self.config.strip_pitch_mm).round();
        let along = point.dot(self.unit[0]) / self.pad_pitch - 0.5 * k;
        let a = (along.round() + 0.5 * k) * self.pad_pitch;
        self.pitch_axis[0] * (k * self.config.strip_pitch_mm) + self.unit[0] * a
    }

    fn axis_index(&self, strip: StripId) -> i32 {
        strip.number - self.number_offset
    }

    fn extent(&self, dir_k: i32) -> Option<StripExtent> {
        let offset = f64::from(dir_k) * self.config.strip_pitch_mm;
        let half_chord_sq = self.config.radius_mm.powi(2) - offset.powi(2);
        if half_chord_sq <= 0.0 {
            return None;
        }
        let half_chord = half_chord_sq.sqrt() / self.pad_pitch;
        let shift = 0.5 * f64::from(dir_k);
        let m_min = (-half_chord - shift).ceil();
        let m_max = (half_chord - shift).floor();
        if m_min >= m_max {
            return None;
        }
        Some(StripExtent {
            start: (m_min + shift) * self.pad_pitch,
            end: (m_max + shift) * self.pad_pitch,
        })
    }

    fn point_on_strip(&self, dir: Direction, dir_k: i32, along: f64) -> Vec2 {
        self.pitch_axis[dir.index()] * (f64::from(dir_k) * self.config.strip_pitch_mm)
            + self.unit[dir.index()] * along
    }
}

impl StripGeometry for RegularGeometry {
    fn strip_at(&self, point: Vec2) -> Option<StripId> {
        let pitch = self.config.strip_pitch_mm;
        let mut best: Option<(Direction, i32, f64)> = None;
        for dir in Direction::ALL {
            let t = point.dot(self.pitch_axis[dir.index()]) / pitch;
            let k = t.round();
            let distance = (t - k).abs();
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((dir, k as i32, distance));
            }
        }
        let (dir, k, _) = best?;
        let extent = self.extent(k)?;
        let along = point.dot(self.unit[dir.index()]);
        if along < extent.start || along > extent.end {
            return None;
        }
        Some(StripId::new(dir, self.strip_number(k)))
    }

    fn strip_start(&self, strip: StripId) -> Option<Vec2> {
        let k = self.axis_index(strip);
        let extent = self.extent(k)?;
        Some(self.point_on_strip(strip.dir, k, extent.start))
    }

    fn section_boundaries(&self, strip: StripId) -> Vec<SectionBoundary> {
        let k = self.axis_index(strip);
        let Some(extent) = self.extent(k) else {
            return Vec::new();
        };
        let dir = strip.dir;
        let mut boundaries = vec![SectionBoundary::new(
            self.point_on_strip(dir, k, extent.start),
            SectionTag::Outside,
            SectionTag::Section(0),
        )];
        let mut last = 0u8;
        if let Some(split) = self.config.section_splits_mm[dir.index()] {
            let shift = 0.5 * f64::from(k);
            let along = ((split / self.pad_pitch - shift).round() + shift) * self.pad_pitch;
            if along > extent.start && along < extent.end {
                boundaries.push(SectionBoundary::new(
                    self.point_on_strip(dir, k, along),
                    SectionTag::Section(0),
                    SectionTag::Section(1),
                ));
                last = 1;
            }
        }
        boundaries.push(SectionBoundary::new(
            self.point_on_strip(dir, k, extent.end),
            SectionTag::Section(last),
            SectionTag::Outside,
        ));
        boundaries
    }

    fn pad_pitch(&self) -> f64 {
        self.pad_pitch
    }

    fn strip_pitch(&self) -> f64 {
        self.config.strip_pitch_mm
    }

    fn unit_vector(&self, dir: Direction) -> Vec2 {
        self.unit[dir.index()]
    }

    fn timecell_at(&self, z: f64) -> Option<i32> {
        let cell = ((z - self.z_min) / self.timecell_width).floor();
        if cell < 0.0 || cell >= f64::from(self.config.n_timecells) {
            return None;
        }
        Some(cell as i32)
    }

    fn timecell_lower_edge(&self, cell: i32) -> Option<f64> {
        if cell < 0 || cell >= self.config.n_timecells {
            return None;
        }
        Some(self.z_min + f64::from(cell) * self.timecell_width)
    }

    fn timecell_width(&self) -> f64 {
        self.timecell_width
    }

    fn strip_position(&self, strip: StripId) -> Option<f64> {
        let k = self.axis_index(strip);
        self.extent(k)?;
        Some(f64::from(k) * self.config.strip_pitch_mm)
    }

    fn active_area_bounds(&self) -> (f64, f64, f64, f64) {
        let r = self.config.radius_mm;
        (-r, r, -r, r)
    }

    fn sampling_rate_mhz(&self) -> f64 {
        self.config.sampling_rate_mhz
    }

    fn drift_velocity_cm_per_us(&self) -> f64 {
        self.config.drift_velocity_cm_per_us
    }
}
