//! Distribution of a merged-strip fraction over electronic sections.
#![allow(clippy::cast_possible_truncation, clippy::float_cmp)]

use uvwresponse_core::{sections_of, ResponseKernels, SectionTag, StripGeometry, StripId, Vec2};

/// Charge fraction collected by one electronic section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionFraction {
    pub section: u8,
    pub fraction: f64,
}

/// Splits merged-strip fractions using the section-start kernels.
#[derive(Clone, Copy)]
pub struct SectionSplitter<'a> {
    geometry: &'a dyn StripGeometry,
    kernels: &'a ResponseKernels,
}

impl<'a> SectionSplitter<'a> {
    #[must_use]
    pub fn new(geometry: &'a dyn StripGeometry, kernels: &'a ResponseKernels) -> Self {
        Self { geometry, kernels }
    }

    /// Pad offset of a boundary at along-axis distance `along` from the reference node.
    ///
    /// Nodes of strips with an odd relative index sit half a pad away from
    /// the reference node's projection, so their boundaries are shifted
    /// before rounding.
    #[inline]
    #[must_use]
    pub fn pad_offset(&self, along: f64, delta_strip: i32) -> i32 {
        let parity = f64::from(delta_strip.rem_euclid(2));
        (along / self.geometry.pad_pitch() - 0.5 * parity).round() as i32
    }

    /// Splits `fraction`, the merged response of `strip` at `offset` from `node`.
    ///
    /// Every section starts with the full fraction. At each boundary inside
    /// the pad window the section before keeps the charge collected before the
    /// boundary and the section after keeps the rest. A boundary beyond the
    /// window empties the section lying entirely outside it. Sides tagged
    /// outside the active area are ignored and results are clamped at zero.
    #[must_use]
    pub fn split(
        &self,
        strip: StripId,
        delta_strip: i32,
        node: Vec2,
        offset: Vec2,
        fraction: f64,
    ) -> Vec<SectionFraction> {
        let boundaries = self.geometry.section_boundaries(strip);
        let mut sections: Vec<SectionFraction> = sections_of(&boundaries)
            .into_iter()
            .map(|section| SectionFraction { section, fraction })
            .collect();
        if sections.len() == 1 {
            return sections;
        }

        let n_pads = self.kernels.window().n_pads;
        let unit = self.geometry.unit_vector(strip.dir);
        for boundary in &boundaries {
            let along = (boundary.position - node).dot(unit);
            let pad = self.pad_offset(along, delta_strip);
            let (before, after) = if pad < -n_pads {
                (0.0, fraction)
            } else if pad > n_pads {
                (fraction, 0.0)
            } else {
                let collected = self
                    .kernels
                    .section_start(strip.dir, delta_strip, pad)
                    .map_or(0.0, |hist| hist.value_at(offset.x, offset.y));
                (collected, fraction - collected)
            };
            subtract(&mut sections, boundary.before, fraction - before);
            subtract(&mut sections, boundary.after, fraction - after);
        }
        for section in &mut sections {
            section.fraction = section.fraction.max(0.0);
        }
        sections
    }
}

fn subtract(sections: &mut [SectionFraction], tag: SectionTag, amount: f64) {
    if amount == 0.0 {
        return;
    }
    if let Some(index) = tag.section() {
        if let Some(entry) = sections.iter_mut().find(|s| s.section == index) {
            entry.fraction -= amount;
        }
    }
}
