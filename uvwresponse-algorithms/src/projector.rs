//! Projection of point charges onto strips, sections and time cells.
#![allow(clippy::cast_precision_loss, clippy::float_cmp)]

use std::sync::Arc;

use log::debug;
use uvwresponse_core::{
    ChargeSink, Deposit, Direction, Error, Histogram2D, OutputSink, ResponseKernels, Result,
    StripGeometry, StripId, Vec2,
};

use crate::locator::NodeLocator;
use crate::splitter::SectionSplitter;

/// Time cell reached by a deposit.
#[derive(Debug, Clone, Copy)]
struct CellShare {
    cell: i32,
    fraction: f64,
    z_mm: f64,
}

/// Distributes point charges over every affected strip section and time cell.
///
/// Kernels and geometry are shared read-only; the attached sinks are owned
/// by the projector, so concurrent projectors never share accumulators.
pub struct ChargeProjector {
    geometry: Arc<dyn StripGeometry>,
    kernels: Arc<ResponseKernels>,
    sinks: Vec<OutputSink>,
}

impl ChargeProjector {
    /// Creates a projector without sinks.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the kernels were generated for another
    /// sampling rate or drift velocity.
    pub fn new(geometry: Arc<dyn StripGeometry>, kernels: Arc<ResponseKernels>) -> Result<Self> {
        let identity = kernels.identity();
        if identity.sampling_rate_mhz != geometry.sampling_rate_mhz()
            || identity.drift_velocity_cm_per_us != geometry.drift_velocity_cm_per_us()
        {
            return Err(Error::Config(format!(
                "kernels {} do not match geometry timing ({} MHz, {} cm/us)",
                identity.container_stem(),
                geometry.sampling_rate_mhz(),
                geometry.drift_velocity_cm_per_us()
            )));
        }
        Ok(Self {
            geometry,
            kernels,
            sinks: Vec::new(),
        })
    }

    /// Replaces the attached sinks.
    pub fn set_output_sinks(&mut self, sinks: Vec<OutputSink>) {
        self.sinks = sinks;
    }

    #[must_use]
    pub fn sinks(&self) -> &[OutputSink] {
        &self.sinks
    }

    /// Detaches and returns the sinks.
    pub fn take_sinks(&mut self) -> Vec<OutputSink> {
        std::mem::take(&mut self.sinks)
    }

    #[must_use]
    pub fn kernels(&self) -> &Arc<ResponseKernels> {
        &self.kernels
    }

    #[must_use]
    pub fn geometry(&self) -> &Arc<dyn StripGeometry> {
        &self.geometry
    }

    /// Diagnostic copy of a merged-strip table.
    #[must_use]
    pub fn strip_response(&self, dir: Direction, delta_strip: i32) -> Option<Histogram2D> {
        self.kernels.strip_response(dir, delta_strip)
    }

    /// Distributes `charge` deposited at `position` (x, y, z in mm).
    ///
    /// Every attached sink and the optional `persistent` sink receive the
    /// same destinations. A deposit whose reference node or time cell cannot
    /// be resolved is dropped.
    pub fn add_charge(
        &mut self,
        position: [f64; 3],
        charge: f64,
        mut persistent: Option<&mut dyn ChargeSink>,
    ) {
        if charge == 0.0 || (self.sinks.is_empty() && persistent.is_none()) {
            return;
        }
        let geometry = self.geometry.as_ref();
        let kernels = self.kernels.as_ref();
        let locator = NodeLocator::new(geometry);
        let [x, y, z] = position;
        let Some(node) = locator.reference_strip_node(Vec2::new(x, y)) else {
            debug!("dropping deposit at ({x:.3}, {y:.3}, {z:.3}): no reference node");
            return;
        };
        let Some(reference_cell) = locator.reference_timecell(z) else {
            debug!("dropping deposit at ({x:.3}, {y:.3}, {z:.3}): outside the drift range");
            return;
        };
        let offset = Vec2::new(x, y) - node.position;
        let width = geometry.timecell_width();
        // Cell and lower edge are rounded separately; keep the offset inside [0, width).
        let dz = (z - reference_cell.lower_edge).clamp(0.0, width * (1.0 - f64::EPSILON));

        let half_width = 0.5 * width;
        let window = kernels.window();
        let cells: Vec<CellShare> = window
            .cell_offsets()
            .filter_map(|delta| {
                let fraction = kernels.time(delta)?.value_at(dz);
                if fraction == 0.0 {
                    return None;
                }
                let cell = reference_cell.cell + delta;
                let lower_edge = geometry.timecell_lower_edge(cell)?;
                Some(CellShare {
                    cell,
                    fraction,
                    z_mm: lower_edge + half_width,
                })
            })
            .collect();
        if cells.is_empty() {
            return;
        }

        let splitter = SectionSplitter::new(geometry, kernels);
        for dir in Direction::ALL {
            for delta in window.strip_offsets() {
                let Some(merged) = kernels.merged(dir, delta) else {
                    continue;
                };
                let fraction = merged.value_at(offset.x, offset.y);
                if fraction == 0.0 {
                    continue;
                }
                let strip = StripId::new(dir, node.strip(dir) + delta);
                let Some(strip_position_mm) = geometry.strip_position(strip) else {
                    continue;
                };
                for section in splitter.split(strip, delta, node.position, offset, fraction) {
                    if section.fraction == 0.0 {
                        continue;
                    }
                    for share in &cells {
                        let deposit = Deposit {
                            strip,
                            section: section.section,
                            timecell: share.cell,
                            charge: charge * section.fraction * share.fraction,
                            strip_position_mm,
                            z_mm: share.z_mm,
                        };
                        for sink in &mut self.sinks {
                            sink.accumulate(&deposit);
                        }
                        if let Some(sink) = persistent.as_deref_mut() {
                            sink.accumulate(&deposit);
                        }
                    }
                }
            }
        }
    }

    /// Spreads `charge` uniformly along a straight segment as `n_points` point deposits.
    pub fn add_track_segment(
        &mut self,
        start: [f64; 3],
        end: [f64; 3],
        charge: f64,
        n_points: usize,
    ) {
        if n_points == 0 {
            return;
        }
        let step = 1.0 / n_points as f64;
        let point_charge = charge * step;
        for i in 0..n_points {
            let t = (i as f64 + 0.5) * step;
            let position = [0, 1, 2].map(|axis| start[axis] + t * (end[axis] - start[axis]));
            self.add_charge(position, point_charge, None);
        }
    }
}
