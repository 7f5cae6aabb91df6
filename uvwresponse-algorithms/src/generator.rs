//! Kernel family generation.
//!
//! The XY tables are integrated by Monte Carlo around the node closest to
//! the centre of the active area. Each grid row of the tables is filled by
//! its own seeded generator, so rows can run in parallel and the result
//! does not depend on the number of threads. The time tables are exact
//! Gaussian cell integrals unless a front-end peaking time is configured,
//! in which case the shaping delay is folded in by Monte Carlo.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::f64::consts::{PI, SQRT_2};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use statrs::function::erf::erf;
use uvwresponse_core::{
    Axis, Direction, Error, Histogram1D, Histogram2D, ResponseConfig, ResponseKernels, Result,
    StripGeometry, TransverseTables, Vec2, Window,
};

use crate::locator::{NodeLocator, ReferenceNode};

/// Bin centres further than this many pad pitches from the node stay empty.
const DISK_RADIUS_PADS: f64 = 1.05;

/// Converts a delay in ns at a drift velocity in cm/us into mm.
const NS_CM_PER_US_TO_MM: f64 = 0.01;

/// Tables of one XY grid row.
struct RowTables {
    /// `[merged table][iy]`.
    merged: Vec<f64>,
    /// `[section table][iy]`; holds the charge whose first enclosing boundary is at that pad.
    first_boundary: Vec<f64>,
}

/// Monte-Carlo and closed-form generator of response kernel families.
#[derive(Debug, Clone)]
pub struct KernelGenerator {
    config: ResponseConfig,
}

impl KernelGenerator {
    /// Creates a generator.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: ResponseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &ResponseConfig {
        &self.config
    }

    /// Generates the complete family.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if `cancel` is raised, or [`Error::Config`]
    /// if no reference node exists at the centre of the active area.
    pub fn generate(
        &self,
        geometry: &dyn StripGeometry,
        cancel: &AtomicBool,
    ) -> Result<ResponseKernels> {
        let identity = self.config.identity(geometry);
        info!("generating response kernels {}", identity.container_stem());
        let transverse = self.generate_strip_response(geometry, cancel)?;
        let time = self.generate_time_response(geometry)?;
        ResponseKernels::from_tables(identity, transverse, time)
    }

    /// Integrates the merged-strip and section-start tables.
    ///
    /// Samples that leave the active area are dropped without renormalising;
    /// near the edge that charge is physically lost.
    ///
    /// # Errors
    /// Returns [`Error::Cancelled`] if `cancel` is raised, or [`Error::Config`]
    /// if no reference node exists at the centre of the active area.
    pub fn generate_strip_response(
        &self,
        geometry: &dyn StripGeometry,
        cancel: &AtomicBool,
    ) -> Result<TransverseTables> {
        let config = &self.config;
        let settings = &config.generation;
        let window = Window::of(&config.identity(geometry));
        let pad = geometry.pad_pitch();
        let axis = Axis::new(settings.n_bins_xy, -pad, pad)?;
        let normal = Normal::new(0.0, config.sigma_xy_mm)
            .map_err(|e| Error::Config(format!("sigma_xy: {e}")))?;

        let (xmin, xmax, ymin, ymax) = geometry.active_area_bounds();
        let centre = Vec2::new(0.5 * (xmin + xmax), 0.5 * (ymin + ymax));
        let node = NodeLocator::new(geometry)
            .reference_strip_node(centre)
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot find a reference node at the active area centre ({:.3}, {:.3})",
                    centre.x, centre.y
                ))
            })?;
        debug!(
            "reference node {:?} at ({:.3}, {:.3})",
            node.strips, node.position.x, node.position.y
        );

        let sampler = RowSampler {
            geometry,
            node,
            window,
            axis,
            normal,
            n_points: settings.n_points_xy,
            weight: 1.0 / settings.n_points_xy as f64,
            disk_radius: DISK_RADIUS_PADS * pad,
        };
        let rows: Option<Vec<RowTables>> = (0..axis.n_bins())
            .into_par_iter()
            .map(|ix| {
                if cancel.load(Ordering::Relaxed) {
                    return None;
                }
                let mut rng = StdRng::seed_from_u64(settings.seed.wrapping_add(ix as u64));
                Some(sampler.fill_row(ix, &mut rng))
            })
            .collect();
        let rows = rows.ok_or(Error::Cancelled)?;

        let n_merged = 3 * window.strip_span();
        let n_section = n_merged * window.pad_span();
        let ny = axis.n_bins();
        let mut merged = vec![Histogram2D::new(axis, axis); n_merged];
        let mut section_start = vec![Histogram2D::new(axis, axis); n_section];
        for (ix, row) in rows.iter().enumerate() {
            for (table, hist) in merged.iter_mut().enumerate() {
                for iy in 0..ny {
                    hist.add_to_bin(ix, iy, row.merged[table * ny + iy]);
                }
            }
            // Charge before the boundary at pad p is the cumulative sum of
            // first-boundary weights up to p.
            for strip_table in 0..n_merged {
                for iy in 0..ny {
                    let mut cumulative = 0.0;
                    for p in 0..window.pad_span() {
                        let table = strip_table * window.pad_span() + p;
                        cumulative += row.first_boundary[table * ny + iy];
                        section_start[table].add_to_bin(ix, iy, cumulative);
                    }
                }
            }
        }

        let closure_min = (0..ny)
            .flat_map(|ix| (0..ny).map(move |iy| (ix, iy)))
            .filter(|&(ix, iy)| {
                axis.bin_center(ix).hypot(axis.bin_center(iy)) <= sampler.disk_radius
            })
            .map(|(ix, iy)| merged.iter().map(|h| h.bin(ix, iy)).sum::<f64>())
            .fold(f64::INFINITY, f64::min);
        info!(
            "initialized {} merged-strip and {} section-start tables, minimum closure {closure_min:.4}",
            merged.len(),
            section_start.len()
        );
        Ok(TransverseTables {
            merged,
            section_start,
        })
    }

    /// Fills the time tables.
    ///
    /// Without shaping each bin holds the exact Gaussian mass inside the
    /// relative cell, so the sum over cells telescopes to one.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an unusable sigma or time cell width.
    pub fn generate_time_response(&self, geometry: &dyn StripGeometry) -> Result<Vec<Histogram1D>> {
        let config = &self.config;
        let window = Window::of(&config.identity(geometry));
        let width = geometry.timecell_width();
        let axis = Axis::new(config.generation.n_bins_z, 0.0, width)?;

        let tables = if config.peaking_time_ns > 0.0 {
            self.shaped_time_response(geometry, window, axis)?
        } else {
            let scale = SQRT_2 * config.sigma_z_mm;
            window
                .cell_offsets()
                .map(|k| {
                    let a = f64::from(k) * width;
                    let b = a + width;
                    let values = (0..axis.n_bins())
                        .map(|bin| {
                            let c = axis.bin_center(bin);
                            0.5 * (erf((c - a) / scale) - erf((c - b) / scale))
                        })
                        .collect();
                    Histogram1D::from_values(axis, values)
                })
                .collect::<Result<Vec<_>>>()?
        };
        info!("initialized {} time response tables", tables.len());
        Ok(tables)
    }

    fn shaped_time_response(
        &self,
        geometry: &dyn StripGeometry,
        window: Window,
        axis: Axis,
    ) -> Result<Vec<Histogram1D>> {
        let config = &self.config;
        let settings = &config.generation;
        let width = geometry.timecell_width();
        let shaping =
            ShapingResponse::new(config.peaking_time_ns, geometry.drift_velocity_cm_per_us());
        let normal = Normal::new(0.0, config.sigma_z_mm)
            .map_err(|e| Error::Config(format!("sigma_z: {e}")))?;
        debug!(
            "shaping: peaking time {} ns, tau {:.3} ns",
            config.peaking_time_ns, shaping.tau_ns
        );

        let weight = 1.0 / settings.n_points_z as f64;
        let columns: Vec<Vec<f64>> = (0..axis.n_bins())
            .into_par_iter()
            .map(|bin| {
                let mut rng =
                    StdRng::seed_from_u64(settings.seed.rotate_left(32).wrapping_add(bin as u64));
                let c = axis.bin_center(bin);
                let mut column = vec![0.0; window.cell_span()];
                for _ in 0..settings.n_points_z {
                    let z = c + normal.sample(&mut rng) + shaping.sample_delay_mm(&mut rng);
                    let k = (z / width).floor() as i32;
                    if let Some(index) = window.cell_index(k) {
                        column[index] += weight;
                    }
                }
                column
            })
            .collect();

        (0..window.cell_span())
            .map(|index| {
                let values = columns.iter().map(|column| column[index]).collect();
                Histogram1D::from_values(axis, values)
            })
            .collect()
    }
}

struct RowSampler<'a> {
    geometry: &'a dyn StripGeometry,
    node: ReferenceNode,
    window: Window,
    axis: Axis,
    normal: Normal<f64>,
    n_points: usize,
    weight: f64,
    disk_radius: f64,
}

impl RowSampler<'_> {
    fn fill_row(&self, ix: usize, rng: &mut StdRng) -> RowTables {
        let window = self.window;
        let ny = self.axis.n_bins();
        let n_merged = 3 * window.strip_span();
        let mut row = RowTables {
            merged: vec![0.0; n_merged * ny],
            first_boundary: vec![0.0; n_merged * window.pad_span() * ny],
        };
        let pad = self.geometry.pad_pitch();
        let units = Direction::ALL.map(|dir| self.geometry.unit_vector(dir));
        let c1 = self.axis.bin_center(ix);
        for iy in 0..ny {
            let c2 = self.axis.bin_center(iy);
            if c1.hypot(c2) > self.disk_radius {
                continue;
            }
            for _ in 0..self.n_points {
                let offset = Vec2::new(c1 + self.normal.sample(rng), c2 + self.normal.sample(rng));
                let Some(strip) = self.geometry.strip_at(self.node.position + offset) else {
                    continue;
                };
                let delta = strip.number - self.node.strip(strip.dir);
                let Some(table) = window.strip_index(strip.dir, delta) else {
                    continue;
                };
                row.merged[table * ny + iy] += self.weight;

                // First boundary (p + parity / 2) * pad lying beyond the sample.
                let along = offset.dot(units[strip.dir.index()]);
                let parity = f64::from(delta.rem_euclid(2));
                let first = (along / pad - 0.5 * parity).floor() as i32 + 1;
                if first > window.n_pads {
                    continue;
                }
                let p = first.max(-window.n_pads);
                let section_table = table * window.pad_span() + (p + window.n_pads) as usize;
                row.first_boundary[section_table * ny + iy] += self.weight;
            }
        }
        row
    }
}

/// Front-end impulse response `exp(-3x) x^3 sin(x)` with `x = t / tau`, `0 <= x <= pi`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShapingResponse {
    tau_ns: f64,
    peak: f64,
    drift_velocity_cm_per_us: f64,
}

impl ShapingResponse {
    pub(crate) fn new(peaking_time_ns: f64, drift_velocity_cm_per_us: f64) -> Self {
        let x_peak = Self::peak_position();
        Self {
            tau_ns: peaking_time_ns / x_peak,
            peak: Self::shape(x_peak),
            drift_velocity_cm_per_us,
        }
    }

    #[inline]
    pub(crate) fn shape(x: f64) -> f64 {
        (-3.0 * x).exp() * x.powi(3) * x.sin()
    }

    /// Maximum of [`Self::shape`], where `3/x + cot(x) = 3`.
    pub(crate) fn peak_position() -> f64 {
        let slope = |x: f64| 3.0 / x + x.cos() / x.sin() - 3.0;
        let (mut lo, mut hi) = (1.0e-3, PI - 1.0e-3);
        for _ in 0..100 {
            let mid = 0.5 * (lo + hi);
            if slope(mid) > 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Delay drawn from the impulse response, converted to mm.
    fn sample_delay_mm<R: Rng>(&self, rng: &mut R) -> f64 {
        loop {
            let x = rng.random_range(0.0..PI);
            if rng.random_range(0.0..self.peak) <= Self::shape(x) {
                return x * self.tau_ns * self.drift_velocity_cm_per_us * NS_CM_PER_US_TO_MM;
            }
        }
    }
}
