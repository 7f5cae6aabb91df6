//! Smearing configuration and kernel identity.

use crate::error::{Error, Result};
use crate::geometry::StripGeometry;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monte-Carlo and binning settings used when a kernel family is generated.
///
/// These settings affect the statistical quality of the tables, not their
/// meaning, and are therefore not part of the [`KernelIdentity`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GenerationSettings {
    /// Gaussian samples per XY bin centre.
    pub n_points_xy: usize,
    /// Bins per axis of the XY tables.
    pub n_bins_xy: usize,
    /// Samples per Z bin centre (only used with a non-zero peaking time).
    pub n_points_z: usize,
    /// Bins of the Z tables.
    pub n_bins_z: usize,
    /// Base seed; every grid row derives its own stream from it.
    pub seed: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            n_points_xy: 100_000,
            n_bins_xy: 30,
            n_points_z: 100_000,
            n_bins_z: 30,
            seed: 0x5eed_u64,
        }
    }
}

/// Smearing parameters and window half-widths of a response model.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResponseConfig {
    /// Neighbour strips considered on each side of the reference strip.
    pub n_strips: usize,
    /// Neighbour time cells considered on each side of the reference cell.
    pub n_timecells: usize,
    /// Pad offsets on each side of the reference node covered by section-start tables.
    pub n_pads: usize,
    /// Transverse diffusion [mm].
    pub sigma_xy_mm: f64,
    /// Longitudinal diffusion [mm].
    pub sigma_z_mm: f64,
    /// Front-end peaking time [ns]; zero disables shaping.
    pub peaking_time_ns: f64,
    /// Generation settings.
    pub generation: GenerationSettings,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            n_strips: 7,
            n_timecells: 50,
            n_pads: 14,
            sigma_xy_mm: 1.0,
            sigma_z_mm: 1.0,
            peaking_time_ns: 0.0,
            generation: GenerationSettings::default(),
        }
    }
}

impl ResponseConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strip, time cell and pad window half-widths.
    #[must_use]
    pub fn with_window(mut self, n_strips: usize, n_timecells: usize, n_pads: usize) -> Self {
        self.n_strips = n_strips;
        self.n_timecells = n_timecells;
        self.n_pads = n_pads;
        self
    }

    /// Sets transverse and longitudinal diffusion.
    #[must_use]
    pub fn with_sigmas(mut self, sigma_xy_mm: f64, sigma_z_mm: f64) -> Self {
        self.sigma_xy_mm = sigma_xy_mm;
        self.sigma_z_mm = sigma_z_mm;
        self
    }

    /// Sets the front-end peaking time.
    #[must_use]
    pub fn with_peaking_time(mut self, peaking_time_ns: f64) -> Self {
        self.peaking_time_ns = peaking_time_ns;
        self
    }

    /// Sets the number of XY samples and bins.
    #[must_use]
    pub fn with_xy_sampling(mut self, n_points: usize, n_bins: usize) -> Self {
        self.generation.n_points_xy = n_points;
        self.generation.n_bins_xy = n_bins;
        self
    }

    /// Sets the number of Z samples and bins.
    #[must_use]
    pub fn with_z_sampling(mut self, n_points: usize, n_bins: usize) -> Self {
        self.generation.n_points_z = n_points;
        self.generation.n_bins_z = n_bins;
        self
    }

    /// Sets the generation seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.generation.seed = seed;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a non-positive window, sigma or sampling
    /// setting, or a negative peaking time.
    pub fn validate(&self) -> Result<()> {
        if self.n_strips == 0 || self.n_timecells == 0 || self.n_pads == 0 {
            return Err(Error::Config(format!(
                "window half-widths must be positive, got strips={} timecells={} pads={}",
                self.n_strips, self.n_timecells, self.n_pads
            )));
        }
        if !(self.sigma_xy_mm.is_finite() && self.sigma_xy_mm > 0.0) {
            return Err(Error::Config(format!(
                "wrong horizontal smearing parameter sigma_xy={}",
                self.sigma_xy_mm
            )));
        }
        if !(self.sigma_z_mm.is_finite() && self.sigma_z_mm > 0.0) {
            return Err(Error::Config(format!(
                "wrong vertical smearing parameter sigma_z={}",
                self.sigma_z_mm
            )));
        }
        if !(self.peaking_time_ns.is_finite() && self.peaking_time_ns >= 0.0) {
            return Err(Error::Config(format!(
                "peaking time must be non-negative, got {}",
                self.peaking_time_ns
            )));
        }
        let generation = &self.generation;
        if generation.n_bins_xy == 0 || generation.n_bins_z == 0 {
            return Err(Error::Config(
                "response tables need at least one bin".to_string(),
            ));
        }
        if generation.n_points_xy == 0 || generation.n_points_z == 0 {
            return Err(Error::Config(
                "number of sampling points must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Identity of the kernel family this configuration produces on `geometry`.
    #[must_use]
    pub fn identity(&self, geometry: &dyn StripGeometry) -> KernelIdentity {
        KernelIdentity {
            n_strips: self.n_strips,
            n_timecells: self.n_timecells,
            n_pads: self.n_pads,
            sigma_xy_mm: self.sigma_xy_mm,
            sigma_z_mm: self.sigma_z_mm,
            peaking_time_ns: self.peaking_time_ns,
            sampling_rate_mhz: geometry.sampling_rate_mhz(),
            drift_velocity_cm_per_us: geometry.drift_velocity_cm_per_us(),
        }
    }
}

/// Full parameter tuple that determines a kernel family.
///
/// Two families with equal identities are interchangeable; any difference
/// means a persisted family must not be reused.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KernelIdentity {
    pub n_strips: usize,
    pub n_timecells: usize,
    pub n_pads: usize,
    pub sigma_xy_mm: f64,
    pub sigma_z_mm: f64,
    pub peaking_time_ns: f64,
    pub sampling_rate_mhz: f64,
    pub drift_velocity_cm_per_us: f64,
}

impl KernelIdentity {
    /// Container name without extension.
    ///
    /// The peaking time suffix is only present when shaping is enabled, so
    /// families generated without shaping keep their historical names.
    #[must_use]
    pub fn container_stem(&self) -> String {
        let mut stem = format!(
            "StripResponseModel_{}x{}x{}_S{}MHz_V{}cmus_T{}mm_L{}mm",
            self.n_strips,
            self.n_timecells,
            self.n_pads,
            self.sampling_rate_mhz,
            self.drift_velocity_cm_per_us,
            self.sigma_xy_mm,
            self.sigma_z_mm
        );
        if self.peaking_time_ns != 0.0 {
            stem.push_str(&format!("_P{}ns", self.peaking_time_ns));
        }
        stem
    }

    /// True if the XY part of two families is interchangeable.
    ///
    /// The transverse tables depend only on the strip/pad windows and `sigma_xy`.
    #[must_use]
    pub fn same_transverse(&self, other: &Self) -> bool {
        self.n_strips == other.n_strips
            && self.n_pads == other.n_pads
            && self.sigma_xy_mm.to_bits() == other.sigma_xy_mm.to_bits()
    }
}
