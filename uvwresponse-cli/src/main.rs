//! uvwresponse CLI
//!
//! Generates, inspects and recycles strip response kernel families for a
//! regular UVW readout, and projects single deposits through them.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use log::{info, LevelFilter};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uvwresponse_algorithms::{ChargeProjector, KernelGenerator};
use uvwresponse_core::{
    ChargeMap, Direction, KernelIdentity, RegularGeometry, RegularGeometryConfig, ResponseConfig,
    ResponseKernels, StripGeometry,
};
use uvwresponse_io::{ContainerFormat, KernelStore};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] uvwresponse_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] uvwresponse_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Container format selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Memory-mapped little-endian binary container
    Binary,
    /// HDF5 container (requires the `hdf5` feature)
    #[cfg(feature = "hdf5")]
    Hdf5,
}

impl From<Format> for ContainerFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Binary => ContainerFormat::Binary,
            #[cfg(feature = "hdf5")]
            Format::Hdf5 => ContainerFormat::Hdf5,
        }
    }
}

/// Strip and time-cell response model for UVW strip readouts.
#[derive(Parser)]
#[command(name = "uvwresponse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Regular readout geometry.
#[derive(Args, Debug, Clone)]
struct GeometryArgs {
    /// Strip pitch (mm)
    #[arg(long, default_value = "1.5")]
    strip_pitch: f64,

    /// Radius of the active area (mm)
    #[arg(long, default_value = "100.0")]
    radius: f64,

    /// Number of time cells of the electronics
    #[arg(long, default_value = "512")]
    electronics_cells: i32,

    /// Sampling rate (MHz)
    #[arg(long, default_value = "25.0")]
    sampling_rate: f64,

    /// Drift velocity (cm/us)
    #[arg(long, default_value = "0.65")]
    drift_velocity: f64,
}

impl GeometryArgs {
    fn build(&self) -> Result<RegularGeometry> {
        let config = RegularGeometryConfig::default()
            .with_strip_pitch(self.strip_pitch)
            .with_radius(self.radius)
            .with_timecells(self.electronics_cells)
            .with_timing(self.sampling_rate, self.drift_velocity);
        Ok(RegularGeometry::new(config)?)
    }
}

/// Smearing parameters, windows and Monte-Carlo settings of a kernel family.
#[derive(Args, Debug, Clone)]
struct ModelArgs {
    /// Neighbour strips on each side of the reference strip
    #[arg(long, default_value = "7")]
    strips: usize,

    /// Neighbour time cells on each side of the reference cell
    #[arg(long, default_value = "50")]
    timecells: usize,

    /// Pad offsets on each side of the reference node
    #[arg(long, default_value = "14")]
    pads: usize,

    /// Transverse diffusion (mm)
    #[arg(long, default_value = "1.0")]
    sigma_xy: f64,

    /// Longitudinal diffusion (mm)
    #[arg(long, default_value = "1.0")]
    sigma_z: f64,

    /// Front-end peaking time (ns), 0 disables shaping
    #[arg(long, default_value = "0.0")]
    peaking_time: f64,

    /// Gaussian samples per XY bin
    #[arg(long, default_value = "100000")]
    points_xy: usize,

    /// Bins per axis of the XY tables
    #[arg(long, default_value = "30")]
    bins_xy: usize,

    /// Samples per Z bin (shaped kernels only)
    #[arg(long, default_value = "100000")]
    points_z: usize,

    /// Bins of the Z tables
    #[arg(long, default_value = "30")]
    bins_z: usize,

    /// Generation seed
    #[arg(long, default_value = "24301")]
    seed: u64,
}

impl ModelArgs {
    fn config(&self) -> ResponseConfig {
        ResponseConfig::new()
            .with_window(self.strips, self.timecells, self.pads)
            .with_sigmas(self.sigma_xy, self.sigma_z)
            .with_peaking_time(self.peaking_time)
            .with_xy_sampling(self.points_xy, self.bins_xy)
            .with_z_sampling(self.points_z, self.bins_z)
            .with_seed(self.seed)
    }
}

/// Kernel container directory.
#[derive(Args, Debug, Clone)]
struct StoreArgs {
    /// Directory holding kernel containers
    #[arg(short, long, default_value = ".")]
    store: PathBuf,

    /// Container format
    #[arg(long, value_enum, default_value = "binary")]
    format: Format,
}

impl StoreArgs {
    fn open(&self) -> KernelStore {
        KernelStore::new(&self.store).with_format(self.format.into())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a kernel family and save it to the store
    Generate {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        geometry: GeometryArgs,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Show closure diagnostics of a stored kernel family
    Inspect {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        geometry: GeometryArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the time part of a stored family and save the result
    Retime {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        geometry: GeometryArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Longitudinal diffusion of the stored family (mm)
        #[arg(long)]
        from_sigma_z: f64,

        /// Peaking time of the stored family (ns)
        #[arg(long, default_value = "0.0")]
        from_peaking_time: f64,

        /// Sampling rate of the stored family (MHz), defaults to the geometry's
        #[arg(long)]
        from_sampling_rate: Option<f64>,

        /// Drift velocity of the stored family (cm/us), defaults to the geometry's
        #[arg(long)]
        from_drift_velocity: Option<f64>,
    },

    /// Project one point deposit and print the per-channel charges
    Deposit {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        geometry: GeometryArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Deposit position x (mm)
        #[arg(long, allow_hyphen_values = true)]
        x: f64,

        /// Deposit position y (mm)
        #[arg(long, allow_hyphen_values = true)]
        y: f64,

        /// Deposit position z (mm)
        #[arg(long, allow_hyphen_values = true)]
        z: f64,

        /// Deposited charge
        #[arg(long, default_value = "1000.0")]
        charge: f64,

        /// Print the channels as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct KernelSummary {
    container: String,
    identity: KernelIdentity,
    tables: usize,
    xy_bins: usize,
    z_bins: usize,
    min_closure: f64,
    max_closure: f64,
    direction_shares: [f64; 3],
    min_time_closure: f64,
    max_time_closure: f64,
}

impl KernelSummary {
    /// Closure statistics over the bins inside one pad pitch of the reference node.
    fn of(kernels: &ResponseKernels, geometry: &dyn StripGeometry) -> Option<Self> {
        let reference = kernels.merged(Direction::U, 0)?;
        let (x_axis, y_axis) = (reference.x_axis(), reference.y_axis());
        let radius = geometry.pad_pitch();
        let mut min_closure = f64::INFINITY;
        let mut max_closure = f64::NEG_INFINITY;
        let mut shares = [0.0; 3];
        let mut n_inside = 0usize;
        for ix in 0..x_axis.n_bins() {
            for iy in 0..y_axis.n_bins() {
                let (x, y) = (x_axis.bin_center(ix), y_axis.bin_center(iy));
                if x.hypot(y) > radius {
                    continue;
                }
                let closure = kernels.merged_closure(ix, iy);
                min_closure = min_closure.min(closure);
                max_closure = max_closure.max(closure);
                for dir in Direction::ALL {
                    shares[dir.index()] += kernels.direction_share(dir, ix, iy);
                }
                n_inside += 1;
            }
        }
        if n_inside > 0 {
            for share in &mut shares {
                *share /= n_inside as f64;
            }
        }

        let z_bins = kernels.time(0)?.axis().n_bins();
        let (min_time_closure, max_time_closure) = (0..z_bins)
            .map(|bin| kernels.time_closure(bin))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(c), hi.max(c))
            });

        Some(Self {
            container: kernels.identity().container_stem(),
            identity: kernels.identity().clone(),
            tables: kernels.tables().count(),
            xy_bins: x_axis.n_bins(),
            z_bins,
            min_closure,
            max_closure,
            direction_shares: shares,
            min_time_closure,
            max_time_closure,
        })
    }
}

#[derive(Serialize)]
struct ChannelCharge {
    dir: Direction,
    strip: i32,
    section: u8,
    timecell: i32,
    charge: f64,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cancel = AtomicBool::new(false);

    match cli.command {
        Commands::Generate {
            model,
            geometry,
            store,
        } => {
            let geometry = geometry.build()?;
            let config = model.config();
            let start = Instant::now();
            let kernels = KernelGenerator::new(config)?.generate(&geometry, &cancel)?;
            let elapsed = start.elapsed();
            let path = store.open().save(&kernels)?;

            println!(
                "Generated {} tables in {:.2}s",
                kernels.tables().count(),
                elapsed.as_secs_f64()
            );
            println!("Saved: {}", path.display());
        }

        Commands::Inspect {
            model,
            geometry,
            store,
            json,
        } => {
            let geometry = geometry.build()?;
            let kernels = store.open().load(&model.config(), &geometry)?;
            let summary = KernelSummary::of(&kernels, &geometry).ok_or_else(|| {
                uvwresponse_core::Error::KernelShape("family has no central tables".to_string())
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Container: {}", summary.container);
                println!("Tables: {}", summary.tables);
                println!(
                    "XY bins: {0}x{0}, Z bins: {1}",
                    summary.xy_bins, summary.z_bins
                );
                println!(
                    "XY closure: {:.4} - {:.4}",
                    summary.min_closure, summary.max_closure
                );
                for dir in Direction::ALL {
                    println!(
                        "  {} share: {:.4}",
                        dir,
                        summary.direction_shares[dir.index()]
                    );
                }
                println!(
                    "Z closure: {:.4} - {:.4}",
                    summary.min_time_closure, summary.max_time_closure
                );
            }
        }

        Commands::Retime {
            model,
            geometry,
            store,
            from_sigma_z,
            from_peaking_time,
            from_sampling_rate,
            from_drift_velocity,
        } => {
            let geometry = geometry.build()?;
            let config = model.config();
            let target = config.identity(&geometry);
            let source = KernelIdentity {
                sigma_z_mm: from_sigma_z,
                peaking_time_ns: from_peaking_time,
                sampling_rate_mhz: from_sampling_rate.unwrap_or(target.sampling_rate_mhz),
                drift_velocity_cm_per_us: from_drift_velocity
                    .unwrap_or(target.drift_velocity_cm_per_us),
                ..target.clone()
            };

            let store = store.open();
            let stored = store.load_identity(&source)?;
            info!("recycling XY tables of {}", source.container_stem());
            let time = KernelGenerator::new(config)?.generate_time_response(&geometry)?;
            let kernels = stored.with_time_response(target, time)?;
            let path = store.save(&kernels)?;

            println!("Recycled: {}", source.container_stem());
            println!("Saved: {}", path.display());
        }

        Commands::Deposit {
            model,
            geometry,
            store,
            x,
            y,
            z,
            charge,
            json,
        } => {
            let geometry = geometry.build()?;
            let config = model.config();
            let kernels = store
                .open()
                .load_or_generate(&geometry, &config, &cancel, true)?;

            let geometry: Arc<dyn StripGeometry> = Arc::new(geometry);
            let mut projector = ChargeProjector::new(geometry, Arc::new(kernels))?;
            let mut channels = ChargeMap::new();
            projector.add_charge([x, y, z], charge, Some(&mut channels));

            let charges: Vec<ChannelCharge> = channels
                .iter()
                .filter(|&(_, &q)| q > 0.0)
                .map(|(key, &q)| ChannelCharge {
                    dir: key.dir,
                    strip: key.strip,
                    section: key.section,
                    timecell: key.timecell,
                    charge: q,
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&charges)?);
            } else {
                println!(
                    "{:<4} | {:<6} | {:<8} | {:<9} | {:<10}",
                    "Dir", "Strip", "Section", "Timecell", "Charge"
                );
                println!("{:-<49}", "");
                for c in &charges {
                    println!(
                        "{:<4} | {:<6} | {:<8} | {:<9} | {:<10.3}",
                        c.dir, c.strip, c.section, c.timecell, c.charge
                    );
                }
                for dir in Direction::ALL {
                    println!("Total {}: {:.3}", dir, channels.total_for(dir));
                }
                println!("Total: {:.3} of {:.3}", channels.total(), charge);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deposit_arguments() {
        let cli = Cli::try_parse_from([
            "uvwresponse",
            "-vv",
            "deposit",
            "--x",
            "-1.5",
            "--y",
            "0.25",
            "--z",
            "3",
            "--sigma-xy",
            "0.8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Deposit {
            model, x, charge, ..
        } = cli.command
        else {
            panic!("expected deposit");
        };
        assert_eq!(x, -1.5);
        assert_eq!(charge, 1000.0);
        let config = model.config();
        assert_eq!(config.sigma_xy_mm, 0.8);
        assert_eq!(config, ResponseConfig::new().with_sigmas(0.8, 1.0));
    }

    #[test]
    fn test_retime_requires_source_sigma() {
        assert!(Cli::try_parse_from(["uvwresponse", "retime"]).is_err());
    }
}
