//! HDF5 kernel container.
//!
//! The identity is stored as root attributes; every table is a dataset of
//! the `tables` group carrying its axis ranges as attributes.

use crate::{Error, Result};
use hdf5::{Dataset, File, Group};
use ndarray::ArrayView1;
use std::path::Path;
use uvwresponse_core::{
    Axis, Histogram1D, Histogram2D, KernelIdentity, ResponseKernels, Table, TableRef,
};

const TABLES_GROUP: &str = "tables";
const WINDOW_ATTRS: [&str; 3] = ["n_strips", "n_timecells", "n_pads"];
const PARAMETER_ATTRS: [&str; 5] = [
    "sigma_xy_mm",
    "sigma_z_mm",
    "peaking_time_ns",
    "sampling_rate_mhz",
    "drift_velocity_cm_per_us",
];

/// Writes every table of `kernels` into a new HDF5 file at `path`.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_container_hdf5<P: AsRef<Path>>(path: P, kernels: &ResponseKernels) -> Result<()> {
    let file = File::create(path)?;
    let identity = kernels.identity();
    let windows = [identity.n_strips, identity.n_timecells, identity.n_pads];
    for (name, value) in WINDOW_ATTRS.iter().zip(windows) {
        file.new_attr::<u64>()
            .create(*name)?
            .write_scalar(&(value as u64))?;
    }
    let parameters = [
        identity.sigma_xy_mm,
        identity.sigma_z_mm,
        identity.peaking_time_ns,
        identity.sampling_rate_mhz,
        identity.drift_velocity_cm_per_us,
    ];
    for (name, value) in PARAMETER_ATTRS.iter().zip(parameters) {
        file.new_attr::<f64>().create(*name)?.write_scalar(&value)?;
    }

    let group = file.create_group(TABLES_GROUP)?;
    for (key, table) in kernels.tables() {
        let name = key.name();
        match table {
            TableRef::Plane(hist) => {
                let dataset = group
                    .new_dataset::<f64>()
                    .shape([hist.x_axis().n_bins(), hist.y_axis().n_bins()])
                    .create(name.as_str())?;
                dataset.write_raw(ArrayView1::from(hist.values()))?;
                set_axis_attrs(&dataset, "x", hist.x_axis())?;
                set_axis_attrs(&dataset, "y", hist.y_axis())?;
            }
            TableRef::Line(hist) => {
                let dataset = group
                    .new_dataset::<f64>()
                    .shape([hist.axis().n_bins()])
                    .create(name.as_str())?;
                dataset.write_raw(ArrayView1::from(hist.values()))?;
                set_axis_attrs(&dataset, "x", hist.axis())?;
            }
        }
    }
    file.flush()?;
    Ok(())
}

/// Reads the stored identity of an HDF5 container.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or an attribute is missing.
pub fn read_identity_hdf5(file: &File) -> Result<KernelIdentity> {
    let window = |name: &str| -> Result<usize> {
        let value = file.attr(name)?.read_scalar::<u64>()?;
        usize::try_from(value).map_err(|_| Error::InvalidFormat(format!("{name}={value}")))
    };
    let parameter = |name: &str| -> Result<f64> { Ok(file.attr(name)?.read_scalar::<f64>()?) };
    Ok(KernelIdentity {
        n_strips: window(WINDOW_ATTRS[0])?,
        n_timecells: window(WINDOW_ATTRS[1])?,
        n_pads: window(WINDOW_ATTRS[2])?,
        sigma_xy_mm: parameter(PARAMETER_ATTRS[0])?,
        sigma_z_mm: parameter(PARAMETER_ATTRS[1])?,
        peaking_time_ns: parameter(PARAMETER_ATTRS[2])?,
        sampling_rate_mhz: parameter(PARAMETER_ATTRS[3])?,
        drift_velocity_cm_per_us: parameter(PARAMETER_ATTRS[4])?,
    })
}

/// Reads one table, `Ok(None)` if the container does not hold it.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the dataset shape is inconsistent.
pub fn read_table_hdf5(file: &File, name: &str) -> Result<Option<Table>> {
    let group: Group = file.group(TABLES_GROUP)?;
    if !group.link_exists(name) {
        return Ok(None);
    }
    let dataset = group.dataset(name)?;
    let values = dataset.read_raw::<f64>()?;
    let table = match dataset.shape().len() {
        1 => Table::Line(Histogram1D::from_values(
            read_axis_attrs(&dataset, "x")?,
            values,
        )?),
        2 => Table::Plane(Histogram2D::from_values(
            read_axis_attrs(&dataset, "x")?,
            read_axis_attrs(&dataset, "y")?,
            values,
        )?),
        n => {
            return Err(Error::InvalidFormat(format!(
                "table {name} has {n} dimensions"
            )))
        }
    };
    Ok(Some(table))
}

fn set_axis_attrs(dataset: &Dataset, axis_name: &str, axis: &Axis) -> Result<()> {
    dataset
        .new_attr::<f64>()
        .create(format!("{axis_name}_min").as_str())?
        .write_scalar(&axis.min())?;
    dataset
        .new_attr::<f64>()
        .create(format!("{axis_name}_max").as_str())?
        .write_scalar(&axis.max())?;
    Ok(())
}

fn read_axis_attrs(dataset: &Dataset, axis_name: &str) -> Result<Axis> {
    let index = usize::from(axis_name == "y");
    let n_bins = dataset
        .shape()
        .get(index)
        .copied()
        .ok_or_else(|| Error::InvalidFormat(format!("missing {axis_name} axis")))?;
    let min = dataset
        .attr(format!("{axis_name}_min").as_str())?
        .read_scalar::<f64>()?;
    let max = dataset
        .attr(format!("{axis_name}_max").as_str())?
        .read_scalar::<f64>()?;
    Ok(Axis::new(n_bins, min, max)?)
}
