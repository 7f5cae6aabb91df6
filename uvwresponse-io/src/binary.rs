//! Binary kernel container.
//!
//! Layout, all little-endian:
//! - magic `UVWK`, format version (u32)
//! - identity: strip, time cell and pad windows (u32 each), then sigma_xy,
//!   sigma_z, peaking time, sampling rate and drift velocity (f64 each)
//! - table count (u32)
//! - per table: name length (u32), UTF-8 name, dimension count (u8), per
//!   axis bin count (u32) and range (2 x f64), then the bin contents (f64)
#![allow(clippy::cast_possible_truncation)]

use crate::{Error, Result};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use uvwresponse_core::{
    Axis, Histogram1D, Histogram2D, KernelIdentity, ResponseKernels, Table, TableRef,
};

const MAGIC: &[u8; 4] = b"UVWK";
const FORMAT_VERSION: u32 = 1;

/// Writes every table of `kernels` to `writer`.
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_container<W: Write>(writer: &mut W, kernels: &ResponseKernels) -> Result<()> {
    let identity = kernels.identity();
    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    for window in [identity.n_strips, identity.n_timecells, identity.n_pads] {
        writer.write_all(&to_u32(window)?.to_le_bytes())?;
    }
    for value in [
        identity.sigma_xy_mm,
        identity.sigma_z_mm,
        identity.peaking_time_ns,
        identity.sampling_rate_mhz,
        identity.drift_velocity_cm_per_us,
    ] {
        writer.write_all(&value.to_le_bytes())?;
    }

    let tables: Vec<_> = kernels.tables().collect();
    writer.write_all(&to_u32(tables.len())?.to_le_bytes())?;
    for (key, table) in tables {
        let name = key.name();
        writer.write_all(&to_u32(name.len())?.to_le_bytes())?;
        writer.write_all(name.as_bytes())?;
        let (axes, values): (Vec<&Axis>, &[f64]) = match table {
            TableRef::Plane(hist) => (vec![hist.x_axis(), hist.y_axis()], hist.values()),
            TableRef::Line(hist) => (vec![hist.axis()], hist.values()),
        };
        writer.write_all(&[axes.len() as u8])?;
        for axis in axes {
            writer.write_all(&to_u32(axis.n_bins())?.to_le_bytes())?;
            writer.write_all(&axis.min().to_le_bytes())?;
            writer.write_all(&axis.max().to_le_bytes())?;
        }
        for value in values {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidFormat(format!("{value} does not fit in u32")))
}

/// Read-only, memory-mapped binary container.
pub struct BinaryContainer {
    mmap: Mmap,
    path: PathBuf,
}

impl BinaryContainer {
    /// Maps a container for reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and containers are never modified
        // after they have been persisted under their final name.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the identity and every table of the container.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for a foreign or truncated file.
    pub fn read(&self) -> Result<(KernelIdentity, HashMap<String, Table>)> {
        let mut reader = ByteReader::new(&self.mmap[..]);
        if reader.take(4)? != MAGIC {
            return Err(Error::InvalidFormat(format!(
                "{} is not a kernel container",
                self.path.display()
            )));
        }
        let version = reader.u32()?;
        if version != FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported container version {version}"
            )));
        }
        let identity = KernelIdentity {
            n_strips: reader.u32()? as usize,
            n_timecells: reader.u32()? as usize,
            n_pads: reader.u32()? as usize,
            sigma_xy_mm: reader.f64()?,
            sigma_z_mm: reader.f64()?,
            peaking_time_ns: reader.f64()?,
            sampling_rate_mhz: reader.f64()?,
            drift_velocity_cm_per_us: reader.f64()?,
        };

        let count = reader.u32()? as usize;
        let mut tables = HashMap::with_capacity(count);
        for _ in 0..count {
            let name_len = reader.u32()? as usize;
            let name = std::str::from_utf8(reader.take(name_len)?)
                .map_err(|e| Error::InvalidFormat(format!("table name: {e}")))?
                .to_string();
            let ndim = reader.take(1)?[0];
            let mut axes = Vec::with_capacity(usize::from(ndim));
            for _ in 0..ndim {
                let n_bins = reader.u32()? as usize;
                let min = reader.f64()?;
                let max = reader.f64()?;
                axes.push(Axis::new(n_bins, min, max)?);
            }
            let n_values: usize = axes.iter().map(Axis::n_bins).product();
            let values = reader.f64_vec(n_values)?;
            let table = match axes.as_slice() {
                [axis] => Table::Line(Histogram1D::from_values(*axis, values)?),
                [x_axis, y_axis] => {
                    Table::Plane(Histogram2D::from_values(*x_axis, *y_axis, values)?)
                }
                _ => {
                    return Err(Error::InvalidFormat(format!(
                        "table {name} has {ndim} dimensions"
                    )))
                }
            };
            tables.insert(name, table);
        }
        Ok((identity, tables))
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Error::InvalidFormat(format!("truncated container at byte {}", self.pos))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buf))
    }

    fn f64_vec(&mut self, len: usize) -> Result<Vec<f64>> {
        let bytes = self.take(len.saturating_mul(8))?;
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect())
    }
}
