//! Dense response kernel family.
//!
//! All tables of one configuration live in a single [`ResponseKernels`]
//! value. Tables are stored in flat vectors indexed by `offset + radius`,
//! so a lookup is plain index arithmetic. Reloading a family means building
//! a new value and swapping it in.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::config::KernelIdentity;
use crate::error::{Error, Result};
use crate::geometry::Direction;
use crate::histogram::{Histogram1D, Histogram2D};

/// Key of one table within a kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// Merged-strip XY response.
    Strip { dir: Direction, delta_strip: i32 },
    /// Charge collected before the boundary at `delta_pad`.
    SectionStart {
        dir: Direction,
        delta_strip: i32,
        delta_pad: i32,
    },
    /// Time-cell response.
    Time { delta_cell: i32 },
}

fn signed_label(value: i32) -> String {
    match value.signum() {
        0 => "0".to_string(),
        -1 => format!("minus{}", value.unsigned_abs()),
        _ => format!("plus{value}"),
    }
}

impl TableKey {
    /// Stable table name inside a persisted container.
    #[must_use]
    pub fn name(&self) -> String {
        match *self {
            TableKey::Strip { dir, delta_strip } => {
                format!("h_respXY_{}{}", dir.name(), signed_label(delta_strip))
            }
            TableKey::SectionStart {
                dir,
                delta_strip,
                delta_pad,
            } => format!(
                "h_respXY_{}{}_pad{}",
                dir.name(),
                signed_label(delta_strip),
                signed_label(delta_pad)
            ),
            TableKey::Time { delta_cell } => format!("h_respZ_{}", signed_label(delta_cell)),
        }
    }
}

/// Borrowed table of either dimensionality.
#[derive(Debug, Clone, Copy)]
pub enum TableRef<'a> {
    Plane(&'a Histogram2D),
    Line(&'a Histogram1D),
}

/// Owned table of either dimensionality.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Plane(Histogram2D),
    Line(Histogram1D),
}

/// Window radii of a kernel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub n_strips: i32,
    pub n_timecells: i32,
    pub n_pads: i32,
}

impl Window {
    /// Window radii of an identity.
    #[must_use]
    pub fn of(identity: &KernelIdentity) -> Self {
        Self {
            n_strips: identity.n_strips as i32,
            n_timecells: identity.n_timecells as i32,
            n_pads: identity.n_pads as i32,
        }
    }

    /// Number of relative strips per direction.
    #[inline]
    #[must_use]
    pub fn strip_span(&self) -> usize {
        (2 * self.n_strips + 1) as usize
    }

    /// Number of relative pads per strip.
    #[inline]
    #[must_use]
    pub fn pad_span(&self) -> usize {
        (2 * self.n_pads + 1) as usize
    }

    /// Number of relative time cells.
    #[inline]
    #[must_use]
    pub fn cell_span(&self) -> usize {
        (2 * self.n_timecells + 1) as usize
    }

    /// Relative strip offsets covered by the window.
    pub fn strip_offsets(&self) -> impl Iterator<Item = i32> {
        -self.n_strips..=self.n_strips
    }

    /// Relative pad offsets covered by the window.
    pub fn pad_offsets(&self) -> impl Iterator<Item = i32> {
        -self.n_pads..=self.n_pads
    }

    /// Relative time cell offsets covered by the window.
    pub fn cell_offsets(&self) -> impl Iterator<Item = i32> {
        -self.n_timecells..=self.n_timecells
    }

    /// Dense index of a merged-strip table.
    #[inline]
    #[must_use]
    pub fn strip_index(&self, dir: Direction, delta_strip: i32) -> Option<usize> {
        if delta_strip.abs() > self.n_strips {
            return None;
        }
        Some(dir.index() * self.strip_span() + (delta_strip + self.n_strips) as usize)
    }

    /// Dense index of a section-start table.
    #[inline]
    #[must_use]
    pub fn section_index(&self, dir: Direction, delta_strip: i32, delta_pad: i32) -> Option<usize> {
        if delta_pad.abs() > self.n_pads {
            return None;
        }
        let strip = self.strip_index(dir, delta_strip)?;
        Some(strip * self.pad_span() + (delta_pad + self.n_pads) as usize)
    }

    /// Dense index of a time table.
    #[inline]
    #[must_use]
    pub fn cell_index(&self, delta_cell: i32) -> Option<usize> {
        if delta_cell.abs() > self.n_timecells {
            return None;
        }
        Some((delta_cell + self.n_timecells) as usize)
    }

    /// Every table key in dense storage order.
    #[must_use]
    pub fn table_keys(&self) -> Vec<TableKey> {
        let mut keys =
            Vec::with_capacity(3 * self.strip_span() * (1 + self.pad_span()) + self.cell_span());
        for dir in Direction::ALL {
            for delta_strip in self.strip_offsets() {
                keys.push(TableKey::Strip { dir, delta_strip });
            }
        }
        for dir in Direction::ALL {
            for delta_strip in self.strip_offsets() {
                for delta_pad in self.pad_offsets() {
                    keys.push(TableKey::SectionStart {
                        dir,
                        delta_strip,
                        delta_pad,
                    });
                }
            }
        }
        for delta_cell in self.cell_offsets() {
            keys.push(TableKey::Time { delta_cell });
        }
        keys
    }
}

/// XY part of a kernel family.
#[derive(Debug, Clone, PartialEq)]
pub struct TransverseTables {
    /// Merged-strip tables in [`Window::strip_index`] order.
    pub merged: Vec<Histogram2D>,
    /// Section-start tables in [`Window::section_index`] order.
    pub section_start: Vec<Histogram2D>,
}

/// Complete, immutable kernel family of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseKernels {
    identity: KernelIdentity,
    window: Window,
    transverse: TransverseTables,
    time: Vec<Histogram1D>,
}

impl ResponseKernels {
    /// Assembles a family from tables in dense storage order.
    ///
    /// # Errors
    /// Returns [`Error::KernelShape`] if table counts do not match the window
    /// or the XY tables do not share one binning.
    pub fn from_tables(
        identity: KernelIdentity,
        transverse: TransverseTables,
        time: Vec<Histogram1D>,
    ) -> Result<Self> {
        let window = Window::of(&identity);
        let strips = 3 * window.strip_span();
        if transverse.merged.len() != strips
            || transverse.section_start.len() != strips * window.pad_span()
            || time.len() != window.cell_span()
        {
            return Err(Error::KernelShape(format!(
                "table counts {}/{}/{} do not match window {window:?}",
                transverse.merged.len(),
                transverse.section_start.len(),
                time.len()
            )));
        }
        let reference = &transverse.merged[0];
        let same_binning = transverse
            .merged
            .iter()
            .chain(&transverse.section_start)
            .all(|h| h.x_axis() == reference.x_axis() && h.y_axis() == reference.y_axis());
        if !same_binning {
            return Err(Error::KernelShape(
                "XY tables use different binnings".to_string(),
            ));
        }
        Ok(Self {
            identity,
            window,
            transverse,
            time,
        })
    }

    /// Assembles a family by fetching every required table by name.
    ///
    /// # Errors
    /// Returns [`Error::MissingTable`] for the first absent table, or
    /// [`Error::KernelShape`] if a table has the wrong dimensionality.
    pub fn assemble<F>(identity: KernelIdentity, mut fetch: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<Table>,
    {
        let window = Window::of(&identity);
        let mut merged = Vec::with_capacity(3 * window.strip_span());
        let mut section_start = Vec::with_capacity(3 * window.strip_span() * window.pad_span());
        let mut time = Vec::with_capacity(window.cell_span());
        for key in window.table_keys() {
            let name = key.name();
            let table = fetch(&name).ok_or_else(|| Error::MissingTable(name.clone()))?;
            match (key, table) {
                (TableKey::Strip { .. }, Table::Plane(hist)) => merged.push(hist),
                (TableKey::SectionStart { .. }, Table::Plane(hist)) => section_start.push(hist),
                (TableKey::Time { .. }, Table::Line(hist)) => time.push(hist),
                _ => {
                    return Err(Error::KernelShape(format!(
                        "table {name} has the wrong dimensionality"
                    )))
                }
            }
        }
        Self::from_tables(
            identity,
            TransverseTables {
                merged,
                section_start,
            },
            time,
        )
    }

    /// Identity of the family.
    #[must_use]
    pub fn identity(&self) -> &KernelIdentity {
        &self.identity
    }

    /// Window radii of the family.
    #[must_use]
    pub fn window(&self) -> Window {
        self.window
    }

    /// Merged-strip table for a relative strip.
    #[inline]
    #[must_use]
    pub fn merged(&self, dir: Direction, delta_strip: i32) -> Option<&Histogram2D> {
        self.window
            .strip_index(dir, delta_strip)
            .map(|i| &self.transverse.merged[i])
    }

    /// Section-start table for a relative strip and pad offset.
    #[inline]
    #[must_use]
    pub fn section_start(
        &self,
        dir: Direction,
        delta_strip: i32,
        delta_pad: i32,
    ) -> Option<&Histogram2D> {
        self.window
            .section_index(dir, delta_strip, delta_pad)
            .map(|i| &self.transverse.section_start[i])
    }

    /// Time table for a relative time cell.
    #[inline]
    #[must_use]
    pub fn time(&self, delta_cell: i32) -> Option<&Histogram1D> {
        self.window.cell_index(delta_cell).map(|i| &self.time[i])
    }

    /// Copy of a merged-strip table for diagnostics.
    #[must_use]
    pub fn strip_response(&self, dir: Direction, delta_strip: i32) -> Option<Histogram2D> {
        self.merged(dir, delta_strip).cloned()
    }

    /// Copy of a time table for diagnostics.
    #[must_use]
    pub fn time_response(&self, delta_cell: i32) -> Option<Histogram1D> {
        self.time(delta_cell).cloned()
    }

    /// Sum of one XY bin over every direction and relative strip.
    ///
    /// Each point of the readout plane belongs to exactly one strip, so the
    /// closure approaches 1 as the sample count grows.
    #[must_use]
    pub fn merged_closure(&self, ix: usize, iy: usize) -> f64 {
        self.transverse
            .merged
            .iter()
            .map(|hist| hist.bin(ix, iy))
            .sum()
    }

    /// Share of one XY bin collected by the strips of one direction.
    #[must_use]
    pub fn direction_share(&self, dir: Direction, ix: usize, iy: usize) -> f64 {
        self.window
            .strip_offsets()
            .filter_map(|delta| self.merged(dir, delta))
            .map(|hist| hist.bin(ix, iy))
            .sum()
    }

    /// Sum over relative time cells of one Z bin.
    #[must_use]
    pub fn time_closure(&self, bin: usize) -> f64 {
        self.time.iter().map(|hist| hist.bin(bin)).sum()
    }

    /// Every table with its key, in dense storage order.
    pub fn tables(&self) -> impl Iterator<Item = (TableKey, TableRef<'_>)> {
        let keys = self.window.table_keys();
        let refs = self
            .transverse
            .merged
            .iter()
            .chain(&self.transverse.section_start)
            .map(TableRef::Plane)
            .chain(self.time.iter().map(TableRef::Line));
        keys.into_iter().zip(refs)
    }

    /// Replaces the time part, keeping the XY tables.
    ///
    /// The XY tables depend only on the strip/pad windows and `sigma_xy`, so
    /// they can be recycled for new drift, sampling or shaping settings.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `identity` changes the transverse parameters,
    /// or [`Error::KernelShape`] if `time` does not match the new window.
    pub fn with_time_response(
        self,
        identity: KernelIdentity,
        time: Vec<Histogram1D>,
    ) -> Result<Self> {
        if !self.identity.same_transverse(&identity) {
            return Err(Error::Config(
                "recycled XY tables need identical strip/pad windows and sigma_xy".to_string(),
            ));
        }
        Self::from_tables(identity, self.transverse, time)
    }
}
