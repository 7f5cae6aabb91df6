//! Uniformly binned 1D and 2D tables.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::error::{Error, Result};

/// Uniform axis with `n_bins` bins over `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    n_bins: usize,
    min: f64,
    max: f64,
}

impl Axis {
    /// Creates a new axis.
    ///
    /// # Errors
    /// Returns [`Error::KernelShape`] for zero bins or an empty range.
    pub fn new(n_bins: usize, min: f64, max: f64) -> Result<Self> {
        if n_bins == 0 || !(max > min) {
            return Err(Error::KernelShape(format!(
                "invalid axis: {n_bins} bins over [{min}, {max})"
            )));
        }
        Ok(Self { n_bins, min, max })
    }

    /// Number of bins.
    #[inline]
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Lower edge of the axis.
    #[inline]
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper edge of the axis.
    #[inline]
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Width of one bin.
    #[inline]
    #[must_use]
    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.n_bins as f64
    }

    /// Centre of bin `index`.
    #[inline]
    #[must_use]
    pub fn bin_center(&self, index: usize) -> f64 {
        self.min + (index as f64 + 0.5) * self.bin_width()
    }

    /// Bin containing `value`, `None` outside the axis.
    #[inline]
    #[must_use]
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        if !(value >= self.min && value < self.max) {
            return None;
        }
        let index = ((value - self.min) / self.bin_width()) as usize;
        Some(index.min(self.n_bins - 1))
    }
}

/// One-dimensional table of charge fractions.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    axis: Axis,
    values: Vec<f64>,
}

impl Histogram1D {
    /// Creates an empty table.
    #[must_use]
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            values: vec![0.0; axis.n_bins()],
        }
    }

    /// Rebuilds a table from stored values.
    ///
    /// # Errors
    /// Returns [`Error::KernelShape`] if the value count does not match the axis.
    pub fn from_values(axis: Axis, values: Vec<f64>) -> Result<Self> {
        if values.len() != axis.n_bins() {
            return Err(Error::KernelShape(format!(
                "expected {} values, got {}",
                axis.n_bins(),
                values.len()
            )));
        }
        Ok(Self { axis, values })
    }

    /// Axis of the table.
    #[inline]
    #[must_use]
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Raw bin contents.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Content of bin `index`.
    #[inline]
    #[must_use]
    pub fn bin(&self, index: usize) -> f64 {
        self.values[index]
    }

    /// Adds `weight` to bin `index`.
    #[inline]
    pub fn add_to_bin(&mut self, index: usize, weight: f64) {
        self.values[index] += weight;
    }

    /// Content of the bin containing `x`; zero outside the axis.
    #[inline]
    #[must_use]
    pub fn value_at(&self, x: f64) -> f64 {
        self.axis.find_bin(x).map_or(0.0, |i| self.values[i])
    }
}

/// Two-dimensional table of charge fractions, stored row-major in x.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x_axis: Axis,
    y_axis: Axis,
    values: Vec<f64>,
}

impl Histogram2D {
    /// Creates an empty table.
    #[must_use]
    pub fn new(x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            x_axis,
            y_axis,
            values: vec![0.0; x_axis.n_bins() * y_axis.n_bins()],
        }
    }

    /// Rebuilds a table from stored values.
    ///
    /// # Errors
    /// Returns [`Error::KernelShape`] if the value count does not match the axes.
    pub fn from_values(x_axis: Axis, y_axis: Axis, values: Vec<f64>) -> Result<Self> {
        let expected = x_axis.n_bins() * y_axis.n_bins();
        if values.len() != expected {
            return Err(Error::KernelShape(format!(
                "expected {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self {
            x_axis,
            y_axis,
            values,
        })
    }

    /// X axis of the table.
    #[inline]
    #[must_use]
    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    /// Y axis of the table.
    #[inline]
    #[must_use]
    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    /// Raw bin contents; index `ix * n_bins_y + iy`.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    fn index(&self, ix: usize, iy: usize) -> usize {
        ix * self.y_axis.n_bins() + iy
    }

    /// Content of bin `(ix, iy)`.
    #[inline]
    #[must_use]
    pub fn bin(&self, ix: usize, iy: usize) -> f64 {
        self.values[self.index(ix, iy)]
    }

    /// Adds `weight` to bin `(ix, iy)`.
    #[inline]
    pub fn add_to_bin(&mut self, ix: usize, iy: usize, weight: f64) {
        let index = self.index(ix, iy);
        self.values[index] += weight;
    }

    /// Bin indices containing `(x, y)`.
    #[inline]
    #[must_use]
    pub fn find_bin(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        Some((self.x_axis.find_bin(x)?, self.y_axis.find_bin(y)?))
    }

    /// Content of the bin containing `(x, y)`; zero outside the table.
    #[inline]
    #[must_use]
    pub fn value_at(&self, x: f64, y: f64) -> f64 {
        self.find_bin(x, y).map_or(0.0, |(ix, iy)| self.bin(ix, iy))
    }

    /// Sum of all bin contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.values.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_axis_binning() {
        let axis = Axis::new(4, -1.0, 1.0).unwrap();
        assert_abs_diff_eq!(axis.bin_width(), 0.5);
        assert_abs_diff_eq!(axis.bin_center(0), -0.75);
        assert_eq!(axis.find_bin(-1.0), Some(0));
        assert_eq!(axis.find_bin(0.0), Some(2));
        assert_eq!(axis.find_bin(0.999), Some(3));
        assert_eq!(axis.find_bin(1.0), None);
        assert_eq!(axis.find_bin(f64::NAN), None);
        assert!(Axis::new(0, 0.0, 1.0).is_err());
        assert!(Axis::new(3, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_histogram_1d() {
        let mut hist = Histogram1D::new(Axis::new(3, 0.0, 3.0).unwrap());
        hist.add_to_bin(1, 0.25);
        hist.add_to_bin(1, 0.25);
        assert_abs_diff_eq!(hist.value_at(1.5), 0.5);
        assert_abs_diff_eq!(hist.value_at(-0.1), 0.0);
        assert!(Histogram1D::from_values(*hist.axis(), vec![0.0; 2]).is_err());
    }

    #[test]
    fn test_histogram_2d() {
        let axis = Axis::new(2, -1.0, 1.0).unwrap();
        let mut hist = Histogram2D::new(axis, axis);
        hist.add_to_bin(1, 0, 0.75);
        assert_abs_diff_eq!(hist.value_at(0.5, -0.5), 0.75);
        assert_abs_diff_eq!(hist.value_at(-0.5, 0.5), 0.0);
        assert_abs_diff_eq!(hist.value_at(5.0, 0.0), 0.0);

        hist.add_to_bin(1, 0, 0.25);
        assert_abs_diff_eq!(hist.bin(1, 0), 1.0);
        assert_abs_diff_eq!(hist.integral(), 1.0);
    }
}
