//! Accumulators receiving projected charge.
//!
//! Every sink sees the same [`Deposit`] records for one input charge and
//! converts them into its own units, so all attached sinks stay consistent.
#![allow(clippy::cast_sign_loss)]

use std::collections::BTreeMap;

use crate::geometry::{Direction, StripId};
use crate::histogram::{Axis, Histogram1D, Histogram2D};

/// Charge delivered to one (direction, strip, section, time cell) destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deposit {
    pub strip: StripId,
    pub section: u8,
    pub timecell: i32,
    pub charge: f64,
    /// Signed strip axis position along the pitch axis [mm].
    pub strip_position_mm: f64,
    /// Centre of the time cell [mm].
    pub z_mm: f64,
}

/// Receiver of projected charge.
pub trait ChargeSink {
    /// Adds one destination's charge.
    fn accumulate(&mut self, deposit: &Deposit);
}

/// Strip x time cell accumulator per direction, sections merged.
#[derive(Debug, Clone, PartialEq)]
pub struct StripTimeProjections {
    n_strips: usize,
    n_timecells: usize,
    values: [Vec<f64>; 3],
}

impl StripTimeProjections {
    /// Creates an empty accumulator for strip numbers `0..n_strips` and cells `0..n_timecells`.
    #[must_use]
    pub fn new(n_strips: usize, n_timecells: usize) -> Self {
        let plane = vec![0.0; n_strips * n_timecells];
        Self {
            n_strips,
            n_timecells,
            values: [plane.clone(), plane.clone(), plane],
        }
    }

    fn index(&self, strip: i32, timecell: i32) -> Option<usize> {
        let strip = usize::try_from(strip).ok()?;
        let cell = usize::try_from(timecell).ok()?;
        (strip < self.n_strips && cell < self.n_timecells)
            .then_some(strip * self.n_timecells + cell)
    }

    /// Charge collected by one strip in one time cell.
    #[must_use]
    pub fn value(&self, dir: Direction, strip: i32, timecell: i32) -> f64 {
        self.index(strip, timecell)
            .map_or(0.0, |i| self.values[dir.index()][i])
    }

    /// Raw projection of one direction; index `strip * n_timecells + cell`.
    #[must_use]
    pub fn projection(&self, dir: Direction) -> &[f64] {
        &self.values[dir.index()]
    }

    /// Total charge of one direction.
    #[must_use]
    pub fn total(&self, dir: Direction) -> f64 {
        self.values[dir.index()].iter().sum()
    }
}

impl ChargeSink for StripTimeProjections {
    fn accumulate(&mut self, deposit: &Deposit) {
        if let Some(i) = self.index(deposit.strip.number, deposit.timecell) {
            self.values[deposit.strip.dir.index()][i] += deposit.charge;
        }
    }
}

/// Drift coordinate x strip position accumulator per direction, in millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalProjections {
    planes: [Histogram2D; 3],
}

impl PhysicalProjections {
    /// Creates an empty accumulator with the given z and strip position binning.
    #[must_use]
    pub fn new(z_axis: Axis, position_axis: Axis) -> Self {
        let plane = Histogram2D::new(z_axis, position_axis);
        Self {
            planes: [plane.clone(), plane.clone(), plane],
        }
    }

    /// Projection of one direction.
    #[must_use]
    pub fn projection(&self, dir: Direction) -> &Histogram2D {
        &self.planes[dir.index()]
    }

    /// Total charge of one direction.
    #[must_use]
    pub fn total(&self, dir: Direction) -> f64 {
        self.planes[dir.index()].integral()
    }
}

impl ChargeSink for PhysicalProjections {
    fn accumulate(&mut self, deposit: &Deposit) {
        let plane = &mut self.planes[deposit.strip.dir.index()];
        if let Some((iz, ip)) = plane.find_bin(deposit.z_mm, deposit.strip_position_mm) {
            plane.add_to_bin(iz, ip, deposit.charge);
        }
    }
}

/// Charge versus drift coordinate, summed over all strips of all directions.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftProfile {
    profile: Histogram1D,
}

impl DriftProfile {
    /// Creates an empty profile.
    #[must_use]
    pub fn new(z_axis: Axis) -> Self {
        Self {
            profile: Histogram1D::new(z_axis),
        }
    }

    #[must_use]
    pub fn profile(&self) -> &Histogram1D {
        &self.profile
    }

    /// Total charge of the profile.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.profile.values().iter().sum()
    }
}

impl ChargeSink for DriftProfile {
    fn accumulate(&mut self, deposit: &Deposit) {
        if let Some(bin) = self.profile.axis().find_bin(deposit.z_mm) {
            self.profile.add_to_bin(bin, deposit.charge);
        }
    }
}

/// Key of a [`ChargeMap`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    pub dir: Direction,
    pub strip: i32,
    pub section: u8,
    pub timecell: i32,
}

/// Persistent per-channel charge map.
///
/// Unlike the projections, sections are kept apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargeMap {
    charges: BTreeMap<ChannelKey, f64>,
}

impl ChargeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge of one channel; zero if it never received any.
    #[must_use]
    pub fn get(&self, key: &ChannelKey) -> f64 {
        self.charges.get(key).copied().unwrap_or(0.0)
    }

    /// Channels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &f64)> {
        self.charges.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.charges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charges.is_empty()
    }

    /// Total charge over all channels.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.charges.values().sum()
    }

    /// Total charge of one direction.
    #[must_use]
    pub fn total_for(&self, dir: Direction) -> f64 {
        self.charges
            .iter()
            .filter(|(key, _)| key.dir == dir)
            .map(|(_, charge)| charge)
            .sum()
    }

    pub fn clear(&mut self) {
        self.charges.clear();
    }
}

impl ChargeSink for ChargeMap {
    fn accumulate(&mut self, deposit: &Deposit) {
        let key = ChannelKey {
            dir: deposit.strip.dir,
            strip: deposit.strip.number,
            section: deposit.section,
            timecell: deposit.timecell,
        };
        *self.charges.entry(key).or_insert(0.0) += deposit.charge;
    }
}

/// Sink kinds that can be attached to a projector.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSink {
    RawProjection(StripTimeProjections),
    PhysicalProjection(PhysicalProjections),
    DriftProfile(DriftProfile),
    ChargeMap(ChargeMap),
}

impl OutputSink {
    /// Short kind name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OutputSink::RawProjection(_) => "raw",
            OutputSink::PhysicalProjection(_) => "physical",
            OutputSink::DriftProfile(_) => "drift",
            OutputSink::ChargeMap(_) => "map",
        }
    }

    /// Total charge collected by the sink over all directions.
    #[must_use]
    pub fn total(&self) -> f64 {
        match self {
            OutputSink::RawProjection(sink) => Direction::ALL.iter().map(|&d| sink.total(d)).sum(),
            OutputSink::PhysicalProjection(sink) => {
                Direction::ALL.iter().map(|&d| sink.total(d)).sum()
            }
            OutputSink::DriftProfile(sink) => sink.total(),
            OutputSink::ChargeMap(sink) => sink.total(),
        }
    }
}

impl ChargeSink for OutputSink {
    #[inline]
    fn accumulate(&mut self, deposit: &Deposit) {
        match self {
            OutputSink::RawProjection(sink) => sink.accumulate(deposit),
            OutputSink::PhysicalProjection(sink) => sink.accumulate(deposit),
            OutputSink::DriftProfile(sink) => sink.accumulate(deposit),
            OutputSink::ChargeMap(sink) => sink.accumulate(deposit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn deposit(dir: Direction, number: i32, section: u8, timecell: i32, charge: f64) -> Deposit {
        Deposit {
            strip: StripId::new(dir, number),
            section,
            timecell,
            charge,
            strip_position_mm: f64::from(number) - 5.0,
            z_mm: f64::from(timecell) + 0.5,
        }
    }

    fn all_sinks() -> Vec<OutputSink> {
        let z_axis = Axis::new(10, 0.0, 10.0).unwrap();
        let position_axis = Axis::new(10, -5.0, 5.0).unwrap();
        vec![
            OutputSink::RawProjection(StripTimeProjections::new(10, 10)),
            OutputSink::PhysicalProjection(PhysicalProjections::new(z_axis, position_axis)),
            OutputSink::DriftProfile(DriftProfile::new(z_axis)),
            OutputSink::ChargeMap(ChargeMap::new()),
        ]
    }

    #[test]
    fn test_sinks_agree_on_totals() {
        let mut sinks = all_sinks();
        let deposits = [
            deposit(Direction::U, 4, 0, 2, 10.0),
            deposit(Direction::U, 4, 1, 2, 5.0),
            deposit(Direction::W, 7, 0, 9, 2.5),
        ];
        for sink in &mut sinks {
            for d in &deposits {
                sink.accumulate(d);
            }
        }
        for sink in &sinks {
            assert_abs_diff_eq!(sink.total(), 17.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_raw_projection_merges_sections() {
        let mut raw = StripTimeProjections::new(10, 10);
        raw.accumulate(&deposit(Direction::V, 3, 0, 1, 1.0));
        raw.accumulate(&deposit(Direction::V, 3, 1, 1, 2.0));
        raw.accumulate(&deposit(Direction::V, 30, 0, 1, 7.0));
        assert_abs_diff_eq!(raw.value(Direction::V, 3, 1), 3.0);
        assert_abs_diff_eq!(raw.total(Direction::V), 3.0);
        assert_abs_diff_eq!(raw.total(Direction::U), 0.0);
    }

    #[test]
    fn test_charge_map_keeps_sections() {
        let mut map = ChargeMap::new();
        map.accumulate(&deposit(Direction::V, 3, 0, 1, 1.0));
        map.accumulate(&deposit(Direction::V, 3, 1, 1, 2.0));
        map.accumulate(&deposit(Direction::V, 3, 1, 1, 2.0));
        assert_eq!(map.len(), 2);
        let key = ChannelKey {
            dir: Direction::V,
            strip: 3,
            section: 1,
            timecell: 1,
        };
        assert_abs_diff_eq!(map.get(&key), 4.0);
        assert_abs_diff_eq!(map.total_for(Direction::V), 5.0);
        map.clear();
        assert!(map.is_empty());
    }
}
