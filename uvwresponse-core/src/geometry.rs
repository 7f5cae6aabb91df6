//! Strip geometry contract for UVW readouts.

use crate::error::{Error, Result};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Strip family of the readout plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    U = 0,
    V = 1,
    W = 2,
}

impl Direction {
    /// All strip families in index order.
    pub const ALL: [Direction; 3] = [Direction::U, Direction::V, Direction::W];

    /// Dense index of the direction (0, 1 or 2).
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts a dense index back into a direction.
    ///
    /// # Errors
    /// Returns [`Error::InvalidDirection`] for indices above 2.
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(Error::InvalidDirection(index))
    }

    /// Short name used in table names and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Direction::U => "U",
            Direction::V => "V",
            Direction::W => "W",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Point or displacement in the readout plane [mm].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scalar product.
    #[inline]
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Euclidean length.
    #[inline]
    #[must_use]
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Vector rotated by +90 degrees.
    #[inline]
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    #[inline]
    fn mul(self, rhs: f64) -> Self::Output {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    #[inline]
    fn neg(self) -> Self::Output {
        Vec2::new(-self.x, -self.y)
    }
}

/// Physical strip identified by family and strip number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripId {
    pub dir: Direction,
    pub number: i32,
}

impl StripId {
    /// Creates a new strip identifier.
    #[inline]
    #[must_use]
    pub const fn new(dir: Direction, number: i32) -> Self {
        Self { dir, number }
    }
}

/// What lies on one side of a section boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SectionTag {
    /// Electronic section read out by its own channel.
    Section(u8),
    /// Beyond the physical end of the strip.
    Outside,
}

impl SectionTag {
    /// Section index, if this side is inside the active area.
    #[inline]
    #[must_use]
    pub fn section(self) -> Option<u8> {
        match self {
            SectionTag::Section(index) => Some(index),
            SectionTag::Outside => None,
        }
    }
}

/// Boundary point on a strip, ordered along the strip unit vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SectionBoundary {
    /// Cartesian position of the boundary [mm].
    pub position: Vec2,
    /// Side with smaller along-axis coordinate.
    pub before: SectionTag,
    /// Side with larger along-axis coordinate.
    pub after: SectionTag,
}

impl SectionBoundary {
    /// Creates a new boundary.
    #[must_use]
    pub const fn new(position: Vec2, before: SectionTag, after: SectionTag) -> Self {
        Self {
            position,
            before,
            after,
        }
    }
}

/// Checks that boundaries partition a strip into contiguous sections.
///
/// Every boundary's `after` tag must equal the next boundary's `before` tag.
#[must_use]
pub fn boundaries_are_contiguous(boundaries: &[SectionBoundary]) -> bool {
    boundaries
        .windows(2)
        .all(|pair| pair[0].after == pair[1].before)
}

/// Section indices present on a strip, in ascending order.
///
/// A strip without boundaries is a single section `0`.
#[must_use]
pub fn sections_of(boundaries: &[SectionBoundary]) -> Vec<u8> {
    let mut sections: Vec<u8> = boundaries
        .iter()
        .flat_map(|b| [b.before.section(), b.after.section()])
        .flatten()
        .collect();
    sections.sort_unstable();
    sections.dedup();
    if sections.is_empty() {
        sections.push(0);
    }
    sections
}

/// Geometry services consumed by the response model.
///
/// This is the minimal contract of a full detector geometry library:
/// strip ownership, crossing-node arithmetic, section boundaries and the
/// drift-time axis.
pub trait StripGeometry: Send + Sync {
    /// Strip owning the given point, `None` outside the active area.
    fn strip_at(&self, point: Vec2) -> Option<StripId>;

    /// Defined start of a strip; crossing nodes sit at whole pad pitches from it.
    fn strip_start(&self, strip: StripId) -> Option<Vec2>;

    /// Section boundaries of a physical strip, ordered along its unit vector.
    fn section_boundaries(&self, strip: StripId) -> Vec<SectionBoundary>;

    /// Distance between neighbouring crossing nodes along a strip [mm].
    fn pad_pitch(&self) -> f64;

    /// Distance between neighbouring parallel strips [mm].
    fn strip_pitch(&self) -> f64;

    /// Unit vector along the strips of a family.
    fn unit_vector(&self, dir: Direction) -> Vec2;

    /// Time cell containing the drift coordinate `z` [mm].
    fn timecell_at(&self, z: f64) -> Option<i32>;

    /// Lower edge of a time cell [mm].
    fn timecell_lower_edge(&self, cell: i32) -> Option<f64>;

    /// Width of one time cell [mm].
    fn timecell_width(&self) -> f64;

    /// Signed distance of the strip axis from the origin along the pitch axis [mm].
    fn strip_position(&self, strip: StripId) -> Option<f64>;

    /// Bounding box of the active area as `(xmin, xmax, ymin, ymax)` [mm].
    fn active_area_bounds(&self) -> (f64, f64, f64, f64);

    /// Electronics sampling rate [MHz].
    fn sampling_rate_mhz(&self) -> f64;

    /// Electron drift velocity [cm/us].
    fn drift_velocity_cm_per_us(&self) -> f64;

    /// Along-axis coordinate of a point for the given family [mm].
    #[inline]
    fn project_onto_strip_axis(&self, point: Vec2, dir: Direction) -> f64 {
        point.dot(self.unit_vector(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_index(dir.index()).unwrap(), dir);
        }
        assert!(Direction::from_index(3).is_err());
        assert_eq!(Direction::V.to_string(), "V");
    }

    #[test]
    fn test_vec2_arithmetic() {
        let a = Vec2::new(3.0, 4.0);
        let b = Vec2::new(1.0, -1.0);
        assert_eq!(a + b, Vec2::new(4.0, 3.0));
        assert_eq!(a - b, Vec2::new(2.0, 5.0));
        assert_eq!(a * 2.0, Vec2::new(6.0, 8.0));
        assert!((a.norm() - 5.0).abs() < f64::EPSILON);
        assert!(a.dot(a.perpendicular()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sections_of_boundaries() {
        assert_eq!(sections_of(&[]), vec![0]);

        let boundaries = [
            SectionBoundary::new(
                Vec2::new(-10.0, 0.0),
                SectionTag::Outside,
                SectionTag::Section(0),
            ),
            SectionBoundary::new(
                Vec2::new(0.0, 0.0),
                SectionTag::Section(0),
                SectionTag::Section(1),
            ),
            SectionBoundary::new(
                Vec2::new(10.0, 0.0),
                SectionTag::Section(1),
                SectionTag::Outside,
            ),
        ];
        assert_eq!(sections_of(&boundaries), vec![0, 1]);
        assert!(boundaries_are_contiguous(&boundaries));

        let broken = [boundaries[0], boundaries[2]];
        assert!(!boundaries_are_contiguous(&broken));
    }
}
