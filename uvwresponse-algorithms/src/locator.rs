//! Reference node and time cell lookup.

use log::debug;
use uvwresponse_core::{Direction, StripGeometry, Vec2};

/// Crossing node nearest to a deposit, the origin of every kernel lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceNode {
    /// Strip numbers of the U, V and W strips crossing at the node.
    pub strips: [i32; 3],
    /// Cartesian node position [mm].
    pub position: Vec2,
}

impl ReferenceNode {
    /// Strip number of one family at the node.
    #[inline]
    #[must_use]
    pub fn strip(&self, dir: Direction) -> i32 {
        self.strips[dir.index()]
    }
}

/// Time cell containing a deposit, the origin of the time kernel lookups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceCell {
    pub cell: i32,
    /// Lower edge of the cell [mm].
    pub lower_edge: f64,
}

/// Resolves reference nodes and time cells through a [`StripGeometry`].
#[derive(Clone, Copy)]
pub struct NodeLocator<'a> {
    geometry: &'a dyn StripGeometry,
}

impl<'a> NodeLocator<'a> {
    #[must_use]
    pub fn new(geometry: &'a dyn StripGeometry) -> Self {
        Self { geometry }
    }

    /// Strip triplet and position of the crossing node nearest to `point`.
    ///
    /// The node is found on the strip owning the point by rounding its
    /// distance from the strip start to whole pad pitches. The two other
    /// families are resolved by probing half a pad pitch along their own
    /// axes, first forwards and then backwards. Returns `None` if any of the
    /// three families cannot be resolved, e.g. close to the active area edge.
    #[must_use]
    pub fn reference_strip_node(&self, point: Vec2) -> Option<ReferenceNode> {
        let geometry = self.geometry;
        let Some(strip) = geometry.strip_at(point) else {
            debug!("no strip at ({:.3}, {:.3})", point.x, point.y);
            return None;
        };
        let start = geometry.strip_start(strip)?;
        let pad = geometry.pad_pitch();
        let unit = geometry.unit_vector(strip.dir);
        let distance_to_start = (point - start).dot(unit);
        let position = start + unit * ((distance_to_start / pad).round() * pad);

        let mut strips = [0; 3];
        strips[strip.dir.index()] = strip.number;
        for dir in Direction::ALL {
            if dir == strip.dir {
                continue;
            }
            let probe = geometry.unit_vector(dir) * (0.5 * pad);
            let found = [position + probe, position - probe]
                .into_iter()
                .filter_map(|p| geometry.strip_at(p))
                .find(|s| s.dir == dir);
            let Some(other) = found else {
                debug!(
                    "node ({:.3}, {:.3}) has no {dir} strip",
                    position.x, position.y
                );
                return None;
            };
            strips[dir.index()] = other.number;
        }
        Some(ReferenceNode { strips, position })
    }

    /// Time cell containing the drift coordinate `z`.
    #[must_use]
    pub fn reference_timecell(&self, z: f64) -> Option<ReferenceCell> {
        let cell = self.geometry.timecell_at(z)?;
        let lower_edge = self.geometry.timecell_lower_edge(cell)?;
        Some(ReferenceCell { cell, lower_edge })
    }
}
