//! Nearest-waypoint association and encounter extraction
//!
//! An R-tree over the prepared waypoints answers "which waypoint, if any,
//! is nearest to this fix within the association radius". Walking the
//! prepared track rows in order and collapsing maximal runs of the same
//! nearest waypoint yields [`Encounter`] intervals, the raw material of the
//! route graph.
//!
//! Distances are squared Euclidean in integer UTM metres, so the math is
//! exact. Ties between equally distant waypoints resolve to the smaller
//! waypoint-table index.

use rstar::{AABB, PointDistance, RTree, RTreeObject};
use tracing::debug;

use crate::prepare::{TrackTable, WaypointTable};

/// A maximal contiguous visit of the track stream to one waypoint's
/// neighbourhood, within a single segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Encounter {
    /// Segment the visit belongs to.
    pub segment: u32,

    /// Waypoint-table index of the visited waypoint.
    pub waypoint: usize,

    /// Offset of the first fix of the run.
    pub start: u32,

    /// Offset of the last fix of the run.
    pub end: u32,
}

struct WaypointEntry {
    pos: [i64; 2],
    index: usize,
}

impl RTreeObject for WaypointEntry {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.pos)
    }
}

impl PointDistance for WaypointEntry {
    fn distance_2(&self, point: &[i64; 2]) -> i64 {
        let de = self.pos[0] - point[0];
        let dn = self.pos[1] - point[1];
        de * de + dn * dn
    }
}

/// Fixed-radius nearest-waypoint index over a prepared waypoint table.
pub struct WaypointIndex {
    tree: RTree<WaypointEntry>,
}

impl WaypointIndex {
    pub fn new(waypoints: &WaypointTable) -> WaypointIndex {
        let entries = waypoints
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| WaypointEntry {
                pos: [row.east, row.north],
                index,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// The nearest waypoint within `max_dist` metres of the query point, or
    /// `None` when no waypoint is that close. Equidistant candidates resolve
    /// to the smallest table index.
    pub fn nearest_within(&self, east: i64, north: i64, max_dist: f64) -> Option<usize> {
        let query = [east, north];
        let limit = (max_dist * max_dist) as i64;
        self.tree
            .locate_within_distance(query, limit)
            .map(|entry| (entry.distance_2(&query), entry.index))
            .filter(|&(d2, _)| d2 <= limit)
            .min()
            .map(|(_, index)| index)
    }
}

/// Extract the encounters of a prepared track with a prepared waypoint set.
///
/// Fixes without a waypoint within `max_dist` are dropped; among the
/// survivors of each segment, maximal runs of the same nearest waypoint
/// collapse into one encounter each.
pub fn find_encounters(
    track: &TrackTable,
    waypoints: &WaypointTable,
    max_dist: f64,
) -> Vec<Encounter> {
    let index = WaypointIndex::new(waypoints);

    let mut encounters = Vec::new();
    let mut current: Option<Encounter> = None;
    for row in &track.rows {
        let Some(waypoint) = index.nearest_within(row.east, row.north, max_dist) else {
            continue;
        };
        match current.as_mut() {
            Some(run) if run.segment == row.segment && run.waypoint == waypoint => {
                run.end = row.offset;
            }
            _ => {
                if let Some(run) = current.take() {
                    encounters.push(run);
                }
                current = Some(Encounter {
                    segment: row.segment,
                    waypoint,
                    start: row.offset,
                    end: row.offset,
                });
            }
        }
    }
    if let Some(run) = current {
        encounters.push(run);
    }

    debug!(
        encounters = encounters.len(),
        fixes = track.rows.len(),
        "extracted encounters"
    );
    encounters
}
