//! Preparation of the raw corpora into tabular records
//!
//! The track preparer filters fixes by accuracy, sorts them by timestamp,
//! projects them, and splits the stream into trips: a new segment starts
//! whenever the gap to the previous fix exceeds [`SEGMENT_GAP_SECS`]. Each
//! row carries its offset in whole seconds from the first fix of its
//! segment.
//!
//! The waypoint preparer projects the named waypoints and classifies each
//! as a point of interest or an intersection by the digits-name rule.
//!
//! Both tables carry the UTM zone tag of their batch so the caller can
//! verify that tracks and waypoints live in the same zone.

use std::collections::HashSet;

use thiserror::Error;
use tracing::info;

use crate::projection::{ProjectionError, UtmZone, project_batch};
use crate::types::{GeoPoint, RawTrackpoint, RawWaypoint, WaypointKind};

/// A gap above this many seconds between consecutive fixes starts a new
/// segment.
pub const SEGMENT_GAP_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Empty {0} corpus")]
    EmptyData(&'static str),
    #[error("Duplicate waypoint name {0:?}")]
    DuplicateWaypoint(String),
    #[error("Projection error")]
    Projection(#[from] ProjectionError),
}

type Result<T> = std::result::Result<T, PrepareError>;

/// One prepared trackpoint.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrackRow {
    /// Trip index, starting at 0.
    pub segment: u32,

    /// Whole seconds since the first fix of this segment.
    pub offset: u32,

    /// UTM easting in integer metres.
    pub east: i64,

    /// UTM northing in integer metres.
    pub north: i64,
}

/// The prepared track corpus, ordered by timestamp.
#[derive(Debug)]
pub struct TrackTable {
    pub rows: Vec<TrackRow>,
    pub zone: UtmZone,
}

/// One prepared waypoint.
#[derive(Clone, Debug)]
pub struct WaypointRow {
    pub name: String,
    pub kind: WaypointKind,
    pub east: i64,
    pub north: i64,
    pub point: GeoPoint,
}

/// The prepared waypoint corpus. Row order follows the input and is the
/// stable tie-breaking order for nearest-waypoint queries.
#[derive(Debug)]
pub struct WaypointTable {
    pub rows: Vec<WaypointRow>,
    pub zone: UtmZone,
}

impl WaypointTable {
    /// Build a table from prepared rows, rejecting duplicate names.
    pub fn new(rows: Vec<WaypointRow>, zone: UtmZone) -> Result<WaypointTable> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(row.name.as_str()) {
                return Err(PrepareError::DuplicateWaypoint(row.name.clone()));
            }
        }
        Ok(Self { rows, zone })
    }
}

/// Prepare the trackpoint corpus.
///
/// Fixes with an hdop above `max_hdop` are discarded; the survivors are
/// sorted by timestamp (ties keep input order) and projected into one UTM
/// zone. Fails with [`PrepareError::EmptyData`] when nothing survives the
/// accuracy filter.
pub fn prepare_trackpoints(trackpoints: &[RawTrackpoint], max_hdop: f64) -> Result<TrackTable> {
    let mut kept: Vec<&RawTrackpoint> =
        trackpoints.iter().filter(|t| t.hdop <= max_hdop).collect();
    if kept.is_empty() {
        return Err(PrepareError::EmptyData("trackpoint"));
    }
    kept.sort_by_key(|t| t.time);

    let points: Vec<GeoPoint> = kept.iter().map(|t| t.point).collect();
    let (coords, zone) = project_batch(&points)?;

    let mut rows = Vec::with_capacity(kept.len());
    let mut segment = 0u32;
    let mut segment_start = kept[0].time;
    let mut previous = kept[0].time;
    for (trackpoint, coord) in kept.iter().zip(coords) {
        if (trackpoint.time - previous).num_seconds() > SEGMENT_GAP_SECS {
            segment += 1;
            segment_start = trackpoint.time;
        }
        rows.push(TrackRow {
            segment,
            offset: (trackpoint.time - segment_start).num_seconds() as u32,
            east: coord.east,
            north: coord.north,
        });
        previous = trackpoint.time;
    }

    info!(
        rows = rows.len(),
        discarded = trackpoints.len() - rows.len(),
        segments = segment + 1,
        zone = %zone,
        "prepared track table"
    );
    Ok(TrackTable { rows, zone })
}

/// Prepare the waypoint corpus.
///
/// Names must be unique. Fails with [`PrepareError::EmptyData`] on an empty
/// input.
pub fn prepare_waypoints(waypoints: &[RawWaypoint]) -> Result<WaypointTable> {
    if waypoints.is_empty() {
        return Err(PrepareError::EmptyData("waypoint"));
    }

    let points: Vec<GeoPoint> = waypoints.iter().map(|w| w.point).collect();
    let (coords, zone) = project_batch(&points)?;

    let rows = waypoints
        .iter()
        .zip(coords)
        .map(|(waypoint, coord)| WaypointRow {
            name: waypoint.name.clone(),
            kind: WaypointKind::classify(&waypoint.name),
            east: coord.east,
            north: coord.north,
            point: waypoint.point,
        })
        .collect::<Vec<_>>();

    info!(rows = rows.len(), zone = %zone, "prepared waypoint table");
    WaypointTable::new(rows, zone)
}
