//! Core record types shared across the pipeline
//!
//! The raw corpora are plain lists of [`RawTrackpoint`] and [`RawWaypoint`]
//! values, exactly as produced by the ingest parser or supplied by the
//! caller. Everything downstream (preparation, encounters, the graph) is
//! derived from these.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("Geographic point invariant: invalid value {1} for {0:?}")]
    GeoPointInvariant(GeoPointDimension, f64),
}

type Result<T> = std::result::Result<T, TypeError>;

#[derive(Debug)]
pub enum GeoPointDimension {
    Latitude,
    Longitude,
}

/// A point on the surface of the WGS84 ellipsoid.
///
/// Enforces valid latitude and longitude values as type invariants.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<GeoPoint> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Latitude,
                lat,
            ));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(TypeError::GeoPointInvariant(
                GeoPointDimension::Longitude,
                lon,
            ));
        }
        Ok(Self { lat, lon })
    }

    /// Get point latitude in decimal degrees
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Get point longitude in decimal degrees
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A single recorded GPS fix.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct RawTrackpoint {
    /// Time of the fix in UTC.
    pub time: DateTime<Utc>,

    /// Position of the fix.
    pub point: GeoPoint,

    /// Horizontal dilution of precision, unitless. Fixes with an hdop above
    /// the configured maximum are discarded during preparation.
    pub hdop: f64,
}

impl RawTrackpoint {
    pub fn new(time: DateTime<Utc>, point: GeoPoint, hdop: f64) -> RawTrackpoint {
        Self { time, point, hdop }
    }
}

/// A named geographic location the user cares about.
///
/// The name is the waypoint's stable identity and also decides its
/// [`WaypointKind`].
#[derive(Clone, PartialEq, Debug)]
pub struct RawWaypoint {
    pub name: String,

    pub point: GeoPoint,
}

impl RawWaypoint {
    pub fn new(name: impl Into<String>, point: GeoPoint) -> RawWaypoint {
        Self {
            name: name.into(),
            point,
        }
    }
}

/// Classification of a waypoint by its name.
///
/// A name that is a pure decimal integer marks an intersection of the road
/// network; any other name marks a point of interest. Routing queries start
/// and end at waypoints of either kind, but only intersections are eligible
/// for the slow-intersection split in the graph.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WaypointKind {
    Poi,
    Intersection,
}

impl WaypointKind {
    pub fn classify(name: &str) -> WaypointKind {
        if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
            WaypointKind::Intersection
        } else {
            WaypointKind::Poi
        }
    }
}
