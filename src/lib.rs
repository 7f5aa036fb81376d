//! A library for learning a personal transport network from recorded GPS
//! activity and answering fastest-route queries between named places.
//!
//! Feed a [`World`] your recorded trackpoints and the waypoints you care
//! about (points of interest, plus digit-named intersections), either
//! directly or from GPX files via [`World::ingest`]. The world infers a
//! directed graph whose edges carry the travel times observed on past
//! trips; [`World::fastest_path`] and [`World::single_source_periods`]
//! then answer queries weighted by a quantile of those observations, so
//! you can ask for the route that is fastest four trips out of five.
//!
//! Intersections where trips typically wait (traffic lights) are modelled
//! per observed turn with a split pair of vertices, letting the learned
//! dwell time depend on the direction of travel.
//!
//! # Feature flags
//!
//! - `cli` enables the additional dependencies needed by the CLI
//!
//! # Concurrency
//!
//! The pipeline is single-threaded and synchronous; queries may rebuild
//! the cached graph and therefore take `&mut self`. Embedders in
//! concurrent hosts must serialise access to a [`World`] themselves.

mod encounter;
mod gpx;
mod graph;
mod prepare;
mod projection;
mod router;
mod types;
mod world;

use thiserror::Error;

pub use crate::encounter::Encounter;
pub use crate::gpx::{GpxError, GpxItem, GpxReader, GpxWaypoint, parse_track_file};
pub use crate::graph::{EdgeTimes, RouteGraph, Vertex, VertexInfo, quantile};
pub use crate::prepare::PrepareError;
pub use crate::projection::{ProjectionError, UtmZone};
pub use crate::router::RouteError;
pub use crate::types::{GeoPoint, RawTrackpoint, RawWaypoint, TypeError, WaypointKind};
pub use crate::world::{DEFAULT_QUANTILE, IngestSummary, World, WorldOptions};

#[derive(Error, Debug)]
pub enum GohomeError {
    #[error("GPX processing error")]
    Gpx(#[from] gpx::GpxError),
    #[error("Projection error")]
    Projection(#[from] projection::ProjectionError),
    #[error("Preparation error")]
    Prepare(#[from] prepare::PrepareError),
    #[error("Routing error")]
    Route(#[from] router::RouteError),
    #[error("Core type error")]
    Type(#[from] types::TypeError),
}

pub type Result<T> = std::result::Result<T, GohomeError>;
