//! Your world
//!
//! [`World`] holds the two append-only corpora (trackpoints and waypoints)
//! and the learned route graph derived from them. Any mutation of the
//! corpora drops the cached graph; the next query rebuilds it by running
//! the whole pipeline: preparation, encounter extraction, graph
//! construction. The rebuild re-verifies that both corpora share a single
//! UTM zone.
//!
//! Queries take `&mut self` because they may rebuild the cache; this also
//! makes a mutation during a query unrepresentable on a single value.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::Result;
use crate::encounter::find_encounters;
use crate::gpx::parse_track_file;
use crate::graph::{RouteGraph, Vertex};
use crate::prepare::{prepare_trackpoints, prepare_waypoints};
use crate::projection::ProjectionError;
use crate::router;
use crate::types::{RawTrackpoint, RawWaypoint};

/// Quantile used by callers that have no opinion of their own.
pub const DEFAULT_QUANTILE: f64 = 0.8;

/// Tunable thresholds of the learning pipeline.
#[derive(Clone, Copy, Debug)]
pub struct WorldOptions {
    /// Fixes with an hdop above this survive neither ingest nor
    /// preparation.
    pub max_hdop: f64,

    /// Association radius in metres for the nearest-waypoint lookup.
    pub max_dist: f64,
}

impl Default for WorldOptions {
    fn default() -> Self {
        Self {
            max_hdop: 16.0,
            max_dist: 30.0,
        }
    }
}

/// What a single ingested file contributed to the corpora.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IngestSummary {
    pub trackpoints: usize,
    pub waypoints: usize,
}

/// A personal transport network learned from recorded activity.
#[derive(Default)]
pub struct World {
    trackpoints: Vec<RawTrackpoint>,
    waypoints: Vec<RawWaypoint>,
    options: WorldOptions,
    graph: Option<RouteGraph>,
}

impl World {
    /// An empty world with default options.
    pub fn new() -> World {
        World::default()
    }

    pub fn with_options(options: WorldOptions) -> World {
        Self {
            options,
            ..World::default()
        }
    }

    pub fn trackpoints(&self) -> &[RawTrackpoint] {
        &self.trackpoints
    }

    pub fn waypoints(&self) -> &[RawWaypoint] {
        &self.waypoints
    }

    /// The cached route graph, absent whenever the corpora have been
    /// mutated since the last query.
    pub fn graph(&self) -> Option<&RouteGraph> {
        self.graph.as_ref()
    }

    /// Append trackpoints and drop the cached graph.
    pub fn add_trackpoints<I>(&mut self, trackpoints: I)
    where
        I: IntoIterator<Item = RawTrackpoint>,
    {
        self.trackpoints.extend(trackpoints);
        self.graph = None;
    }

    /// Append waypoints and drop the cached graph.
    pub fn add_waypoints<I>(&mut self, waypoints: I)
    where
        I: IntoIterator<Item = RawWaypoint>,
    {
        self.waypoints.extend(waypoints);
        self.graph = None;
    }

    /// Parse a GPX document and append whatever it contains.
    ///
    /// A corpus is only touched (and the cache only dropped) when the file
    /// actually contributes to it.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<IngestSummary> {
        let (trackpoints, waypoints) = parse_track_file(bytes)?;
        let summary = IngestSummary {
            trackpoints: trackpoints.len(),
            waypoints: waypoints.len(),
        };
        if !trackpoints.is_empty() {
            self.add_trackpoints(trackpoints);
        }
        if !waypoints.is_empty() {
            self.add_waypoints(waypoints);
        }
        info!(
            trackpoints = summary.trackpoints,
            waypoints = summary.waypoints,
            "ingested GPX document"
        );
        Ok(summary)
    }

    /// The path minimising the chosen quantile of travel time between two
    /// named waypoints, together with its total cost in seconds. See
    /// [`DEFAULT_QUANTILE`] for the usual choice of `quantile`.
    pub fn fastest_path(
        &mut self,
        src: &str,
        dst: &str,
        quantile: f64,
    ) -> Result<(Vec<Vertex>, f64)> {
        let graph = self.ensure_graph()?;
        Ok(router::fastest_path(graph, src, dst, quantile)?)
    }

    /// Periods in whole seconds from `src` to every reachable waypoint.
    pub fn single_source_periods(
        &mut self,
        src: &str,
        quantile: f64,
    ) -> Result<BTreeMap<String, u64>> {
        let graph = self.ensure_graph()?;
        Ok(router::single_source_periods(graph, src, quantile)?)
    }

    fn ensure_graph(&mut self) -> Result<&RouteGraph> {
        let graph = match self.graph.take() {
            Some(graph) => {
                debug!("reusing cached route graph");
                graph
            }
            None => Self::rebuild(&self.trackpoints, &self.waypoints, self.options)?,
        };
        Ok(self.graph.insert(graph))
    }

    fn rebuild(
        trackpoints: &[RawTrackpoint],
        waypoints: &[RawWaypoint],
        options: WorldOptions,
    ) -> Result<RouteGraph> {
        info!(
            trackpoints = trackpoints.len(),
            waypoints = waypoints.len(),
            "rebuilding route graph"
        );
        let tracks = prepare_trackpoints(trackpoints, options.max_hdop)?;
        let waypoint_table = prepare_waypoints(waypoints)?;
        if tracks.zone != waypoint_table.zone {
            return Err(ProjectionError::ZoneMismatch {
                tracks: tracks.zone,
                waypoints: waypoint_table.zone,
            }
            .into());
        }
        let encounters = find_encounters(&tracks, &waypoint_table, options.max_dist);
        Ok(crate::graph::build_graph(&encounters, &waypoint_table))
    }
}
