//! Quantile-weighted shortest-path queries
//!
//! Both operations run Dijkstra over the route graph with edge weights
//! obtained by evaluating a caller-chosen quantile of each edge's observed
//! travel times. Ties between equally cheap frontier vertices resolve by
//! the priority heap's pop order, which is deterministic for a fixed graph
//! build order.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use petgraph::algo::{astar, dijkstra};
use petgraph::visit::EdgeRef;
use thiserror::Error;
use tracing::debug;

use crate::graph::{RouteGraph, Vertex, quantile};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Unknown waypoint {0:?}")]
    UnknownWaypoint(String),
    #[error("No route from {src:?} to {dst:?}")]
    Unreachable { src: String, dst: String },
}

type Result<T> = std::result::Result<T, RouteError>;

/// The path minimising the chosen quantile of travel time from `src` to
/// `dst`, as a vertex sequence together with its total cost in seconds.
///
/// Both endpoints are plain waypoint names; the path itself may pass
/// through split vertices. Fails with [`RouteError::UnknownWaypoint`] when
/// an endpoint has no plain vertex in the graph, and with
/// [`RouteError::Unreachable`] when no directed path exists.
pub fn fastest_path(
    graph: &RouteGraph,
    src: &str,
    dst: &str,
    quantile_q: f64,
) -> Result<(Vec<Vertex>, f64)> {
    let start = graph
        .plain(src)
        .ok_or_else(|| RouteError::UnknownWaypoint(src.to_owned()))?;
    let goal = graph
        .plain(dst)
        .ok_or_else(|| RouteError::UnknownWaypoint(dst.to_owned()))?;

    let (cost, path) = astar(
        graph.graph(),
        start,
        |node| node == goal,
        |edge| OrderedFloat(quantile(&edge.weight().secs, quantile_q)),
        |_| OrderedFloat(0.0),
    )
    .ok_or_else(|| RouteError::Unreachable {
        src: src.to_owned(),
        dst: dst.to_owned(),
    })?;

    debug!(%src, %dst, q = quantile_q, cost = cost.0, hops = path.len(), "found fastest path");
    Ok((
        path.into_iter().map(|ix| graph.vertex(ix).clone()).collect(),
        cost.0,
    ))
}

/// Expected travel periods from `src` to every reachable waypoint.
///
/// Each edge weight is the chosen quantile truncated to whole seconds.
/// Split vertices project down to their waypoint name, keeping the minimum
/// period among the halves, so the result maps plain names only.
pub fn single_source_periods(
    graph: &RouteGraph,
    src: &str,
    quantile_q: f64,
) -> Result<BTreeMap<String, u64>> {
    let start = graph
        .plain(src)
        .ok_or_else(|| RouteError::UnknownWaypoint(src.to_owned()))?;

    let costs = dijkstra(graph.graph(), start, None, |edge| {
        quantile(&edge.weight().secs, quantile_q) as u64
    });

    let mut periods: BTreeMap<String, u64> = BTreeMap::new();
    for (ix, cost) in costs {
        let name = graph.vertex(ix).name().to_owned();
        periods
            .entry(name)
            .and_modify(|period| *period = (*period).min(cost))
            .or_insert(cost);
    }

    debug!(%src, q = quantile_q, destinations = periods.len(), "expanded periods");
    Ok(periods)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{RouteError, fastest_path, single_source_periods};
    use crate::encounter::Encounter;
    use crate::graph::{RouteGraph, Vertex, build_graph};
    use crate::prepare::{WaypointRow, WaypointTable};
    use crate::projection::UtmZone;
    use crate::types::{GeoPoint, WaypointKind};

    fn table(names: &[&str]) -> Result<WaypointTable> {
        let rows = names
            .iter()
            .enumerate()
            .map(|(i, name)| WaypointRow {
                name: (*name).to_owned(),
                kind: WaypointKind::classify(name),
                east: 456_000 + i as i64 * 1_000,
                north: 5_427_000,
                point: GeoPoint::default(),
            })
            .collect();
        Ok(WaypointTable::new(
            rows,
            UtmZone {
                number: 32,
                letter: 'U',
            },
        )?)
    }

    fn enc(segment: u32, waypoint: usize, start: u32, end: u32) -> Encounter {
        Encounter {
            segment,
            waypoint,
            start,
            end,
        }
    }

    /// Two observed routes from alice to bob: direct but usually slow, or a
    /// detour via carol with stable timing.
    ///
    /// Direct observations: 10, 100, 100 s. Detour: 20 + 20 s on every
    /// trip. Low quantiles prefer the direct hop, high quantiles the
    /// detour.
    fn forked_graph() -> Result<RouteGraph> {
        let waypoints = table(&["alice", "bob", "carol"])?;
        let mut encounters = Vec::new();
        for (segment, secs) in [(0, 10), (1, 100), (2, 100)] {
            encounters.push(enc(segment, 0, 0, 0));
            encounters.push(enc(segment, 1, secs, secs));
        }
        for segment in [3, 4] {
            encounters.push(enc(segment, 0, 0, 0));
            encounters.push(enc(segment, 2, 20, 20));
            encounters.push(enc(segment, 1, 40, 40));
        }
        Ok(build_graph(&encounters, &waypoints))
    }

    #[test]
    fn test_low_quantile_prefers_the_direct_hop() -> Result<()> {
        let graph = forked_graph()?;
        let (path, cost) = fastest_path(&graph, "alice", "bob", 0.0)?;
        assert_eq!(
            path,
            vec![
                Vertex::Plain("alice".to_owned()),
                Vertex::Plain("bob".to_owned())
            ]
        );
        assert_eq!(cost, 10.0);
        Ok(())
    }

    #[test]
    fn test_high_quantile_prefers_the_stable_detour() -> Result<()> {
        let graph = forked_graph()?;
        let (path, cost) = fastest_path(&graph, "alice", "bob", 0.9)?;
        assert_eq!(
            path,
            vec![
                Vertex::Plain("alice".to_owned()),
                Vertex::Plain("carol".to_owned()),
                Vertex::Plain("bob".to_owned())
            ]
        );
        assert_eq!(cost, 40.0);
        Ok(())
    }

    #[test]
    fn test_trivial_path_is_the_source_alone() -> Result<()> {
        let graph = forked_graph()?;
        let (path, cost) = fastest_path(&graph, "alice", "alice", 0.8)?;
        assert_eq!(path, vec![Vertex::Plain("alice".to_owned())]);
        assert_eq!(cost, 0.0);
        Ok(())
    }

    #[test]
    fn test_unknown_waypoint_is_reported() -> Result<()> {
        let graph = forked_graph()?;
        assert!(matches!(
            fastest_path(&graph, "alice", "dave", 0.8),
            Err(RouteError::UnknownWaypoint(name)) if name == "dave"
        ));
        assert!(matches!(
            single_source_periods(&graph, "dave", 0.8),
            Err(RouteError::UnknownWaypoint(name)) if name == "dave"
        ));
        Ok(())
    }

    #[test]
    fn test_unreachable_destination_is_reported() -> Result<()> {
        // All observed trips run alice -> bob, so nothing leads back.
        let waypoints = table(&["alice", "bob"])?;
        let graph = build_graph(&[enc(0, 0, 0, 0), enc(0, 1, 6, 6)], &waypoints);
        assert!(matches!(
            fastest_path(&graph, "bob", "alice", 0.8),
            Err(RouteError::Unreachable { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_periods_project_split_vertices_to_their_minimum() -> Result<()> {
        let waypoints = table(&["alice", "2", "bob"])?;
        let graph = build_graph(
            &[enc(0, 0, 0, 0), enc(0, 1, 3, 53), enc(0, 2, 56, 56)],
            &waypoints,
        );
        let periods = single_source_periods(&graph, "alice", 0.8)?;
        assert_eq!(
            periods,
            [
                ("alice".to_owned(), 0),
                ("2".to_owned(), 3),
                ("bob".to_owned(), 56)
            ]
            .into_iter()
            .collect()
        );
        Ok(())
    }

    #[test]
    fn test_cost_is_monotonic_in_the_quantile() -> Result<()> {
        let graph = forked_graph()?;
        let mut previous = 0;
        for q in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let periods = single_source_periods(&graph, "alice", q)?;
            let bob = periods["bob"];
            assert!(bob >= previous);
            previous = bob;
        }
        Ok(())
    }
}
