//! Route graph construction
//!
//! Composes encounters into a directed weighted graph over the waypoints.
//! Each edge carries the sorted list of travel times observed for that hop
//! on past trips; queries weight an edge by an empirical [`quantile`] of
//! that list.
//!
//! Intersections where trips typically dwell (traffic lights) are modelled
//! with a two-vertex split per observed turn: an approach half
//! `(x, p, x)` and an exit half `(x, x, s)`, joined by an internal edge
//! carrying the dwell observations for the turn `p -> x -> s`. Fast
//! intersections stay transparent: their dwell folds into the outgoing
//! transit observation and they appear as plain vertices only.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use tracing::info;

use crate::encounter::Encounter;
use crate::prepare::WaypointTable;
use crate::types::{GeoPoint, WaypointKind};

/// Dwell quantile examined by the slow-intersection rule.
const SLOW_DWELL_QUANTILE: f64 = 0.75;

/// An intersection is slow when its dwell quantile exceeds this many
/// seconds.
const SLOW_DWELL_SECS: f64 = 20.0;

/// A vertex of the route graph.
///
/// Waypoints normally appear as a single [`Vertex::Plain`] carrying their
/// name. A slow intersection instead appears as [`Vertex::Split`] halves,
/// one pair per observed turn; `here` is the waypoint the halves physically
/// sit at.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Vertex {
    Plain(String),
    Split {
        here: String,
        from: String,
        to: String,
    },
}

impl Vertex {
    /// The name of the waypoint this vertex sits at.
    pub fn name(&self) -> &str {
        match self {
            Vertex::Plain(name) => name,
            Vertex::Split { here, .. } => here,
        }
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vertex::Plain(name) => write!(f, "{name}"),
            Vertex::Split { here, from, to } => write!(f, "{here}[{from}->{to}]"),
        }
    }
}

/// Node attributes: the vertex tag plus the waypoint's position.
#[derive(Clone, Debug)]
pub struct VertexInfo {
    pub vertex: Vertex,
    pub point: GeoPoint,
}

/// Edge attribute: observed travel times in seconds, sorted ascending.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EdgeTimes {
    pub secs: Vec<u32>,
}

/// The learned transport network.
pub struct RouteGraph {
    graph: DiGraph<VertexInfo, EdgeTimes>,
    index: HashMap<Vertex, NodeIndex>,
}

impl RouteGraph {
    fn new() -> RouteGraph {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    fn ensure_vertex(&mut self, vertex: Vertex, point: GeoPoint) -> NodeIndex {
        if let Some(&ix) = self.index.get(&vertex) {
            return ix;
        }
        let ix = self.graph.add_node(VertexInfo {
            vertex: vertex.clone(),
            point,
        });
        self.index.insert(vertex, ix);
        ix
    }

    /// The underlying petgraph structure.
    pub fn graph(&self) -> &DiGraph<VertexInfo, EdgeTimes> {
        &self.graph
    }

    pub fn node(&self, vertex: &Vertex) -> Option<NodeIndex> {
        self.index.get(vertex).copied()
    }

    /// Node index of the plain vertex with the given waypoint name.
    pub fn plain(&self, name: &str) -> Option<NodeIndex> {
        self.node(&Vertex::Plain(name.to_owned()))
    }

    pub fn vertex(&self, ix: NodeIndex) -> &Vertex {
        &self.graph[ix].vertex
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Observed times of the edge between two vertices, if present.
    pub fn secs_between(&self, from: &Vertex, to: &Vertex) -> Option<&[u32]> {
        let from = self.node(from)?;
        let to = self.node(to)?;
        let edge = self.graph.find_edge(from, to)?;
        self.graph.edge_weight(edge).map(|times| times.secs.as_slice())
    }

    /// Iterate over all vertices.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.graph.node_weights().map(|info| &info.vertex)
    }
}

/// The empirical quantile of a sorted observation list, with linear
/// interpolation between adjacent order statistics.
///
/// `q = 0` yields the minimum, `q = 1` the maximum, and `q = 0.75` of
/// `[a, b]` yields `a + 0.75 * (b - a)`. Values of `q` outside `[0, 1]`
/// are clamped.
pub fn quantile(sorted_secs: &[u32], q: f64) -> f64 {
    if sorted_secs.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted_secs.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let lower = sorted_secs[below] as f64;
    let upper = sorted_secs[above] as f64;
    lower + (rank - below as f64) * (upper - lower)
}

/// Per-encounter view with its neighbours in the segment resolved.
struct Leg {
    waypoint: usize,
    pred: Option<usize>,
    succ: Option<usize>,
    /// Seconds dwelt at the waypoint.
    curr_secs: u32,
    /// Seconds to the next encounter of the segment, if any.
    succ_secs: Option<u32>,
}

/// Build the route graph from the encounters of a prepared corpus.
///
/// Grouping keys are waypoint-table indices held in ordered maps, so the
/// vertex and edge creation order is a deterministic function of the input.
pub fn build_graph(encounters: &[Encounter], waypoints: &WaypointTable) -> RouteGraph {
    let mut legs: Vec<Leg> = encounters
        .iter()
        .map(|e| Leg {
            waypoint: e.waypoint,
            pred: None,
            succ: None,
            curr_secs: e.end - e.start,
            succ_secs: None,
        })
        .collect();
    for i in 1..encounters.len() {
        if encounters[i].segment == encounters[i - 1].segment {
            legs[i].pred = Some(encounters[i - 1].waypoint);
            legs[i - 1].succ = Some(encounters[i].waypoint);
            legs[i - 1].succ_secs = Some(encounters[i].start - encounters[i - 1].end);
        }
    }

    // Classify intersections. Slow means the dwell quantile exceeds the
    // threshold and at least one encounter saw both a predecessor and a
    // successor; an intersection never observed with both sides cannot
    // produce a turn and stays transparent.
    let mut dwells: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    let mut complete: HashSet<usize> = HashSet::new();
    for leg in &legs {
        if waypoints.rows[leg.waypoint].kind == WaypointKind::Intersection {
            dwells.entry(leg.waypoint).or_default().push(leg.curr_secs);
            if leg.pred.is_some() && leg.succ.is_some() {
                complete.insert(leg.waypoint);
            }
        }
    }
    let slow: BTreeSet<usize> = dwells
        .into_iter()
        .filter(|(waypoint, dwell)| {
            if !complete.contains(waypoint) {
                return false;
            }
            let mut dwell = dwell.clone();
            dwell.sort_unstable();
            quantile(&dwell, SLOW_DWELL_QUANTILE) > SLOW_DWELL_SECS
        })
        .map(|(waypoint, _)| waypoint)
        .collect();

    // Fold the dwell of fast intersections into the outgoing transit, which
    // makes them transparent in the graph.
    for leg in &mut legs {
        if waypoints.rows[leg.waypoint].kind == WaypointKind::Intersection
            && !slow.contains(&leg.waypoint)
        {
            if let Some(succ_secs) = leg.succ_secs.as_mut() {
                *succ_secs += leg.curr_secs;
            }
            leg.curr_secs = 0;
        }
    }

    // Group the dwell observations of slow intersections by turn, and every
    // transit with a known successor by hop.
    let mut turns: BTreeMap<(usize, usize, usize), Vec<u32>> = BTreeMap::new();
    let mut transits: BTreeMap<(usize, usize), Vec<u32>> = BTreeMap::new();
    for leg in &legs {
        if slow.contains(&leg.waypoint) {
            if let (Some(pred), Some(succ)) = (leg.pred, leg.succ) {
                turns
                    .entry((leg.waypoint, pred, succ))
                    .or_default()
                    .push(leg.curr_secs);
            }
        }
        if let (Some(succ), Some(succ_secs)) = (leg.succ, leg.succ_secs) {
            transits
                .entry((leg.waypoint, succ))
                .or_default()
                .push(succ_secs);
        }
    }

    // Waypoints owning split vertices. Transits touching them attach to the
    // split halves rather than to a plain vertex.
    let split: BTreeSet<usize> = turns.keys().map(|&(here, _, _)| here).collect();

    let name = |w: usize| waypoints.rows[w].name.clone();
    let point = |w: usize| waypoints.rows[w].point;

    let mut route_graph = RouteGraph::new();
    for ((here, pred, succ), mut secs) in turns {
        secs.sort_unstable();
        let approach = route_graph.ensure_vertex(
            Vertex::Split {
                here: name(here),
                from: name(pred),
                to: name(here),
            },
            point(here),
        );
        let exit = route_graph.ensure_vertex(
            Vertex::Split {
                here: name(here),
                from: name(here),
                to: name(succ),
            },
            point(here),
        );
        route_graph.graph.add_edge(approach, exit, EdgeTimes { secs });
    }

    for ((curr, succ), mut secs) in transits {
        secs.sort_unstable();
        let source = if split.contains(&curr) {
            Vertex::Split {
                here: name(curr),
                from: name(curr),
                to: name(succ),
            }
        } else {
            Vertex::Plain(name(curr))
        };
        let dest = if split.contains(&succ) {
            Vertex::Split {
                here: name(succ),
                from: name(curr),
                to: name(succ),
            }
        } else {
            Vertex::Plain(name(succ))
        };
        let source = route_graph.ensure_vertex(source, point(curr));
        let dest = route_graph.ensure_vertex(dest, point(succ));
        route_graph.graph.add_edge(source, dest, EdgeTimes { secs });
    }

    info!(
        vertices = route_graph.vertex_count(),
        edges = route_graph.edge_count(),
        slow_intersections = split.len(),
        "built route graph"
    );
    route_graph
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{Vertex, build_graph, quantile};
    use crate::encounter::Encounter;
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

    fn plain(name: &str) -> Vertex {
        Vertex::Plain(name.to_owned())
    }

    fn split(here: &str, from: &str, to: &str) -> Vertex {
        Vertex::Split {
            here: here.to_owned(),
            from: from.to_owned(),
            to: to.to_owned(),
        }
    }

    #[test]
    fn test_quantile_definition() {
        assert_eq!(quantile(&[6], 0.8), 6.0);
        assert_eq!(quantile(&[3, 9], 0.0), 3.0);
        assert_eq!(quantile(&[3, 9], 1.0), 9.0);
        assert_eq!(quantile(&[6, 10], 0.75), 9.0);
        assert_eq!(quantile(&[0, 10, 20], 0.5), 10.0);
        assert_eq!(quantile(&[0, 10], 0.25), 2.5);
    }

    #[test]
    fn test_quantile_clamps_out_of_range() {
        assert_eq!(quantile(&[3, 9], -0.5), 3.0);
        assert_eq!(quantile(&[3, 9], 1.5), 9.0);
    }

    #[test]
    fn test_simple_transit_between_pois() -> Result<()> {
        let waypoints = table(&["alice", "bob"])?;
        let graph = build_graph(&[enc(0, 0, 0, 0), enc(0, 1, 6, 6)], &waypoints);

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.secs_between(&plain("alice"), &plain("bob")),
            Some(&[6][..])
        );
        Ok(())
    }

    #[test]
    fn test_repeated_trips_accumulate_sorted() -> Result<()> {
        let waypoints = table(&["alice", "bob"])?;
        let graph = build_graph(
            &[
                enc(0, 0, 0, 0),
                enc(0, 1, 9, 9),
                enc(1, 0, 0, 0),
                enc(1, 1, 4, 4),
                enc(2, 0, 0, 0),
                enc(2, 1, 7, 7),
            ],
            &waypoints,
        );

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.secs_between(&plain("alice"), &plain("bob")),
            Some(&[4, 7, 9][..])
        );
        Ok(())
    }

    #[test]
    fn test_segment_boundaries_produce_no_edge() -> Result<()> {
        let waypoints = table(&["alice", "bob"])?;
        // The two encounters belong to different trips, so no transit links
        // them.
        let graph = build_graph(&[enc(0, 0, 0, 0), enc(1, 1, 0, 0)], &waypoints);
        assert_eq!(graph.edge_count(), 0);
        Ok(())
    }

    #[test]
    fn test_fast_intersection_is_transparent() -> Result<()> {
        let waypoints = table(&["alice", "1", "bob"])?;
        let graph = build_graph(
            &[enc(0, 0, 0, 0), enc(0, 1, 3, 8), enc(0, 2, 12, 12)],
            &waypoints,
        );

        // The 5 s dwell folds into the outgoing transit.
        assert_eq!(
            graph.secs_between(&plain("alice"), &plain("1")),
            Some(&[3][..])
        );
        assert_eq!(graph.secs_between(&plain("1"), &plain("bob")), Some(&[9][..]));
        assert!(graph.vertices().all(|v| matches!(v, Vertex::Plain(_))));
        Ok(())
    }

    #[test]
    fn test_slow_intersection_splits() -> Result<()> {
        let waypoints = table(&["alice", "2", "bob"])?;
        let graph = build_graph(
            &[enc(0, 0, 0, 0), enc(0, 1, 3, 53), enc(0, 2, 56, 56)],
            &waypoints,
        );

        assert_eq!(
            graph.secs_between(&plain("alice"), &split("2", "alice", "2")),
            Some(&[3][..])
        );
        assert_eq!(
            graph.secs_between(&split("2", "alice", "2"), &split("2", "2", "bob")),
            Some(&[50][..])
        );
        assert_eq!(
            graph.secs_between(&split("2", "2", "bob"), &plain("bob")),
            Some(&[3][..])
        );
        // The slow intersection has no plain vertex.
        assert!(graph.plain("2").is_none());
        Ok(())
    }

    #[test]
    fn test_turnless_slow_dwell_folds_like_fast() -> Result<()> {
        let waypoints = table(&["3", "bob"])?;
        // A 40 s dwell, but the intersection opens the segment and so never
        // completes a turn.
        let graph = build_graph(&[enc(0, 0, 0, 40), enc(0, 1, 45, 45)], &waypoints);

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.secs_between(&plain("3"), &plain("bob")), Some(&[45][..]));
        Ok(())
    }

    #[test]
    fn test_transits_prefer_existing_split_halves() -> Result<()> {
        let waypoints = table(&["alice", "2", "bob", "carol"])?;
        let graph = build_graph(
            &[
                // A turn through the intersection makes it slow.
                enc(0, 0, 0, 0),
                enc(0, 1, 3, 53),
                enc(0, 2, 56, 56),
                // A later trip starts at the intersection and leaves toward
                // carol; its transit must attach to an exit half.
                enc(1, 1, 0, 2),
                enc(1, 3, 10, 10),
            ],
            &waypoints,
        );

        assert_eq!(
            graph.secs_between(&split("2", "2", "carol"), &plain("carol")),
            Some(&[8][..])
        );
        assert!(graph.plain("2").is_none());
        Ok(())
    }

    #[test]
    fn test_no_split_vertex_at_fast_intersections() -> Result<()> {
        let waypoints = table(&["alice", "1", "bob"])?;
        let graph = build_graph(
            &[enc(0, 0, 0, 0), enc(0, 1, 3, 8), enc(0, 2, 12, 12)],
            &waypoints,
        );
        assert!(
            graph
                .vertices()
                .all(|v| !matches!(v, Vertex::Split { here, .. } if here == "1"))
        );
        Ok(())
    }

    #[test]
    fn test_secs_are_sorted_on_every_edge() -> Result<()> {
        let waypoints = table(&["alice", "2", "bob"])?;
        let mut encounters = Vec::new();
        for (segment, dwell) in [(0, 60), (1, 24), (2, 48)] {
            encounters.push(enc(segment, 0, 0, 0));
            encounters.push(enc(segment, 1, 3, 3 + dwell));
            encounters.push(enc(segment, 2, 3 + dwell + 3, 3 + dwell + 3));
        }
        let graph = build_graph(&encounters, &waypoints);

        for edge in graph.graph().edge_weights() {
            assert!(edge.secs.is_sorted());
        }
        assert_eq!(
            graph.secs_between(&split("2", "alice", "2"), &split("2", "2", "bob")),
            Some(&[24, 48, 60][..])
        );
        Ok(())
    }
}
