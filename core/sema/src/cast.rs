//! Cast Resolution
//!
//! Conversions are directed, weighted edges ([`CastDescriptor`]) registered
//! against their destination type. Resolving a cast finds the unique
//! minimum-weight chain of edges from the source type to the destination and
//! pushes the source value range through every edge on it.
//!
//! The search runs backwards from the destination, since the graph is indexed
//! by destination: a Dijkstra expansion over "all edges pointing to T" that
//! counts the number of minimum-weight paths reaching each node. More than one
//! minimum path to the source is an ambiguity error. A single registered edge
//! between source and destination short-circuits the search.
//!
//! Weights double as the overload-resolution currency, so the caller passes
//! the budget left for the enclosing expression and exceeding it is an error
//! rather than a silent truncation.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::{self, Display, Formatter};

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::errors::{CastError, ice};
use crate::static_type::StaticType;
use crate::value_range::ValueRange;

/// Non-negative cost of a conversion or literal typing. Lower wins.
pub type Weight = u32;

pub const NO_WEIGHT_LIMIT: Weight = Weight::MAX;

/// Whether an edge may be taken without explicit cast syntax.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ImplicitCastAllowed {
    Always,
    /// Implicit only when the source range provably fits the destination.
    WhenRangeFits,
    /// Explicit casts only.
    Never,
}

/// The operation a backend emits for one edge.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CastOp {
    NoOp,
    Dereference,
    Truncate,
    ChangeSign,
    ExpandSigned,
    ExpandUnsigned,
}

/// `(source, destination, input range, implicit)`. `None` rejects the
/// conversion as range-unsafe.
pub type RangeTransform = fn(&StaticType, &StaticType, &ValueRange, bool) -> Option<ValueRange>;

#[derive(Clone, Debug)]
pub struct CastDescriptor {
    pub source: StaticType,
    pub destination: StaticType,
    pub weight: Weight,
    pub implicit: ImplicitCastAllowed,
    pub op: CastOp,
    pub range_transform: RangeTransform,
}

impl CastDescriptor {
    #[must_use]
    pub fn new(
        source: StaticType,
        destination: StaticType,
        weight: Weight,
        implicit: ImplicitCastAllowed,
        op: CastOp,
        range_transform: RangeTransform,
    ) -> Self {
        Self {
            source,
            destination,
            weight,
            implicit,
            op,
            range_transform,
        }
    }

    fn usable(&self, implicit: bool) -> bool {
        !implicit || self.implicit != ImplicitCastAllowed::Never
    }
}

impl Display for CastDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.source, self.destination, self.weight)
    }
}

/// Range transform that passes the input through unchanged.
#[must_use]
pub fn identity_range(
    _source: &StaticType,
    _destination: &StaticType,
    range: &ValueRange,
    _implicit: bool,
) -> Option<ValueRange> {
    Some(*range)
}

/// Range transform for integer-to-integer conversions: the input is
/// re-expressed in the destination representation, wrapping where the
/// conversion truncates or changes sign.
#[must_use]
pub fn integer_range(
    _source: &StaticType,
    destination: &StaticType,
    range: &ValueRange,
    _implicit: bool,
) -> Option<ValueRange> {
    destination.as_scalar().map(|scalar| range.convert(scalar))
}

/// Anything that can list the conversions ending at a type.
pub trait CastGraph {
    fn casts_to(&self, destination: &StaticType) -> Vec<CastDescriptor>;
}

#[derive(Clone, Debug)]
pub struct CastStep {
    pub descriptor: CastDescriptor,
    /// Range of the value after this step.
    pub range: Option<ValueRange>,
}

/// Resolved conversion, ordered from source to destination. Empty when the
/// types were already equal.
#[derive(Clone, Debug)]
pub struct CastChain {
    pub steps: Vec<CastStep>,
    pub weight: Weight,
    pub range: Option<ValueRange>,
}

impl CastChain {
    fn identity(range: Option<ValueRange>) -> Self {
        Self {
            steps: Vec::new(),
            weight: 0,
            range,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A conversion request. `weight_limit` is what is left of the enclosing
/// expression's budget.
#[derive(Clone, Debug)]
pub struct CastQuery<'a> {
    pub source: &'a StaticType,
    pub source_range: Option<ValueRange>,
    pub destination: &'a StaticType,
    pub implicit: bool,
    pub weight_limit: Weight,
}

/// Finds the cheapest unambiguous conversion chain and applies its range
/// transforms in order.
///
/// # Errors
///
/// - [`CastError::NoPath`] when the destination is unreachable;
/// - [`CastError::Ambiguous`] when several chains share the minimum weight;
/// - [`CastError::TooExpensive`] when the chain exceeds `weight_limit`;
/// - [`CastError::RangeUnsafe`] when a transform on the chosen chain rejects
///   the range. The search does not fall back to a costlier chain.
pub fn resolve_cast(graph: &dyn CastGraph, query: &CastQuery<'_>) -> Result<CastChain, CastError> {
    if query.source == query.destination {
        return Ok(CastChain::identity(query.source_range));
    }
    let path = match direct_edge(graph, query)? {
        Some(edge) => {
            debug!(edge = %edge, "direct cast");
            vec![edge]
        }
        None => shortest_path(graph, query)?,
    };
    let weight = path
        .iter()
        .fold(0, |total: Weight, edge| total.saturating_add(edge.weight));
    if weight > query.weight_limit {
        return Err(CastError::TooExpensive {
            weight,
            limit: query.weight_limit,
        });
    }
    apply_ranges(path, weight, query)
}

fn direct_edge(
    graph: &dyn CastGraph,
    query: &CastQuery<'_>,
) -> Result<Option<CastDescriptor>, CastError> {
    let mut direct: Vec<CastDescriptor> = graph
        .casts_to(query.destination)
        .into_iter()
        .filter(|edge| edge.usable(query.implicit) && edge.source == *query.source)
        .collect();
    let Some(cheapest) = direct.iter().map(|edge| edge.weight).min() else {
        return Ok(None);
    };
    direct.retain(|edge| edge.weight == cheapest);
    if direct.len() > 1 {
        return Err(CastError::Ambiguous {
            from: query.source.clone(),
            to: query.destination.clone(),
            paths: u32::try_from(direct.len()).unwrap_or(u32::MAX),
        });
    }
    Ok(direct.pop())
}

/// Per-node search state. Node 0 is the destination.
struct Node {
    ty: StaticType,
    distance: Weight,
    expanded: bool,
}

/// An edge seen during the search, between node indices.
struct Edge {
    from: usize,
    to: usize,
    descriptor: CastDescriptor,
}

#[derive(Clone, Copy)]
enum PathCount {
    Unvisited,
    InProgress,
    Done(u32),
}

fn shortest_path(
    graph: &dyn CastGraph,
    query: &CastQuery<'_>,
) -> Result<Vec<CastDescriptor>, CastError> {
    let mut nodes = vec![Node {
        ty: query.destination.clone(),
        distance: 0,
        expanded: false,
    }];
    let mut index: FxHashMap<StaticType, usize> = FxHashMap::default();
    index.insert(query.destination.clone(), 0);
    let mut edges: Vec<Edge> = Vec::new();
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse((0, 0_usize)));
    let mut source = None;

    // Distances only. Every node at or below the source's distance is
    // expanded, so every edge of a minimum path gets recorded.
    while let Some(Reverse((distance, current))) = frontier.pop() {
        if nodes[current].expanded || distance > nodes[current].distance {
            continue;
        }
        if let Some(found) = source {
            let found: &Node = &nodes[found];
            if distance > found.distance {
                break;
            }
        }
        nodes[current].expanded = true;
        if nodes[current].ty == *query.source {
            source = Some(current);
            continue;
        }
        let ty = nodes[current].ty.clone();
        for descriptor in graph.casts_to(&ty) {
            if !descriptor.usable(query.implicit) {
                continue;
            }
            let candidate = distance.saturating_add(descriptor.weight);
            let neighbour = match index.get(&descriptor.source) {
                Some(&i) => i,
                None => {
                    nodes.push(Node {
                        ty: descriptor.source.clone(),
                        distance: Weight::MAX,
                        expanded: false,
                    });
                    index.insert(descriptor.source.clone(), nodes.len() - 1);
                    nodes.len() - 1
                }
            };
            if candidate < nodes[neighbour].distance {
                nodes[neighbour].distance = candidate;
                frontier.push(Reverse((candidate, neighbour)));
            }
            edges.push(Edge {
                from: neighbour,
                to: current,
                descriptor,
            });
        }
    }

    let Some(source) = source else {
        return Err(CastError::NoPath {
            from: query.source.clone(),
            to: query.destination.clone(),
        });
    };

    // Edges that lie on some minimum path, grouped by the node they leave.
    let mut tight: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, edge) in edges.iter().enumerate() {
        let through = nodes[edge.to]
            .distance
            .saturating_add(edge.descriptor.weight);
        if nodes[edge.from].distance == through {
            tight[edge.from].push(i);
        }
    }
    let mut counts = vec![PathCount::Unvisited; nodes.len()];
    let paths = count_paths(source, &tight, &edges, &mut counts);
    if paths > 1 {
        debug!(
            from = %query.source,
            to = %query.destination,
            paths,
            "ambiguous cast"
        );
        return Err(CastError::Ambiguous {
            from: query.source.clone(),
            to: query.destination.clone(),
            paths,
        });
    }

    // The path is unique: follow the one tight edge that still reaches the
    // destination from each node.
    let mut path = Vec::new();
    let mut at = source;
    while at != 0 {
        let next = tight[at]
            .iter()
            .map(|&i| &edges[i])
            .find(|edge| matches!(counts[edge.to], PathCount::Done(n) if n > 0));
        let Some(edge) = next.filter(|_| path.len() < nodes.len()) else {
            ice!(
                "cast path from `{}` stops short of `{}`",
                query.source,
                query.destination
            );
        };
        path.push(edge.descriptor.clone());
        at = edge.to;
    }
    debug!(
        from = %query.source,
        to = %query.destination,
        steps = path.len(),
        weight = nodes[source].distance,
        "cast path found"
    );
    Ok(path)
}

/// Number of minimum-weight paths from `node` to the destination. A cycle of
/// zero-weight edges makes the count unbounded.
fn count_paths(node: usize, tight: &[Vec<usize>], edges: &[Edge], counts: &mut [PathCount]) -> u32 {
    if node == 0 {
        counts[node] = PathCount::Done(1);
        return 1;
    }
    match counts[node] {
        PathCount::Done(n) => return n,
        PathCount::InProgress => return u32::MAX,
        PathCount::Unvisited => {}
    }
    counts[node] = PathCount::InProgress;
    let mut total: u32 = 0;
    for &i in &tight[node] {
        total = total.saturating_add(count_paths(edges[i].to, tight, edges, counts));
    }
    counts[node] = PathCount::Done(total);
    total
}

fn apply_ranges(
    path: Vec<CastDescriptor>,
    weight: Weight,
    query: &CastQuery<'_>,
) -> Result<CastChain, CastError> {
    let mut range = query.source_range;
    let mut steps = Vec::with_capacity(path.len());
    for descriptor in path {
        if query.implicit && descriptor.implicit == ImplicitCastAllowed::WhenRangeFits {
            let fits = match (range, descriptor.destination.as_scalar()) {
                (Some(r), Some(scalar)) => r.fits_in(scalar),
                _ => false,
            };
            if !fits {
                warn!(edge = %descriptor, "implicit cast rejected, range does not fit");
                return Err(range_unsafe(query, range));
            }
        }
        range = match range {
            Some(input) => {
                let output = (descriptor.range_transform)(
                    &descriptor.source,
                    &descriptor.destination,
                    &input,
                    query.implicit,
                );
                if output.is_none() {
                    warn!(edge = %descriptor, range = %input, "range transform rejected cast");
                    return Err(range_unsafe(query, Some(input)));
                }
                trace!(edge = %descriptor, from = %input, to = ?output, "cast range");
                output
            }
            None => ValueRange::full(&descriptor.destination),
        };
        steps.push(CastStep { descriptor, range });
    }
    Ok(CastChain {
        steps,
        weight,
        range,
    })
}

fn range_unsafe(query: &CastQuery<'_>, range: Option<ValueRange>) -> CastError {
    CastError::RangeUnsafe {
        from: query.source.clone(),
        to: query.destination.clone(),
        range,
    }
}
