use crate::config::LimitConfig;
use crate::constants::RELAXATION_EPSILON;
use crate::graph::market_graph::{FastHashMap, MarketGraph};
use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A closed walk through the market graph whose log-space weights sum below
/// zero, i.e. a profitable round trip in rate space.
///
/// Holds indices into the graph it was computed against, never references;
/// a cycle must not outlive its graph snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    /// Node sequence with the starting node repeated at the end.
    pub nodes: Vec<NodeIndex>,
    /// Sum of edge weights along the cycle; negative for profitable cycles.
    pub total_weight: f64,
}

impl Cycle {
    pub fn hops(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

/// Bellman-Ford negative-cycle detector over one immutable graph snapshot.
///
/// Edge weights are already in log space (`-ln(rate * (1 - fee))`), so a
/// profitable conversion loop is exactly a negative-weight cycle. Distances
/// start at zero for every node, the classic virtual-source trick, so the
/// detector sees the whole graph regardless of connectivity. Relaxation
/// deltas are compared with an epsilon so floating-point noise around the
/// break-even point never turns into a reported cycle.
pub struct CycleDetector {
    max_cycle_hops: usize,
}

impl CycleDetector {
    pub fn new(limits: &LimitConfig) -> Self {
        Self { max_cycle_hops: limits.max_cycle_hops }
    }

    /// All distinct negative cycles of at most `max_cycle_hops` hops.
    ///
    /// Deterministic for a given graph: edges relax in insertion order,
    /// which the builder fixes from listing order.
    pub fn find_negative_cycles(&self, market: &MarketGraph) -> Vec<Cycle> {
        let n = market.node_count();
        if n == 0 {
            return Vec::new();
        }

        // Flat edge list in insertion order; iterating the arena once beats
        // chasing adjacency lists for the dense pairwise graphs we build.
        let edges: Vec<(usize, usize, f64)> = market
            .graph
            .edge_indices()
            .map(|e| {
                let (u, v) = market.graph.edge_endpoints(e).expect("edge endpoints");
                (u.index(), v.index(), market.graph[e].weight)
            })
            .collect();

        let mut dist = vec![0.0f64; n];
        let mut pred: Vec<Option<usize>> = vec![None; n];

        // |V| - 1 relaxation rounds, stopping early once a round changes
        // nothing.
        for round in 0..n.saturating_sub(1) {
            let mut relaxed = false;
            for &(u, v, w) in &edges {
                if dist[u] + w < dist[v] - RELAXATION_EPSILON {
                    dist[v] = dist[u] + w;
                    pred[v] = Some(u);
                    relaxed = true;
                }
            }
            if !relaxed {
                debug!("relaxation converged after {} of {} rounds", round + 1, n - 1);
                break;
            }
        }

        // One more round: any edge that still relaxes ends in a node that
        // sits on, or is reachable from, a negative cycle.
        let mut flagged = Vec::new();
        for &(u, v, w) in &edges {
            if dist[u] + w < dist[v] - RELAXATION_EPSILON {
                flagged.push(v);
            }
        }

        if flagged.is_empty() {
            return Vec::new();
        }

        // Minimum weight per node pair, for summing cycle weights. Parallel
        // edges cannot come out of the builder, but relaxation would pick
        // the cheaper one anyway.
        let mut weight_of: FastHashMap<(usize, usize), f64> = FastHashMap::default();
        for &(u, v, w) in &edges {
            weight_of
                .entry((u, v))
                .and_modify(|existing| *existing = existing.min(w))
                .or_insert(w);
        }

        let mut seen_canonical: HashSet<Vec<usize>> = HashSet::new();
        let mut cycles = Vec::new();

        for start in flagged {
            let Some(nodes) = extract_cycle(start, &pred, n) else {
                continue;
            };

            let hops = nodes.len() - 1;
            if hops < 2 {
                continue;
            }
            if hops > self.max_cycle_hops {
                debug!(hops, max = self.max_cycle_hops, "discarding over-long cycle");
                continue;
            }

            if !seen_canonical.insert(canonical_rotation(&nodes[..nodes.len() - 1])) {
                continue;
            }

            let Some(total_weight) = cycle_weight(&nodes, &weight_of) else {
                warn!(?nodes, "predecessor walk produced a cycle with a missing edge");
                continue;
            };
            if total_weight >= -RELAXATION_EPSILON {
                // Numerically break-even; not a real opportunity.
                continue;
            }

            cycles.push(Cycle {
                nodes: nodes.into_iter().map(NodeIndex::new).collect(),
                total_weight,
            });
        }

        debug!("detected {} negative cycle(s) over {} nodes / {} edges", cycles.len(), n, edges.len());
        cycles
    }
}

/// Walk predecessor pointers from a flagged node until a node repeats, then
/// return the cyclic suffix in forward (edge) direction, closed with its
/// first node. The initial `n` predecessor steps guarantee the walk starts
/// inside the cycle rather than on a tail that merely reaches it.
fn extract_cycle(start: usize, pred: &[Option<usize>], n: usize) -> Option<Vec<usize>> {
    let mut inside = start;
    for _ in 0..n {
        inside = pred[inside]?;
    }

    let mut position: FastHashMap<usize, usize> = FastHashMap::default();
    let mut walk = Vec::new();
    let mut current = inside;

    loop {
        if let Some(&pos) = position.get(&current) {
            // walk[pos..] is the cycle in predecessor (reverse) order.
            let mut nodes: Vec<usize> = walk[pos..].to_vec();
            nodes.reverse();
            let first = nodes[0];
            nodes.push(first);
            return Some(nodes);
        }
        position.insert(current, walk.len());
        walk.push(current);
        current = pred[current]?;
    }
}

/// Rotation-independent signature of an open cycle (closing node stripped),
/// used to report each distinct cycle once no matter which of its nodes the
/// extra relaxation round flagged.
fn canonical_rotation(open_cycle: &[usize]) -> Vec<usize> {
    let pivot = open_cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, node)| **node)
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut rotated = Vec::with_capacity(open_cycle.len());
    rotated.extend_from_slice(&open_cycle[pivot..]);
    rotated.extend_from_slice(&open_cycle[..pivot]);
    rotated
}

fn cycle_weight(nodes: &[usize], weight_of: &FastHashMap<(usize, usize), f64>) -> Option<f64> {
    let mut total = 0.0;
    for pair in nodes.windows(2) {
        total += weight_of.get(&(pair[0], pair[1]))?;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::market_graph::{ConversionEdge, MarketNode, NodeKey};
    use crate::listing::Listing;
    use crate::utils::fingerprint::fingerprint_parts;

    fn empty_graph() -> MarketGraph {
        MarketGraph::new(fingerprint_parts(["detector-test"]))
    }

    fn item_node(id: &str) -> MarketNode {
        MarketNode::item(&Listing::new(id, id, "rifle", 1000, 5, "dmarket"))
    }

    /// base -> a -> b -> base with the given effective rates and zero fees.
    fn triangle(rate_base_a: f64, rate_a_b: f64, rate_b_base: f64) -> MarketGraph {
        let mut market = empty_graph();
        let base = market.add_or_get_node(MarketNode::base("USD"));
        let a = market.add_or_get_node(item_node("a"));
        let b = market.add_or_get_node(item_node("b"));

        market.add_conversion(base, a, ConversionEdge::new(rate_base_a, 0.0, 10.0));
        market.add_conversion(a, b, ConversionEdge::new(rate_a_b, 0.0, 10.0));
        market.add_conversion(b, base, ConversionEdge::new(rate_b_base, 0.0, 10.0));
        market
    }

    fn detector() -> CycleDetector {
        CycleDetector::new(&EngineConfig::default().limits)
    }

    #[test]
    fn test_profitable_triangle_is_found_exactly_once() {
        // 0.1 * 1.2 * 8.75 = 1.05: a 5% round trip
        let market = triangle(0.1, 1.2, 8.75);

        let cycles = detector().find_negative_cycles(&market);

        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.hops(), 3);
        assert_eq!(cycle.nodes.first(), cycle.nodes.last());
        assert!((cycle.total_weight - (-(1.05f64).ln())).abs() < 1e-9);

        let keys: Vec<&NodeKey> =
            cycle.nodes.iter().map(|&idx| &market.get_node(idx).unwrap().key).collect();
        assert!(keys.contains(&&NodeKey::Base));
    }

    #[test]
    fn test_no_false_positives_on_a_lossy_triangle() {
        // 0.1 * 1.2 * 8.0 = 0.96: every loop loses money
        let market = triangle(0.1, 1.2, 8.0);

        assert!(detector().find_negative_cycles(&market).is_empty());
    }

    #[test]
    fn test_break_even_cycle_is_never_reported() {
        // 0.1 * 1.25 * 8.0 = 1.0 exactly: floating-point noise around zero
        // must stay below the epsilon.
        let market = triangle(0.1, 1.25, 8.0);

        assert!(detector().find_negative_cycles(&market).is_empty());
    }

    #[test]
    fn test_listing_built_graphs_have_no_negative_cycles() -> eyre::Result<()> {
        // Fees make every consistent-priced loop lose; the detector must
        // come back empty on a full pairwise graph.
        let config = EngineConfig::default();
        let listings: Vec<Listing> = (0..15)
            .map(|i| Listing::new(format!("item{i}"), format!("Item {i}"), "rifle", 700 + i * 53, 4, "dmarket"))
            .collect();
        let market = GraphBuilder::new(&config).build(&listings, fingerprint_parts(["lossy"]))?;

        assert!(detector().find_negative_cycles(&market).is_empty());
        Ok(())
    }

    #[test]
    fn test_over_long_cycles_are_discarded() {
        // base -> a -> b -> c -> d -> base, profitable but 5 hops
        let mut market = empty_graph();
        let base = market.add_or_get_node(MarketNode::base("USD"));
        let items: Vec<_> =
            ["a", "b", "c", "d"].iter().map(|id| market.add_or_get_node(item_node(id))).collect();

        market.add_conversion(base, items[0], ConversionEdge::new(0.1, 0.0, 10.0));
        market.add_conversion(items[0], items[1], ConversionEdge::new(1.1, 0.0, 10.0));
        market.add_conversion(items[1], items[2], ConversionEdge::new(1.1, 0.0, 10.0));
        market.add_conversion(items[2], items[3], ConversionEdge::new(1.1, 0.0, 10.0));
        market.add_conversion(items[3], base, ConversionEdge::new(9.0, 0.0, 10.0));

        let mut limits = EngineConfig::default().limits;
        limits.max_cycle_hops = 4;
        assert!(CycleDetector::new(&limits).find_negative_cycles(&market).is_empty());

        limits.max_cycle_hops = 5;
        let cycles = CycleDetector::new(&limits).find_negative_cycles(&market);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].hops(), 5);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let market = triangle(0.1, 1.2, 8.75);
        let detector = detector();

        let first = detector.find_negative_cycles(&market);
        let second = detector.find_negative_cycles(&market);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_graph_yields_no_cycles() {
        assert!(detector().find_negative_cycles(&empty_graph()).is_empty());
    }
}
