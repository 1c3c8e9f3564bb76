use crate::listing::{Listing, now_unix_secs};
use crate::utils::fingerprint::Fingerprint;
use ahash::RandomState;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

pub type FastHasher = RandomState;
/// FastHashMap using ahash
pub type FastHashMap<K, V> = HashMap<K, V, FastHasher>;

/// Identity of a graph node. The same item listed on two sources is two
/// distinct tradable assets and therefore two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    Base,
    Item { item_id: String, source_id: String },
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::Base => write!(f, "base"),
            NodeKey::Item { item_id, source_id } => write!(f, "{item_id}@{source_id}"),
        }
    }
}

/// A vertex of the market graph: the base currency or one tradable item
/// from one source, with the listing data its edges were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketNode {
    pub key: NodeKey,
    pub display_name: String,
    pub category: String,
    pub price_cents: u64,
    pub quantity: u32,
}

impl MarketNode {
    pub fn base(currency: &str) -> Self {
        Self {
            key: NodeKey::Base,
            display_name: currency.to_string(),
            category: String::new(),
            price_cents: 0,
            quantity: 0,
        }
    }

    pub fn item(listing: &Listing) -> Self {
        let (item_id, source_id) = listing.get_node_key();
        Self {
            key: NodeKey::Item { item_id, source_id },
            display_name: listing.get_display_name().to_string(),
            category: listing.get_category().to_string(),
            price_cents: listing.get_price_cents(),
            quantity: listing.get_available_quantity(),
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self.key, NodeKey::Base)
    }
}

impl Display for MarketNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// A directed conversion between two nodes.
///
/// `weight` is the negative log of the fee-adjusted rate, precomputed at
/// construction so the detector sums plain f64s. A cycle is profitable iff
/// its weights sum below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionEdge {
    /// Units of `to` received per unit of `from`, before the fee.
    pub rate: f64,
    /// Fee fraction in [0, 1) charged on this conversion.
    pub fee: f64,
    /// Tradable depth proxy; a cycle is only as liquid as its thinnest edge.
    pub liquidity: f64,
    pub weight: f64,
}

impl ConversionEdge {
    pub fn new(rate: f64, fee: f64, liquidity: f64) -> Self {
        let weight = -(rate * (1.0 - fee)).ln();
        Self { rate, fee, liquidity, weight }
    }

    pub fn effective_rate(&self) -> f64 {
        self.rate * (1.0 - self.fee)
    }
}

/// Arena-owned snapshot of one construction pass.
///
/// Nodes and edges are rebuilt wholesale on every construction; indices are
/// only meaningful against the graph that produced them and never survive a
/// rebuild. Iteration order is insertion order, which keeps detection
/// deterministic for a given listing batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct MarketGraph {
    pub graph: DiGraph<MarketNode, ConversionEdge>,
    // node key -> node index, rebuilt from the arena on deserialization
    pub node_index: FastHashMap<NodeKey, NodeIndex>,
    pub fingerprint: Fingerprint,
    pub built_at: u64,
}

/// Wire form of a graph: the index map is derived data, so only the arena
/// travels and the map is rebuilt on the way in.
#[derive(Clone, Serialize, Deserialize)]
struct GraphSnapshot {
    graph: DiGraph<MarketNode, ConversionEdge>,
    fingerprint: Fingerprint,
    built_at: u64,
}

impl From<GraphSnapshot> for MarketGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut node_index = FastHashMap::default();
        for idx in snapshot.graph.node_indices() {
            node_index.insert(snapshot.graph[idx].key.clone(), idx);
        }
        Self {
            graph: snapshot.graph,
            node_index,
            fingerprint: snapshot.fingerprint,
            built_at: snapshot.built_at,
        }
    }
}

impl From<MarketGraph> for GraphSnapshot {
    fn from(market: MarketGraph) -> Self {
        Self { graph: market.graph, fingerprint: market.fingerprint, built_at: market.built_at }
    }
}

impl MarketGraph {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            graph: DiGraph::default(),
            node_index: FastHashMap::default(),
            fingerprint,
            built_at: now_unix_secs(),
        }
    }

    /// Add a node, or return the index of the node already registered under
    /// the same key.
    pub fn add_or_get_node(&mut self, node: MarketNode) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(&node.key) {
            return idx;
        }
        let key = node.key.clone();
        let idx = self.graph.add_node(node);
        self.node_index.insert(key, idx);
        idx
    }

    pub fn get_node_index(&self, key: &NodeKey) -> Option<NodeIndex> {
        self.node_index.get(key).copied()
    }

    pub fn get_node(&self, idx: NodeIndex) -> Option<&MarketNode> {
        self.graph.node_weight(idx)
    }

    pub fn base_index(&self) -> Option<NodeIndex> {
        self.get_node_index(&NodeKey::Base)
    }

    pub fn add_conversion(&mut self, from: NodeIndex, to: NodeIndex, edge: ConversionEdge) -> EdgeIndex {
        self.graph.add_edge(from, to, edge)
    }

    pub fn edge_between(&self, from: NodeIndex, to: NodeIndex) -> Option<&ConversionEdge> {
        self.graph.find_edge(from, to).and_then(|e| self.graph.edge_weight(e))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Flatten edges into a `(from_key, to_key) -> weight` map. Used to
    /// compare graphs structurally regardless of edge insertion order.
    pub fn edge_weight_map(&self) -> FastHashMap<(NodeKey, NodeKey), f64> {
        let mut map = FastHashMap::default();
        for edge in self.graph.edge_indices() {
            let (from, to) = self.graph.edge_endpoints(edge).expect("edge endpoints");
            let from_key = self.graph[from].key.clone();
            let to_key = self.graph[to].key.clone();
            map.insert((from_key, to_key), self.graph[edge].weight);
        }
        map
    }

    /// Structural equality: same node keys and same edge weights within
    /// `tolerance`, regardless of index assignment or edge order.
    pub fn is_equivalent_to(&self, other: &MarketGraph, tolerance: f64) -> bool {
        if self.node_count() != other.node_count() || self.edge_count() != other.edge_count() {
            return false;
        }
        if self.node_index.keys().any(|k| !other.node_index.contains_key(k)) {
            return false;
        }

        let ours = self.edge_weight_map();
        let theirs = other.edge_weight_map();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter().all(|(pair, weight)| {
            theirs.get(pair).is_some_and(|w| (w - weight).abs() <= tolerance)
        })
    }
}
