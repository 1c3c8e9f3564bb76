/// Market graph construction.
///
/// Listings become an arena-indexed directed graph: one node per tradable
/// asset (plus the base currency), one edge per possible conversion. Graphs
/// are immutable snapshots; every detection request builds (or reuses from
/// cache) a fresh one, never patches an old one in place.
pub mod builder;
pub mod market_graph;
pub mod parallel;

pub use builder::GraphBuilder;
pub use market_graph::{ConversionEdge, FastHashMap, MarketGraph, MarketNode, NodeKey};
pub use parallel::ParallelGraphBuilder;
