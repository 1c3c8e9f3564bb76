use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::builder::{GraphBuilder, dedup_listings};
use crate::graph::market_graph::{MarketGraph, MarketNode};
use crate::constants::BASE_CURRENCY;
use crate::listing::Listing;
use crate::utils::fingerprint::Fingerprint;
use rayon::prelude::*;
use tracing::debug;

/// Fan-out/fan-in coordinator for the O(n²) graph build.
///
/// The listing batch is split into contiguous shards; each shard builds an
/// independent partial graph (its base/item edges plus item-to-item edges
/// within the shard) on the rayon pool. Merging happens strictly after all
/// shards complete, so no reader ever observes a partially built graph. The
/// item-to-item edges that cross shard boundaries are the only work needing
/// the full node set and run single-threaded after the merge.
pub struct ParallelGraphBuilder<'a> {
    inner: GraphBuilder<'a>,
    config: &'a EngineConfig,
}

impl<'a> ParallelGraphBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { inner: GraphBuilder::new(config), config }
    }

    /// Build the same graph `GraphBuilder::build` would, using `shard_count`
    /// concurrent partial builds. Node sets and edge weights are identical
    /// to the sequential build for any shard count ≥ 1; only edge insertion
    /// order differs.
    pub fn build_parallel(
        &self,
        listings: &[Listing],
        fingerprint: Fingerprint,
        shard_count: usize,
    ) -> Result<MarketGraph, EngineError> {
        let unique = dedup_listings(listings);
        if unique.is_empty() {
            return Err(EngineError::EmptyListingSet);
        }
        self.inner.check_limits(unique.len())?;

        let shard_count = shard_count.clamp(1, unique.len());
        let chunk_size = unique.len().div_ceil(shard_count);
        let shards: Vec<&[&Listing]> = unique.chunks(chunk_size).collect();

        // Fan-out: every shard builds its partial graph in isolation.
        let partials: Vec<MarketGraph> = shards
            .par_iter()
            .map(|shard| self.inner.build_partial(shard, fingerprint, true))
            .collect();

        // Fan-in: disjoint union of nodes (shards never re-declare a node),
        // append of edges. Shard order preserves the sequential node order.
        let mut merged = MarketGraph::new(fingerprint);
        merged.add_or_get_node(MarketNode::base(BASE_CURRENCY));

        for partial in &partials {
            for node_idx in partial.graph.node_indices() {
                let node = &partial.graph[node_idx];
                if node.is_base() {
                    continue;
                }
                merged.add_or_get_node(node.clone());
            }
        }

        for partial in &partials {
            for edge_idx in partial.graph.edge_indices() {
                let (from, to) = partial.graph.edge_endpoints(edge_idx).expect("edge endpoints");
                let from_idx = merged
                    .get_node_index(&partial.graph[from].key)
                    .expect("merged node for shard edge");
                let to_idx = merged
                    .get_node_index(&partial.graph[to].key)
                    .expect("merged node for shard edge");
                merged.add_conversion(from_idx, to_idx, partial.graph[edge_idx].clone());
            }
        }

        // Cross-shard pass, single-threaded over the merged node map.
        if self.config.builder.enable_item_to_item {
            self.add_cross_shard_edges(&mut merged, &shards);
        }

        debug!(
            shards = shards.len(),
            nodes = merged.node_count(),
            edges = merged.edge_count(),
            "merged parallel market graph"
        );

        Ok(merged)
    }

    fn add_cross_shard_edges(&self, merged: &mut MarketGraph, shards: &[&[&Listing]]) {
        for (i, shard_a) in shards.iter().enumerate() {
            for (j, shard_b) in shards.iter().enumerate() {
                if i == j {
                    continue;
                }
                for from in shard_a.iter() {
                    let from_idx = merged
                        .get_node_index(&MarketNode::item(from).key)
                        .expect("merged node for cross-shard edge");
                    for to in shard_b.iter() {
                        let to_idx = merged
                            .get_node_index(&MarketNode::item(to).key)
                            .expect("merged node for cross-shard edge");
                        merged.add_conversion(from_idx, to_idx, self.inner.pair_edge(from, to));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::fingerprint::fingerprint_parts;

    fn listing(id: &str, price_cents: u64, quantity: u32) -> Listing {
        Listing::new(id, id, "rifle", price_cents, quantity, "dmarket")
    }

    fn batch(n: usize) -> Vec<Listing> {
        (0..n).map(|i| listing(&format!("item{i}"), 500 + (i as u64) * 131, 1 + (i % 9) as u32)).collect()
    }

    fn test_fingerprint() -> Fingerprint {
        fingerprint_parts(["parallel-test"])
    }

    #[test]
    fn test_parallel_matches_sequential_for_all_shard_counts() -> eyre::Result<()> {
        let config = EngineConfig::default();
        let sequential = GraphBuilder::new(&config).build(&batch(23), test_fingerprint())?;
        let parallel_builder = ParallelGraphBuilder::new(&config);

        for shard_count in [1, 2, 3, 7, 23, 64] {
            let parallel = parallel_builder.build_parallel(&batch(23), test_fingerprint(), shard_count)?;
            assert!(
                parallel.is_equivalent_to(&sequential, 1e-12),
                "shard_count {shard_count} diverged from the sequential build"
            );
        }
        Ok(())
    }

    #[test]
    fn test_parallel_without_item_to_item() -> eyre::Result<()> {
        let mut config = EngineConfig::default();
        config.builder.enable_item_to_item = false;

        let sequential = GraphBuilder::new(&config).build(&batch(11), test_fingerprint())?;
        let parallel = ParallelGraphBuilder::new(&config).build_parallel(&batch(11), test_fingerprint(), 4)?;

        assert_eq!(parallel.edge_count(), 22);
        assert!(parallel.is_equivalent_to(&sequential, 1e-12));
        Ok(())
    }

    #[test]
    fn test_parallel_empty_batch_is_an_error() {
        let config = EngineConfig::default();
        let result = ParallelGraphBuilder::new(&config).build_parallel(&[], test_fingerprint(), 4);

        assert!(matches!(result, Err(EngineError::EmptyListingSet)));
    }

    #[test]
    fn test_parallel_node_order_matches_sequential() -> eyre::Result<()> {
        let config = EngineConfig::default();
        let sequential = GraphBuilder::new(&config).build(&batch(10), test_fingerprint())?;
        let parallel = ParallelGraphBuilder::new(&config).build_parallel(&batch(10), test_fingerprint(), 3)?;

        let sequential_order: Vec<_> =
            sequential.graph.node_indices().map(|i| sequential.graph[i].key.clone()).collect();
        let parallel_order: Vec<_> =
            parallel.graph.node_indices().map(|i| parallel.graph[i].key.clone()).collect();

        assert_eq!(sequential_order, parallel_order);
        Ok(())
    }
}
