use crate::config::EngineConfig;
use crate::constants::BASE_CURRENCY;
use crate::error::EngineError;
use crate::graph::market_graph::{ConversionEdge, MarketGraph, MarketNode};
use crate::listing::Listing;
use crate::utils::fingerprint::Fingerprint;
use std::collections::HashSet;
use tracing::debug;

/// Builds a market graph from a normalized listing batch.
///
/// For every listing two edges are created against the base currency: a buy
/// edge (`base -> item`, rate `1/price`) and a sell edge (`item -> base`,
/// rate `price * (1 - fee)`). With item-to-item conversion enabled, every
/// ordered pair of distinct items also gets a direct conversion edge priced
/// off the seller's fee-adjusted rate. Input listings are never mutated.
pub struct GraphBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Build the full graph sequentially.
    pub fn build(&self, listings: &[Listing], fingerprint: Fingerprint) -> Result<MarketGraph, EngineError> {
        let unique = dedup_listings(listings);
        if unique.is_empty() {
            return Err(EngineError::EmptyListingSet);
        }
        self.check_limits(unique.len())?;

        let market = self.build_partial(&unique, fingerprint, self.config.builder.enable_item_to_item);

        debug!(
            nodes = market.node_count(),
            edges = market.edge_count(),
            listings = unique.len(),
            "built market graph"
        );

        Ok(market)
    }

    /// Build a graph over a slice of listings: base node, buy and sell edges
    /// and (optionally) item-to-item edges within the slice. The parallel
    /// coordinator calls this per shard with `item_to_item` on and adds the
    /// cross-shard pairs itself.
    pub(crate) fn build_partial(
        &self,
        listings: &[&Listing],
        fingerprint: Fingerprint,
        item_to_item: bool,
    ) -> MarketGraph {
        let mut market = MarketGraph::new(fingerprint);
        let base = market.add_or_get_node(MarketNode::base(BASE_CURRENCY));

        let mut item_indices = Vec::with_capacity(listings.len());
        for listing in listings {
            let item = market.add_or_get_node(MarketNode::item(listing));
            let (buy, sell) = self.listing_edges(listing);
            market.add_conversion(base, item, buy);
            market.add_conversion(item, base, sell);
            item_indices.push(item);
        }

        if item_to_item && self.config.builder.enable_item_to_item {
            for (i, from_listing) in listings.iter().enumerate() {
                for (j, to_listing) in listings.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let edge = self.pair_edge(from_listing, to_listing);
                    market.add_conversion(item_indices[i], item_indices[j], edge);
                }
            }
        }

        market
    }

    /// Buy and sell edges for one listing against the base currency.
    pub(crate) fn listing_edges(&self, listing: &Listing) -> (ConversionEdge, ConversionEdge) {
        let price = listing.get_price();
        let fee = self.config.fees.category_fee(listing.get_category());
        let liquidity = listing.get_available_quantity() as f64;

        let buy = ConversionEdge::new(1.0 / price, fee, liquidity);
        let sell = ConversionEdge::new(price * (1.0 - fee), fee, liquidity);
        (buy, sell)
    }

    /// Direct conversion edge between two items: sell `from` at its
    /// fee-adjusted price, buy `to` at its asking price.
    pub(crate) fn pair_edge(&self, from: &Listing, to: &Listing) -> ConversionEdge {
        let from_fee = self.config.fees.category_fee(from.get_category());
        let rate = from.get_price() * (1.0 - from_fee) / to.get_price();
        let liquidity = from.get_available_quantity().min(to.get_available_quantity()) as f64;

        ConversionEdge::new(rate, from_fee, liquidity)
    }

    /// Reject batches whose graph would blow the configured safety limits.
    /// Edge counts are predicted up front so the O(n²) pairwise pass never
    /// starts on an oversized batch.
    pub(crate) fn check_limits(&self, listing_count: usize) -> Result<(), EngineError> {
        let nodes = listing_count + 1;
        let mut edges = listing_count * 2;
        if self.config.builder.enable_item_to_item {
            edges += listing_count * listing_count.saturating_sub(1);
        }

        let limits = &self.config.limits;
        if nodes > limits.max_nodes || edges > limits.max_edges {
            return Err(EngineError::GraphTooLarge {
                nodes,
                edges,
                max_nodes: limits.max_nodes,
                max_edges: limits.max_edges,
            });
        }
        Ok(())
    }
}

/// Drop listings that re-declare an `(item_id, source_id)` already seen in
/// the batch; the first occurrence wins. Preserves input order so node
/// insertion order, and with it detection order, stays reproducible.
pub(crate) fn dedup_listings(listings: &[Listing]) -> Vec<&Listing> {
    let mut seen = HashSet::with_capacity(listings.len());
    let mut unique = Vec::with_capacity(listings.len());

    for listing in listings {
        if seen.insert(listing.get_node_key()) {
            unique.push(listing);
        } else {
            debug!(
                item_id = listing.get_item_id(),
                source_id = listing.get_source_id(),
                "skipping duplicate listing for node"
            );
        }
    }
    unique
}
