use crate::error::EngineError;
use crate::graph::market_graph::MarketGraph;
use crate::listing::now_unix_secs;
use crate::logic::detector::Cycle;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Seconds budgeted per marketplace transaction when estimating execution
/// time.
const BASE_SECS_PER_HOP: f64 = 30.0;

/// One conversion step of an opportunity, readable by humans and machines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopDetail {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub fee: f64,
    pub effective_rate: f64,
    pub liquidity: f64,
}

/// A fully described arbitrage opportunity, safe to serialize and hand to a
/// presentation or execution layer. Built once from a cycle plus the graph
/// that produced it; immutable afterwards except for the scoring fields the
/// scorer fills in (`risk_score`, `recommended_volume`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Display names along the cycle, first == last.
    pub path: Vec<String>,
    /// Categories of the item nodes on the path (base currency excluded);
    /// input to the category risk factor.
    pub path_categories: Vec<String>,
    pub hops: Vec<HopDetail>,
    /// Multiplier on the starting budget after one full trip; > 1 by
    /// construction.
    pub profit_ratio: f64,
    /// Minimum liquidity across the cycle's edges.
    pub liquidity: f64,
    /// Sum of hop fees, for reporting.
    pub total_fee: f64,
    /// Composite risk in 0..10, set by the scorer.
    pub risk_score: f64,
    /// Units worth trading given profit, liquidity and risk; set by the
    /// scorer once the risk score is known.
    pub recommended_volume: u32,
    pub estimated_execution_secs: u64,
    pub discovered_at: u64,
}

impl Opportunity {
    /// Absolute gain per unit of budget.
    pub fn profit_margin(&self) -> f64 {
        self.profit_ratio - 1.0
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Volume heuristic: profit pushes volume up (capped at 3x), thin
    /// liquidity and high risk pull it down, and the thinnest listing on
    /// the path is a hard ceiling.
    pub fn recommended_volume_for(profit_ratio: f64, liquidity: f64, risk_score: f64) -> u32 {
        let profit_multiplier = (1.0 + (profit_ratio - 1.0) * 10.0).min(3.0);
        let liquidity_multiplier = (liquidity / 3.0).min(1.0);
        let risk_multiplier = 1.0 - (risk_score / 10.0) * 0.7;

        let volume = (profit_multiplier * liquidity_multiplier * risk_multiplier).floor() as u32;
        volume.clamp(1, (liquidity.max(1.0)) as u32)
    }
}

/// Expands raw cycles into opportunities by recovering each edge's listing
/// data from the graph.
pub struct OpportunityBuilder;

impl OpportunityBuilder {
    /// Build an opportunity from a detector cycle.
    ///
    /// The detector only emits negative-sum cycles, so `profit_ratio <= 1`
    /// here means a detector bug: it is logged with the full cycle detail
    /// and surfaced as `InvariantViolation`, never silently dropped.
    pub fn build(cycle: &Cycle, market: &MarketGraph) -> Result<Opportunity, EngineError> {
        let profit_ratio = (-cycle.total_weight).exp();
        if profit_ratio <= 1.0 {
            let detail = format!(
                "cycle with profit_ratio {profit_ratio:.9} (total_weight {:.9}) reported as profitable: {:?}",
                cycle.total_weight, cycle.nodes
            );
            error!(%detail, "opportunity invariant violated");
            return Err(EngineError::InvariantViolation(detail));
        }

        let mut path = Vec::with_capacity(cycle.nodes.len());
        let mut path_categories = Vec::new();
        let mut hops = Vec::with_capacity(cycle.hops());
        let mut min_liquidity = f64::INFINITY;
        let mut total_fee = 0.0;

        for &idx in &cycle.nodes {
            let node = market.get_node(idx).ok_or_else(|| {
                EngineError::InvariantViolation(format!("cycle node {idx:?} missing from graph"))
            })?;
            path.push(node.display_name.clone());
            if !node.is_base() && path.len() < cycle.nodes.len() {
                path_categories.push(node.category.clone());
            }
        }

        for pair in cycle.nodes.windows(2) {
            let edge = market.edge_between(pair[0], pair[1]).ok_or_else(|| {
                EngineError::InvariantViolation(format!("cycle edge {:?} -> {:?} missing from graph", pair[0], pair[1]))
            })?;
            let from = market.get_node(pair[0]).expect("cycle node").display_name.clone();
            let to = market.get_node(pair[1]).expect("cycle node").display_name.clone();

            min_liquidity = min_liquidity.min(edge.liquidity);
            total_fee += edge.fee;
            hops.push(HopDetail {
                from,
                to,
                rate: edge.rate,
                fee: edge.fee,
                effective_rate: edge.effective_rate(),
                liquidity: edge.liquidity,
            });
        }

        let liquidity = if min_liquidity.is_finite() { min_liquidity } else { 0.0 };
        let estimated_execution_secs = estimate_execution_secs(hops.len(), liquidity);

        Ok(Opportunity {
            path,
            path_categories,
            hops,
            profit_ratio,
            liquidity,
            total_fee,
            risk_score: 0.0,
            recommended_volume: 1,
            estimated_execution_secs,
            discovered_at: now_unix_secs(),
        })
    }
}

/// Execution time estimate: monotone in hop count and inverse liquidity.
/// Each hop past the second adds 20% coordination overhead.
fn estimate_execution_secs(hop_count: usize, liquidity: f64) -> u64 {
    let hops = hop_count as f64;
    let liquidity_factor = (2.0 / liquidity.max(f64::MIN_POSITIVE)).max(1.0);
    let path_complexity = 1.0 + (hops - 2.0).max(0.0) * 0.2;

    (BASE_SECS_PER_HOP * hops * liquidity_factor * path_complexity) as u64
}
