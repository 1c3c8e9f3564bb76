use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::builder::GraphBuilder;
use crate::graph::parallel::ParallelGraphBuilder;
use crate::listing::{Listing, RawListing, normalize_batch};
use crate::logic::detector::CycleDetector;
use crate::logic::opportunity::{Opportunity, OpportunityBuilder};
use crate::logic::scorer::{RankMode, RiskScorer};
use crate::source::ListingSource;
use crate::utils::cache::AdaptiveCache;
use crate::utils::fingerprint::{Fingerprint, fingerprint_parts};
use crate::utils::volatility::{adaptive_ttl, price_volatility};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Parameters of one detection request. The fingerprintable subset (game,
/// price band, category, sources) identifies the graph; mode and budget
/// only affect ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRequest {
    pub game_id: String,
    pub price_from_cents: u64,
    pub price_to_cents: u64,
    pub category: Option<String>,
    /// Marketplace sources to include; empty means all.
    pub sources: Vec<String>,
    pub mode: RankMode,
    /// Overrides the configured result budget when set.
    pub result_budget: Option<usize>,
}

impl Default for DetectionRequest {
    fn default() -> Self {
        Self {
            game_id: String::new(),
            price_from_cents: 0,
            price_to_cents: u64::MAX,
            category: None,
            sources: Vec::new(),
            mode: RankMode::default(),
            result_budget: None,
        }
    }
}

impl DetectionRequest {
    /// Hash of the parameters that shape the graph. Sources are sorted so
    /// request ordering cannot split the cache.
    pub fn query_fingerprint(&self) -> Fingerprint {
        let mut sources = self.sources.clone();
        sources.sort();

        let mut parts: Vec<Vec<u8>> = vec![
            self.game_id.as_bytes().to_vec(),
            self.price_from_cents.to_le_bytes().to_vec(),
            self.price_to_cents.to_le_bytes().to_vec(),
            self.category.as_deref().unwrap_or("").as_bytes().to_vec(),
        ];
        parts.extend(sources.into_iter().map(String::into_bytes));
        fingerprint_parts(parts)
    }
}

/// A request paired with the raw listings an external marketplace client
/// already fetched for it.
#[derive(Debug, Clone)]
pub struct DetectionJob {
    pub request: DetectionRequest,
    pub raw_listings: Vec<RawListing>,
}

/// Outcome of one detection request: the ranked opportunity list plus the
/// measurements that shaped it. Plain serializable data for whatever layer
/// consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub opportunities: Vec<Opportunity>,
    pub listings_seen: usize,
    pub volatility: f64,
    pub from_cache: bool,
    pub elapsed_ms: u64,
}

/// Statistics about the engine's current state.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cache_entries: usize,
    pub cache_hit_rate: f64,
    pub max_cycle_hops: usize,
    pub result_budget: usize,
    pub shard_count: usize,
    pub item_to_item_enabled: bool,
}

/// The arbitrage detection engine.
///
/// One context object owns the validated configuration and the shared
/// result cache; the host application constructs it once and passes it
/// around by reference. Each `detect` call runs the full pipeline
/// (normalize, build graph, find negative cycles, expand, score, rank) over
/// an immutable graph snapshot, strictly in that order. The engine is
/// CPU-bound and safe to call from blocking worker threads; the async
/// surface is limited to the channel-fed processing loop and the listing
/// source boundary.
pub struct ArbitrageEngine {
    config: EngineConfig,
    cache: Arc<AdaptiveCache>,
}

impl ArbitrageEngine {
    /// Create an engine, validating the configuration once up front.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_cache(config, Arc::new(AdaptiveCache::new()))
    }

    /// Create an engine sharing an existing cache, e.g. across engines with
    /// different ranking defaults.
    pub fn with_cache(config: EngineConfig, cache: Arc<AdaptiveCache>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, cache })
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn get_cache(&self) -> &Arc<AdaptiveCache> {
        &self.cache
    }

    pub fn get_statistics(&self) -> EngineStats {
        EngineStats {
            cache_entries: self.cache.len(),
            cache_hit_rate: self.cache.stats.hit_rate(),
            max_cycle_hops: self.config.limits.max_cycle_hops,
            result_budget: self.config.ranking.result_budget,
            shard_count: self.config.builder.shard_count,
            item_to_item_enabled: self.config.builder.enable_item_to_item,
        }
    }

    /// Cache key of the graph snapshot for a request.
    pub fn graph_fingerprint(&self, request: &DetectionRequest) -> Fingerprint {
        let base = request.query_fingerprint();
        fingerprint_parts([base.0.as_slice(), b"graph".as_slice()])
    }

    /// Cache key of the ranked result list for a request. Mode and budget
    /// participate because they change the ranking, not the graph.
    pub fn opportunities_fingerprint(&self, request: &DetectionRequest) -> Fingerprint {
        let base = request.query_fingerprint();
        let budget = (self.resolve_budget(request) as u64).to_le_bytes();
        let mode = request.mode.to_string();
        fingerprint_parts([
            base.0.as_slice(),
            b"opportunities".as_slice(),
            mode.as_bytes(),
            budget.as_slice(),
        ])
    }

    /// Run one full detection pass over a raw listing batch.
    ///
    /// Failure is typed: an `Err` always means the search itself failed,
    /// never that it found nothing. A clean pass with zero opportunities
    /// returns `Ok` with an empty list.
    pub fn detect(
        &self,
        request: &DetectionRequest,
        raw_listings: &[RawListing],
    ) -> Result<DetectionReport, EngineError> {
        let started = Instant::now();
        let budget = self.resolve_budget(request);

        let opportunities_fp = self.opportunities_fingerprint(request);
        if let Ok(Some(opportunities)) = self.cache.get_opportunities(&opportunities_fp) {
            debug!(%opportunities_fp, "serving ranked opportunities from cache");
            return Ok(DetectionReport {
                listings_seen: 0,
                volatility: 0.0,
                from_cache: true,
                elapsed_ms: started.elapsed().as_millis() as u64,
                opportunities,
            });
        }

        let listings = self.filter_listings(normalize_batch(raw_listings), request);
        if listings.is_empty() {
            return Err(EngineError::EmptyListingSet);
        }

        let volatility = price_volatility(&listings);
        let ttl = adaptive_ttl(volatility, &self.config.cache);

        let graph_fp = self.graph_fingerprint(request);
        let graph = match self.cache.get_graph(&graph_fp) {
            Ok(Some(graph)) => graph,
            // a miss, or corruption downgraded to a forced miss
            _ => {
                let market = if self.config.builder.shard_count > 1 {
                    ParallelGraphBuilder::new(&self.config).build_parallel(
                        &listings,
                        graph_fp,
                        self.config.builder.shard_count,
                    )?
                } else {
                    GraphBuilder::new(&self.config).build(&listings, graph_fp)?
                };
                let market = Arc::new(market);
                self.cache.put_graph(graph_fp, market.clone(), ttl);
                market
            }
        };

        let cycles = CycleDetector::new(&self.config.limits).find_negative_cycles(&graph);

        let mut opportunities = Vec::with_capacity(cycles.len());
        for cycle in &cycles {
            opportunities.push(OpportunityBuilder::build(cycle, &graph)?);
        }

        let scorer = RiskScorer::new(&self.config.risk, &self.config.ranking);
        scorer.score_all(&mut opportunities);
        let ranked = scorer.rank(opportunities, request.mode, budget);

        self.cache.put_opportunities(opportunities_fp, ranked.clone(), ttl);

        info!(
            opportunities = ranked.len(),
            listings = listings.len(),
            volatility,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detection pass complete"
        );

        Ok(DetectionReport {
            opportunities: ranked,
            listings_seen: listings.len(),
            volatility,
            from_cache: false,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Fetch listings from an external source, then detect. The await sits
    /// entirely before the CPU-bound pipeline; nothing is locked across it.
    pub async fn detect_from_source(
        &self,
        source: &dyn ListingSource,
        request: &DetectionRequest,
    ) -> eyre::Result<DetectionReport> {
        let raw_listings = source.fetch_listings(request).await?;
        Ok(self.detect(request, &raw_listings)?)
    }

    /// Channel-fed processing loop for hosts that stream listing batches.
    ///
    /// Shutdown is honored between jobs, the suspension point before graph
    /// construction. Once a job enters `detect`, it runs to completion:
    /// partial detector state has no valid meaning, and the work is bounded
    /// by the configured node and edge limits.
    pub async fn run_processing_loop(
        self: Arc<Self>,
        mut job_receiver: mpsc::Receiver<DetectionJob>,
        report_sender: mpsc::Sender<Result<DetectionReport, EngineError>>,
        mut shutdown_receiver: mpsc::Receiver<()>,
    ) {
        info!("starting detection processing loop");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_receiver.recv() => {
                    info!("shutdown requested, leaving processing loop");
                    break;
                }
                job = job_receiver.recv() => {
                    let Some(job) = job else {
                        break;
                    };
                    let result = self.detect(&job.request, &job.raw_listings);
                    if let Err(e) = &result {
                        warn!(error = %e, game_id = %job.request.game_id, "detection request failed");
                    }
                    if report_sender.send(result).await.is_err() {
                        warn!("report receiver dropped, leaving processing loop");
                        break;
                    }
                }
            }
        }

        info!("detection processing loop ended");
    }

    fn resolve_budget(&self, request: &DetectionRequest) -> usize {
        request.result_budget.unwrap_or(self.config.ranking.result_budget)
    }

    fn filter_listings(&self, listings: Vec<Listing>, request: &DetectionRequest) -> Vec<Listing> {
        listings
            .into_iter()
            .filter(|listing| {
                let price = listing.get_price_cents();
                if price < request.price_from_cents || price > request.price_to_cents {
                    return false;
                }
                if let Some(category) = &request.category {
                    if listing.get_category() != category.to_lowercase() {
                        return false;
                    }
                }
                if !request.sources.is_empty() && !request.sources.iter().any(|s| s == listing.get_source_id()) {
                    return false;
                }
                true
            })
            .collect()
    }
}

/// Builder pattern for creating and configuring an `ArbitrageEngine`.
pub struct ArbitrageEngineBuilder {
    config: EngineConfig,
    cache: Option<Arc<AdaptiveCache>>,
}

impl ArbitrageEngineBuilder {
    pub fn new() -> Self {
        Self { config: EngineConfig::default(), cache: None }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_result_budget(mut self, budget: usize) -> Self {
        self.config.ranking.result_budget = budget;
        self
    }

    pub fn with_max_cycle_hops(mut self, max_hops: usize) -> Self {
        self.config.limits.max_cycle_hops = max_hops;
        self
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.config.builder.shard_count = shard_count;
        self
    }

    pub fn with_item_to_item(mut self, enabled: bool) -> Self {
        self.config.builder.enable_item_to_item = enabled;
        self
    }

    pub fn with_base_fee_bps(mut self, base_fee_bps: u32) -> Self {
        self.config.fees.base_fee_bps = base_fee_bps;
        self
    }

    pub fn with_shared_cache(mut self, cache: Arc<AdaptiveCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<ArbitrageEngine, EngineError> {
        match self.cache {
            Some(cache) => ArbitrageEngine::with_cache(self.config, cache),
            None => ArbitrageEngine::new(self.config),
        }
    }
}

impl Default for ArbitrageEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GameId;
    use crate::graph::market_graph::{ConversionEdge, MarketGraph, MarketNode};
    use crate::source::StaticListingSource;

    fn raw_listing(item_id: &str, price_cents: i64, quantity: i64, category: &str) -> RawListing {
        RawListing {
            item_id: item_id.to_string(),
            title: format!("{item_id} title"),
            price_minor_units: price_cents,
            currency: "USD".to_string(),
            quantity,
            category: category.to_string(),
            source: "dmarket".to_string(),
        }
    }

    fn request() -> DetectionRequest {
        DetectionRequest { game_id: GameId::CS2.to_string(), ..DetectionRequest::default() }
    }

    fn batch(n: usize) -> Vec<RawListing> {
        (0..n).map(|i| raw_listing(&format!("item{i}"), 700 + (i as i64) * 53, 4, "rifle")).collect()
    }

    /// A graph containing one 5% round trip, placed in the cache under the
    /// request's graph fingerprint so `detect` picks it up as a snapshot.
    fn inject_profitable_graph(engine: &ArbitrageEngine, request: &DetectionRequest) {
        let fp = engine.graph_fingerprint(request);
        let mut market = MarketGraph::new(fp);
        let base = market.add_or_get_node(MarketNode::base("USD"));
        let a = market.add_or_get_node(MarketNode::item(&Listing::new("a", "Item A", "rifle", 1000, 5, "dmarket")));
        let b = market.add_or_get_node(MarketNode::item(&Listing::new("b", "Item B", "rifle", 800, 3, "dmarket")));
        market.add_conversion(base, a, ConversionEdge::new(0.1, 0.0, 5.0));
        market.add_conversion(a, b, ConversionEdge::new(1.2, 0.0, 3.0));
        market.add_conversion(b, base, ConversionEdge::new(8.75, 0.0, 3.0));

        engine.get_cache().put_graph(fp, Arc::new(market), std::time::Duration::from_secs(60));
    }

    #[test]
    fn test_empty_batch_is_a_typed_error() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();

        let result = engine.detect(&request(), &[]);
        assert!(matches!(result, Err(EngineError::EmptyListingSet)));
    }

    #[test]
    fn test_consistent_prices_yield_empty_success_not_error() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();

        let report = engine.detect(&request(), &batch(12)).unwrap();

        assert!(report.opportunities.is_empty());
        assert!(!report.from_cache);
        assert_eq!(report.listings_seen, 12);
    }

    #[test]
    fn test_second_identical_request_hits_the_cache() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();
        let request = request();

        let first = engine.detect(&request, &batch(12)).unwrap();
        let second = engine.detect(&request, &batch(12)).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert!(engine.get_statistics().cache_hit_rate > 0.0);
    }

    #[test]
    fn test_detects_and_scores_injected_cycle() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();
        let request = request();
        inject_profitable_graph(&engine, &request);

        let report = engine.detect(&request, &batch(3)).unwrap();

        assert_eq!(report.opportunities.len(), 1);
        let opportunity = &report.opportunities[0];
        assert!((opportunity.profit_ratio - 1.05).abs() < 1e-9);
        assert!(opportunity.risk_score > 0.0);
        assert!(opportunity.recommended_volume >= 1);
        assert_eq!(opportunity.path.first(), opportunity.path.last());

        // The report is plain data for the presentation layer.
        let serialized = serde_json::to_string(&report).unwrap();
        assert!(serialized.contains("profit_ratio"));
    }

    #[test]
    fn test_result_budget_override() {
        let engine = ArbitrageEngineBuilder::new().with_result_budget(20).build().unwrap();
        let mut request = request();
        request.result_budget = Some(1);
        inject_profitable_graph(&engine, &request);

        let report = engine.detect(&request, &batch(3)).unwrap();
        assert!(report.opportunities.len() <= 1);
    }

    #[test]
    fn test_mode_changes_reuse_the_graph_snapshot() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();
        let mut request = request();
        inject_profitable_graph(&engine, &request);

        let balanced = engine.detect(&request, &batch(3)).unwrap();
        request.mode = RankMode::TradePro;
        let aggressive = engine.detect(&request, &batch(3)).unwrap();

        // Different opportunity cache keys, same graph snapshot.
        assert!(!balanced.from_cache);
        assert!(!aggressive.from_cache);
        assert_eq!(balanced.opportunities.len(), aggressive.opportunities.len());
    }

    #[test]
    fn test_price_band_and_category_filters_apply() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();
        let mut request = request();
        request.price_from_cents = 500;
        request.price_to_cents = 1500;
        request.category = Some("Rifle".to_string());

        let raw = vec![
            raw_listing("cheap", 100, 4, "rifle"),
            raw_listing("fits", 1000, 4, "rifle"),
            raw_listing("wrong_category", 1000, 4, "container"),
            raw_listing("expensive", 90_000, 4, "rifle"),
        ];

        let report = engine.detect(&request, &raw).unwrap();
        assert_eq!(report.listings_seen, 1);
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.risk.path_weight = 0.9;

        let result = ArbitrageEngineBuilder::new().with_config(config).build();
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_fingerprints_are_source_order_independent() {
        let engine = ArbitrageEngineBuilder::new().build().unwrap();

        let mut a = request();
        a.sources = vec!["steam".to_string(), "dmarket".to_string()];
        let mut b = request();
        b.sources = vec!["dmarket".to_string(), "steam".to_string()];

        assert_eq!(engine.graph_fingerprint(&a), engine.graph_fingerprint(&b));
    }

    #[tokio::test]
    async fn test_detect_from_source() -> eyre::Result<()> {
        let engine = ArbitrageEngineBuilder::new().build()?;
        let source = StaticListingSource::new(batch(8));

        let report = engine.detect_from_source(&source, &request()).await?;
        assert_eq!(report.listings_seen, 8);
        Ok(())
    }

    #[tokio::test]
    async fn test_processing_loop_handles_jobs_and_shutdown() {
        let engine = Arc::new(ArbitrageEngineBuilder::new().build().unwrap());
        let (job_tx, job_rx) = mpsc::channel(4);
        let (report_tx, mut report_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let loop_handle = tokio::spawn(engine.clone().run_processing_loop(job_rx, report_tx, shutdown_rx));

        job_tx.send(DetectionJob { request: request(), raw_listings: batch(6) }).await.unwrap();
        let report = report_rx.recv().await.unwrap().unwrap();
        assert_eq!(report.listings_seen, 6);

        // An empty batch comes back as a typed error, not a crash.
        job_tx.send(DetectionJob { request: request(), raw_listings: Vec::new() }).await.unwrap();
        let failure = report_rx.recv().await.unwrap();
        assert!(matches!(failure, Err(EngineError::EmptyListingSet)));

        shutdown_tx.send(()).await.unwrap();
        loop_handle.await.unwrap();
    }
}
