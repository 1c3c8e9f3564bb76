/// Logic Layer - Arbitrage Detection
///
/// This layer is responsible for:
/// - Negative-cycle detection over the market graph (log-space Bellman-Ford)
/// - Expanding raw cycles into fully described opportunities
/// - Risk scoring and mode-weighted ranking
/// - The engine context object tying the stages together with the cache
pub mod detector;
pub mod engine;
pub mod opportunity;
pub mod scorer;

// Re-export key components from the logic layer
pub use detector::{Cycle, CycleDetector};
pub use engine::{
    ArbitrageEngine, ArbitrageEngineBuilder, DetectionJob, DetectionReport, DetectionRequest, EngineStats,
};
pub use opportunity::{HopDetail, Opportunity, OpportunityBuilder};
pub use scorer::{RankMode, RiskScorer};
