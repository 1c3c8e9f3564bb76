// Three-Layer Architecture
pub mod listing;   // Data Layer: raw listing normalization
pub mod graph;     // Graph Layer: market graph construction (sequential + sharded)
pub mod logic;     // Logic Layer: cycle detection, opportunities, scoring, engine

// Common utilities and types
pub mod config;
pub mod constants;
pub mod error;
pub mod source;
pub mod utils;

// Re-export key components from each layer
pub use config::{
    BuilderConfig, CacheConfig, EngineConfig, FeeConfig, LimitConfig, RankWeights, RankingConfig, RiskConfig,
};
pub use error::{CacheError, EngineError};
pub use graph::{ConversionEdge, GraphBuilder, MarketGraph, MarketNode, NodeKey, ParallelGraphBuilder};
pub use listing::{Listing, RawListing, normalize_batch};
pub use logic::{
    ArbitrageEngine, ArbitrageEngineBuilder, Cycle, CycleDetector, DetectionJob, DetectionReport,
    DetectionRequest, EngineStats, HopDetail, Opportunity, OpportunityBuilder, RankMode, RiskScorer,
};
pub use source::{ListingSource, StaticListingSource};
pub use utils::{AdaptiveCache, CacheStats, Fingerprint, adaptive_ttl, fingerprint_parts, price_volatility};
