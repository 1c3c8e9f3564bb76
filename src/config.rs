use crate::error::EngineError;
use crate::logic::scorer::RankMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the whole detection engine.
///
/// All tunables live here (fee tables, risk weights, ranking modes, cache
/// policy, safety limits) and are validated once at construction. No
/// module re-reads environment or global state per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fees: FeeConfig,
    pub risk: RiskConfig,
    pub ranking: RankingConfig,
    pub cache: CacheConfig,
    pub limits: LimitConfig,
    pub builder: BuilderConfig,
}

impl EngineConfig {
    /// Load defaults with environment variable overrides for the knobs that
    /// are commonly tuned per deployment.
    pub fn from_env() -> eyre::Result<Self> {
        let mut config = Self::default();

        if let Ok(base_fee) = std::env::var("MARKET_BASE_FEE_BPS") {
            config.fees.base_fee_bps =
                base_fee.parse().map_err(|e| eyre::eyre!("Invalid MARKET_BASE_FEE_BPS: {}", e))?;
        }

        if let Ok(max_hops) = std::env::var("MARKET_MAX_CYCLE_HOPS") {
            config.limits.max_cycle_hops =
                max_hops.parse().map_err(|e| eyre::eyre!("Invalid MARKET_MAX_CYCLE_HOPS: {}", e))?;
        }

        if let Ok(budget) = std::env::var("MARKET_RESULT_BUDGET") {
            config.ranking.result_budget =
                budget.parse().map_err(|e| eyre::eyre!("Invalid MARKET_RESULT_BUDGET: {}", e))?;
        }

        if let Ok(base_ttl) = std::env::var("MARKET_CACHE_BASE_TTL_SECS") {
            config.cache.base_ttl_secs =
                base_ttl.parse().map_err(|e| eyre::eyre!("Invalid MARKET_CACHE_BASE_TTL_SECS: {}", e))?;
        }

        if let Ok(shards) = std::env::var("MARKET_SHARD_COUNT") {
            config.builder.shard_count =
                shards.parse().map_err(|e| eyre::eyre!("Invalid MARKET_SHARD_COUNT: {}", e))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants. Called once when the engine is
    /// built; a config that passes here is never re-checked on the hot path.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.fees.validate()?;
        self.risk.validate()?;
        self.ranking.validate()?;
        self.cache.validate()?;
        self.limits.validate()?;
        self.builder.validate()?;
        Ok(())
    }
}

/// Marketplace fee model: a base fee in basis points scaled by a
/// per-category multiplier. Unknown categories pay the base fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub base_fee_bps: u32,
    /// category (lowercase) -> multiplier on the base fee
    pub category_multiplier: HashMap<String, f64>,
}

impl Default for FeeConfig {
    fn default() -> Self {
        let category_multiplier = HashMap::from([
            ("knife".to_string(), 0.9),
            ("gloves".to_string(), 0.9),
            ("rifle".to_string(), 1.0),
            ("pistol".to_string(), 1.1),
            ("smg".to_string(), 1.1),
            ("shotgun".to_string(), 1.2),
            ("machinegun".to_string(), 1.2),
            ("container".to_string(), 1.3),
        ]);

        Self { base_fee_bps: 700, category_multiplier }
    }
}

impl FeeConfig {
    /// Fee for a category, in basis points.
    pub fn category_fee_bps(&self, category: &str) -> u32 {
        let multiplier = self.category_multiplier.get(category).copied().unwrap_or(1.0);
        (self.base_fee_bps as f64 * multiplier).round() as u32
    }

    /// Fee for a category as a fraction in [0, 1).
    pub fn category_fee(&self, category: &str) -> f64 {
        self.category_fee_bps(category) as f64 / 10_000.0
    }

    fn validate(&self) -> Result<(), EngineError> {
        for (category, multiplier) in &self.category_multiplier {
            let fee = self.base_fee_bps as f64 * multiplier / 10_000.0;
            if !(0.0..1.0).contains(&fee) {
                return Err(EngineError::InvalidConfig(format!(
                    "fee for category '{category}' is {fee:.4}, must be in [0, 1)"
                )));
            }
        }
        if self.base_fee_bps >= 10_000 {
            return Err(EngineError::InvalidConfig(format!(
                "base_fee_bps {} means a fee of 100% or more",
                self.base_fee_bps
            )));
        }
        Ok(())
    }
}

/// Weights of the composite risk score. The four factor weights must sum
/// to 1; the resulting score is scaled to 0..10.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub path_weight: f64,
    pub profit_weight: f64,
    pub liquidity_weight: f64,
    pub category_weight: f64,
    /// Categories that add a fixed penalty per hop through them.
    pub high_risk_categories: Vec<String>,
    pub high_risk_penalty: f64,
    pub max_category_risk: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            path_weight: 0.3,
            profit_weight: 0.2,
            liquidity_weight: 0.3,
            category_weight: 0.2,
            high_risk_categories: vec![
                "container".to_string(),
                "sticker".to_string(),
                "agent".to_string(),
                "patch".to_string(),
            ],
            high_risk_penalty: 0.1,
            max_category_risk: 0.5,
        }
    }
}

impl RiskConfig {
    pub fn is_high_risk_category(&self, category: &str) -> bool {
        self.high_risk_categories.iter().any(|c| c == category)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let sum = self.path_weight + self.profit_weight + self.liquidity_weight + self.category_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(format!("risk factor weights sum to {sum}, expected 1.0")));
        }
        if self.high_risk_penalty < 0.0 || self.max_category_risk < 0.0 {
            return Err(EngineError::InvalidConfig("risk penalties must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// One named ranking weight vector. Profit, inverted risk and liquidity are
/// each normalized to [0, 1] before weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankWeights {
    pub profit: f64,
    pub risk: f64,
    pub liquidity: f64,
}

impl RankWeights {
    fn validate(&self, mode: &str) -> Result<(), EngineError> {
        let sum = self.profit + self.risk + self.liquidity;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(format!(
                "ranking weights for mode '{mode}' sum to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// Ranking configuration: a result budget and one weight vector per preset
/// trading mode. The modes share one code path; only the vectors differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub result_budget: usize,
    pub balance_boost: RankWeights,
    pub medium_trader: RankWeights,
    pub trade_pro: RankWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            result_budget: 20,
            // quick flips: safety over raw profit
            balance_boost: RankWeights { profit: 0.3, risk: 0.5, liquidity: 0.2 },
            medium_trader: RankWeights { profit: 0.5, risk: 0.3, liquidity: 0.2 },
            // deep cycles: chase profit, tolerate risk
            trade_pro: RankWeights { profit: 0.6, risk: 0.1, liquidity: 0.3 },
        }
    }
}

impl RankingConfig {
    pub fn weights_for(&self, mode: RankMode) -> RankWeights {
        match mode {
            RankMode::BalanceBoost => self.balance_boost,
            RankMode::MediumTrader => self.medium_trader,
            RankMode::TradePro => self.trade_pro,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.result_budget == 0 {
            return Err(EngineError::InvalidConfig("result_budget must be at least 1".to_string()));
        }
        self.balance_boost.validate("balance_boost")?;
        self.medium_trader.validate("medium_trader")?;
        self.trade_pro.validate("trade_pro")?;
        Ok(())
    }
}

/// Cache policy. The effective TTL shrinks as measured price volatility
/// rises: `ttl = max(floor, base / (1 + volatility * factor))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub base_ttl_secs: u64,
    pub floor_ttl_secs: u64,
    pub volatility_factor: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { base_ttl_secs: 300, floor_ttl_secs: 60, volatility_factor: 2.0 }
    }
}

impl CacheConfig {
    pub fn base_ttl(&self) -> Duration {
        Duration::from_secs(self.base_ttl_secs)
    }

    pub fn floor_ttl(&self) -> Duration {
        Duration::from_secs(self.floor_ttl_secs)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.floor_ttl_secs > self.base_ttl_secs {
            return Err(EngineError::InvalidConfig(format!(
                "floor_ttl_secs {} exceeds base_ttl_secs {}",
                self.floor_ttl_secs, self.base_ttl_secs
            )));
        }
        if self.volatility_factor < 0.0 {
            return Err(EngineError::InvalidConfig("volatility_factor must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Safety limits bounding detector work. Relaxation is O(|V| * |E|), so both
/// counts are capped before the detector ever runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub max_nodes: usize,
    pub max_edges: usize,
    /// Maximum cycle length in hops. Longer cycles are numerically less
    /// reliable and operationally harder to execute atomically.
    pub max_cycle_hops: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self { max_nodes: 2_000, max_edges: 500_000, max_cycle_hops: 4 }
    }
}

impl LimitConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.max_nodes < 2 {
            return Err(EngineError::InvalidConfig("max_nodes must allow the base currency plus one item".to_string()));
        }
        if self.max_cycle_hops < 2 {
            return Err(EngineError::InvalidConfig("max_cycle_hops below 2 cannot express a round trip".to_string()));
        }
        Ok(())
    }
}

/// Graph construction knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Item-to-item conversion edges. O(n²) in listings; the parallel
    /// coordinator exists because of this pass.
    pub enable_item_to_item: bool,
    pub shard_count: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self { enable_item_to_item: true, shard_count: 4 }
    }
}

impl BuilderConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.shard_count == 0 {
            return Err(EngineError::InvalidConfig("shard_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_category_fee_lookup() {
        let fees = FeeConfig::default();

        // 7% base, knives at 0.9x, containers at 1.3x
        assert_eq!(fees.category_fee_bps("rifle"), 700);
        assert_eq!(fees.category_fee_bps("knife"), 630);
        assert_eq!(fees.category_fee_bps("container"), 910);
        // unknown categories use the base fee
        assert_eq!(fees.category_fee_bps("music_kit"), 700);
        assert!((fees.category_fee("rifle") - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_risk_weights_must_sum_to_one() {
        let mut config = EngineConfig::default();
        config.risk.path_weight = 0.9;

        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_mode_weight_vectors() {
        let ranking = RankingConfig::default();

        let low_risk = ranking.weights_for(RankMode::BalanceBoost);
        let high_profit = ranking.weights_for(RankMode::TradePro);

        assert!(low_risk.risk > high_profit.risk);
        assert!(high_profit.profit > low_risk.profit);
    }

    #[test]
    fn test_ttl_floor_cannot_exceed_base() {
        let mut config = EngineConfig::default();
        config.cache.floor_ttl_secs = config.cache.base_ttl_secs + 1;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = EngineConfig::default();

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: EngineConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.fees.base_fee_bps, config.fees.base_fee_bps);
        assert_eq!(deserialized.ranking.result_budget, config.ranking.result_budget);
    }
}
