use crate::config::CacheConfig;
use crate::listing::Listing;
use std::time::Duration;

/// Coefficient of variation above this is treated as fully volatile.
const FULL_VOLATILITY_CV: f64 = 0.3;

/// Measured price volatility of a listing batch, normalized to [0, 1].
///
/// Computed as the coefficient of variation (standard deviation over mean)
/// of batch prices, with 30% variation and above mapping to 1.0. Batches
/// with fewer than two listings read as perfectly calm.
pub fn price_volatility(listings: &[Listing]) -> f64 {
    if listings.len() < 2 {
        return 0.0;
    }

    let prices: Vec<f64> = listings.iter().map(|l| l.get_price()).collect();
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }

    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64;
    let coefficient_of_variation = variance.sqrt() / mean;

    (coefficient_of_variation / FULL_VOLATILITY_CV).min(1.0)
}

/// TTL for a cache entry given measured volatility.
///
/// `ttl = max(floor, base / (1 + volatility * factor))`: turbulent markets
/// rebuild more often, trading hit rate for freshness.
pub fn adaptive_ttl(volatility: f64, config: &CacheConfig) -> Duration {
    let base = config.base_ttl_secs as f64;
    let scaled = base / (1.0 + volatility.clamp(0.0, 1.0) * config.volatility_factor);

    Duration::from_secs((scaled as u64).max(config.floor_ttl_secs))
}
