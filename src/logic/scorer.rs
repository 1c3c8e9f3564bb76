use crate::config::{RankWeights, RankingConfig, RiskConfig};
use crate::logic::opportunity::Opportunity;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Preset ranking profiles. Each mode is a named weight vector in
/// `RankingConfig`; the scoring code path is shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RankMode {
    /// Quick low-risk flips on cheap items.
    BalanceBoost,
    /// Balanced profit versus risk.
    #[default]
    MediumTrader,
    /// High-profit, high-risk deep cycles.
    TradePro,
}

/// Computes composite risk scores and ranks opportunities.
///
/// Risk is a weighted sum of four normalized factors (path length, profit
/// plausibility, liquidity, category) scaled to 0..10. The ranking key
/// combines normalized profit, inverted risk and liquidity under the active
/// mode's weight vector. All weights come from configuration; nothing is
/// hard-coded in the scoring path.
pub struct RiskScorer<'a> {
    risk: &'a RiskConfig,
    ranking: &'a RankingConfig,
}

impl<'a> RiskScorer<'a> {
    pub fn new(risk: &'a RiskConfig, ranking: &'a RankingConfig) -> Self {
        Self { risk, ranking }
    }

    /// Fill in `risk_score` (0..10) and the risk-aware recommended volume.
    pub fn score(&self, opportunity: &mut Opportunity) {
        let path_length = opportunity.path.len() as f64;
        let profit_ratio = opportunity.profit_ratio;
        let liquidity = opportunity.liquidity;

        // Longer paths mean more legs that can move against us.
        let path_risk = ((path_length - 2.0) / 5.0).clamp(0.0, 1.0);

        // Very high profit ratios usually mean stale or bad data rather
        // than free money; risk falls as profit rises only up to ~20%.
        let profit_risk = (1.0 - (profit_ratio - 1.0) * 5.0).clamp(0.0, 1.0);

        let liquidity_risk = (1.0 - liquidity / 10.0).clamp(0.0, 1.0);

        let flagged_hops = opportunity
            .path_categories
            .iter()
            .filter(|category| self.risk.is_high_risk_category(category))
            .count() as f64;
        let category_risk = (flagged_hops * self.risk.high_risk_penalty).min(self.risk.max_category_risk);

        let combined = path_risk * self.risk.path_weight
            + profit_risk * self.risk.profit_weight
            + liquidity_risk * self.risk.liquidity_weight
            + category_risk * self.risk.category_weight;

        opportunity.risk_score = (combined * 10.0).clamp(0.0, 10.0);
        opportunity.recommended_volume =
            Opportunity::recommended_volume_for(profit_ratio, liquidity, opportunity.risk_score);
    }

    pub fn score_all(&self, opportunities: &mut [Opportunity]) {
        for opportunity in opportunities.iter_mut() {
            self.score(opportunity);
        }
    }

    /// Rank scored opportunities under a mode's weight vector and truncate
    /// to `budget`.
    ///
    /// The sort is stable and descending; ties break toward larger absolute
    /// profit, then shorter cycles. Truncation happens only after the full
    /// sort so a late high-rank opportunity can never be lost to an early
    /// cutoff.
    pub fn rank(&self, mut opportunities: Vec<Opportunity>, mode: RankMode, budget: usize) -> Vec<Opportunity> {
        let weights = self.ranking.weights_for(mode);

        opportunities.sort_by(|a, b| {
            ranking_key(b, &weights)
                .total_cmp(&ranking_key(a, &weights))
                .then_with(|| b.profit_margin().total_cmp(&a.profit_margin()))
                .then_with(|| a.hop_count().cmp(&b.hop_count()))
        });

        opportunities.truncate(budget);
        opportunities
    }
}

/// Weighted combination of normalized profit, inverted risk and liquidity.
/// 20% profit and liquidity of 10 units are treated as the saturation
/// points of their factors.
fn ranking_key(opportunity: &Opportunity, weights: &RankWeights) -> f64 {
    let normalized_profit = ((opportunity.profit_ratio - 1.0) * 5.0).clamp(0.0, 1.0);
    let normalized_safety = (10.0 - opportunity.risk_score) / 10.0;
    let normalized_liquidity = (opportunity.liquidity / 10.0).clamp(0.0, 1.0);

    normalized_profit * weights.profit
        + normalized_safety * weights.risk
        + normalized_liquidity * weights.liquidity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::listing::now_unix_secs;
    use std::str::FromStr;

    fn opportunity(profit_ratio: f64, liquidity: f64, hops: usize, categories: &[&str]) -> Opportunity {
        let path: Vec<String> = (0..=hops).map(|i| format!("node{i}")).collect();
        Opportunity {
            path,
            path_categories: categories.iter().map(|c| c.to_string()).collect(),
            hops: Vec::new(),
            profit_ratio,
            liquidity,
            total_fee: 0.07,
            risk_score: 0.0,
            recommended_volume: 1,
            estimated_execution_secs: 90,
            discovered_at: now_unix_secs(),
        }
    }

    fn scorer(config: &EngineConfig) -> RiskScorer<'_> {
        RiskScorer::new(&config.risk, &config.ranking)
    }

    #[test]
    fn test_risk_score_stays_in_range() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        let mut safe = opportunity(1.15, 50.0, 3, &[]);
        let mut risky = opportunity(1.001, 0.5, 8, &["container", "sticker"]);

        scorer.score(&mut safe);
        scorer.score(&mut risky);

        assert!((0.0..=10.0).contains(&safe.risk_score));
        assert!((0.0..=10.0).contains(&risky.risk_score));
        assert!(risky.risk_score > safe.risk_score);
    }

    #[test]
    fn test_high_risk_categories_add_penalty() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        let mut plain = opportunity(1.05, 5.0, 3, &["rifle", "pistol"]);
        let mut flagged = opportunity(1.05, 5.0, 3, &["container", "sticker"]);

        scorer.score(&mut plain);
        scorer.score(&mut flagged);

        assert!(flagged.risk_score > plain.risk_score);
    }

    #[test]
    fn test_rank_is_descending_and_truncated_after_sort() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        let mut opportunities: Vec<Opportunity> = (0..30)
            .map(|i| opportunity(1.0 + 0.005 * (i as f64 + 1.0), 5.0, 3, &[]))
            .collect();
        scorer.score_all(&mut opportunities);

        let ranked = scorer.rank(opportunities, RankMode::MediumTrader, 20);

        assert_eq!(ranked.len(), 20);
        // The most profitable entry was last in input order; truncation
        // before sorting would have dropped it.
        assert!((ranked[0].profit_ratio - 1.15).abs() < 1e-12);
        for pair in ranked.windows(2) {
            assert!(pair[0].profit_ratio >= pair[1].profit_ratio);
        }
    }

    #[test]
    fn test_ranking_is_a_fixed_point() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        let mut opportunities: Vec<Opportunity> = vec![
            opportunity(1.02, 8.0, 3, &[]),
            opportunity(1.10, 2.0, 4, &["container"]),
            opportunity(1.05, 5.0, 3, &[]),
        ];
        scorer.score_all(&mut opportunities);

        let once = scorer.rank(opportunities, RankMode::MediumTrader, 20);
        let paths_once: Vec<_> = once.iter().map(|o| o.path.clone()).collect();

        let twice = scorer.rank(once, RankMode::MediumTrader, 20);
        let paths_twice: Vec<_> = twice.iter().map(|o| o.path.clone()).collect();

        assert_eq!(paths_once, paths_twice);
    }

    #[test]
    fn test_ties_break_by_profit_then_cycle_length() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        // Saturate the profit factor (>= 20% each) so the weighted keys tie.
        let mut a = opportunity(1.25, 10.0, 4, &[]);
        let mut b = opportunity(1.30, 10.0, 4, &[]);
        scorer.score(&mut a);
        scorer.score(&mut b);
        // Force identical risk so only the tie-breakers differ.
        a.risk_score = 2.0;
        b.risk_score = 2.0;

        let ranked = scorer.rank(vec![a, b], RankMode::MediumTrader, 10);
        assert!((ranked[0].profit_ratio - 1.30).abs() < 1e-12);
    }

    #[test]
    fn test_modes_reorder_results() {
        let config = EngineConfig::default();
        let scorer = scorer(&config);

        // Saturated profit but risky vs modest profit and safe.
        let mut risky_rich = opportunity(1.30, 1.0, 5, &["container", "sticker", "agent"]);
        let mut safe_modest = opportunity(1.04, 10.0, 3, &[]);
        scorer.score(&mut risky_rich);
        scorer.score(&mut safe_modest);

        let low_risk = scorer.rank(
            vec![risky_rich.clone(), safe_modest.clone()],
            RankMode::BalanceBoost,
            10,
        );
        let high_profit = scorer.rank(vec![risky_rich, safe_modest], RankMode::TradePro, 10);

        assert!((low_risk[0].profit_ratio - 1.04).abs() < 1e-12);
        assert!((high_profit[0].profit_ratio - 1.30).abs() < 1e-12);
    }

    #[test]
    fn test_rank_mode_round_trips_through_strings() {
        assert_eq!(RankMode::from_str("trade_pro").unwrap(), RankMode::TradePro);
        assert_eq!(RankMode::BalanceBoost.to_string(), "balance_boost");
        assert_eq!(RankMode::default(), RankMode::MediumTrader);
    }
}
