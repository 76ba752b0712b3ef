//! Quote Router - simulated multi-venue pricing
//!
//! Every call waits one simulated network delay, then prices the order on
//! each configured venue as `base ± base * U(-variance, variance)`.

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::random::RandomSource;
use crate::config::{RouterConfig, VenueConfig};
use crate::domain::OrderSide;
use crate::error::{DexflowError, Result};

/// Slippage tolerance applied when the caller does not supply one
pub const DEFAULT_SLIPPAGE_PCT: Decimal = dec!(1);

/// Simulated liquidity venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Raydium,
    Meteora,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Raydium => "raydium",
            Venue::Meteora => "meteora",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One venue's price for a pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub venue: Venue,
    pub price: Decimal,
    /// Fee fraction in [0, 1)
    pub fee: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount_out: Option<Decimal>,
}

impl Quote {
    pub fn new(venue: Venue, price: Decimal, fee: Decimal) -> Self {
        Self {
            venue,
            price,
            fee,
            min_amount_out: None,
        }
    }
}

/// Best venue for a token plus the slippage-protected output floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    pub venue: Venue,
    pub price: Decimal,
    pub fee: Decimal,
    pub min_amount_out: Decimal,
    pub slippage_pct: Decimal,
    /// Every venue quote considered, in venue order
    pub quotes: Vec<Quote>,
}

/// Anything that can price an order across venues
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// One quote per configured venue, in venue order
    async fn quote(&self, pair: &str, amount: Decimal) -> Result<Vec<Quote>>;
}

/// Pick the winning quote for a side. Buy takes the lowest price, sell the
/// highest; on equal prices the earlier quote wins.
pub fn select_best(quotes: &[Quote], side: OrderSide) -> Option<&Quote> {
    quotes.iter().fold(None, |best: Option<&Quote>, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            let better = match side {
                OrderSide::Buy => candidate.price < current.price,
                OrderSide::Sell => candidate.price > current.price,
            };
            Some(if better { candidate } else { current })
        }
    })
}

/// `amount * price * (1 - slippage_pct / 100)`, or `None` on overflow
pub fn min_amount_out(
    amount: Decimal,
    price: Decimal,
    slippage_pct: Decimal,
) -> Option<Decimal> {
    let tolerance = Decimal::ONE.checked_sub(slippage_pct.checked_div(dec!(100))?)?;
    amount.checked_mul(price)?.checked_mul(tolerance)
}

fn validate_request(token_ref: &str, amount: Decimal) -> Result<()> {
    if token_ref.trim().is_empty() {
        return Err(DexflowError::InvalidInput(
            "token reference must not be empty".to_string(),
        ));
    }
    if amount <= Decimal::ZERO {
        return Err(DexflowError::InvalidInput(format!(
            "amount must be greater than 0, got {}",
            amount
        )));
    }
    Ok(())
}

/// Simulated router over the configured venues
pub struct QuoteRouter {
    venues: Vec<VenueConfig>,
    base_prices: HashMap<String, Decimal>,
    default_base_price: Decimal,
    min_delay_ms: u64,
    max_delay_ms: u64,
    rng: Arc<dyn RandomSource>,
}

impl QuoteRouter {
    pub fn new(config: RouterConfig, rng: Arc<dyn RandomSource>) -> Self {
        let base_prices = config
            .base_prices
            .into_iter()
            .map(|(pair, price)| (pair.trim().to_uppercase(), price))
            .collect();

        Self {
            venues: config.venues,
            base_prices,
            default_base_price: config.default_base_price,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms.max(config.min_delay_ms),
            rng,
        }
    }

    pub fn venues(&self) -> impl Iterator<Item = Venue> + '_ {
        self.venues.iter().map(|v| v.venue)
    }

    /// Reference price for a pair before venue variance
    pub fn base_price(&self, pair: &str) -> Decimal {
        self.base_prices
            .get(&pair.trim().to_uppercase())
            .copied()
            .unwrap_or(self.default_base_price)
    }

    fn network_delay(&self) -> Duration {
        let ms = self
            .rng
            .uniform(self.min_delay_ms as f64, self.max_delay_ms as f64);
        Duration::from_millis(ms.round().max(0.0) as u64)
    }

    fn venue_quote(&self, venue: &VenueConfig, base: Decimal) -> Quote {
        let drift = self.rng.uniform(-venue.variance, venue.variance);
        let drift = Decimal::from_f64(drift).unwrap_or(Decimal::ZERO);
        let price = (base + base * drift).round_dp(6);
        Quote::new(venue.venue, price, venue.fee)
    }

    /// Best (cheapest) venue for `token_ref` with a slippage floor.
    ///
    /// `slippage_pct` defaults to [`DEFAULT_SLIPPAGE_PCT`].
    pub async fn best_quote(
        &self,
        token_ref: &str,
        amount: Decimal,
        slippage_pct: Option<Decimal>,
    ) -> Result<QuoteResult> {
        validate_request(token_ref, amount)?;

        let slippage_pct = slippage_pct.unwrap_or(DEFAULT_SLIPPAGE_PCT);
        if slippage_pct < Decimal::ZERO || slippage_pct >= dec!(100) {
            return Err(DexflowError::InvalidInput(format!(
                "slippage must be in [0, 100), got {}",
                slippage_pct
            )));
        }

        let overflow = || {
            DexflowError::InvalidInput(format!(
                "amount {} is too large to quote {}",
                amount, token_ref
            ))
        };

        let mut quotes = self.quote(token_ref, amount).await?;
        for quote in quotes.iter_mut() {
            quote.min_amount_out =
                Some(min_amount_out(amount, quote.price, slippage_pct).ok_or_else(overflow)?);
        }

        let best = select_best(&quotes, OrderSide::Buy)
            .cloned()
            .ok_or_else(|| DexflowError::Routing(format!("no venue quoted {}", token_ref)))?;
        let best_min_out = best.min_amount_out.ok_or_else(overflow)?;

        Ok(QuoteResult {
            venue: best.venue,
            price: best.price,
            fee: best.fee,
            min_amount_out: best_min_out,
            slippage_pct,
            quotes,
        })
    }
}

#[async_trait]
impl QuoteSource for QuoteRouter {
    async fn quote(&self, pair: &str, amount: Decimal) -> Result<Vec<Quote>> {
        validate_request(pair, amount)?;

        sleep(self.network_delay()).await;

        let base = self.base_price(pair);
        let quotes: Vec<Quote> = self
            .venues
            .iter()
            .map(|venue| self.venue_quote(venue, base))
            .collect();

        debug!(
            "Quoted {} {} across {} venues: {:?}",
            amount,
            pair,
            quotes.len(),
            quotes.iter().map(|q| (q.venue, q.price)).collect::<Vec<_>>()
        );

        Ok(quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::random::{SequenceRandom, StdRandom};

    fn fast_config() -> RouterConfig {
        RouterConfig {
            min_delay_ms: 0,
            max_delay_ms: 1,
            ..RouterConfig::default()
        }
    }

    fn quotes(a: Decimal, b: Decimal) -> Vec<Quote> {
        vec![
            Quote::new(Venue::Raydium, a, dec!(0.003)),
            Quote::new(Venue::Meteora, b, dec!(0.002)),
        ]
    }

    #[test]
    fn test_select_best_by_side() {
        let q = quotes(dec!(150.5), dec!(149.8));
        assert_eq!(select_best(&q, OrderSide::Buy).unwrap().venue, Venue::Meteora);
        assert_eq!(select_best(&q, OrderSide::Sell).unwrap().venue, Venue::Raydium);
    }

    #[test]
    fn test_select_best_ties_keep_first_venue() {
        let q = quotes(dec!(150), dec!(150));
        assert_eq!(select_best(&q, OrderSide::Buy).unwrap().venue, Venue::Raydium);
        assert_eq!(select_best(&q, OrderSide::Sell).unwrap().venue, Venue::Raydium);
        assert!(select_best(&[], OrderSide::Buy).is_none());
    }

    #[test]
    fn test_min_amount_out() {
        assert_eq!(min_amount_out(dec!(100), dec!(150), dec!(1)), Some(dec!(14850)));
        assert_eq!(min_amount_out(dec!(100), dec!(150), dec!(2)), Some(dec!(14700)));
        assert_eq!(min_amount_out(Decimal::MAX, dec!(150), dec!(1)), None);
    }

    #[tokio::test]
    async fn test_quote_prices_within_variance() {
        let router = QuoteRouter::new(fast_config(), Arc::new(StdRandom::seeded(11)));
        for _ in 0..50 {
            let quotes = router.quote("SOL/USDC", dec!(1)).await.unwrap();
            assert_eq!(quotes.len(), 2);
            assert!(quotes[0].price >= dec!(144) && quotes[0].price <= dec!(156));
            assert!(quotes[1].price >= dec!(142.5) && quotes[1].price <= dec!(157.5));
            assert_eq!(quotes[0].fee, dec!(0.003));
            assert_eq!(quotes[1].fee, dec!(0.002));
        }
    }

    #[tokio::test]
    async fn test_venue_count_follows_config() {
        let mut config = fast_config();
        config.venues.push(VenueConfig {
            venue: Venue::Raydium,
            variance: 0.01,
            fee: dec!(0.001),
        });
        let router = QuoteRouter::new(config, Arc::new(SequenceRandom::midpoint()));
        let quotes = router.quote("SOL/USDC", dec!(1)).await.unwrap();
        assert_eq!(quotes.len(), 3);
        assert!(quotes.iter().all(|q| q.price == dec!(150)));
    }

    #[tokio::test]
    async fn test_best_quote_slippage_defaults_to_one_percent() {
        // delay draw, then one drift draw per venue: 0.5 = no drift, 1.0 = +variance
        let rng = SequenceRandom::new([0.0, 0.5, 1.0], 0.5);
        let router = QuoteRouter::new(fast_config(), Arc::new(rng));

        let result = router.best_quote("SOL/USDC", dec!(100), None).await.unwrap();
        assert_eq!(result.venue, Venue::Raydium);
        assert_eq!(result.price, dec!(150));
        assert_eq!(result.slippage_pct, dec!(1));
        assert_eq!(result.min_amount_out, dec!(14850));
        assert_eq!(result.quotes.len(), 2);

        let result = router
            .best_quote("SOL/USDC", dec!(100), Some(dec!(2)))
            .await
            .unwrap();
        assert_eq!(result.min_amount_out, dec!(14700));
    }

    #[tokio::test]
    async fn test_best_quote_rejects_bad_input() {
        let router = QuoteRouter::new(fast_config(), Arc::new(SequenceRandom::midpoint()));
        for token in ["", "   "] {
            let err = router.best_quote(token, dec!(1), None).await.unwrap_err();
            assert!(matches!(err, DexflowError::InvalidInput(_)));
        }
        for amount in [dec!(0), dec!(-1)] {
            let err = router.best_quote("SOL", amount, None).await.unwrap_err();
            assert!(matches!(err, DexflowError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_best_quote_rejects_overflowing_amount() {
        let router = QuoteRouter::new(fast_config(), Arc::new(SequenceRandom::midpoint()));
        let err = router
            .best_quote("SOL/USDC", Decimal::MAX / dec!(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DexflowError::InvalidInput(msg) if msg.contains("too large")));
    }

    #[test]
    fn test_unknown_pair_uses_default_base_price() {
        let router = QuoteRouter::new(fast_config(), Arc::new(SequenceRandom::midpoint()));
        assert_eq!(router.base_price("sol/usdc"), dec!(150));
        assert_eq!(router.base_price("BONK/USDC"), dec!(100));
    }
}
