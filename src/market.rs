//! Fair-market pricing of inference credits.

use crate::config::PricingConfig;
use crate::error::{Error, Result};
use crate::policy::{is_transient, RetryPolicy};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Lowest PSL/USD price accepted from a feed.
pub const MIN_PLAUSIBLE_PSL_USD: f64 = 0.000_000_1;

/// Highest PSL/USD price accepted from a feed.
pub const MAX_PLAUSIBLE_PSL_USD: f64 = 0.02;

/// Source of the current PSL/USD market price.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current PSL price in USD.
    async fn psl_usd(&self) -> Result<f64>;
}

/// CoinGecko simple-price feed.
#[derive(Debug, Clone)]
pub struct CoinGeckoOracle {
    url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl CoinGeckoOracle {
    /// Create an oracle reading `url`, retrying transient failures once.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            client,
            retry: retry.with_max_attempts(2),
        })
    }

    async fn fetch_once(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("price feed request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "price feed returned status {}",
                response.status()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("price feed returned invalid JSON: {e}")))?;
        let price = body
            .pointer("/pastel/usd")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::Network(format!("price feed has no pastel.usd: {body}")))?;
        check_plausible(price)
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn psl_usd(&self) -> Result<f64> {
        let price = self
            .retry
            .run("price feed", |_| self.fetch_once(), is_transient)
            .await?;
        debug!("PSL/USD market price: {price}");
        Ok(price)
    }
}

/// Fixed price, for offline estimates and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPriceOracle(pub f64);

#[async_trait]
impl PriceOracle for StaticPriceOracle {
    async fn psl_usd(&self) -> Result<f64> {
        check_plausible(self.0)
    }
}

fn check_plausible(price: f64) -> Result<f64> {
    if (MIN_PLAUSIBLE_PSL_USD..=MAX_PLAUSIBLE_PSL_USD).contains(&price) {
        Ok(price)
    } else {
        warn!("Rejecting implausible PSL/USD price {price}");
        Err(Error::Pricing(format!(
            "PSL/USD price {price} outside [{MIN_PLAUSIBLE_PSL_USD}, {MAX_PLAUSIBLE_PSL_USD}]"
        )))
    }
}

/// Fair PSL price of one credit at `psl_usd`.
///
/// # Errors
///
/// Returns [`Error::Pricing`] for a non-positive price or a margin outside
/// `[0, 1)`.
pub fn estimate_price_per_credit(config: &PricingConfig, psl_usd: f64) -> Result<f64> {
    if psl_usd <= 0.0 || !psl_usd.is_finite() {
        return Err(Error::Pricing(format!("invalid PSL/USD price {psl_usd}")));
    }
    if !(0.0..1.0).contains(&config.target_profit_margin) {
        return Err(Error::Pricing(format!(
            "profit margin {} must be in [0, 1)",
            config.target_profit_margin
        )));
    }
    Ok(config.target_value_per_credit_usd / (1.0 - config.target_profit_margin) / psl_usd)
}

/// Estimated PSL cost of `credits` with a fractional safety `cushion`,
/// rounded to cents.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate_purchase_cost(credits: u64, price_per_credit: f64, cushion: f64) -> f64 {
    let raw = credits as f64 * price_per_credit * (1.0 + cushion);
    (raw * 100.0).round() / 100.0
}

/// Relative deviation of `quoted` from `estimated`.
///
/// # Errors
///
/// Returns [`Error::Pricing`] when the estimate is zero.
pub fn price_deviation(quoted: f64, estimated: f64) -> Result<f64> {
    if estimated == 0.0 {
        return Err(Error::Pricing(
            "cannot compare against a zero price estimate".to_string(),
        ));
    }
    Ok((quoted - estimated).abs() / estimated)
}
