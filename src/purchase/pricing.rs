//! Price ceilings and preliminary quote evaluation.

use crate::error::{Error, Result};
use crate::market::price_deviation;
use crate::protocol::PreliminaryPriceQuote;
use serde::Serialize;

/// Slack for comparing PSL amounts that went through rounding.
const PSL_EPSILON: f64 = 1e-9;

/// Caller-supplied price limits. Either may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceCeilings {
    /// Most the caller will pay for the whole pack.
    pub max_total_psl: Option<f64>,
    /// Most the caller will pay per credit.
    pub max_per_credit_psl: Option<f64>,
}

/// Both limits, with any missing one derived from the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedCeilings {
    /// Total ceiling in PSL.
    pub max_total_psl: f64,
    /// Per-credit ceiling in PSL.
    pub max_per_credit_psl: f64,
}

impl PriceCeilings {
    /// Cap the total only.
    #[must_use]
    pub fn total(max_total_psl: f64) -> Self {
        Self {
            max_total_psl: Some(max_total_psl),
            max_per_credit_psl: None,
        }
    }

    /// Cap the per-credit price only.
    #[must_use]
    pub fn per_credit(max_per_credit_psl: f64) -> Self {
        Self {
            max_total_psl: None,
            max_per_credit_psl: Some(max_per_credit_psl),
        }
    }

    /// Fill in missing limits for a pack of `credits`. With neither given,
    /// the per-credit limit is `default_per_credit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pricing`] for a zero credit count or a non-positive
    /// limit.
    #[allow(clippy::cast_precision_loss)]
    pub fn resolve(&self, credits: u64, default_per_credit: f64) -> Result<ResolvedCeilings> {
        if credits == 0 {
            return Err(Error::Pricing("credit count must be positive".to_string()));
        }
        let count = credits as f64;
        let (max_total_psl, max_per_credit_psl) =
            match (self.max_total_psl, self.max_per_credit_psl) {
                (Some(total), Some(per_credit)) => (total, per_credit),
                (Some(total), None) => (total, total / count),
                (None, Some(per_credit)) => (per_credit * count, per_credit),
                (None, None) => (default_per_credit * count, default_per_credit),
            };
        if max_total_psl <= 0.0 || max_per_credit_psl <= 0.0 {
            return Err(Error::Pricing(format!(
                "price ceilings must be positive (total {max_total_psl}, per credit {max_per_credit_psl})"
            )));
        }
        Ok(ResolvedCeilings {
            max_total_psl,
            max_per_credit_psl,
        })
    }
}

impl ResolvedCeilings {
    /// Whether `total` PSL fits under the total ceiling.
    #[must_use]
    pub fn allows_total(&self, total: f64) -> bool {
        total <= self.max_total_psl + PSL_EPSILON
    }

    /// Whether `per_credit` PSL fits under the per-credit ceiling.
    #[must_use]
    pub fn allows_per_credit(&self, per_credit: f64) -> bool {
        per_credit <= self.max_per_credit_psl + PSL_EPSILON
    }
}

/// Why a quote was or was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuoteEvaluation {
    /// Quoted price per credit.
    pub quoted_per_credit: f64,
    /// Quoted total.
    pub quoted_total: f64,
    /// Locally estimated fair price per credit.
    pub estimated_per_credit: f64,
    /// Relative deviation of the quote from the estimate.
    pub deviation: f64,
    /// Quote respects the per-credit ceiling.
    pub within_per_credit: bool,
    /// Quote respects the total ceiling.
    pub within_total: bool,
    /// Deviation is within tolerance.
    pub within_tolerance: bool,
}

impl QuoteEvaluation {
    /// Whether every condition holds.
    #[must_use]
    pub fn agreed(&self) -> bool {
        self.within_per_credit && self.within_total && self.within_tolerance
    }
}

/// Judge `quote` against the caller's ceilings and the fair-price estimate.
///
/// # Errors
///
/// Returns [`Error::Pricing`] if the estimate is zero.
pub fn evaluate_quote(
    quote: &PreliminaryPriceQuote,
    ceilings: &ResolvedCeilings,
    estimated_per_credit: f64,
    tolerance: f64,
) -> Result<QuoteEvaluation> {
    let deviation = price_deviation(quote.price_per_credit, estimated_per_credit)?;
    Ok(QuoteEvaluation {
        quoted_per_credit: quote.price_per_credit,
        quoted_total: quote.total_cost,
        estimated_per_credit,
        deviation,
        within_per_credit: ceilings.allows_per_credit(quote.price_per_credit),
        within_total: ceilings.allows_total(quote.total_cost),
        within_tolerance: deviation <= tolerance + PSL_EPSILON,
    })
}

/// PSL amount to burn for a proposed total, rounded to 5 decimals.
#[must_use]
pub fn burn_amount(proposed_total: f64) -> f64 {
    (proposed_total * 100_000.0).round() / 100_000.0
}
