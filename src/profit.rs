//! # Profitability Analyzer
//! Pure landed-cost pricing: foreign unit price → domestic sale price, cost
//! breakdown and achieved margin. No I/O, deterministic, total.
//!
//! Pipeline (all money in KRW, integers):
//! 1. purchase = ⌊price × rate × buffer⌋
//! 2. customs  = ⌊purchase × customs_rate⌋
//! 3. total    = purchase + shipping + customs
//! 4. raw      = ⌊total / (1 − margin/100)⌋
//! 5. sale     = raw rounded *up* to the next multiple of 100
//! 6. profit   = sale − total, margin = profit / sale × 100
//!
//! Because step 5 only ever rounds up, the configured margin is a floor.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::ingest::types::Currency;

/// Absorbs binary representation noise (1994.9999999 must floor to 1995).
const FLOOR_EPSILON: f64 = 1e-9;

const PRICE_STEP: i64 = 100;

/// Ceiling for any KRW amount. Far above real goods, far below `i64::MAX`,
/// so sums and the round-up step cannot overflow.
pub const MAX_MONEY: i64 = 1_000_000_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub purchase_cost_local: i64,
    pub shipping_cost: i64,
    pub customs_tax: i64,
    pub total_cost: i64,
    pub target_margin_pct: f64,
    pub sale_price: i64,
    pub profit: i64,
    pub achieved_margin_pct: f64,
    pub exchange_rate_used: f64,
}

impl CostBreakdown {
    fn zero(target_margin_pct: f64, exchange_rate_used: f64) -> Self {
        Self {
            purchase_cost_local: 0,
            shipping_cost: 0,
            customs_tax: 0,
            total_cost: 0,
            target_margin_pct,
            sale_price: 0,
            profit: 0,
            achieved_margin_pct: 0.0,
            exchange_rate_used,
        }
    }

    pub fn meets_target(&self) -> bool {
        self.achieved_margin_pct >= self.target_margin_pct
    }
}

/// Net result of selling through one marketplace channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEstimate {
    pub channel: String,
    pub fee_rate: f64,
    pub fee: i64,
    pub net_profit: i64,
}

/// Price a listing quoted in CNY (the configured purchase currency).
pub fn analyze(unit_price_foreign: f64, config: &PipelineConfig) -> CostBreakdown {
    analyze_with_rate(unit_price_foreign, config.exchange_rate, config)
}

/// Price a listing quoted in any supported currency using the configured rate for it.
pub fn analyze_in(unit_price: f64, currency: Currency, config: &PipelineConfig) -> CostBreakdown {
    analyze_with_rate(unit_price, exchange_rate_for(currency, config), config)
}

/// KRW per unit of `currency`.
pub fn exchange_rate_for(currency: Currency, config: &PipelineConfig) -> f64 {
    match currency {
        Currency::Cny => config.exchange_rate,
        Currency::Usd => config.usd_exchange_rate,
        Currency::Krw => 1.0,
    }
}

fn analyze_with_rate(unit_price: f64, rate: f64, config: &PipelineConfig) -> CostBreakdown {
    let target = config.target_margin_pct;

    // Missing or broken prices must not abort the batch: they price at zero.
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return CostBreakdown::zero(target, rate);
    }

    let purchase_cost_local = floor_int(unit_price * rate * config.safety_buffer);
    let customs_tax = floor_int(purchase_cost_local as f64 * config.customs_rate);
    let shipping_cost = config.shipping_cost.clamp(0, MAX_MONEY);
    let total_cost = purchase_cost_local
        .saturating_add(shipping_cost)
        .saturating_add(customs_tax)
        .min(MAX_MONEY);

    let keep = 1.0 - target / 100.0;
    let sale_price_raw = if keep > 0.0 {
        floor_int(total_cost as f64 / keep)
    } else {
        total_cost
    };
    let sale_price = ceil_to_step(sale_price_raw);

    let profit = sale_price.saturating_sub(total_cost);
    let achieved_margin_pct = if sale_price > 0 {
        profit as f64 / sale_price as f64 * 100.0
    } else {
        0.0
    };

    CostBreakdown {
        purchase_cost_local,
        shipping_cost,
        customs_tax,
        total_cost,
        target_margin_pct: target,
        sale_price,
        profit,
        achieved_margin_pct,
        exchange_rate_used: rate,
    }
}

/// Marketplace commission and what is left after it, per configured channel.
pub fn channel_estimates(cost: &CostBreakdown, config: &PipelineConfig) -> Vec<ChannelEstimate> {
    config
        .channel_fees
        .iter()
        .map(|(channel, &fee_rate)| {
            let fee = floor_int(cost.sale_price as f64 * fee_rate);
            ChannelEstimate {
                channel: channel.clone(),
                fee_rate,
                fee,
                net_profit: cost.profit.saturating_sub(fee),
            }
        })
        .collect()
}

fn floor_int(x: f64) -> i64 {
    if x <= 0.0 {
        0
    } else {
        ((x + FLOOR_EPSILON).floor() as i64).min(MAX_MONEY)
    }
}

fn ceil_to_step(x: i64) -> i64 {
    if x <= 0 {
        0
    } else {
        let x = x.min(MAX_MONEY);
        (x + PRICE_STEP - 1) / PRICE_STEP * PRICE_STEP
    }
}
