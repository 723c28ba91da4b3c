// src/aggregate.rs
//! Merge per-source listings and pre-rank them for the funnel.
//!
//! Triage score = w_price*f(price) + w_margin*approx_margin + w_moq*g(moq),
//! each signal in [0,1]. Prices are first put on a common footing with
//! fixed reference constants. Those constants only make sources comparable;
//! profitability always uses the configured exchange rates.

use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

use crate::ingest::types::{Currency, RawListing};

/// Rough USD value of one unit of each currency. Comparability only.
pub fn reference_rate(c: Currency) -> f64 {
    match c {
        Currency::Cny => 0.14,
        Currency::Usd => 1.0,
        Currency::Krw => 0.00075,
    }
}

/// Reference price at which f(price) = 0.5.
const PRICE_SCALE: f64 = 10.0;

/// Resale heuristic for approx_margin: sell at 3x, pay 1.1x plus a flat landed overhead.
const RESALE_MULTIPLE: f64 = 3.0;
const COST_MULTIPLE: f64 = 1.1;
const FLAT_OVERHEAD: f64 = 3.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriageWeights {
    pub price: f64,
    pub margin: f64,
    pub moq: f64,
}

impl Default for TriageWeights {
    fn default() -> Self {
        Self {
            price: 0.4,
            margin: 0.4,
            moq: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredListing {
    pub listing: RawListing,
    pub score: f64,
    /// Unit price in the reference currency (USD).
    pub reference_price: f64,
}

pub fn reference_price(l: &RawListing) -> f64 {
    l.unit_price * reference_rate(l.currency)
}

/// Lower price scores higher; 1.0 at zero, 0.5 at `PRICE_SCALE`.
fn price_signal(price_ref: f64) -> f64 {
    1.0 / (1.0 + price_ref.max(0.0) / PRICE_SCALE)
}

pub fn approx_margin(price_ref: f64) -> f64 {
    if price_ref <= 0.0 {
        return 0.0;
    }
    let sale = RESALE_MULTIPLE * price_ref;
    let cost = COST_MULTIPLE * price_ref + FLAT_OVERHEAD;
    (1.0 - cost / sale).clamp(0.0, 1.0)
}

fn moq_signal(moq: u32) -> f64 {
    1.0 / f64::from(moq.max(1))
}

pub fn triage_score(l: &RawListing, w: &TriageWeights) -> f64 {
    let p = reference_price(l);
    let raw = w.price * price_signal(p) + w.margin * approx_margin(p) + w.moq * moq_signal(l.unit_count_min);
    let denom = (w.price + w.margin + w.moq).max(1e-6);
    (raw / denom).clamp(0.0, 1.0)
}

/// Stable identity for a listing URL: SHA-256 of the normalized URL.
///
/// Scheme and host are case-insensitive and fold; path and query keep their
/// case since marketplace item ids are case-sensitive. Fragments and a
/// trailing slash are ignored.
pub fn url_fingerprint(url: &str) -> [u8; 32] {
    let trimmed = url.trim();
    let normalized = match Url::parse(trimmed) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => trimmed.to_string(),
    };
    let mut hasher = Sha256::new();
    hasher.update(normalized.trim_end_matches('/').as_bytes());
    hasher.finalize().into()
}

/// Concatenate in source order, drop repeated URLs (first arrival wins),
/// score, and sort descending. Equal scores keep arrival order.
pub fn merge(per_source: Vec<Vec<RawListing>>, w: &TriageWeights) -> Vec<ScoredListing> {
    let mut seen: HashSet<[u8; 32]> = HashSet::new();
    let mut out: Vec<ScoredListing> = Vec::new();
    let mut dupes = 0usize;

    for listing in per_source.into_iter().flatten() {
        if !seen.insert(url_fingerprint(&listing.url)) {
            dupes += 1;
            continue;
        }
        let score = triage_score(&listing, w);
        let reference_price = reference_price(&listing);
        out.push(ScoredListing {
            listing,
            score,
            reference_price,
        });
    }

    // sort_by is stable
    out.sort_by(|a, b| b.score.total_cmp(&a.score));

    if dupes > 0 {
        tracing::debug!(target: "aggregate", dupes, kept = out.len(), "duplicate listings dropped");
    }
    out
}
