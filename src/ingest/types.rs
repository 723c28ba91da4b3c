// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamFetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Cny,
    Usd,
    Krw,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
            Currency::Krw => "KRW",
        }
    }
}

/// One normalized candidate product. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub source_id: String, // e.g. "1688", "aliexpress", "fallback"
    pub url: String,       // absolute, host-checked
    pub title: String,     // normalized text
    pub unit_price: f64,
    pub currency: Currency,
    /// Seller's minimum order quantity (MOQ), at least 1.
    pub unit_count_min: u32,
    /// Sales/orders counter as advertised upstream; 0 when unknown.
    pub popularity_signal: u64,
    /// `None` when upstream had no usable image (never fabricated).
    pub image_ref: Option<String>,
    /// Produced by the fallback generator rather than a real marketplace.
    #[serde(default)]
    pub synthetic: bool,
}

/// What one adapter call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub listings: Vec<RawListing>,
    /// Upstream records dropped by validation.
    pub rejected: usize,
}

impl SourceBatch {
    pub fn new(listings: Vec<RawListing>, rejected: usize) -> Self {
        Self { listings, rejected }
    }
}

/// "Search a keyword, return normalized listings."
///
/// Implementations never panic on upstream trouble; they return an
/// [`UpstreamFetchError`] and the scrape barrier turns it into zero results.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(
        &self,
        keyword: &str,
        max_results: usize,
    ) -> Result<SourceBatch, UpstreamFetchError>;

    fn name(&self) -> &'static str;
}
