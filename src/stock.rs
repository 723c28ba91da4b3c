// src/stock.rs
//! Is a sourced product still for sale upstream?
//!
//! Called on demand by whatever re-checks live listings; the sourcing funnel
//! never calls it.

use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::config::SourceSettings;
use crate::error::UpstreamFetchError;
use crate::ingest::providers::ScrapingAntClient;

pub const STOCK_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower-cased body markers of a delisted or sold-out product page.
const OUT_OF_STOCK_MARKERS: &[&str] = &["下架", "已下架", "缺货"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
    /// Could not verify. Callers treat it as available.
    Unknown { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        !matches!(self, Availability::Unavailable { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Unavailable { .. } => "unavailable",
            Availability::Unknown { .. } => "unknown",
        }
    }
}

/// Verdict for a fetched product page.
pub fn classify_stock_page(status: u16, body: &str) -> Availability {
    if status == 404 {
        return Availability::Unavailable {
            reason: "Product deleted".to_string(),
        };
    }
    let lower = body.to_lowercase();
    if OUT_OF_STOCK_MARKERS.iter().any(|m| lower.contains(m)) {
        return Availability::Unavailable {
            reason: "Out of stock".to_string(),
        };
    }
    if !(200..300).contains(&status) {
        return Availability::Unknown {
            reason: format!("Check failed: HTTP {status}"),
        };
    }
    Availability::Available
}

#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    async fn check_availability(&self, url: &str) -> Availability;
}

/// Checks product pages through the rendering proxy.
pub struct ProxyStockChecker {
    client: Option<ScrapingAntClient>,
}

impl ProxyStockChecker {
    /// Without a credential every check answers `Unknown`.
    pub fn from_settings(settings: &SourceSettings) -> Self {
        let client = settings.scrapingant_api_key.as_deref().and_then(|key| {
            ScrapingAntClient::new(key, settings.scrapingant_endpoint.clone(), STOCK_CHECK_TIMEOUT)
                .map_err(|e| tracing::warn!(error = %e, "stock checker client not built"))
                .ok()
        });
        Self { client }
    }
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("stock_checks_total", "Product availability checks by outcome.");
    });
}

#[async_trait]
impl AvailabilityChecker for ProxyStockChecker {
    async fn check_availability(&self, url: &str) -> Availability {
        ensure_metrics_described();

        let verdict = match &self.client {
            None => Availability::Unknown {
                reason: "Cannot verify - API key missing".to_string(),
            },
            Some(client) => match client.fetch_page(url).await {
                Ok(body) => classify_stock_page(200, &body),
                Err(UpstreamFetchError::Status { status }) => classify_stock_page(status, ""),
                Err(e) => Availability::Unknown {
                    reason: format!("Check failed: {e}"),
                },
            },
        };

        counter!("stock_checks_total", "outcome" => verdict.label()).increment(1);
        match &verdict {
            Availability::Unavailable { reason } => {
                tracing::info!(target: "stock", url, reason = reason.as_str(), "product unavailable")
            }
            Availability::Unknown { reason } => {
                tracing::warn!(target: "stock", url, reason = reason.as_str(), "availability unknown")
            }
            Availability::Available => tracing::debug!(target: "stock", url, "product available"),
        }
        verdict
    }
}
