// src/ingest/mod.rs
pub mod block;
pub mod providers;
pub mod types;
pub mod validate;

use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::UpstreamFetchError;
use crate::ingest::types::{RawListing, SourceAdapter, SourceBatch};

/// Titles longer than this are cut; marketplace SEO titles run on forever.
pub const TITLE_MAX_CHARS: usize = 300;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sourcing_listings_fetched_total",
            "Listings returned by source adapters after validation."
        );
        describe_counter!(
            "sourcing_listings_rejected_total",
            "Upstream records dropped by validation."
        );
        describe_counter!(
            "sourcing_provider_errors_total",
            "Adapter calls that failed, timed out or hit a block page."
        );
        describe_histogram!("sourcing_fetch_ms", "Adapter call time in milliseconds.");
    });
}

/// Normalize listing text: decode entities, strip tags, fold whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Zero-width characters sneak into scraped titles
    out = out.replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'], "");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap
    if out.chars().count() > TITLE_MAX_CHARS {
        out = out.chars().take(TITLE_MAX_CHARS).collect::<String>().trim_end().to_string();
    }

    out
}

/// Per-adapter account of one scrape, surfaced in results and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub elapsed_ms: u64,
}

impl SourceReport {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Everything the scrape barrier collected, in adapter order.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOutcome {
    pub per_source: Vec<Vec<RawListing>>,
    pub reports: Vec<SourceReport>,
}

impl ScrapeOutcome {
    pub fn total_listings(&self) -> usize {
        self.per_source.iter().map(Vec::len).sum()
    }
}

/// Call every adapter concurrently and wait for all of them (the barrier).
///
/// Each call is bounded by `timeout`; a slow, failing or blocked adapter
/// contributes an empty list and a report carrying the reason.
pub async fn scrape_all(
    adapters: &[Box<dyn SourceAdapter>],
    keyword: &str,
    max_results: usize,
    timeout: Duration,
) -> ScrapeOutcome {
    ensure_metrics_described();

    let calls = adapters
        .iter()
        .map(|a| fetch_one(a.as_ref(), keyword, max_results, timeout));
    let results = futures::future::join_all(calls).await;

    let mut outcome = ScrapeOutcome::default();
    for (report, listings) in results {
        outcome.per_source.push(listings);
        outcome.reports.push(report);
    }
    outcome
}

async fn fetch_one(
    adapter: &dyn SourceAdapter,
    keyword: &str,
    max_results: usize,
    timeout: Duration,
) -> (SourceReport, Vec<RawListing>) {
    let source = adapter.name();
    let t0 = Instant::now();

    let res = match tokio::time::timeout(timeout, adapter.fetch(keyword, max_results)).await {
        Ok(r) => r,
        Err(_) => Err(UpstreamFetchError::Timeout(timeout)),
    };

    let elapsed_ms = t0.elapsed().as_millis() as u64;
    histogram!("sourcing_fetch_ms", "source" => source).record(elapsed_ms as f64);

    match res {
        Ok(SourceBatch {
            mut listings,
            rejected,
        }) => {
            listings.truncate(max_results);
            counter!("sourcing_listings_fetched_total", "source" => source)
                .increment(listings.len() as u64);
            counter!("sourcing_listings_rejected_total", "source" => source)
                .increment(rejected as u64);
            tracing::info!(
                target: "ingest",
                source,
                keyword,
                fetched = listings.len(),
                rejected,
                elapsed_ms,
                "adapter finished"
            );
            let report = SourceReport {
                source: source.to_string(),
                fetched: listings.len(),
                rejected,
                error: None,
                error_kind: None,
                elapsed_ms,
            };
            (report, listings)
        }
        Err(e) => {
            tracing::warn!(
                target: "ingest",
                source,
                keyword,
                error = %e,
                kind = e.kind(),
                elapsed_ms,
                "adapter yielded nothing"
            );
            counter!("sourcing_provider_errors_total", "source" => source, "kind" => e.kind())
                .increment(1);
            let report = SourceReport {
                source: source.to_string(),
                fetched: 0,
                rejected: 0,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                elapsed_ms,
            };
            (report, Vec::new())
        }
    }
}
