// src/sniper.rs
//! The sourcing funnel: SCRAPE → FILTER → ANALYZE → SELECT → PERSIST.
//!
//! Linear, no stage ever loops back. The only substitute behavior is the
//! fallback: when every source comes back empty the funnel runs on
//! synthetic listings and the result is marked `degraded`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::activity::{ActivitySink, Severity};
use crate::aggregate::{self, TriageWeights};
use crate::config::PipelineConfig;
use crate::error::SourcingError;
use crate::fallback::FallbackGenerator;
use crate::ingest::types::{RawListing, SourceAdapter};
use crate::ingest::{scrape_all, SourceReport};
use crate::profit::{self, ChannelEstimate, CostBreakdown};
use crate::safety;
use crate::store::{ResultStore, RowStatus, RunRecord, SafetyStatus, ShortlistRow};

const ACTIVITY_TYPE: &str = "sourcing";

/// Listing counts after each stage: `scraped ≥ safe ≥ profitable ≥ final`
/// outside bypass runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetrics {
    pub scraped: usize,
    pub safe: usize,
    pub profitable: usize,
    #[serde(rename = "final")]
    pub final_count: usize,
}

impl StageMetrics {
    pub fn is_monotone(&self) -> bool {
        self.scraped >= self.safe && self.safe >= self.profitable && self.profitable >= self.final_count
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortlistEntry {
    pub listing: RawListing,
    pub cost: CostBreakdown,
    pub channel_estimates: Vec<ChannelEstimate>,
}

/// What one invocation hands back. Always produced unless configuration failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcingResult {
    pub success: bool,
    pub run_id: Uuid,
    pub keyword: String,
    pub top_k: Vec<ShortlistEntry>,
    pub stage_metrics: StageMetrics,
    pub degraded: bool,
    pub bypass: bool,
    /// Highest margin seen in ANALYZE, even if nothing qualified.
    pub best_margin_pct: Option<f64>,
    pub suggestion: String,
    pub sources: Vec<SourceReport>,
    pub rejected_by_category: BTreeMap<String, usize>,
    pub persisted: usize,
    pub persist_failures: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sourcing_runs_total", "Completed sourcing runs.");
        describe_gauge!(
            "sourcing_stage_listings",
            "Listings left after each funnel stage in the last run."
        );
        describe_counter!(
            "sourcing_safety_rejected_total",
            "Listings rejected by the banned-category filter."
        );
        describe_counter!(
            "sourcing_persist_failures_total",
            "Shortlist rows that could not be written."
        );
        describe_counter!(
            "sourcing_fallback_total",
            "Runs that fell back to synthetic listings."
        );
    });
}

/// Runs the funnel against a fixed set of adapters and collaborators.
pub struct Sniper {
    adapters: Vec<Box<dyn SourceAdapter>>,
    store: Arc<dyn ResultStore>,
    activity: Arc<dyn ActivitySink>,
    weights: TriageWeights,
    fallback_seed: Option<u64>,
}

impl Sniper {
    pub fn new(
        adapters: Vec<Box<dyn SourceAdapter>>,
        store: Arc<dyn ResultStore>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            adapters,
            store,
            activity,
            weights: TriageWeights::default(),
            fallback_seed: None,
        }
    }

    pub fn with_weights(mut self, weights: TriageWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Make fallback listings reproducible.
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.fallback_seed = Some(seed);
        self
    }

    fn note(&self, message: &str, severity: Severity) {
        self.activity.record(ACTIVITY_TYPE, message, severity, None);
    }

    pub async fn run(
        &self,
        keyword: &str,
        cfg: &PipelineConfig,
    ) -> Result<SourcingResult, SourcingError> {
        ensure_metrics_described();

        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(SourcingError::EmptyKeyword);
        }
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sourcing", %run_id, keyword, bypass = cfg.bypass_filters);
        Ok(self.run_funnel(run_id, keyword, cfg).instrument(span).await)
    }

    async fn run_funnel(&self, run_id: Uuid, keyword: &str, cfg: &PipelineConfig) -> SourcingResult {
        let bypass = cfg.bypass_filters;
        self.note(
            &format!("Starting sourcing for keyword: {keyword}"),
            Severity::InProgress,
        );
        if bypass {
            tracing::warn!("filters bypassed for this run");
        }

        // SCRAPE
        self.note(
            &format!(
                "Step 1/3: Initial scan ({} products per source)",
                cfg.max_results_per_source
            ),
            Severity::InProgress,
        );
        let outcome = scrape_all(
            &self.adapters,
            keyword,
            cfg.max_results_per_source,
            cfg.fetch_timeout,
        )
        .await;
        for r in outcome.reports.iter().filter(|r| r.failed()) {
            self.activity.record(
                ACTIVITY_TYPE,
                &format!("Source {} yielded nothing", r.source),
                Severity::Warning,
                Some(json!({ "error": r.error, "kind": r.error_kind })),
            );
        }

        let mut ranked = aggregate::merge(outcome.per_source, &self.weights);
        let degraded = ranked.is_empty();
        let candidates: Vec<RawListing> = if degraded {
            counter!("sourcing_fallback_total").increment(1);
            tracing::warn!(
                fallback_count = cfg.fallback_count,
                "no usable listings from any source; using synthetic fallback"
            );
            self.note(
                "All sources returned nothing; continuing with sample data",
                Severity::Warning,
            );
            let mut generator = match self.fallback_seed {
                Some(seed) => FallbackGenerator::seeded(seed),
                None => FallbackGenerator::new(),
            };
            generator.generate(keyword, cfg.fallback_count)
        } else {
            if ranked.len() > cfg.max_candidates {
                tracing::info!(
                    merged = ranked.len(),
                    admitted = cfg.max_candidates,
                    "candidate list truncated"
                );
                ranked.truncate(cfg.max_candidates);
            }
            ranked.into_iter().map(|s| s.listing).collect()
        };

        let mut metrics = StageMetrics {
            scraped: candidates.len(),
            ..StageMetrics::default()
        };
        self.note(
            &format!("Found {} products", metrics.scraped),
            Severity::Success,
        );

        // FILTER
        self.note("Step 2/3: Applying safety filters", Severity::InProgress);
        let mut rejected_by_category: BTreeMap<String, usize> = BTreeMap::new();
        let safe: Vec<RawListing> = if bypass {
            candidates
        } else {
            let mut kept = Vec::with_capacity(candidates.len());
            for l in candidates {
                let verdict = safety::check(&l.title, "");
                if verdict.passed {
                    kept.push(l);
                    continue;
                }
                let category = verdict.category.unwrap_or("unknown");
                *rejected_by_category.entry(category.to_string()).or_default() += 1;
                counter!("sourcing_safety_rejected_total", "category" => category).increment(1);
                let short: String = l.title.chars().take(50).collect();
                self.note(
                    &format!("Filtered out: {short} - {}", verdict.reason()),
                    Severity::Warning,
                );
            }
            kept
        };
        metrics.safe = safe.len();
        self.note(
            &format!("{} products passed safety filter", metrics.safe),
            Severity::Success,
        );

        // ANALYZE
        self.note("Step 3/3: Analyzing profitability", Severity::InProgress);
        let mut best_margin_pct: Option<f64> = None;
        let mut profitable: Vec<(RawListing, CostBreakdown)> = Vec::with_capacity(safe.len());
        for l in safe {
            let cost = profit::analyze_in(l.unit_price, l.currency, cfg);
            best_margin_pct = Some(match best_margin_pct {
                Some(b) => b.max(cost.achieved_margin_pct),
                None => cost.achieved_margin_pct,
            });
            if bypass || cost.meets_target() {
                profitable.push((l, cost));
            }
        }
        metrics.profitable = profitable.len();

        // SELECT (sort_by is stable)
        profitable.sort_by(|a, b| b.1.profit.cmp(&a.1.profit));
        profitable.truncate(cfg.selection_limit());
        metrics.final_count = profitable.len();

        let top_k: Vec<ShortlistEntry> = profitable
            .into_iter()
            .map(|(listing, cost)| ShortlistEntry {
                channel_estimates: profit::channel_estimates(&cost, cfg),
                listing,
                cost,
            })
            .collect();
        self.note(
            &format!("Top {} profitable products selected", metrics.final_count),
            Severity::Success,
        );

        // PERSIST
        let (persisted, persist_failures) = self
            .persist(run_id, keyword, &top_k, degraded, bypass)
            .await;
        let record = RunRecord {
            run_id,
            keyword: keyword.to_string(),
            metrics,
            degraded,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.record_stage_metrics(&record).await {
            tracing::warn!(error = %e, "stage metrics not recorded");
        }

        record_stage_gauges(&metrics, degraded);
        if !bypass && !metrics.is_monotone() {
            tracing::error!(?metrics, "stage counts not monotone");
        }

        let suggestion = suggest(&metrics, degraded, bypass, best_margin_pct, cfg, &rejected_by_category);
        tracing::info!(
            scraped = metrics.scraped,
            safe = metrics.safe,
            profitable = metrics.profitable,
            final_count = metrics.final_count,
            degraded,
            persisted,
            persist_failures,
            "sourcing finished"
        );
        self.activity.record(
            ACTIVITY_TYPE,
            &format!("Sourcing completed. {persisted} products saved"),
            if degraded { Severity::Warning } else { Severity::Success },
            Some(json!({ "run_id": run_id, "stage_metrics": metrics, "degraded": degraded })),
        );

        SourcingResult {
            success: true,
            run_id,
            keyword: keyword.to_string(),
            top_k,
            stage_metrics: metrics,
            degraded,
            bypass,
            best_margin_pct,
            suggestion,
            sources: outcome.reports,
            rejected_by_category,
            persisted,
            persist_failures,
        }
    }

    /// Write each entry independently; a failed row is logged and skipped.
    async fn persist(
        &self,
        run_id: Uuid,
        keyword: &str,
        top_k: &[ShortlistEntry],
        degraded: bool,
        bypass: bool,
    ) -> (usize, usize) {
        let status = if degraded {
            RowStatus::Synthetic
        } else {
            RowStatus::Pending
        };
        let safety_status = if bypass {
            SafetyStatus::Bypassed
        } else {
            SafetyStatus::Passed
        };

        let mut ok = 0usize;
        let mut failed = 0usize;
        for (i, e) in top_k.iter().enumerate() {
            let row = ShortlistRow {
                run_id,
                keyword: keyword.to_string(),
                rank: i + 1,
                listing: e.listing.clone(),
                cost: e.cost,
                status,
                safety_status,
                created_at: Utc::now(),
            };
            match self.store.insert(&row).await {
                Ok(()) => ok += 1,
                Err(err) => {
                    failed += 1;
                    counter!("sourcing_persist_failures_total").increment(1);
                    tracing::warn!(url = %row.listing.url, rank = row.rank, error = %err, "row not persisted");
                    self.activity.record(
                        ACTIVITY_TYPE,
                        &format!("Could not save product #{}", row.rank),
                        Severity::Error,
                        Some(json!({ "url": row.listing.url, "error": err.to_string() })),
                    );
                }
            }
        }
        (ok, failed)
    }
}

fn record_stage_gauges(m: &StageMetrics, degraded: bool) {
    counter!("sourcing_runs_total", "degraded" => if degraded { "true" } else { "false" })
        .increment(1);
    gauge!("sourcing_stage_listings", "stage" => "scraped").set(m.scraped as f64);
    gauge!("sourcing_stage_listings", "stage" => "safe").set(m.safe as f64);
    gauge!("sourcing_stage_listings", "stage" => "profitable").set(m.profitable as f64);
    gauge!("sourcing_stage_listings", "stage" => "final").set(m.final_count as f64);
}

/// Human-readable next step for the caller.
fn suggest(
    m: &StageMetrics,
    degraded: bool,
    bypass: bool,
    best_margin_pct: Option<f64>,
    cfg: &PipelineConfig,
    rejected: &BTreeMap<String, usize>,
) -> String {
    if degraded {
        return format!(
            "All sources were unavailable or blocked; {} sample listings shown. Check the scraping credentials or retry later.",
            m.scraped
        );
    }
    if m.safe == 0 {
        let top = rejected
            .iter()
            .max_by_key(|(_, n)| **n)
            .map(|(c, _)| c.as_str())
            .unwrap_or("banned");
        return format!(
            "Every product matched a banned category (mostly {top}). Try a different keyword."
        );
    }
    if m.profitable == 0 {
        return match best_margin_pct {
            Some(best) => format!(
                "No product reached the {:.0}% target margin; the best was {:.1}%. Consider lowering target_margin_rate.",
                cfg.target_margin_pct, best
            ),
            None => "No product could be priced.".to_string(),
        };
    }
    if bypass {
        return format!(
            "Filters bypassed: showing {} unfiltered products. Turn off debug_mode_ignore_filters for real runs.",
            m.final_count
        );
    }
    format!(
        "{} of {} products met the {:.0}% target margin; top {} shortlisted.",
        m.profitable, m.scraped, cfg.target_margin_pct, m.final_count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_metrics_serialize_final() {
        let m = StageMetrics {
            scraped: 5,
            safe: 4,
            profitable: 2,
            final_count: 2,
        };
        let v = serde_json::to_value(m).unwrap();
        assert_eq!(v["final"], 2);
        assert!(m.is_monotone());
        assert!(!StageMetrics { safe: 6, ..m }.is_monotone());
    }

    #[test]
    fn suggestion_points_at_margin_when_nothing_qualifies() {
        let m = StageMetrics {
            scraped: 10,
            safe: 10,
            profitable: 0,
            final_count: 0,
        };
        let s = suggest(&m, false, false, Some(21.37), &PipelineConfig::default(), &BTreeMap::new());
        assert!(s.contains("21.4%"), "{s}");
        assert!(s.contains("target_margin_rate"));
    }

    #[test]
    fn suggestion_names_dominant_banned_category() {
        let m = StageMetrics {
            scraped: 3,
            ..StageMetrics::default()
        };
        let mut rejected = BTreeMap::new();
        rejected.insert("food".to_string(), 1);
        rejected.insert("replica".to_string(), 2);
        let s = suggest(&m, false, false, None, &PipelineConfig::default(), &rejected);
        assert!(s.contains("replica"), "{s}");
    }
}
