// src/store/mod.rs
//! Where shortlists end up.
//!
//! Writes are per row and independent: the orchestrator logs a failed row
//! and moves on. Rows are keyed by `(run_id, url)`, so replaying a write
//! within one run changes nothing.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::ingest::types::RawListing;
use crate::profit::CostBreakdown;
use crate::sniper::StageMetrics;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Downstream registration only picks up `Pending` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Pending,
    Synthetic,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Pending => "pending",
            RowStatus::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    Passed,
    /// The safety filter was skipped for this run.
    Bypassed,
}

impl SafetyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SafetyStatus::Passed => "passed",
            SafetyStatus::Bypassed => "bypassed",
        }
    }
}

/// One shortlisted product, self-describing for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistRow {
    pub run_id: Uuid,
    pub keyword: String,
    /// 1-based position in the shortlist.
    pub rank: usize,
    pub listing: RawListing,
    pub cost: CostBreakdown,
    pub status: RowStatus,
    pub safety_status: SafetyStatus,
    pub created_at: DateTime<Utc>,
}

/// Stage counts of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub keyword: String,
    pub metrics: StageMetrics,
    pub degraded: bool,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write one row. Re-inserting the same `(run_id, url)` is a no-op.
    async fn insert(&self, row: &ShortlistRow) -> Result<(), PersistenceError>;

    async fn record_stage_metrics(&self, run: &RunRecord) -> Result<(), PersistenceError>;

    /// Latest rows first.
    async fn recent(&self, limit: usize) -> Result<Vec<ShortlistRow>, PersistenceError>;
}

#[cfg(test)]
pub(crate) mod test_rows {
    use super::*;
    use crate::ingest::types::Currency;

    pub fn row(run_id: Uuid, url: &str, rank: usize) -> ShortlistRow {
        ShortlistRow {
            run_id,
            keyword: "shoe rack".into(),
            rank,
            listing: RawListing {
                source_id: "1688".into(),
                url: url.into(),
                title: format!("rack {rank}"),
                unit_price: 10.0,
                currency: Currency::Cny,
                unit_count_min: 2,
                popularity_signal: 300,
                image_ref: Some("https://img.example.com/a.jpg".into()),
                synthetic: false,
            },
            cost: CostBreakdown {
                purchase_cost_local: 1995,
                shipping_cost: 5000,
                customs_tax: 199,
                total_cost: 7194,
                target_margin_pct: 30.0,
                sale_price: 10300,
                profit: 3106,
                achieved_margin_pct: 30.15,
                exchange_rate_used: 190.0,
            },
            status: RowStatus::Pending,
            safety_status: SafetyStatus::Passed,
            created_at: Utc::now(),
        }
    }
}
