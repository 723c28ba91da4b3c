// src/store/sqlite.rs
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ResultStore, RowStatus, RunRecord, SafetyStatus, ShortlistRow};
use crate::error::PersistenceError;

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sourced_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    keyword TEXT NOT NULL,
    rank INTEGER NOT NULL,
    source_id TEXT NOT NULL,
    original_url TEXT NOT NULL,
    title_cn TEXT NOT NULL,
    price_foreign REAL NOT NULL,
    currency TEXT NOT NULL,
    moq INTEGER NOT NULL,
    popularity INTEGER NOT NULL,
    price_krw INTEGER NOT NULL,
    total_cost INTEGER NOT NULL,
    profit_margin REAL NOT NULL,
    estimated_profit INTEGER NOT NULL,
    safety_status TEXT NOT NULL,
    images_json TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    listing_json TEXT NOT NULL,
    cost_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(run_id, original_url)
);

CREATE INDEX IF NOT EXISTS idx_sourced_products_status
ON sourced_products(status, id DESC);

CREATE TABLE IF NOT EXISTS sourcing_runs (
    run_id TEXT PRIMARY KEY,
    keyword TEXT NOT NULL,
    scraped INTEGER NOT NULL,
    safe INTEGER NOT NULL,
    profitable INTEGER NOT NULL,
    final_count INTEGER NOT NULL,
    degraded INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;

/// SQLite-backed result store. One connection behind an async mutex.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening result store {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("setting result store pragmas")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory result store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("creating result store tables")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn run(&self, run_id: Uuid) -> Result<Option<RunRecord>, PersistenceError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT keyword, scraped, safe, profitable, final_count, degraded, recorded_at
             FROM sourcing_runs WHERE run_id = ?1",
        )?;
        let mut rows = stmt.query(params![run_id.to_string()])?;
        let Some(r) = rows.next()? else {
            return Ok(None);
        };
        let keyword: String = r.get(0)?;
        let metrics = crate::sniper::StageMetrics {
            scraped: r.get::<_, i64>(1)? as usize,
            safe: r.get::<_, i64>(2)? as usize,
            profitable: r.get::<_, i64>(3)? as usize,
            final_count: r.get::<_, i64>(4)? as usize,
        };
        let degraded: bool = r.get(5)?;
        let recorded_at: String = r.get(6)?;
        Ok(Some(RunRecord {
            run_id,
            keyword,
            metrics,
            degraded,
            recorded_at: parse_ts(&recorded_at)?,
        }))
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn insert(&self, row: &ShortlistRow) -> Result<(), PersistenceError> {
        let images: Vec<&str> = row.listing.image_ref.iter().map(String::as_str).collect();
        let images_json = serde_json::to_string(&images)?;
        let listing_json = serde_json::to_string(&row.listing)?;
        let cost_json = serde_json::to_string(&row.cost)?;

        let db = self.db.lock().await;
        db.execute(
            "INSERT OR IGNORE INTO sourced_products
             (run_id, keyword, rank, source_id, original_url, title_cn, price_foreign, currency,
              moq, popularity, price_krw, total_cost, profit_margin, estimated_profit,
              safety_status, images_json, status, listing_json, cost_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                row.run_id.to_string(),
                row.keyword,
                row.rank as i64,
                row.listing.source_id,
                row.listing.url,
                row.listing.title,
                row.listing.unit_price,
                row.listing.currency.code(),
                i64::from(row.listing.unit_count_min),
                row.listing.popularity_signal.min(i64::MAX as u64) as i64,
                row.cost.sale_price,
                row.cost.total_cost,
                row.cost.achieved_margin_pct,
                row.cost.profit,
                row.safety_status.as_str(),
                images_json,
                row.status.as_str(),
                listing_json,
                cost_json,
                row.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn record_stage_metrics(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        let m = &run.metrics;
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO sourcing_runs
             (run_id, keyword, scraped, safe, profitable, final_count, degraded, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.run_id.to_string(),
                run.keyword,
                m.scraped as i64,
                m.safe as i64,
                m.profitable as i64,
                m.final_count as i64,
                run.degraded,
                run.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ShortlistRow>, PersistenceError> {
        let raw: Vec<(String, String, i64, String, String, String, String, String)> = {
            let db = self.db.lock().await;
            let mut stmt = db.prepare(
                "SELECT run_id, keyword, rank, status, safety_status, listing_json, cost_json, created_at
                 FROM sourced_products ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit.min(i64::MAX as usize) as i64], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                    r.get(7)?,
                ))
            })?;
            let collected = rows.collect::<Result<Vec<_>, _>>()?;
            collected
        };

        raw.into_iter()
            .map(
                |(run_id, keyword, rank, status, safety, listing, cost, created_at)| {
                    Ok(ShortlistRow {
                        run_id: Uuid::parse_str(&run_id)
                            .map_err(|e| PersistenceError::Corrupt(format!("run_id: {e}")))?,
                        keyword,
                        rank: rank.max(0) as usize,
                        listing: serde_json::from_str(&listing)?,
                        cost: serde_json::from_str(&cost)?,
                        status: parse_status(&status)?,
                        safety_status: parse_safety(&safety)?,
                        created_at: parse_ts(&created_at)?,
                    })
                },
            )
            .collect()
    }
}

fn parse_status(s: &str) -> Result<RowStatus, PersistenceError> {
    match s {
        "pending" => Ok(RowStatus::Pending),
        "synthetic" => Ok(RowStatus::Synthetic),
        other => Err(PersistenceError::Corrupt(format!("status {other:?}"))),
    }
}

fn parse_safety(s: &str) -> Result<SafetyStatus, PersistenceError> {
    match s {
        "passed" => Ok(SafetyStatus::Passed),
        "bypassed" => Ok(SafetyStatus::Bypassed),
        other => Err(PersistenceError::Corrupt(format!("safety_status {other:?}"))),
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Corrupt(format!("timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sniper::StageMetrics;
    use crate::store::test_rows::row;

    #[tokio::test]
    async fn rows_round_trip_and_duplicates_are_ignored() {
        let store = SqliteStore::in_memory().unwrap();
        let run = Uuid::new_v4();
        let mut r = row(run, "https://detail.1688.com/offer/9.html", 1);
        r.status = RowStatus::Synthetic;
        r.safety_status = SafetyStatus::Bypassed;
        store.insert(&r).await.unwrap();
        store.insert(&r).await.unwrap();

        let back = store.recent(10).await.unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].listing, r.listing);
        assert_eq!(back[0].cost, r.cost);
        assert_eq!(back[0].status, RowStatus::Synthetic);
        assert_eq!(back[0].safety_status, SafetyStatus::Bypassed);
    }

    #[tokio::test]
    async fn stage_metrics_upsert_per_run() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = Uuid::new_v4();
        let mut rec = RunRecord {
            run_id,
            keyword: "rack".into(),
            metrics: StageMetrics {
                scraped: 10,
                safe: 8,
                profitable: 3,
                final_count: 3,
            },
            degraded: false,
            recorded_at: Utc::now(),
        };
        store.record_stage_metrics(&rec).await.unwrap();
        rec.degraded = true;
        store.record_stage_metrics(&rec).await.unwrap();

        let got = store.run(run_id).await.unwrap().unwrap();
        assert_eq!(got.metrics, rec.metrics);
        assert!(got.degraded);
        assert!(store.run(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sniper.db");
        let run = Uuid::new_v4();
        {
            let s = SqliteStore::open(&path).unwrap();
            s.insert(&row(run, "https://1688.com/a", 1)).await.unwrap();
        }
        let s = SqliteStore::open(&path).unwrap();
        assert_eq!(s.recent(5).await.unwrap().len(), 1);
    }
}
