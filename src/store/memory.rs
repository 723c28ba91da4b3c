// src/store/memory.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ResultStore, RunRecord, ShortlistRow};
use crate::error::PersistenceError;

/// Bounded in-process store. Oldest rows fall off once `cap` is reached.
#[derive(Debug)]
pub struct MemoryStore {
    rows: Mutex<Vec<ShortlistRow>>,
    runs: Mutex<Vec<RunRecord>>,
    cap: usize,
    /// Test hook: fail every n-th insert (0 = never).
    fail_every: usize,
    attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            rows: Mutex::new(Vec::with_capacity(cap.min(256))),
            runs: Mutex::new(Vec::new()),
            cap,
            fail_every: 0,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Every `n`-th insert fails with [`PersistenceError::Unavailable`].
    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = n;
        self
    }

    pub fn rows(&self) -> Vec<ShortlistRow> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Inserts attempted so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(1_000)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert(&self, row: &ShortlistRow) -> Result<(), PersistenceError> {
        let n = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(PersistenceError::Unavailable(format!("injected failure on write {n}")));
        }

        let mut v = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        if v
            .iter()
            .any(|r| r.run_id == row.run_id && r.listing.url == row.listing.url)
        {
            return Ok(());
        }
        v.push(row.clone());
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        Ok(())
    }

    async fn record_stage_metrics(&self, run: &RunRecord) -> Result<(), PersistenceError> {
        let mut v = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        v.retain(|r| r.run_id != run.run_id);
        v.push(run.clone());
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ShortlistRow>, PersistenceError> {
        let v = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        Ok(v.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_rows::row;
    use uuid::Uuid;

    #[tokio::test]
    async fn same_run_and_url_is_written_once() {
        let s = MemoryStore::default();
        let run = Uuid::new_v4();
        let r = row(run, "https://detail.1688.com/offer/1.html", 1);
        s.insert(&r).await.unwrap();
        s.insert(&r).await.unwrap();
        assert_eq!(s.rows().len(), 1);

        // another run may shortlist the same product
        s.insert(&row(Uuid::new_v4(), &r.listing.url, 1)).await.unwrap();
        assert_eq!(s.rows().len(), 2);
    }

    #[tokio::test]
    async fn capacity_drops_oldest_and_recent_is_newest_first() {
        let s = MemoryStore::with_capacity(2);
        let run = Uuid::new_v4();
        for i in 1..=3 {
            s.insert(&row(run, &format!("https://1688.com/{i}"), i)).await.unwrap();
        }
        let recent = s.recent(10).await.unwrap();
        let ranks: Vec<_> = recent.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![3, 2]);
    }

    #[tokio::test]
    async fn injected_failures_hit_every_nth_write() {
        let s = MemoryStore::default().failing_every(2);
        let run = Uuid::new_v4();
        assert!(s.insert(&row(run, "https://1688.com/1", 1)).await.is_ok());
        assert!(s.insert(&row(run, "https://1688.com/2", 2)).await.is_err());
        assert!(s.insert(&row(run, "https://1688.com/3", 3)).await.is_ok());
        assert_eq!(s.attempts(), 3);
        assert_eq!(s.rows().len(), 2);
    }
}
