// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod activity;
pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod fallback;
pub mod ingest;
pub mod metrics;
pub mod profit;
pub mod safety;
pub mod service;
pub mod sniper;
pub mod stock;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router as router, AppState};
pub use crate::config::PipelineConfig;
pub use crate::error::{ConfigurationError, SourcingError};
pub use crate::service::SourcingService;
pub use crate::sniper::{Sniper, SourcingResult, StageMetrics};
