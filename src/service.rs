// src/service.rs
//! Per-request wiring: config snapshot → adapters → funnel.
//!
//! Nothing mutable is shared between invocations except the store and the
//! activity sink, which are append-only collaborators.

use std::sync::Arc;

use serde_json::json;

use crate::activity::{ActivitySink, Severity};
use crate::config::{ConfigProvider, PipelineConfig};
use crate::error::{ConfigurationError, SourcingError};
use crate::ingest::providers::build_adapters;
use crate::ingest::types::SourceAdapter;
use crate::sniper::{Sniper, SourcingResult};
use crate::stock::ProxyStockChecker;
use crate::store::ResultStore;

/// Builds the adapters for one run from its config snapshot.
pub type AdapterFactory = dyn Fn(&PipelineConfig) -> Result<Vec<Box<dyn SourceAdapter>>, ConfigurationError>
    + Send
    + Sync;

#[derive(Clone)]
pub struct SourcingService {
    config: Arc<dyn ConfigProvider>,
    store: Arc<dyn ResultStore>,
    activity: Arc<dyn ActivitySink>,
    adapters: Arc<AdapterFactory>,
    fallback_seed: Option<u64>,
}

impl SourcingService {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        store: Arc<dyn ResultStore>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            config,
            store,
            activity,
            adapters: Arc::new(|cfg: &PipelineConfig| build_adapters(&cfg.sources, cfg.fetch_timeout)),
            fallback_seed: None,
        }
    }

    /// Replace how adapters are built (fixtures, mocks).
    pub fn with_adapter_factory<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineConfig) -> Result<Vec<Box<dyn SourceAdapter>>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        self.adapters = Arc::new(f);
        self
    }

    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.fallback_seed = Some(seed);
        self
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Read every setting once for this invocation.
    pub fn snapshot(&self) -> Result<PipelineConfig, ConfigurationError> {
        PipelineConfig::from_provider(self.config.as_ref())
    }

    /// Run the funnel for `keyword`. Fails only on an empty keyword or bad configuration.
    pub async fn source(&self, keyword: &str) -> Result<SourcingResult, SourcingError> {
        if keyword.trim().is_empty() {
            return Err(SourcingError::EmptyKeyword);
        }

        let prepared = self
            .snapshot()
            .and_then(|cfg| (self.adapters)(&cfg).map(|a| (cfg, a)));
        let (cfg, adapters) = match prepared {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, keys = ?e.keys(), "sourcing aborted: configuration");
                self.activity.record(
                    "sourcing",
                    &format!("Scraping failed: {e}"),
                    Severity::Error,
                    Some(json!({ "keys": e.keys() })),
                );
                return Err(e.into());
            }
        };

        let mut sniper = Sniper::new(adapters, self.store.clone(), self.activity.clone());
        if let Some(seed) = self.fallback_seed {
            sniper = sniper.with_fallback_seed(seed);
        }
        sniper.run(keyword, &cfg).await
    }

    /// Availability checker using the current credentials.
    pub fn stock_checker(&self) -> Result<ProxyStockChecker, ConfigurationError> {
        Ok(ProxyStockChecker::from_settings(&self.snapshot()?.sources))
    }
}
