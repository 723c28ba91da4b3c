//! Smart Sniper — binary entrypoint.
//! Boots the Axum HTTP server: config layers, result store, activity log, routes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smart_sniper::activity::{ActivitySink, MemoryActivity, TeeActivity, TracingActivity};
use smart_sniper::config::{ConfigProvider, Layered};
use smart_sniper::metrics::Metrics;
use smart_sniper::store::SqliteStore;
use smart_sniper::{api, AppState, SourcingService};

const DEFAULT_DB_PATH: &str = "sniper.db";

/// `RUST_LOG` filter (default `smart_sniper=info,warn`); `SNIPER_LOG_FORMAT=json` for JSON lines.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smart_sniper=info,warn"));

    let json = std::env::var("SNIPER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Shuttle may already have installed a subscriber; try_init keeps that one.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already set");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config: Arc<dyn ConfigProvider> =
        Arc::new(Layered::env_then_file().context("loading sniper settings")?);

    let db_path = std::env::var("SNIPER_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));
    let store = Arc::new(SqliteStore::open(&db_path).context("opening result store")?);
    tracing::info!(db_path = %db_path.display(), "result store ready");

    let activity_log = Arc::new(MemoryActivity::default());
    let sinks: Vec<Arc<dyn ActivitySink>> = vec![Arc::new(TracingActivity), activity_log.clone()];
    let activity: Arc<dyn ActivitySink> = Arc::new(TeeActivity::new(sinks));

    let service = SourcingService::new(config, store, activity);
    let state = AppState {
        service,
        activity_log,
    };

    let metrics = Metrics::init()?;
    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
