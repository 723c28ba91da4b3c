// tests/metrics.rs
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use smart_sniper::activity::MemoryActivity;
use smart_sniper::config::PipelineConfig;
use smart_sniper::ingest::providers::Ali1688Provider;
use smart_sniper::ingest::types::SourceAdapter;
use smart_sniper::metrics::Metrics;
use smart_sniper::store::MemoryStore;
use smart_sniper::Sniper;

// One recorder per process, so everything lives in a single test.
#[tokio::test]
async fn metrics_endpoint_exposes_funnel_series_after_a_run() {
    let metrics = Metrics::init().expect("install recorder");

    let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(Ali1688Provider::from_fixture_str(
        include_str!("fixtures/1688_search.html"),
    ))];
    let sniper = Sniper::new(
        adapters,
        Arc::new(MemoryStore::default()),
        Arc::new(MemoryActivity::default()),
    );
    let res = sniper.run("鞋架", &PipelineConfig::default()).await.unwrap();
    assert_eq!(res.stage_metrics.final_count, 3);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "sourcing_runs_total",
        "sourcing_listings_fetched_total",
        "sourcing_listings_rejected_total",
        "sourcing_safety_rejected_total",
        "sourcing_stage_listings",
        "sourcing_fetch_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
    assert!(
        text.contains(r#"sourcing_stage_listings{stage="final"} 3"#),
        "final stage gauge\n{text}"
    );
}
