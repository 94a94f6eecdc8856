use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use nexus_zone::config::Config;
use nexus_zone::engine::zone::{StaticData, ZoneSettings};
use nexus_zone::metrics;
use nexus_zone::registry::{ZoneKey, ZoneRegistry};
use nexus_zone::scheduler::TickScheduler;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "nexus-zone" }))
}

async fn metrics_handler() -> impl axum::response::IntoResponse {
    let body = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let cfg = Config::load();

    let data = match StaticData::load(&cfg.data_dir) {
        Ok(data) => Arc::new(data),
        Err(e) => {
            tracing::error!("failed to load static data from {}: {e}", cfg.data_dir.display());
            std::process::exit(1);
        }
    };
    tracing::info!(
        templates = data.templates.len(),
        worlds = data.spawns.len(),
        "static data loaded from {}",
        cfg.data_dir.display()
    );

    let scheduler = Arc::new(TickScheduler::start(cfg.tick_interval_ms));
    let registry = Arc::new(ZoneRegistry::new(
        data,
        ZoneSettings {
            cell_size: cfg.cell_size,
            lazy_loading: true,
        },
        scheduler.clone(),
        cfg.idle_timeout_ms,
    ));

    // Bring up the starter world eagerly so session servers can route into
    // it without a creation round-trip.
    registry.get_or_create(ZoneKey {
        world_id: 1,
        instance_id: 1,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", addr));

    tracing::info!("zone engine listening on port {}", cfg.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start status server");
}
