use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::MetricsConfig;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

fn describe_engine_metrics() {
    describe_counter!("cik_rebuilds_total", "Conversion table recompilations");
    describe_counter!("cik_cache_hits_total", "Requests served by the cached conversion table");
    describe_counter!("aggregation_requests_total", "Engine requests by kind");
    describe_counter!("aggregation_errors_total", "Failed engine requests by kind and error");
    describe_counter!("store_query_errors_total", "Failed persistence queries");
    describe_histogram!(
        "aggregation_duration_seconds",
        Unit::Seconds,
        "Engine request latency including store reads"
    );
}

/// Install the Prometheus recorder and serve `/metrics` on the configured address.
///
/// Must be called from inside a Tokio runtime.
pub fn init(config: &MetricsConfig) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.as_str();
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics bind address '{bind_addr}': {e}"))?;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))?;
    let _ = PROM_HANDLE.set(handle);
    describe_engine_metrics();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "serving metrics");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> String {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
