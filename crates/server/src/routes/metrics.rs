use axum::Extension;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics - Prometheus text exposition of resolver and HTTP metrics
pub async fn get(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
