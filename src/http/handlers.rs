use std::fmt::Write;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};

use crate::exposition::{render, CATALOG, CONTENT_TYPE};
use crate::http::server::AppState;

pub async fn metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.snapshots.load_full();
    let mut body = match render(&snapshot) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, cycle = snapshot.cycle, "Failed to encode metrics");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }
    };

    if let Some(handle) = &state.self_metrics {
        handle.run_upkeep();
        body.push_str(&handle.render());
    }

    tracing::debug!(cycle = snapshot.cycle, bytes = body.len(), "Served metrics");
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.health.current();
    let status = if current.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, current.describe())
}

pub async fn info() -> Html<String> {
    Html(info_page())
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn info_page() -> String {
    let mut families = String::new();
    for family in CATALOG {
        let _ = writeln!(
            families,
            "      <li><code>{}</code> ({}) - {}</li>",
            family.name,
            family.kind.as_str(),
            family.help
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
  <head><title>X-Ray Exporter</title></head>
  <body>
    <h1>X-Ray Exporter {version}</h1>
    <p>Aggregates traces from an X-Ray-compatible backend into Prometheus metrics.</p>
    <h2>Endpoints</h2>
    <ul>
      <li><a href="/metrics">/metrics</a> - metrics in the Prometheus text format</li>
      <li><a href="/health">/health</a> - health of the last collection cycle</li>
    </ul>
    <h2>Metrics</h2>
    <ul>
{families}    </ul>
    <h2>Prometheus configuration</h2>
    <pre>
scrape_configs:
  - job_name: 'xray-exporter'
    static_configs:
      - targets: ['localhost:9092']
    </pre>
  </body>
</html>
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_page_lists_catalog() {
        let page = info_page();
        assert!(page.contains("<code>xray_service_requests_total</code> (counter)"));
        assert!(page.contains("<code>xray_service_dependency_health</code> (gauge)"));
        assert!(page.contains("href=\"/metrics\""));
    }
}
