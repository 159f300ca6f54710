//! Prometheus metrics.
//!
//! Request counters and latencies are recorded through the `metrics` facade
//! by [`track_requests`]; the installed Prometheus recorder renders them for
//! `GET /metrics`.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder, or return the existing one.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_all();

            gauge!("app_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            let started = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            gauge!("app_start_time_seconds").set(started);

            Ok(handle)
        })
        .cloned()
}

/// Periodically drain histogram buffers held by the recorder.
pub fn spawn_upkeep(handle: PrometheusHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            interval.tick().await;
            handle.run_upkeep();
        }
    })
}

fn describe_all() {
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "webhook_requests_total",
        "Webhook deliveries by outcome"
    );
    describe_gauge!("app_info", "Application information");
    describe_gauge!(
        "app_start_time_seconds",
        metrics::Unit::Seconds,
        "Unix timestamp when the app started"
    );
}

/// Outcome label for `webhook_requests_total`.
pub fn record_webhook(result: &'static str) {
    counter!("webhook_requests_total", "result" => result).increment(1);
}

/// Middleware recording request count and latency per route template.
///
/// Scrapes of `/metrics` itself are not recorded.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    if path == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(elapsed);

    response
}
