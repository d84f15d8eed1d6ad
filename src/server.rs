//! HTTP exposition of the scrape results.

use crate::config::WebConfig;
use crate::encoding::text::{encode, CONTENT_TYPE};
use crate::scrape::Scraper;
use axum::extract::State;
use axum::http::header::{self, HeaderMap};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Request header carrying the scraper's own timeout in seconds.
pub const TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    scraper: Arc<Scraper>,
    margin: Duration,
    default_timeout: Option<Duration>,
}

impl AppState {
    /// Create new [`AppState`].
    pub fn new(scraper: Arc<Scraper>, config: &WebConfig) -> Self {
        Self {
            scraper,
            margin: config.margin(),
            default_timeout: config.default_timeout(),
        }
    }
}

/// Returns the router serving metrics at `telemetry_path`, a health check
/// and a landing page.
pub fn router(state: AppState, telemetry_path: &str) -> Router {
    let mut router = Router::new()
        .route(telemetry_path, get(metrics_handler))
        .route("/health", get(health_handler));
    if telemetry_path != "/" {
        let page = landing_page(telemetry_path);
        router = router.route(
            "/",
            get(move || {
                let page = page.clone();
                async move { Html(page) }
            }),
        );
    }
    router.with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(config: &WebConfig, scraper: Arc<Scraper>) -> std::io::Result<()> {
    let app = router(AppState::new(scraper, config), &config.telemetry_path);
    let listener = tokio::net::TcpListener::bind(config.listen_address).await?;

    info!(
        "listening on http://{}{}",
        config.listen_address, config.telemetry_path
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Scrape timeout of a request.
///
/// Uses the request header if it holds a positive number of seconds, the
/// configured default otherwise. The margin is subtracted unless that leaves
/// nothing.
pub fn scrape_timeout(
    headers: &HeaderMap,
    margin: Duration,
    default: Option<Duration>,
) -> Option<Duration> {
    let requested = headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|d| !d.is_zero())
        .or(default)?;

    match requested.checked_sub(margin) {
        Some(t) if !t.is_zero() => Some(t),
        _ => Some(requested),
    }
}

async fn metrics_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let timeout = scrape_timeout(&headers, state.margin, state.default_timeout);
    render(&state.scraper, timeout).await
}

/// Run a scrape and render it as text exposition response.
pub async fn render(scraper: &Scraper, timeout: Option<Duration>) -> Response {
    let report = match scraper.scrape(timeout).await {
        Ok(report) => report,
        Err(e) => {
            error!("scrape failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let mut body = String::new();
    if let Err(e) = encode(&mut body, &report.samples) {
        error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>counter-exporter</title></head>\n\
         <body>\n\
         <h1>counter-exporter</h1>\n\
         <p><a href=\"{telemetry_path}\">Metrics</a></p>\n\
         <p><i>{}</i></p>\n\
         </body>\n\
         </html>\n",
        env!("CARGO_PKG_VERSION")
    )
}
