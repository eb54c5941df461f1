use crate::export;
use crate::layout::OpenclawHome;
use crate::metrics::{LatencyHistogram, CONTENT_TYPE};
use crate::sessions::{self, SessionsReport};
use crate::store::SnapshotStore;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const HEALTH_PATH: &str = "/api/health";

/// Latency histogram operation label for a session walk during a scrape.
pub const SESSIONS_OPERATION: &str = "openclaw_sessions";

#[derive(Clone)]
pub struct AppState {
    store: Arc<SnapshotStore>,
    home: OpenclawHome,
    latency: Arc<LatencyHistogram>,
    telemetry_path: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<SnapshotStore>,
        home: OpenclawHome,
        latency: Arc<LatencyHistogram>,
        telemetry_path: &str,
    ) -> Self {
        Self {
            store,
            home,
            latency,
            telemetry_path: Arc::from(telemetry_path),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let telemetry_path = Arc::clone(&state.telemetry_path);
    Router::new()
        .route(&telemetry_path, get(scrape))
        .route("/", get(landing))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

/// Serve until `shutdown` fires, then drain in-flight requests.
pub async fn run(
    listen_address: &str,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(telemetry_path = %state.telemetry_path, "openclaw-exporter listening on {local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Workspace metrics come from the last published snapshot; sessions are
/// walked fresh on every scrape. A scrape always answers 200 and reports
/// problems through the `*_scrape_success` gauges.
async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    let published = state.store.current().await;

    let home = state.home.clone();
    let start = Instant::now();
    let report = match tokio::task::spawn_blocking(move || sessions::walk(&home)).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "session walk task failed");
            SessionsReport::default()
        }
    };
    state.latency.observe(SESSIONS_OPERATION, start.elapsed());

    let body = export::render(&published, &report, &state.latency);
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], body)
}

async fn landing(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n<head><title>OpenClaw Exporter</title></head>\n<body>\n<h1>OpenClaw Exporter</h1>\n<p><a href=\"{path}\">Metrics</a></p>\n</body>\n</html>\n",
        path = state.telemetry_path
    ))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let published = state.store.current().await;
    Json(serde_json::json!({
        "ok": true,
        "phase": state.store.phase(),
        "last_scan": published.completed_at,
        "cycles": published.cycles,
        "scrape_success": published.snapshot.scrape_success,
    }))
}
