//! HTTP surface for monsoon.
//!
//! One subscription per topic is opened at startup and pumped by a
//! background tick task. Requests project the current state with the view
//! parameters given in the query string, so every client can sort and filter
//! independently without touching the shared history.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use monsoon_core::{
    DashboardConfig, Error, MetricsProvider, PumpStats, SortDirection, SortKey, StaticTopic,
    SubscriptionController, Topic, ViewMode, ViewState,
};

/// How often the tick task drains every topic's queue.
const PUMP_EVERY: Duration = Duration::from_millis(100);

/// Shared server state.
struct AppState {
    provider: Arc<dyn MetricsProvider>,
    config: DashboardConfig,
    topics: Mutex<BTreeMap<Topic, SubscriptionController>>,
}

impl AppState {
    fn new(provider: Arc<dyn MetricsProvider>, config: DashboardConfig) -> Self {
        let topics = Topic::ALL
            .into_iter()
            .map(|topic| {
                let controller = SubscriptionController::new(
                    provider.clone(),
                    topic,
                    config.retention(),
                    config.params(),
                );
                (topic, controller)
            })
            .collect();
        Self {
            provider,
            config,
            topics: Mutex::new(topics),
        }
    }

    /// Start sessions that are not live yet and drain every queue. A
    /// provider that refused a start is retried on the next tick.
    async fn tick(&self) -> PumpStats {
        let mut topics = self.topics.lock().await;
        let mut total = PumpStats::default();
        for controller in topics.values_mut() {
            let topic = controller.topic();
            if !controller.is_live() {
                if let Err(e) = controller.resume() {
                    log::debug!("{topic}: still unavailable: {e}");
                    continue;
                }
            }
            let stats = controller.pump();
            total.applied += stats.applied;
            total.malformed += stats.malformed;
        }
        total
    }

    async fn stop_all(&self) {
        for controller in self.topics.lock().await.values_mut() {
            controller.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::UnknownTopic(_) => StatusCode::NOT_FOUND,
        Error::UnknownColumn(_) | Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        Error::CommandFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::MalformedSnapshot(_) | Error::StaleDelivery | Error::InvalidTransition { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: e.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TopicQuery {
    mode: Option<String>,
    sort: Option<String>,
    dir: Option<String>,
    filter: Option<String>,
    columns: Option<String>,
}

impl TopicQuery {
    fn view(&self, topic: Topic, base: ViewState) -> Result<ViewState, Error> {
        let mut view = base;
        if let Some(mode) = &self.mode {
            view.set_mode(mode.parse::<ViewMode>()?);
        }
        if let Some(sort) = &self.sort {
            let key: SortKey = sort.parse()?;
            view.sort_key = key;
            view.sort_direction = key.default_direction();
        }
        if let Some(dir) = &self.dir {
            view.sort_direction = dir.parse::<SortDirection>()?;
        }
        if let Some(filter) = &self.filter {
            view.set_filter(filter.as_str());
        }
        if let Some(columns) = &self.columns {
            view.set_columns(topic, columns)?;
        }
        Ok(view)
    }
}

async fn handle_topic(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Query(params): Query<TopicQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let topic: Topic = topic.parse().map_err(api_error)?;
    let view = params
        .view(topic, state.config.view_for(topic))
        .map_err(api_error)?;

    let mut topics = state.topics.lock().await;
    let controller = topics
        .get_mut(&topic)
        .ok_or_else(|| api_error(Error::UnknownTopic(topic.to_string())))?;
    controller.pump();

    Ok(Json(serde_json::json!({
        "topic": topic,
        "live": controller.is_live(),
        "session": controller.session().id,
        "cycle": controller.reconciler().cycles(),
        "view": view,
        "projection": controller.project(&view),
    })))
}

async fn handle_info(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind: StaticTopic = kind.parse().map_err(api_error)?;
    let provider = state.provider.clone();
    let info = tokio::task::spawn_blocking(move || provider.static_info(kind))
        .await
        .map_err(|e| api_error(Error::ProviderUnavailable(e.to_string())))?
        .map_err(api_error)?;
    Ok(Json(serde_json::json!(info)))
}

async fn handle_kill(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<u32>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.provider.kill_entity(pid).map_err(api_error)?;
    Ok(Json(serde_json::json!({ "success": true, "pid": pid })))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let topics = state.topics.lock().await;
    let status: BTreeMap<String, serde_json::Value> = topics
        .iter()
        .map(|(topic, c)| {
            (
                topic.to_string(),
                serde_json::json!({
                    "live": c.is_live(),
                    "state": c.session().state(),
                    "entities": c.store().len(),
                    "cycle": c.reconciler().cycles(),
                }),
            )
        })
        .collect();
    drop(topics);

    Json(serde_json::json!({
        "name": "Monsoon Server",
        "version": monsoon_core::VERSION,
        "provider": state.provider.name(),
        "capacity": state.config.capacity,
        "interval_ms": state.config.interval.as_millis() as u64,
        "topics": status,
        "endpoints": {
            "/": "This API index",
            "/topics/{topic}": {
                "method": "GET",
                "description": "Projected view of one topic (cpu_cores, memory, processes)",
                "params": {
                    "mode": "live (default) or history",
                    "sort": "provider, cpu, memory, name, id",
                    "dir": "asc or desc (default depends on sort key)",
                    "filter": "Case-insensitive substring over name, executable and id",
                    "columns": "Comma-separated visible columns",
                }
            },
            "/info/{kind}": "One-shot host information: system or cpu",
            "/processes/{pid}/kill": "POST: send SIGTERM to a process",
        },
    }))
}

/// Build the axum router and the state behind it.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/topics/{topic}", get(handle_topic))
        .route("/info/{kind}", get(handle_info))
        .route("/processes/{pid}/kill", post(handle_kill))
        .with_state(state)
}

/// Run the HTTP server until Ctrl+C, then stop every session.
pub async fn run_server(
    provider: Arc<dyn MetricsProvider>,
    config: DashboardConfig,
    host: &str,
    port: u16,
) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(provider, config));
    state.tick().await;

    let ticker = {
        let state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PUMP_EVERY);
            loop {
                interval.tick().await;
                let stats = state.tick().await;
                if stats.malformed > 0 {
                    log::warn!("dropped {} malformed snapshot(s)", stats.malformed);
                }
            }
        })
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    let result = axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    ticker.abort();
    state.stop_all().await;
    result
}
