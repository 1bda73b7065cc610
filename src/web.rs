//! HTTP gateway for the task manager.
//!
//! Thin layer over `App`: decode a request, call in, encode the result.
//! Search and embedding upkeep inherit the engine's fail-soft behavior, so
//! a down model or store shows up as empty results here, never as a 500 on
//! the task routes.

use crate::app::{App, AppError};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

pub fn start_daemon(app: App) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async { serve(app).await });
}

async fn serve(app: App) {
    let bind_addr = app.config().bind_addr.clone();
    let app = Arc::new(app);

    let router = router(app);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("couldnt bind {bind_addr}: {e}"));
    log::info!("listening on {bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id", put(update_task).delete(delete_task))
        .route("/api/tasks/search", post(search_tasks))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(app)
}

/// Wraps `AppError` so axum can turn it into a response.
#[derive(Debug)]
struct HttpError(AppError);

impl From<AppError> for HttpError {
    fn from(err: AppError) -> Self {
        HttpError(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        use crate::tasks::TaskError;

        let status = match &self.0 {
            AppError::Task(TaskError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Task(TaskError::TitleRequired) => StatusCode::BAD_REQUEST,
            _ => {
                log::error!("{:?}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "OK", "message": "Server is running"}))
}

async fn list_tasks(State(app): State<Arc<App>>) -> impl IntoResponse {
    Json(app.list_tasks())
}

async fn create_task(
    State(app): State<Arc<App>>,
    Json(create): Json<crate::tasks::TaskCreate>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app.add_task(create)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(app): State<Arc<App>>,
    Path(id): Path<u64>,
    Json(update): Json<crate::tasks::TaskUpdate>,
) -> Result<impl IntoResponse, HttpError> {
    let task = app.update_task(id, update)?;
    Ok(Json(task))
}

async fn delete_task(
    State(app): State<Arc<App>>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, HttpError> {
    app.delete_task(id)?;
    Ok(Json(json!({"message": "Task deleted successfully"})))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search_tasks(
    State(app): State<Arc<App>>,
    Json(req): Json<SearchRequest>,
) -> axum::response::Response {
    if req.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Search query is required"})),
        )
            .into_response();
    }

    Json(app.search(&req.query, req.limit)).into_response()
}
