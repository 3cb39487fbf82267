//! HTTP front door: SSE streaming analysis plus the background task
//! variant. Thin by design; everything interesting happens in the
//! orchestrator.

use analysis_core::Settings;
use analysis_orchestrator::{
    run_background_analysis, spawn_stream_analysis, Runtime, TaskEntry, TaskStatus,
};
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct StockAnalysisRequest {
    pub stock_code: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

pub fn router(rt: Arc<Runtime>) -> Router {
    let api = Router::new()
        .route("/stream_analysis", post(stream_analysis_post).get(stream_analysis_get))
        .route("/analyze_stock", post(analyze_stock))
        .route("/get_task_status/:task_id", get(get_task_status))
        .with_state(rt);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to the Stock Agent Platform API V1. Go to /docs for API documentation."
    }))
}

fn sse_response(rt: Arc<Runtime>, stock_code: String, end_date: Option<String>) -> Response {
    let frames = spawn_stream_analysis(rt, stock_code, end_date);
    let stream = UnboundedReceiverStream::new(frames)
        .map(|frame| Ok::<_, std::convert::Infallible>(frame.into_bytes()));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// SSE stream of every lifecycle event of one analysis run.
async fn stream_analysis_post(
    State(rt): State<Arc<Runtime>>,
    Json(request): Json<StockAnalysisRequest>,
) -> Response {
    sse_response(rt, request.stock_code, request.end_date)
}

/// Same stream for EventSource clients.
async fn stream_analysis_get(
    State(rt): State<Arc<Runtime>>,
    Query(request): Query<StockAnalysisRequest>,
) -> Response {
    sse_response(rt, request.stock_code, request.end_date)
}

/// Start a background run and return the task id immediately.
async fn analyze_stock(
    State(rt): State<Arc<Runtime>>,
    Json(request): Json<StockAnalysisRequest>,
) -> impl IntoResponse {
    let task_id = Uuid::new_v4().to_string();
    rt.tasks.insert(
        task_id.clone(),
        TaskEntry {
            status: TaskStatus::Pending,
            result: None,
        },
    );

    let rt_for_task = Arc::clone(&rt);
    let id = task_id.clone();
    tokio::spawn(async move {
        if let Some(mut entry) = rt_for_task.tasks.get_mut(&id) {
            entry.status = TaskStatus::Running;
        }
        let final_state = run_background_analysis(
            Arc::clone(&rt_for_task),
            request.stock_code,
            request.end_date,
        )
        .await;
        let result = final_state
            .get("final_report")
            .cloned()
            .unwrap_or_else(|| json!("分析完成，但未找到最终报告。"));
        if let Some(mut entry) = rt_for_task.tasks.get_mut(&id) {
            entry.status = TaskStatus::Completed;
            entry.result = Some(result);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "message": "后台分析任务已启动。", "task_id": task_id })),
    )
}

async fn get_task_status(
    State(rt): State<Arc<Runtime>>,
    Path(task_id): Path<String>,
) -> Response {
    match rt.tasks.get(&task_id) {
        Some(entry) => Json(entry.value().clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "任务ID未找到。" })),
        )
            .into_response(),
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let rt = Runtime::initialize_or_degraded(settings).await?;
    tracing::info!(provider = rt.hub.provider_name(), "runtime initialized");

    let app = router(rt);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
