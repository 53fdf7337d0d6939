use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use validator::Validate;

use crate::config::AppConfig;
use crate::error::RagError;
use crate::pipeline::LazyPipeline;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<LazyPipeline>,
    query_counter: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(pipeline: Arc<LazyPipeline>) -> Self {
        Self {
            pipeline,
            query_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seconds since the epoch plus a process-wide counter, so two requests in
    /// the same second never share an id.
    fn next_query_id(&self) -> String {
        let seq = self.query_counter.fetch_add(1, Ordering::SeqCst);
        format!("query-{}-{}", Utc::now().timestamp(), seq)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[serde(default)]
    pub top_k: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub query_id: String,
    pub response_time: f64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1))]
    pub query_id: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    status: String,
    query_id: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: f64,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { detail: detail.into() }))
}

/// Unwraps a JSON body, reporting deserialization and validation failures as 422.
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| api_error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text()))?;
    request
        .validate()
        .map_err(|e| api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    Ok(request)
}

fn status_for(err: &RagError) -> StatusCode {
    match err {
        RagError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                }),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600))
}

/// Create and configure the API router
pub fn create_api(pipeline: Arc<LazyPipeline>, config: &AppConfig) -> Router {
    let state = AppState::new(pipeline);

    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/feedback", post(feedback_handler));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .merge(api.clone())
        .nest("/api", api)
        .layer(middleware::from_fn(process_time))
        .layer(GlobalConcurrencyLimitLayer::new(config.max_inflight_requests))
        .layer(cors_layer(config))
        .with_state(state)
}

async fn process_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&start.elapsed().as_secs_f64().to_string()) {
        response.headers_mut().insert("x-process-time", value);
    }
    response
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let start = Instant::now();
    let request = validated(payload)?;
    let query_id = state.next_query_id();
    info!("Processing chat request {}: {}", query_id, request.message);

    let answer = state
        .pipeline
        .ask(&request.message, request.top_k)
        .await
        .map_err(|e| {
            error!("Error in chat endpoint ({}): {}", query_id, e);
            api_error(status_for(&e), e.to_string())
        })?;

    Ok(Json(ChatResponse {
        answer: answer.text,
        sources: answer.sources,
        query_id,
        response_time: start.elapsed().as_secs_f64(),
    }))
}

async fn feedback_handler(
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FeedbackResponse>), ApiError> {
    let request = validated(payload)?;

    info!(
        "Received feedback for query {}: rating={}{}",
        request.query_id,
        request.rating,
        request
            .feedback
            .as_deref()
            .map(|text| format!(", feedback='{}'", text))
            .unwrap_or_default()
    );

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            status: "Feedback received".to_string(),
            query_id: request.query_id,
        }),
    ))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
    })
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "Welcome to Recipe Assistant API",
        "endpoints": {
            "/chat": "POST - Submit recipe questions (also under /api)",
            "/feedback": "POST - Submit feedback (also under /api)",
            "/health": "GET - Service health check"
        }
    }))
}
