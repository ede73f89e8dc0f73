//! HTTP intake: submit reviews and read stored outcomes.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use bounty_pipeline::{ContextJob, Pipeline};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Largest accepted request body; requirements text is the only large field.
pub const MAX_BODY_SIZE: usize = 262_144;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
}

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/github/review", post(handle_create_review))
        .route(
            "/api/github/review/{submission_url}/{bounty_id}",
            get(handle_get_review),
        )
        .with_state(AppState { pipeline })
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Serve `app` until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}

/// GET /health
async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "bounty-review" }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    #[serde(default)]
    submission_url: Option<String>,
    #[serde(default)]
    bounty_id: Option<String>,
    #[serde(default)]
    bounty_requirements: Option<String>,
}

impl ReviewRequest {
    /// Check every field, collecting one detail entry per problem.
    fn validate(self) -> Result<ContextJob, Vec<Value>> {
        let mut details = Vec::new();
        let mut required = |field: &str, value: Option<String>| {
            if value.is_none() {
                details.push(json!({ "path": [field], "message": "Required" }));
            }
            value.unwrap_or_default()
        };
        let submission_url = required("submissionUrl", self.submission_url);
        let bounty_id = required("bountyId", self.bounty_id);
        let bounty_requirements = required("bountyRequirements", self.bounty_requirements);

        if !submission_url.is_empty() && !is_http_url(&submission_url) {
            details.push(json!({ "path": ["submissionUrl"], "message": "Invalid url" }));
        }

        if details.is_empty() {
            Ok(ContextJob::new(submission_url, bounty_id, bounty_requirements))
        } else {
            Err(details)
        }
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn invalid_request(details: Vec<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": "Invalid request data",
            "details": details,
        })),
    )
}

/// POST /api/github/review: enqueue stage 1 for a submission.
async fn handle_create_review(
    State(state): State<AppState>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return invalid_request(vec![json!({ "message": rejection.body_text() })]);
        }
    };
    let job = match request.validate() {
        Ok(job) => job,
        Err(details) => return invalid_request(details),
    };

    match state.pipeline.submit(&job).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Review process initiated",
                "submissionUrl": job.submission.submission_url,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "error initiating review");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to initiate review" })),
            )
        }
    }
}

/// GET /api/github/review/{submission_url}/{bounty_id}
///
/// The submission URL arrives percent-encoded in a single path segment.
async fn handle_get_review(
    State(state): State<AppState>,
    Path((submission_url, bounty_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match state
        .pipeline
        .outcomes()
        .load(&submission_url, &bounty_id)
        .await
    {
        Ok(Some(outcome)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": outcome })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Review not found" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "error fetching review");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Failed to fetch review" })),
            )
        }
    }
}
