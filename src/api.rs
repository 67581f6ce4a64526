//! REST API routes.
//!
//! Thin axum handlers over [`AssignmentEngine`]: validate the request body,
//! call the engine, wrap the result. Every failure is rendered as
//! `{"error": {"code": ..., "message": ...}}`.

use crate::error::{AppError, ErrorKind, ExistingEntity};
use crate::models::{NewTeam, PullRequest, PullRequestShort, Team, User};
use crate::services::AssignmentEngine;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for all routes.
pub type ApiState = Arc<AssignmentEngine>;

// ── Error handling ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// Wrapper to make AppError usable as an axum error response.
pub struct ApiErr(AppError);

impl ApiErr {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::AlreadyExists {
                kind: ExistingEntity::Team,
                ..
            } => StatusCode::BAD_REQUEST,
            err => match err.kind() {
                ErrorKind::AlreadyExists => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::NoCandidate => StatusCode::CONFLICT,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("[api] {}", self.0);
        }
        let body = ApiErrorEnvelope {
            error: ApiErrorBody {
                code: self.0.code().as_str(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<AppError> for ApiErr {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        log::warn!("[api] Invalid request body: {}", rejection.body_text());
        Self(AppError::invalid_input(rejection.body_text()))
    }
}

/// Fail with `InvalidInput` if a required string is blank.
fn require(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_input_field(
            format!("{} is required", field),
            field,
        ));
    }
    Ok(())
}

// ── Request and response types ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TeamQuery {
    team_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UserQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    #[serde(rename = "type")]
    stats_type: Option<String>,
}

#[derive(Deserialize)]
pub struct SetIsActiveRequest {
    user_id: String,
    is_active: bool,
}

#[derive(Deserialize)]
pub struct CreatePullRequest {
    pull_request_id: String,
    pull_request_name: String,
    author_id: String,
}

#[derive(Deserialize)]
pub struct MergePullRequest {
    pull_request_id: String,
}

#[derive(Deserialize)]
pub struct ReassignReviewer {
    pull_request_id: String,
    old_user_id: String,
}

#[derive(Serialize)]
pub struct TeamResponse {
    team: Team,
}

#[derive(Serialize)]
pub struct UserResponse {
    user: User,
}

#[derive(Serialize)]
pub struct ReviewsResponse {
    user_id: String,
    pull_requests: Vec<PullRequestShort>,
}

#[derive(Serialize)]
pub struct PullRequestResponse {
    pr: PullRequest,
}

#[derive(Serialize)]
pub struct ReassignResponse {
    pr: PullRequest,
    replaced_by: String,
}

// ── Route builder ────────────────────────────────────────────────────────────

/// Build the full router with request logging.
pub fn routes(engine: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/team/add", post(create_team))
        .route("/team/get", get(get_team))
        .route("/users/setIsActive", post(set_is_active))
        .route("/users/getReview", get(get_user_reviews))
        .route("/pullRequest/create", post(create_pull_request))
        .route("/pullRequest/merge", post(merge_pull_request))
        .route("/pullRequest/reassign", post(reassign_reviewer))
        .route("/stats", get(get_stats))
        .with_state(engine)
        .layer(middleware::from_fn(log_requests))
}

/// Log method, path, status and latency of every request, tagged with a
/// fresh request id that is also returned in `x-request-id`.
async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let mut response = next.run(request).await;

    log::info!(
        "[api] {} {} {} -> {} in {:?}",
        request_id,
        method,
        uri,
        response.status().as_u16(),
        started.elapsed()
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "reviewer-assign" }))
}

/// POST /team/add: create a team and upsert its members.
async fn create_team(
    State(engine): State<ApiState>,
    body: Result<Json<NewTeam>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiErr> {
    let Json(team) = body?;

    require(&team.team_name, "team_name")?;
    for member in &team.members {
        require(&member.user_id, "user_id")?;
        require(&member.username, "username")?;
    }

    let team = engine.create_team(&team).await?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

/// GET /team/get?team_name=X
async fn get_team(
    State(engine): State<ApiState>,
    Query(params): Query<TeamQuery>,
) -> Result<Json<Team>, ApiErr> {
    let team_name = params.team_name.unwrap_or_default();
    require(&team_name, "team_name")?;

    Ok(Json(engine.get_team(&team_name).await?))
}

/// POST /users/setIsActive
async fn set_is_active(
    State(engine): State<ApiState>,
    body: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiErr> {
    let Json(req) = body?;
    require(&req.user_id, "user_id")?;

    let user = engine.set_user_active(&req.user_id, req.is_active).await?;
    Ok(Json(UserResponse { user }))
}

/// GET /users/getReview?user_id=X: pull requests the user reviews.
async fn get_user_reviews(
    State(engine): State<ApiState>,
    Query(params): Query<UserQuery>,
) -> Result<Json<ReviewsResponse>, ApiErr> {
    let user_id = params.user_id.unwrap_or_default();
    require(&user_id, "user_id")?;

    let pull_requests = engine.user_reviews(&user_id).await?;
    Ok(Json(ReviewsResponse {
        user_id,
        pull_requests,
    }))
}

/// POST /pullRequest/create
async fn create_pull_request(
    State(engine): State<ApiState>,
    body: Result<Json<CreatePullRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequestResponse>), ApiErr> {
    let Json(req) = body?;
    require(&req.pull_request_id, "pull_request_id")?;
    require(&req.pull_request_name, "pull_request_name")?;
    require(&req.author_id, "author_id")?;

    let pr = engine
        .create_pull_request(&req.pull_request_id, &req.pull_request_name, &req.author_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

/// POST /pullRequest/merge
async fn merge_pull_request(
    State(engine): State<ApiState>,
    body: Result<Json<MergePullRequest>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiErr> {
    let Json(req) = body?;
    require(&req.pull_request_id, "pull_request_id")?;

    let pr = engine.merge_pull_request(&req.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pr }))
}

/// POST /pullRequest/reassign
async fn reassign_reviewer(
    State(engine): State<ApiState>,
    body: Result<Json<ReassignReviewer>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiErr> {
    let Json(req) = body?;
    require(&req.pull_request_id, "pull_request_id")?;
    require(&req.old_user_id, "old_user_id")?;

    let (pr, replaced_by) = engine
        .reassign_reviewer(&req.pull_request_id, &req.old_user_id)
        .await?;
    Ok(Json(ReassignResponse { pr, replaced_by }))
}

/// GET /stats?type=users|prs
async fn get_stats(
    State(engine): State<ApiState>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    match params.stats_type.as_deref() {
        None | Some("") => Ok(Json(json!({ "status": "ok" }))),
        Some("users") => {
            let stats = engine.user_stats().await?;
            Ok(Json(json!({ "stats": stats })))
        }
        Some("prs") => {
            let stats = engine.pull_request_stats().await?;
            Ok(Json(json!({ "stats": stats })))
        }
        Some(other) => Err(AppError::invalid_input_field(
            format!("invalid stats type '{}'", other),
            "type",
        )
        .into()),
    }
}
