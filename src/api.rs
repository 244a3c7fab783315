//! HTTP route handlers.
//!
//! Identity travels as a plain `X-User-Id` header (sessions are out of
//! scope); every mutating handler resolves the acting user's role on the
//! target board before touching the store, so a Viewer cannot reorder even
//! with a hand-crafted request. After a successful mutation the handler
//! publishes a refresh signal so peer clients refetch.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DbHandle;
use crate::errors::StoreError;
use crate::models::*;
use crate::notify::{BoardSignal, BroadcastNotifier, Notifier};

pub const USER_ID_HEADER: &str = "x-user-id";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub notifier: BroadcastNotifier,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: i64,
    pub role: BoardRole,
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Deserialize)]
pub struct CreateLaneRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct RenameLaneRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
}

/// Content edits only; `order` and `lane_id` are owned by the reorder paths.
#[derive(Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub clear_description: bool,
    #[serde(default)]
    pub clear_due_date: bool,
    #[serde(default)]
    pub clear_category: bool,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Deserialize)]
pub struct UpdateLaneOrderRequest {
    pub lanes: Vec<OrderUpdate>,
}

#[derive(Deserialize)]
pub struct UpdateTaskOrderRequest {
    pub tasks: Vec<OrderUpdate>,
}

#[derive(Deserialize)]
pub struct MoveTaskRequest {
    pub task_id: i64,
    pub new_lane_id: i64,
    pub tasks: Vec<OrderUpdate>,
}

#[derive(Serialize)]
pub struct BoardMeta {
    #[serde(flatten)]
    pub board: Board,
    pub categories: Vec<TaskCategory>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Unauthorized { .. } => ApiError::Unauthorized(err.to_string()),
            StoreError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
            StoreError::Sqlite(_) | StoreError::Internal(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/workspaces", post(create_workspace))
        .route("/api/workspaces/{id}/boards", post(create_board))
        .route("/api/boards/{id}", get(get_board).delete(delete_board))
        .route("/api/boards/{id}/full", get(get_board_full))
        .route("/api/boards/{id}/members", post(add_member))
        .route("/api/boards/{id}/categories", post(create_category))
        .route("/api/boards/{id}/lanes", post(create_lane))
        .route("/api/lanes/{id}", patch(rename_lane).delete(delete_lane))
        .route("/api/lanes/{id}/tasks", post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/tasks/{id}/assignees", post(assign_user))
        .route("/api/tasks/{id}/assignees/{user_id}", axum::routing::delete(unassign_user))
        .route("/api/tasks/{id}/comments", post(add_comment))
        .route("/api/boards/{id}/lanes/order", patch(update_lane_order))
        .route("/api/boards/{id}/tasks/order", patch(update_task_order_same_lane))
        .route("/api/boards/{id}/tasks/move", patch(update_task_order_different_lane))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Acting user from the `X-User-Id` header; required for mutations.
fn acting_user(headers: &HeaderMap) -> Result<i64, ApiError> {
    acting_user_opt(headers).ok_or_else(|| {
        ApiError::Unauthorized(format!("missing or invalid {} header", USER_ID_HEADER))
    })
}

fn acting_user_opt(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
}

/// Reject malformed names before any persistence attempt.
fn validate_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn notify_refresh(state: &SharedState, board_id: i64, user_id: i64) {
    state
        .notifier
        .publish(BoardSignal::Refresh { board_id, user_id });
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_len("name", &req.name, 1, 50)?;
    let user = state.db.call(move |db| db.create_user(&req.name)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn create_workspace(
    State(state): State<SharedState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_len("name", &req.name, 1, 50)?;
    let ws = state
        .db
        .call(move |db| db.create_workspace(&req.name))
        .await?;
    Ok((StatusCode::CREATED, Json(ws)))
}

async fn create_board(
    State(state): State<SharedState>,
    Path(workspace_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("name", &req.name, 3, 50)?;
    let board = state
        .db
        .call(move |db| db.create_board(workspace_id, &req.name, req.is_public, user_id))
        .await?;
    Ok((StatusCode::CREATED, Json(board)))
}

async fn get_board(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user_opt(&headers);
    let meta = state
        .db
        .call(move |db| {
            let board = db.authorize_read(user_id, board_id)?;
            let categories = db.list_categories(board_id)?;
            Ok(BoardMeta { board, categories })
        })
        .await?;
    Ok(Json(meta))
}

async fn get_board_full(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user_opt(&headers);
    let full = state
        .db
        .call(move |db| {
            db.authorize_read(user_id, board_id)?;
            db.get_board_full(board_id)
        })
        .await?;
    Ok(Json(full))
}

async fn delete_board(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    state
        .db
        .call(move |db| {
            db.authorize_manage(user_id, board_id)?;
            db.delete_board(board_id)?;
            Ok(())
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    state
        .db
        .call(move |db| {
            db.authorize_manage(user_id, board_id)?;
            db.upsert_member(board_id, req.user_id, req.role)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_category(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("name", &req.name, 1, 30)?;
    let category = state
        .db
        .call(move |db| {
            db.authorize_edit(user_id, board_id)?;
            db.create_category(board_id, &req.name, &req.color)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok((StatusCode::CREATED, Json(category)))
}

async fn create_lane(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CreateLaneRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("name", &req.name, 1, 30)?;
    let lane = state
        .db
        .call(move |db| {
            db.authorize_edit(user_id, board_id)?;
            db.create_lane(board_id, &req.name)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok((StatusCode::CREATED, Json(lane)))
}

async fn rename_lane(
    State(state): State<SharedState>,
    Path(lane_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<RenameLaneRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("name", &req.name, 1, 30)?;
    let (board_id, lane) = state
        .db
        .call(move |db| {
            let board_id = db.lane_board(lane_id)?;
            db.authorize_edit(user_id, board_id)?;
            let lane = db.rename_lane(lane_id, &req.name)?;
            Ok((board_id, lane))
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(Json(lane))
}

async fn delete_lane(
    State(state): State<SharedState>,
    Path(lane_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    let board_id = state
        .db
        .call(move |db| {
            let board_id = db.lane_board(lane_id)?;
            db.authorize_edit(user_id, board_id)?;
            db.delete_lane(lane_id)?;
            Ok(board_id)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn create_task(
    State(state): State<SharedState>,
    Path(lane_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("title", &req.title, 1, 100)?;
    let (board_id, task) = state
        .db
        .call(move |db| {
            let board_id = db.lane_board(lane_id)?;
            db.authorize_edit(user_id, board_id)?;
            let task = db.create_task(lane_id, &req.title)?;
            Ok((board_id, task))
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<SharedState>,
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    if let Some(title) = &req.title {
        validate_len("title", title, 1, 100)?;
    }
    let (board_id, task) = state
        .db
        .call(move |db| {
            let board_id = db.task_board(task_id)?;
            db.authorize_edit(user_id, board_id)?;
            let description = if req.clear_description {
                Some(None)
            } else {
                req.description.as_deref().map(Some)
            };
            let due_date = if req.clear_due_date {
                Some(None)
            } else {
                req.due_date.map(Some)
            };
            let category_id = if req.clear_category {
                Some(None)
            } else {
                req.category_id.map(Some)
            };
            let task = db.update_task(
                task_id,
                req.title.as_deref(),
                description,
                due_date,
                category_id,
            )?;
            Ok((board_id, task))
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<SharedState>,
    Path(task_id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    let board_id = state
        .db
        .call(move |db| {
            let board_id = db.task_board(task_id)?;
            db.authorize_edit(user_id, board_id)?;
            db.delete_task(task_id)?;
            Ok(board_id)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_user(
    State(state): State<SharedState>,
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    let board_id = state
        .db
        .call(move |db| {
            let board_id = db.task_board(task_id)?;
            db.authorize_edit(user_id, board_id)?;
            db.assign_user(task_id, req.user_id)?;
            Ok(board_id)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn unassign_user(
    State(state): State<SharedState>,
    Path((task_id, assignee_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    let board_id = state
        .db
        .call(move |db| {
            let board_id = db.task_board(task_id)?;
            db.authorize_edit(user_id, board_id)?;
            db.unassign_user(task_id, assignee_id)?;
            Ok(board_id)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_comment(
    State(state): State<SharedState>,
    Path(task_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    validate_len("body", &req.body, 1, 1000)?;
    let (board_id, comment) = state
        .db
        .call(move |db| {
            let board_id = db.task_board(task_id)?;
            // any member may comment, including viewers
            db.authorize_read(Some(user_id), board_id)?;
            let comment = db.add_comment(task_id, user_id, &req.body)?;
            Ok((board_id, comment))
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok((StatusCode::CREATED, Json(comment)))
}

// ── Order batches ─────────────────────────────────────────────────────

async fn update_lane_order(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateLaneOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    if req.lanes.is_empty() {
        return Err(ApiError::BadRequest("lanes must not be empty".into()));
    }
    state
        .db
        .call(move |db| {
            db.authorize_edit(user_id, board_id)?;
            db.update_lane_order(board_id, &req.lanes)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_task_order_same_lane(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateTaskOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    if req.tasks.is_empty() {
        return Err(ApiError::BadRequest("tasks must not be empty".into()));
    }
    state
        .db
        .call(move |db| {
            db.authorize_edit(user_id, board_id)?;
            db.update_task_order_same_lane(board_id, &req.tasks)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_task_order_different_lane(
    State(state): State<SharedState>,
    Path(board_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<MoveTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = acting_user(&headers)?;
    if req.tasks.is_empty() {
        return Err(ApiError::BadRequest("tasks must not be empty".into()));
    }
    state
        .db
        .call(move |db| {
            db.authorize_edit(user_id, board_id)?;
            db.update_task_order_different_lane(board_id, req.task_id, req.new_lane_id, &req.tasks)
        })
        .await?;
    notify_refresh(&state, board_id, user_id);
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::BoardDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = BoardDb::new_in_memory().unwrap();
        Arc::new(AppState {
            db: DbHandle::new(db),
            notifier: BroadcastNotifier::new(16),
        })
    }

    fn test_app_with_state(state: SharedState) -> Router {
        api_router().with_state(state)
    }

    fn test_app() -> Router {
        test_app_with_state(test_state())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, user: Option<i64>, body: serde_json::Value) -> Request<Body> {
        request("POST", uri, user, Some(body))
    }

    fn request(
        method: &str,
        uri: &str,
        user: Option<i64>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user.to_string());
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    /// Seed a user, workspace and private board; returns (user_id, board_id).
    fn seed_board(state: &SharedState) -> (i64, i64) {
        let db = state.db.lock_sync().unwrap();
        let user = db.create_user("alice").unwrap();
        let ws = db.create_workspace("acme").unwrap();
        let board = db.create_board(ws.id, "roadmap", false, user.id).unwrap();
        (user.id, board.id)
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_user_workspace_board_flow() {
        let state = test_state();
        let app = test_app_with_state(state);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/users",
                None,
                serde_json::json!({"name": "alice"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let user: User = body_json(response.into_body()).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/workspaces",
                None,
                serde_json::json!({"name": "acme"}),
            ))
            .await
            .unwrap();
        let ws: Workspace = body_json(response.into_body()).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/workspaces/{}/boards", ws.id),
                Some(user.id),
                serde_json::json!({"name": "roadmap"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let board: Board = body_json(response.into_body()).await;
        assert_eq!(board.name, "roadmap");
        assert!(!board.is_public);
    }

    #[tokio::test]
    async fn test_board_name_too_short_is_rejected() {
        let state = test_state();
        let (user_id, _) = seed_board(&state);
        let app = test_app_with_state(state);

        let response = app
            .oneshot(post_json(
                "/api/workspaces/1/boards",
                Some(user_id),
                serde_json::json!({"name": "ab"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_member_gets_unauthorized_not_not_found() {
        let state = test_state();
        let (_, board_id) = seed_board(&state);
        let outsider = {
            let db = state.db.lock_sync().unwrap();
            db.create_user("mallory").unwrap().id
        };
        let app = test_app_with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/api/boards/{}/full", board_id),
                Some(outsider),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request("GET", "/api/boards/9999/full", Some(outsider), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mutation_without_user_header_is_unauthorized() {
        let state = test_state();
        let (_, board_id) = seed_board(&state);
        let app = test_app_with_state(state);

        let response = app
            .oneshot(post_json(
                &format!("/api/boards/{}/lanes", board_id),
                None,
                serde_json::json!({"name": "Todo"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_viewer_cannot_reorder_server_side() {
        let state = test_state();
        let (owner, board_id) = seed_board(&state);
        let viewer = {
            let db = state.db.lock_sync().unwrap();
            let viewer = db.create_user("vera").unwrap();
            db.upsert_member(board_id, viewer.id, BoardRole::Viewer)
                .unwrap();
            db.create_lane(board_id, "Todo").unwrap();
            db.create_lane(board_id, "Done").unwrap();
            viewer.id
        };
        let app = test_app_with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/boards/{}/lanes/order", board_id),
                Some(viewer),
                Some(serde_json::json!({"lanes": [
                    {"id": 1, "order": 1}, {"id": 2, "order": 0}
                ]})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // owner may reorder
        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/api/boards/{}/lanes/order", board_id),
                Some(owner),
                Some(serde_json::json!({"lanes": [
                    {"id": 1, "order": 1}, {"id": 2, "order": 0}
                ]})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_lane_create_appends_and_full_read_is_ordered() {
        let state = test_state();
        let (user_id, board_id) = seed_board(&state);
        let app = test_app_with_state(state);

        for name in ["Todo", "Doing", "Done"] {
            let response = app
                .clone()
                .oneshot(post_json(
                    &format!("/api/boards/{}/lanes", board_id),
                    Some(user_id),
                    serde_json::json!({"name": name}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(request(
                "GET",
                &format!("/api/boards/{}/full", board_id),
                Some(user_id),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let full: FullBoard = body_json(response.into_body()).await;
        let names: Vec<&str> = full
            .lanes
            .iter()
            .map(|l| l.lane.name.as_str())
            .collect();
        assert_eq!(names, vec!["Todo", "Doing", "Done"]);
        let orders: Vec<i64> = full.lanes.iter().map(|l| l.lane.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_reorder_failure_applies_nothing() {
        let state = test_state();
        let (user_id, board_id) = seed_board(&state);
        let (l1, l2) = {
            let db = state.db.lock_sync().unwrap();
            let l1 = db.create_lane(board_id, "A").unwrap();
            let l2 = db.create_lane(board_id, "B").unwrap();
            (l1.id, l2.id)
        };
        let app = test_app_with_state(state.clone());

        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/api/boards/{}/lanes/order", board_id),
                Some(user_id),
                Some(serde_json::json!({"lanes": [
                    {"id": l1, "order": 1},
                    {"id": 9999, "order": 0},
                    {"id": l2, "order": 0}
                ]})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let db = state.db.lock_sync().unwrap();
        let lanes = db.list_lanes(board_id).unwrap();
        let orders: Vec<i64> = lanes.iter().map(|l| l.lane.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_reorder_batch_cannot_reach_another_board() {
        let state = test_state();
        let (_, board_a) = seed_board(&state);
        let (a1, a2, mallory, board_b) = {
            let db = state.db.lock_sync().unwrap();
            let a1 = db.create_lane(board_a, "A1").unwrap();
            let a2 = db.create_lane(board_a, "A2").unwrap();
            let mallory = db.create_user("mallory").unwrap();
            let ws = db.create_workspace("evil").unwrap();
            let board_b = db.create_board(ws.id, "own board", false, mallory.id).unwrap();
            db.create_lane(board_b.id, "B1").unwrap();
            (a1.id, a2.id, mallory.id, board_b.id)
        };
        let app = test_app_with_state(state.clone());

        // mallory edits her own board's URL but names board A's lane ids.
        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/api/boards/{}/lanes/order", board_b),
                Some(mallory),
                Some(serde_json::json!({"lanes": [
                    {"id": a1, "order": 1}, {"id": a2, "order": 0}
                ]})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let db = state.db.lock_sync().unwrap();
        let lanes = db.list_lanes(board_a).unwrap();
        let ids: Vec<i64> = lanes.iter().map(|l| l.lane.id).collect();
        assert_eq!(ids, vec![a1, a2]);
    }

    #[tokio::test]
    async fn test_move_cannot_poach_task_from_another_board() {
        let state = test_state();
        let (_, board_a) = seed_board(&state);
        let (victim, mallory, board_b, lane_b) = {
            let db = state.db.lock_sync().unwrap();
            let lane_a = db.create_lane(board_a, "A1").unwrap();
            let victim = db.create_task(lane_a.id, "victim").unwrap();
            let mallory = db.create_user("mallory").unwrap();
            let ws = db.create_workspace("evil").unwrap();
            let board_b = db.create_board(ws.id, "own board", false, mallory.id).unwrap();
            let lane_b = db.create_lane(board_b.id, "B1").unwrap();
            (victim.id, mallory.id, board_b.id, lane_b.id)
        };
        let app = test_app_with_state(state.clone());

        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/api/boards/{}/tasks/move", board_b),
                Some(mallory),
                Some(serde_json::json!({
                    "task_id": victim,
                    "new_lane_id": lane_b,
                    "tasks": [{"id": victim, "order": 0}],
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let db = state.db.lock_sync().unwrap();
        let task = db.get_task(victim).unwrap().unwrap();
        assert_ne!(task.lane_id, lane_b);
    }

    #[tokio::test]
    async fn test_update_task_clears_description() {
        let state = test_state();
        let (user_id, board_id) = seed_board(&state);
        let task_id = {
            let db = state.db.lock_sync().unwrap();
            let lane = db.create_lane(board_id, "Todo").unwrap();
            db.create_task(lane.id, "plan").unwrap().id
        };
        let app = test_app_with_state(state);

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/tasks/{}", task_id),
                Some(user_id),
                Some(serde_json::json!({"description": "draft"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task: Task = body_json(response.into_body()).await;
        assert_eq!(task.description.as_deref(), Some("draft"));

        let response = app
            .oneshot(request(
                "PATCH",
                &format!("/api/tasks/{}", task_id),
                Some(user_id),
                Some(serde_json::json!({"clear_description": true})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let task: Task = body_json(response.into_body()).await;
        assert_eq!(task.description, None);
    }

    #[tokio::test]
    async fn test_mutations_publish_refresh_signal() {
        let state = test_state();
        let (user_id, board_id) = seed_board(&state);
        let mut rx = state.notifier.subscribe();
        let app = test_app_with_state(state);

        let response = app
            .oneshot(post_json(
                &format!("/api/boards/{}/lanes", board_id),
                Some(user_id),
                serde_json::json!({"name": "Todo"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let signal = rx.recv().await.unwrap();
        assert_eq!(signal, BoardSignal::Refresh { board_id, user_id });
    }
}
