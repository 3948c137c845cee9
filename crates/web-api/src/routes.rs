use application::PresenceRegistry;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use domain::{Notification, NotificationId, Pagination, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, ws};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/read", delete(delete_read))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/notifications/{id}", delete(delete_notification))
        .route("/presence/heartbeat", post(heartbeat))
        .route("/presence/typing", post(set_typing))
        .route("/presence/{user_id}", get(presence_of))
        .route("/presence/{user_id}/typing", get(typing_status))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// 校验身份并刷新在线状态
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(headers)?;
    state.presence.touch(user_id).await;
    Ok(user_id)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    #[serde(default)]
    unread_only: bool,
}

#[derive(Debug, Serialize)]
struct NotificationPageResponse {
    items: Vec<Notification>,
    unread_count: u64,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationPageResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let defaults = Pagination::default();
    let pagination = Pagination::new(
        query.limit.unwrap_or(defaults.limit),
        query.offset.unwrap_or(defaults.offset),
    );

    let page = state
        .notifications
        .list(user_id, pagination, query.unread_only)
        .await?;

    Ok(Json(NotificationPageResponse {
        items: page.items,
        unread_count: page.unread_count,
        limit: page.pagination.limit,
        offset: page.pagination.offset,
    }))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let count = state.notifications.unread_count(user_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .notifications
        .mark_read(user_id, NotificationId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let count = state.notifications.mark_all_read(user_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn delete_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    state
        .notifications
        .delete(user_id, NotificationId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CountResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let count = state.notifications.delete_all_read(user_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    counterpart_id: Uuid,
    is_typing: bool,
}

async fn set_typing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TypingPayload>,
) -> Result<StatusCode, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let counterpart_id = UserId::from(payload.counterpart_id);
    ws::publish_typing(&state, user_id, counterpart_id, payload.is_typing).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct PresenceResponse {
    user_id: UserId,
    online: bool,
    last_seen: Option<Timestamp>,
}

async fn presence_of(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceResponse>, ApiError> {
    authenticate(&state, &headers).await?;
    let user_id = UserId::from(user_id);
    Ok(Json(PresenceResponse {
        user_id,
        online: state.presence.is_online(user_id).await,
        last_seen: state.presence.last_seen(user_id).await,
    }))
}

#[derive(Debug, Serialize)]
struct TypingResponse {
    is_typing: bool,
}

/// `user_id` 是否正在给当前用户输入
async fn typing_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<TypingResponse>, ApiError> {
    let me = authenticate(&state, &headers).await?;
    let is_typing = state.presence.is_typing(UserId::from(user_id), me).await;
    Ok(Json(TypingResponse { is_typing }))
}
