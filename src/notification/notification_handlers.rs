use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, Result},
    state::AppState,
    websocket::types::ConnectionCountPayload,
};
use super::notification_models::Notification;
use super::notification_dto::{
    CreateNotificationRequest, CreateNotificationResponse, NotificationListResponse,
    RemoveNotificationResponse, SuccessResponse,
};

/// Create a notification and push it to all displays
#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = CreateNotificationResponse),
        (status = 400, description = "Invalid input")
    ),
    tag = "notifications"
)]
pub async fn create_notification(
    State(state): State<AppState>,
    Json(payload): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let notification = state
        .registry
        .create(&payload.subject_code, payload.priority, payload.message)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateNotificationResponse {
            success: true,
            notification_id: notification.id,
        }),
    ))
}

/// List every active notification
#[utoipa::path(
    get,
    path = "/api/notifications",
    responses(
        (status = 200, description = "Active notifications", body = NotificationListResponse)
    ),
    tag = "notifications"
)]
pub async fn get_notifications(State(state): State<AppState>) -> Json<NotificationListResponse> {
    Json(NotificationListResponse {
        notifications: state.registry.list(),
    })
}

/// Get a single notification
#[utoipa::path(
    get,
    path = "/api/notifications/{id}",
    params(
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification found", body = Notification),
        (status = 404, description = "Notification not found")
    ),
    tag = "notifications"
)]
pub async fn get_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Result<Json<Notification>> {
    Uuid::parse_str(&notification_id)
        .ok()
        .and_then(|id| state.registry.get(&id))
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
}

/// Mark a notification as viewed
#[utoipa::path(
    post,
    path = "/api/notifications/{id}/viewed",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Whether the notification was pending", body = SuccessResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_notification_viewed(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Json<SuccessResponse> {
    let success = Uuid::parse_str(&notification_id)
        .map(|id| state.registry.mark_viewed(&id))
        .unwrap_or(false);

    Json(SuccessResponse { success })
}

/// Remove a notification
#[utoipa::path(
    delete,
    path = "/api/notifications/{id}",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Whether the notification existed", body = RemoveNotificationResponse)
    ),
    tag = "notifications"
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
) -> Json<RemoveNotificationResponse> {
    let success = Uuid::parse_str(&notification_id)
        .map(|id| state.registry.remove(&id))
        .unwrap_or(false);

    Json(RemoveNotificationResponse {
        success,
        notification_id,
    })
}

/// Current number of monitor and display connections
#[utoipa::path(
    get,
    path = "/api/connections",
    responses(
        (status = 200, description = "Connection counts", body = ConnectionCountPayload)
    ),
    tag = "connections"
)]
pub async fn get_connections(State(state): State<AppState>) -> Json<ConnectionCountPayload> {
    Json(state.registry.connection_counts())
}
