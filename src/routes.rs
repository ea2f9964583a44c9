use crate::{
    notification::{
        notification_dto::*,
        notification_handlers,
        notification_models::{Notification, NotificationStatus, Priority},
    },
    state::AppState,
    websocket::{self, types::ConnectionCountPayload},
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        notification_handlers::create_notification,
        notification_handlers::get_notifications,
        notification_handlers::get_notification,
        notification_handlers::mark_notification_viewed,
        notification_handlers::delete_notification,
        notification_handlers::get_connections,
    ),
    components(
        schemas(
            CreateNotificationRequest,
            CreateNotificationResponse,
            SuccessResponse,
            RemoveNotificationResponse,
            NotificationListResponse,
            Notification,
            NotificationStatus,
            Priority,
            ConnectionCountPayload,
        )
    ),
    tags(
        (name = "notifications", description = "Notification endpoints"),
        (name = "connections", description = "Live connection endpoints")
    )
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let notification_routes = Router::new()
        .route(
            "/",
            get(notification_handlers::get_notifications)
                .post(notification_handlers::create_notification),
        )
        .route(
            "/:id",
            get(notification_handlers::get_notification)
                .delete(notification_handlers::delete_notification),
        )
        .route(
            "/:id/viewed",
            post(notification_handlers::mark_notification_viewed),
        );

    let api_routes = Router::new()
        .nest("/notifications", notification_routes)
        .route("/connections", get(notification_handlers::get_connections));

    let ws_routes = Router::new()
        .route("/monitor", get(websocket::ws_monitor_handler))
        .route("/display", get(websocket::ws_display_handler));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api_routes)
        .nest("/ws", ws_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
