//! Route table

use crate::config::AppState;
use crate::handlers;
use crate::realtime::ws_upgrade;
use crate::web::mw_require_ctx;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        // Messages
        .route("/messages", post(handlers::send_message))
        .route("/messages/conversations", get(handlers::list_conversations))
        .route(
            "/messages/conversation/{user_id}",
            get(handlers::conversation_history),
        )
        .route(
            "/messages/conversation/{user_id}/read",
            put(handlers::mark_conversation_read),
        )
        .route("/messages/unread-count", get(handlers::unread_count))
        // Notifications
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/read-all", put(handlers::mark_all_notifications_read))
        .route(
            "/notifications/{id}/read",
            put(handlers::mark_notification_read),
        )
        .route(
            "/notifications/{id}",
            axum::routing::delete(handlers::delete_notification),
        )
        // Presence and realtime
        .route("/presence", get(handlers::list_online))
        .route("/presence/{user_id}", get(handlers::get_presence))
        .route("/ws", get(ws_upgrade))
        .route_layer(middleware::from_fn(mw_require_ctx));

    Router::new()
        .merge(authed)
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
