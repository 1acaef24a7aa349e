use crate::{config::AppState, models::PresenceStatus, web::Ctx};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub online: Vec<String>,
}

/// GET /presence
pub async fn list_online(ctx: Ctx, State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    info!("GET /presence - {}", ctx.user_id());
    Json(OnlineUsersResponse {
        online: state.presence.online_users(),
    })
}

/// GET /presence/{user_id}
pub async fn get_presence(
    _ctx: Ctx,
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Json<PresenceStatus> {
    let online = state.presence.is_online(&user_id);
    Json(PresenceStatus { user_id, online })
}
