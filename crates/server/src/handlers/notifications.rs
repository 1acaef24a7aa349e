use crate::{
    config::AppState,
    error::Result,
    models::{Notification, PageRequest, Pagination},
    web::Ctx,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::UpdatedResponse;

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub message: &'static str,
}

/// GET /notifications?page&limit&unreadOnly
pub async fn list_notifications(
    ctx: Ctx,
    Query(query): Query<NotificationQuery>,
    State(state): State<AppState>,
) -> Result<Json<NotificationListResponse>> {
    info!("GET /notifications - {}", ctx.user_id());
    let request = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    );
    let page = state
        .notifications
        .list_for(ctx.user_id(), request, query.unread_only)
        .await?;

    Ok(Json(NotificationListResponse {
        notifications: page.items,
        unread_count: page.unread_count,
        pagination: Pagination::new(request, page.total),
    }))
}

/// PUT /notifications/{id}/read
pub async fn mark_notification_read(
    ctx: Ctx,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Notification>> {
    info!("PUT /notifications/{}/read - {}", id, ctx.user_id());
    Ok(Json(state.notifications.mark_read(&id, ctx.user_id()).await?))
}

/// PUT /notifications/read-all
pub async fn mark_all_notifications_read(
    ctx: Ctx,
    State(state): State<AppState>,
) -> Result<Json<UpdatedResponse>> {
    let updated = state.notifications.mark_all_read(ctx.user_id()).await?;
    info!("PUT /notifications/read-all - {} marked {}", ctx.user_id(), updated);
    Ok(Json(UpdatedResponse { updated }))
}

/// DELETE /notifications/{id}
pub async fn delete_notification(
    ctx: Ctx,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>> {
    info!("DELETE /notifications/{} - {}", id, ctx.user_id());
    state.notifications.delete(&id, ctx.user_id()).await?;
    Ok(Json(DeletedResponse {
        message: "Notification deleted",
    }))
}
