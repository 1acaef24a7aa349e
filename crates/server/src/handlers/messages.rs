use crate::{
    config::AppState,
    error::{Error, Result},
    models::{ConversationSummary, Message, PageQuery, Pagination, SendMessageInput},
    web::Ctx,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;

use super::UpdatedResponse;

const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// POST /messages
pub async fn send_message(
    ctx: Ctx,
    State(state): State<AppState>,
    body: std::result::Result<Json<SendMessageInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>)> {
    let Json(input) = body.map_err(Error::from)?;
    info!("POST /messages - {} -> {}", ctx.user_id(), input.receiver_id);

    let message = state.service.send_message(ctx.user_id(), input).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/conversations
pub async fn list_conversations(
    ctx: Ctx,
    State(state): State<AppState>,
) -> Result<Json<Vec<ConversationSummary>>> {
    info!("GET /messages/conversations - {}", ctx.user_id());
    Ok(Json(state.service.list_conversations(ctx.user_id()).await?))
}

/// GET /messages/conversation/{user_id}?page&limit
pub async fn conversation_history(
    ctx: Ctx,
    Path(other_user_id): Path<String>,
    Query(query): Query<PageQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>> {
    info!("GET /messages/conversation/{} - {}", other_user_id, ctx.user_id());

    let request = query.to_request(DEFAULT_PAGE_SIZE);
    let page = state
        .service
        .conversation_history(ctx.user_id(), &other_user_id, request)
        .await?;

    Ok(Json(HistoryResponse {
        messages: page.items,
        pagination: Pagination::new(request, page.total),
    }))
}

/// PUT /messages/conversation/{user_id}/read
pub async fn mark_conversation_read(
    ctx: Ctx,
    Path(other_user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UpdatedResponse>> {
    let updated = state
        .service
        .mark_conversation_read(ctx.user_id(), &other_user_id)
        .await?;
    info!(
        "PUT /messages/conversation/{}/read - {} marked {}",
        other_user_id,
        ctx.user_id(),
        updated
    );
    Ok(Json(UpdatedResponse { updated }))
}

/// GET /messages/unread-count
pub async fn unread_count(ctx: Ctx, State(state): State<AppState>) -> Result<Json<CountResponse>> {
    info!("GET /messages/unread-count - {}", ctx.user_id());
    let count = state.service.unread_count(ctx.user_id()).await?;
    Ok(Json(CountResponse { count }))
}
