//! WebSocket endpoint
//!
//! One reader loop per socket plus a writer task draining the connection's
//! queue. Rejected frames are answered with an `error` event and the socket
//! stays open.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::events::{ClientEvent, ServerEvent};
use crate::config::AppState;
use crate::conversation::ensure_participant;
use crate::error::{Error, Result};
use crate::models::TypingSignal;
use crate::presence::ConnectionId;
use crate::web::Ctx;

const MAX_FRAME_BYTES: usize = 64 * 1024;

/// GET /ws
pub async fn ws_upgrade(
    ctx: Ctx,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user_id = ctx.user_id().to_string();
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: String, socket: WebSocket) {
    let (handle, mut outbound) = state.hub.register();
    info!(
        "{} connected as {} ({} open)",
        user_id,
        handle,
        state.hub.connection_count()
    );

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("socket {} errored: {}", handle, e);
                break;
            }
        };

        let outcome = match serde_json::from_str::<ClientEvent>(text.as_str()) {
            Ok(event) => apply(&state, handle, &user_id, event).await,
            Err(e) => Err(Error::Validation(format!("Malformed frame: {}", e))),
        };
        if let Err(e) = outcome {
            debug!("rejected frame from {}: {}", user_id, e);
            state.hub.send_to(handle, ServerEvent::error(e.client_message()));
        }
    }

    state.hub.unregister(handle);
    writer.abort();
    info!(
        "{} disconnected ({}, {} open)",
        user_id,
        handle,
        state.hub.connection_count()
    );
}

/// Act on one client frame sent over connection `handle` by `user_id`.
pub async fn apply(
    state: &AppState,
    handle: ConnectionId,
    user_id: &str,
    event: ClientEvent,
) -> Result<()> {
    match event {
        ClientEvent::PresenceJoin { user_id: claimed } => {
            if claimed != user_id {
                return Err(Error::Forbidden(
                    "Cannot join presence as another user".to_string(),
                ));
            }
            state.hub.identify(handle, user_id)
        }
        ClientEvent::RoomJoin { conversation_id } => {
            ensure_participant(&conversation_id, user_id)?;
            state.hub.join_room(handle, &conversation_id)
        }
        ClientEvent::RoomLeave { conversation_id } => {
            ensure_participant(&conversation_id, user_id)?;
            state.hub.leave_room(handle, &conversation_id);
            Ok(())
        }
        ClientEvent::MessageSend {
            conversation_id,
            message,
        } => {
            state
                .service
                .relay_message(handle, user_id, &conversation_id, &message.id)
                .await?;
            Ok(())
        }
        ClientEvent::TypingStart { conversation_id } => {
            let signal = typing_signal(conversation_id, user_id)?;
            let room = signal.conversation_id.clone();
            let except = HashSet::from([handle]);
            state.hub.to_room_except(&room, &ServerEvent::TypingStart(signal), &except);
            Ok(())
        }
        ClientEvent::TypingStop { conversation_id } => {
            let signal = typing_signal(conversation_id, user_id)?;
            let room = signal.conversation_id.clone();
            let except = HashSet::from([handle]);
            state.hub.to_room_except(&room, &ServerEvent::TypingStop(signal), &except);
            Ok(())
        }
    }
}

fn typing_signal(conversation_id: String, user_id: &str) -> Result<TypingSignal> {
    ensure_participant(&conversation_id, user_id)?;
    Ok(TypingSignal {
        conversation_id,
        user_id: user_id.to_string(),
    })
}
