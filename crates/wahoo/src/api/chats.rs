use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use wahoo_db::{Chat, ChatSort, ListChatsOpts, ListMessagesOpts, Message};
use wahoo_ipc::SessionTransport;

use super::error::ApiError;
use super::state::AppState;
use super::{parse_flag, parse_limit};

#[derive(Debug, Deserialize)]
pub struct ChatsQuery {
    limit: Option<String>,
    sort_by: Option<String>,
    include_last_message: Option<String>,
}

/// GET /api/chats
pub async fn list_chats<T: SessionTransport>(
    State(state): State<AppState<T>>,
    Query(query): Query<ChatsQuery>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    let sort_by = match query.sort_by.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse::<ChatSort>().map_err(ApiError::BadRequest)?,
        None => ChatSort::default(),
    };

    let opts = ListChatsOpts {
        limit: parse_limit(query.limit.as_deref()),
        include_last_message: parse_flag(query.include_last_message.as_deref(), true),
        sort_by,
    };

    Ok(Json(state.store.list_chats(&opts).await?))
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    chat_jid: Option<String>,
    limit: Option<String>,
    include_context: Option<String>,
}

/// GET /api/messages
///
/// Newest first, the order the store returns them in.
pub async fn list_messages<T: SessionTransport>(
    State(state): State<AppState<T>>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let chat_jid = query
        .chat_jid
        .filter(|jid| !jid.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("chat_jid required".to_string()))?;

    let opts = ListMessagesOpts {
        limit: parse_limit(query.limit.as_deref()),
        include_context: parse_flag(query.include_context.as_deref(), false),
        ..ListMessagesOpts::new(chat_jid)
    };

    Ok(Json(state.store.list_messages(&opts).await?))
}
