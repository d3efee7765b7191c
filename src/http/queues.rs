//! Queue operation HTTP handlers.
//!
//! Each handler builds a command envelope, submits it through consensus,
//! and serializes the applied result. Message timestamps are stamped here,
//! before encoding, so the replicated apply never touches the clock.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::protocol::{Code, Command, CommandResult, Message, QueueConfig};

use super::cluster::apply_error_response;
use super::types::{
    AppState, CodeResponse, CreateQueueResponse, MessageResponse, QueueIdQuery, ViewResponse,
};

/// Liveness probe, leader-independent.
pub async fn ping() -> &'static str {
    "Pong"
}

pub async fn create_queue(
    State(raft): State<AppState>,
    Json(config): Json<QueueConfig>,
) -> Response {
    if config.name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Queue name must not be empty").into_response();
    }

    match raft.apply(Command::create_queue(config.clone())).await {
        Ok(result) => Json(CreateQueueResponse {
            code: result.result_code(),
            queue_config: config,
        })
        .into_response(),
        Err(err) => apply_error_response(err),
    }
}

pub async fn send_message(
    State(raft): State<AppState>,
    Query(query): Query<QueueIdQuery>,
    Json(mut message): Json<Message>,
) -> Response {
    if message.timestamp == 0 {
        message.timestamp = chrono::Utc::now().timestamp_millis() as u64;
    }

    match raft
        .apply(Command::send_message(&query.queue_id, message))
        .await
    {
        Ok(result) => message_response(result).into_response(),
        Err(err) => apply_error_response(err),
    }
}

pub async fn peek_message(
    State(raft): State<AppState>,
    Query(query): Query<QueueIdQuery>,
) -> Response {
    match raft.apply(Command::peek_message(&query.queue_id)).await {
        Ok(result) => message_response(result).into_response(),
        Err(err) => apply_error_response(err),
    }
}

pub async fn pop_message(
    State(raft): State<AppState>,
    Query(query): Query<QueueIdQuery>,
) -> Response {
    match raft.apply(Command::pop_message(&query.queue_id)).await {
        Ok(result) => Json(CodeResponse {
            code: result.result_code(),
        })
        .into_response(),
        Err(err) => apply_error_response(err),
    }
}

pub async fn requeue_message(
    State(raft): State<AppState>,
    Query(query): Query<QueueIdQuery>,
) -> Response {
    match raft.apply(Command::requeue(&query.queue_id)).await {
        Ok(result) => message_response(result).into_response(),
        Err(err) => apply_error_response(err),
    }
}

pub async fn view_all_messages(
    State(raft): State<AppState>,
    Query(query): Query<QueueIdQuery>,
) -> Response {
    match raft.apply(Command::view_queue(&query.queue_id)).await {
        Ok(CommandResult::Queue { code, messages }) => {
            Json(ViewResponse { code, messages }).into_response()
        }
        Ok(result) => Json(ViewResponse {
            code: result.result_code(),
            messages: Vec::new(),
        })
        .into_response(),
        Err(err) => apply_error_response(err),
    }
}

/// `{code, message?}` - the message is included only on OK.
fn message_response(result: CommandResult) -> Json<MessageResponse> {
    let code = result.result_code();
    let message = match result {
        CommandResult::Response(resp) if code == Code::Ok => resp.message,
        _ => None,
    };
    Json(MessageResponse { code, message })
}
