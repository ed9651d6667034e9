//! WebSocket handler for real-time streaming
//!
//! The handshake is checked here, before the hub ever hears of the socket.
//! After the upgrade the socket is adapted to [`Frame`]s and handed to a
//! [`Connection`].

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt, future};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::api::middleware::auth::{authorize_stream, origin_allowed};
use crate::api::state::ApiState;
use crate::api::types::StreamQuery;
use crate::connection::{Connection, Frame};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(&state.settings.allowed_origins, &headers) {
        warn!("rejecting stream from disallowed origin");
        return ApiError::Forbidden("origin not allowed".to_string()).into_response();
    }

    if let Err(e) = authorize_stream(
        state.settings.auth_token.as_deref(),
        query.token.as_deref(),
        &headers,
    ) {
        debug!("rejecting stream handshake: {e:?}");
        return e.into_response();
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    let (sender, receiver) = socket.split();

    let sink = sender.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(into_message(frame))));
    let stream = receiver.map(|message| message.map(into_frame));

    Connection::new(state.hub.clone(), &state.connection)
        .with_shutdown(&state.shutdown)
        .serve(sink, stream)
        .await;
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Ping(data) => Message::Ping(data),
        Frame::Pong(data) => Message::Pong(data),
        Frame::Close => Message::Close(None),
    }
}

fn into_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text),
        Message::Binary(data) => Frame::Text(String::from_utf8_lossy(&data).into_owned()),
        Message::Ping(data) => Frame::Ping(data),
        Message::Pong(data) => Frame::Pong(data),
        Message::Close(_) => Frame::Close,
    }
}
