//! WebSocket connection handling
//!
//! Each connection runs two tasks: the reader below, which feeds frames to
//! the dispatcher, and a writer that drains the connection's outbound queue
//! into the socket with a bounded per-write timeout. Whichever side fails
//! first ends the connection; the registry entry is always removed before
//! the connection counts as closed.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use poker_core::{
    ConnectionContext, ConnectionError, ConnectionHandle, ConnectionLifecycle, DispatchOutcome,
    FrameKind, Outbound, ProtocolError, RoomId,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::http::RoomQuery;
use crate::middleware::CookieSettings;

/// Why a connection ended
#[derive(Debug)]
enum CloseReason {
    ClientClosed,
    ReadFailed(String),
    WriterStopped(Option<ConnectionError>),
    Protocol(ProtocolError),
    Shutdown,
}

/// WebSocket upgrade handler
///
/// The room id must be a canonical GUID. Without a valid session the caller
/// is redirected to the login surface unless anonymous participants are
/// allowed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let room = match RoomId::parse(&query.room_id) {
        Ok(room) => room,
        Err(e) => {
            debug!("Rejecting WebSocket upgrade: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let cookies = CookieSettings::from_config(&state.config);
    let session = match cookies.token(&headers) {
        Some(token) => state.sessions.check_and_renew(&token).await,
        None => None,
    };

    let identity = match &session {
        Some(session) => session.identity.clone(),
        None if state.config.allow_anonymous => String::new(),
        None => {
            debug!(room = %room, "WebSocket upgrade without session, redirecting to login");
            return Redirect::to(&state.config.login_path).into_response();
        }
    };

    let ctx = ConnectionContext::new(room, identity);
    let tracker = state.tasks.clone();
    let mut response =
        ws.on_upgrade(move |socket| tracker.track_future(handle_socket(socket, state, ctx)));

    if let Some(session) = session {
        match cookies.header_value(&session) {
            Ok(cookie) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Err(e) => warn!("Could not renew session cookie: {}", e),
        }
    }
    response
}

/// Handle an upgraded WebSocket for its whole lifetime
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, ctx: ConnectionContext) {
    let mut lifecycle = ConnectionLifecycle::new();
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = state.store.record_connection(&ctx).await {
        warn!(room = %ctx.room, "Refusing connection: {}", e);
        lifecycle.begin_close();
        let _ = sink.send(Message::Close(None)).await;
        let _ = lifecycle.finish_close();
        return;
    }

    let (handle, outbound) = ConnectionHandle::channel(ctx.clone(), state.config.outbound_buffer);
    state.registry.register(handle).await;
    if let Err(e) = lifecycle.open() {
        error!("Connection lifecycle error: {}", e);
    }
    info!(room = %ctx.room, connection = %ctx.id, anonymous = ctx.is_anonymous(), "WebSocket client connected");

    let mut writer = tokio::spawn(write_loop(sink, outbound, state.config.write_timeout));
    let mut writer_done = false;

    let reason = loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break CloseReason::Shutdown,

            result = &mut writer, if !writer_done => {
                writer_done = true;
                let error = match result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(e) => {
                        error!("Writer task failed: {}", e);
                        Some(ConnectionError::Closed)
                    }
                };
                break CloseReason::WriterStopped(error);
            }

            message = stream.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => Ok((text, FrameKind::Text)),
                    Some(Ok(Message::Binary(bytes))) => String::from_utf8(bytes)
                        .map(|text| (text, FrameKind::Binary))
                        .map_err(|_| ProtocolError::InvalidUtf8),
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break CloseReason::ReadFailed(e.to_string()),
                };

                let result = match frame {
                    Ok((text, kind)) => state.dispatcher.handle_frame(&ctx, &text, kind).await,
                    Err(e) => Err(e),
                };

                match result {
                    Ok(DispatchOutcome::Broadcast { report, .. }) => {
                        if !report.dropped.is_empty() {
                            debug!(room = %ctx.room, dropped = report.dropped.len(), "Broadcast dropped members");
                        }
                    }
                    Ok(_) => {}
                    Err(e) if state.config.drop_on_malformed_frame => {
                        break CloseReason::Protocol(e);
                    }
                    Err(e) => {
                        warn!(room = %ctx.room, connection = %ctx.id, "Ignoring malformed frame: {}", e);
                    }
                }
            }
        }
    };

    lifecycle.begin_close();
    state.registry.unregister(&ctx.room, ctx.id).await;

    // The writer sees its queue close once the registry entry is gone
    if !writer_done {
        let grace = state.config.write_timeout + Duration::from_millis(100);
        if tokio::time::timeout(grace, &mut writer).await.is_err() {
            writer.abort();
        }
    }

    if let Err(e) = lifecycle.finish_close() {
        error!("Connection lifecycle error: {}", e);
    }

    match &reason {
        CloseReason::ReadFailed(e) => {
            warn!(room = %ctx.room, connection = %ctx.id, "WebSocket read failed: {}", e);
        }
        CloseReason::Protocol(e) => {
            warn!(room = %ctx.room, connection = %ctx.id, "Dropping connection: {}", e);
        }
        CloseReason::WriterStopped(Some(e)) => {
            warn!(room = %ctx.room, connection = %ctx.id, "WebSocket write failed: {}", e);
        }
        _ => {}
    }
    info!(room = %ctx.room, connection = %ctx.id, ?reason, "WebSocket client disconnected");
}

/// Drain the outbound queue into the socket
///
/// Ends with `Ok` once the queue closes (the registry dropped the handle) and
/// with an error when a write fails or exceeds `write_timeout`.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    write_timeout: Duration,
) -> Result<(), ConnectionError> {
    while let Some(frame) = outbound.recv().await {
        let message = match frame.kind {
            FrameKind::Text => Message::Text(frame.payload),
            FrameKind::Binary => Message::Binary(frame.payload.into_bytes()),
        };
        match tokio::time::timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(ConnectionError::Closed),
            Err(_) => return Err(ConnectionError::WriteTimeout(write_timeout.as_millis() as u64)),
        }
    }

    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
    Ok(())
}
