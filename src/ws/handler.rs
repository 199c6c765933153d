//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::verify_jwt;
use crate::modes::JoinRequest;
use crate::util::rate_limit::{create_limiter, BRIDGE_RATE_LIMIT};
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    // Verify JWT token before upgrading
    match verify_jwt(&query.token, &state.config.operator_jwt_secret) {
        Ok(claims) => {
            info!(bridge = %claims.sub, "WebSocket upgrade for chat bridge");
            ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, state))
        }
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, bridge: String, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, %bridge, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        connection_id,
        server_time: unix_millis(),
        machines: state
            .registry
            .list()
            .iter()
            .map(|s| s.name().to_string())
            .collect(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(%connection_id, error = %e, "Failed to send welcome");
        return;
    }

    let (out_tx, out_rx) = mpsc::channel::<ServerMsg>(256);
    let closed = CancellationToken::new();

    // Fan scheduler events from every machine into the outbound channel
    for scheduler in state.registry.list() {
        let events = scheduler.subscribe();
        tokio::spawn(forward_events(connection_id, events, out_tx.clone(), closed.clone()));
    }

    let writer_handle = tokio::spawn(write_loop(connection_id, ws_sink, out_rx));

    read_loop(connection_id, ws_stream, &state, &out_tx).await;

    closed.cancel();
    writer_handle.abort();
    info!(%connection_id, "WebSocket connection closed");
}

async fn forward_events(
    connection_id: Uuid,
    mut events: broadcast::Receiver<crate::game::SchedulerEvent>,
    out_tx: mpsc::Sender<ServerMsg>,
    closed: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = closed.cancelled() => break,
            received = events.recv() => received,
        };
        match received {
            Ok(event) => {
                if out_tx.send(ServerMsg::Event { event }).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%connection_id, lagged_count = n, "Bridge lagged, skipping {} events", n);
                // Continue - don't disconnect for lag
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_loop(
    connection_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = out_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(%connection_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

async fn read_loop(
    connection_id: Uuid,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    out_tx: &mpsc::Sender<ServerMsg>,
) {
    let frame_limiter = create_limiter(BRIDGE_RATE_LIMIT);

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if frame_limiter.check().is_err() {
                    warn!(%connection_id, "Rate limited bridge message");
                    continue;
                }

                let reply = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => handle_client_msg(state, msg),
                    Err(e) => {
                        warn!(%connection_id, error = %e, "Failed to parse client message");
                        ServerMsg::error("bad_message", e.to_string())
                    }
                };
                if out_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(%connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(%connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(%connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Route one bridge message to its scheduler and build the reply
fn handle_client_msg(state: &AppState, msg: ClientMsg) -> ServerMsg {
    let machine_name = match &msg {
        ClientMsg::Chat { machine, .. }
        | ClientMsg::Join { machine, .. }
        | ClientMsg::Leave { machine, .. } => machine.clone(),
        ClientMsg::Ping { t } => return ServerMsg::Pong { t: *t },
    };
    let Some(scheduler) = state.registry.get(&machine_name) else {
        return ServerMsg::error("unknown_machine", format!("Unknown machine: {}", machine_name));
    };

    match msg {
        ClientMsg::Chat { sender, text, .. } => {
            if !state.chat_limiter.check(&sender) {
                return ServerMsg::error("rate_limited", "Too many messages");
            }
            match scheduler.submit_message(&sender, &text) {
                Ok(result) => ServerMsg::Submitted {
                    machine: machine_name,
                    sender,
                    result,
                },
                Err(reason) => ServerMsg::error("rejected", reason.to_string()),
            }
        }
        ClientMsg::Join { sender, team, .. } => {
            let mut request = JoinRequest::new(sender);
            if let Some(team) = team {
                request = request.with_team(team);
            }
            match scheduler.join(request) {
                Ok(outcome) => ServerMsg::Joined {
                    machine: machine_name,
                    outcome,
                },
                Err(reason) => ServerMsg::error("rejected", reason.to_string()),
            }
        }
        ClientMsg::Leave { sender, .. } => match scheduler.leave(&sender) {
            Ok(()) => ServerMsg::Left {
                machine: machine_name,
                sender,
            },
            Err(reason) => ServerMsg::error("rejected", reason.to_string()),
        },
        ClientMsg::Ping { t } => ServerMsg::Pong { t },
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
