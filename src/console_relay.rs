use axum::extract::ws::{Message as ClientMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as AgentMessage;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent_gateway;
use crate::PanelState;

type AgentStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

#[derive(Debug, Deserialize)]
struct AuthFrame {
    token: String,
}

/// What to do with one relayed frame. Data frames pass through verbatim;
/// ping/pong stay with the transport layers that generate them; a close on
/// either side ends the session.
enum Relayed<T> {
    Forward(T),
    Ignore,
    Close,
}

fn relay_client_frame(frame: ClientMessage) -> Relayed<AgentMessage> {
    match frame {
        ClientMessage::Text(text) => Relayed::Forward(AgentMessage::Text(text.as_str().into())),
        ClientMessage::Binary(data) => Relayed::Forward(AgentMessage::Binary(data)),
        ClientMessage::Ping(_) | ClientMessage::Pong(_) => Relayed::Ignore,
        ClientMessage::Close(_) => Relayed::Close,
    }
}

fn relay_agent_frame(frame: AgentMessage) -> Relayed<ClientMessage> {
    match frame {
        AgentMessage::Text(text) => Relayed::Forward(ClientMessage::Text(text.as_str().into())),
        AgentMessage::Binary(data) => Relayed::Forward(ClientMessage::Binary(data)),
        AgentMessage::Ping(_) | AgentMessage::Pong(_) | AgentMessage::Frame(_) => Relayed::Ignore,
        AgentMessage::Close(_) => Relayed::Close,
    }
}

fn parse_auth_frame(text: &str) -> Option<String> {
    serde_json::from_str::<AuthFrame>(text)
        .ok()
        .map(|frame| frame.token)
}

/// Browser console session: authenticate the first frame, dial the agent
/// console with the node-scoped secret, then run a transparent duplex
/// bridge until either side goes away.
pub async fn handle_console_session(mut socket: WebSocket, server_id: Uuid, state: PanelState) {
    let agent_stream = match establish(&mut socket, server_id, &state).await {
        Ok(stream) => stream,
        Err(reason) => {
            let frame = json!({ "type": "error", "message": reason }).to_string();
            let _ = socket.send(ClientMessage::Text(frame.into())).await;
            return;
        }
    };

    let banner = json!({ "type": "log", "line": "console session established" }).to_string();
    if socket
        .send(ClientMessage::Text(banner.into()))
        .await
        .is_err()
    {
        return;
    }

    bridge(socket, agent_stream, server_id).await;
}

/// Everything that must succeed before the agent side is dialed. Failures
/// here terminate the inbound connection with an explanatory frame and
/// never open the outbound one.
async fn establish(
    socket: &mut WebSocket,
    server_id: Uuid,
    state: &PanelState,
) -> Result<AgentStream, String> {
    let first = match socket.recv().await {
        Some(Ok(ClientMessage::Text(text))) => text,
        _ => return Err("expected an authentication frame".to_string()),
    };
    let token =
        parse_auth_frame(&first).ok_or_else(|| "malformed authentication frame".to_string())?;

    let user_id = state
        .auth
        .verify_user_token(&token)
        .map_err(|_| "invalid credentials".to_string())?;

    let server = state
        .store
        .server(server_id)
        .await
        .filter(|s| s.user_id == user_id)
        .ok_or_else(|| "server not found".to_string())?;

    let node = state
        .store
        .node(&server.node_id)
        .await
        .ok_or_else(|| "node unavailable".to_string())?;

    let request = agent_gateway::console_request(&node, server.id)
        .map_err(|_| "console unavailable".to_string())?;
    let (agent_stream, _) = connect_async(request)
        .await
        .map_err(|e| {
            debug!("Console dial to node {} failed: {}", node.id, e);
            "console unavailable".to_string()
        })?;

    info!(
        "Console session opened for server {} by user {}",
        server.id, user_id
    );
    Ok(agent_stream)
}

/// Two independent copy loops, one per direction, no shared buffer. Either
/// side closing or failing finishes its loop, the select ends, and dropping
/// both halves tears down the paired connection.
async fn bridge(socket: WebSocket, agent_stream: AgentStream, server_id: Uuid) {
    let (mut client_tx, mut client_rx) = socket.split();
    let (mut agent_tx, mut agent_rx) = agent_stream.split();

    let client_to_agent = async {
        while let Some(Ok(frame)) = client_rx.next().await {
            match relay_client_frame(frame) {
                Relayed::Forward(msg) => {
                    if agent_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Relayed::Ignore => {}
                Relayed::Close => break,
            }
        }
    };

    let agent_to_client = async {
        while let Some(Ok(frame)) = agent_rx.next().await {
            match relay_agent_frame(frame) {
                Relayed::Forward(msg) => {
                    if client_tx.send(msg).await.is_err() {
                        break;
                    }
                }
                Relayed::Ignore => {}
                Relayed::Close => break,
            }
        }
    };

    tokio::select! {
        _ = client_to_agent => {}
        _ = agent_to_client => {}
    }

    debug!("Console session for server {} closed", server_id);
}
