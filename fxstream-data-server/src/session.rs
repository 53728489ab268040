use futures::{SinkExt, StreamExt};
use fxstream_data::{hub::ClientKind, protocol::ClientMessage, FxEngine};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        Message,
    },
};
use tracing::{debug, error, info};

/// Pull `client_type` out of the handshake query string
/// (`/ws/prices?client_type=bot`).
fn client_kind_from_query(query: Option<&str>) -> ClientKind {
    query
        .and_then(|query| {
            query.split('&').find_map(|pair| {
                pair.strip_prefix("client_type=")
                    .map(|value| value.parse().unwrap_or(ClientKind::Unknown))
            })
        })
        .unwrap_or(ClientKind::Unknown)
}

/// Drive one client connection: register with the hub (snapshot first),
/// then pump the outbound queue to the socket while applying inbound
/// messages, until either side ends.
pub async fn handle_connection(engine: Arc<FxEngine>, stream: TcpStream, peer_addr: SocketAddr) {
    let mut kind = ClientKind::Unknown;
    let ws_stream = match accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            kind = client_kind_from_query(request.uri().query());
            Ok(response)
        },
    )
    .await
    {
        Ok(ws) => ws,
        Err(error) => {
            error!(%error, %peer_addr, "websocket handshake failed");
            return;
        }
    };

    let client = engine.connect_client(kind);
    info!(client_id = client.id, %kind, %peer_addr, "websocket session started");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Writer: drain this client's private queue onto the socket. A stall
    // here backs up only this client's queue, never the ingest path.
    let queue = client.queue.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = queue.pop().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    error!(%error, "failed to serialise outbound message");
                }
            }
        }
    });

    // Reader: parse and apply client messages. Malformed input is ignored
    // silently per the protocol contract.
    let reader_engine = engine.clone();
    let client_id = client.id;
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(parsed) => reader_engine.handle_client_message(client_id, parsed),
                        Err(error) => {
                            debug!(%error, client_id, "ignored malformed client message");
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Ok(_) => {}
                Err(error) => {
                    debug!(%error, client_id, "websocket read error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    engine.disconnect_client(client.id);
    info!(client_id = client.id, %peer_addr, "websocket session closed");
}
