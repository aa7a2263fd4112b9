//! The minimal websocket/JSON bridge server: forwards every published
//! [`BridgeEvent`] to connected clients and dispatches their inbound
//! [`ClientCommand`]s to a caller-supplied [`ProgramRegistry`].

use crate::event::{BridgeEvent, ClientCommand};
use crate::sink::BroadcastEventSink;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use eyre::Result;
use futures::{SinkExt, StreamExt};
use labflow_engine::program::Program;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Resolves a running program by id so inbound client commands can be
/// routed to it. The CLI's `run` subcommand is the usual implementor,
/// backed by whatever table it keeps of programs spawned for the current
/// draft.
pub trait ProgramRegistry: Send + Sync {
    /// Look up the program currently registered under `program_id`.
    fn get(&self, program_id: &str) -> Option<Arc<dyn Program>>;
}

/// A handle to a running bridge server, used to shut it down gracefully.
#[derive(Debug)]
pub struct BridgeServerHandle {
    /// Address the server is bound to.
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
}

impl BridgeServerHandle {
    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Request the server to stop accepting connections and drain.
    pub fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("bridge server already shut down");
        }
    }
}

#[derive(Clone)]
struct BridgeState {
    sink: Arc<BroadcastEventSink>,
    registry: Arc<dyn ProgramRegistry>,
}

/// Start the bridge server bound to `addr`, forwarding events published on
/// `sink` to every connected websocket client.
pub async fn start_bridge_server(
    addr: SocketAddr,
    sink: Arc<BroadcastEventSink>,
    registry: Arc<dyn ProgramRegistry>,
) -> Result<BridgeServerHandle> {
    let state = BridgeState { sink, registry };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("bridge server failed");
    });

    info!("bridge server listening on {actual_addr}");

    Ok(BridgeServerHandle { addr: actual_addr, shutdown_tx })
}

async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "healthy", "service": "labflow-bridge" }))
}

async fn ws_upgrade(State(state): State<BridgeState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.sink.subscribe();

    let forward = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("bridge client lagged, skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    let dispatch = async {
        while let Some(Ok(message)) = receiver.next().await {
            let Message::Text(text) = message else { continue };
            match serde_json::from_str::<ClientCommand>(&text) {
                Ok(ClientCommand { program_id, message }) => match state.registry.get(&program_id) {
                    Some(program) => program.import_message(message),
                    None => debug!("client command for unknown program {program_id}"),
                },
                Err(err) => debug!("malformed client command: {err}"),
            }
        }
    };

    tokio::select! {
        _ = forward => {}
        _ = dispatch => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    struct EmptyRegistry;
    impl ProgramRegistry for EmptyRegistry {
        fn get(&self, _program_id: &str) -> Option<Arc<dyn Program>> {
            None
        }
    }

    #[tokio::test]
    async fn server_starts_and_health_check_responds() {
        let sink = Arc::new(BroadcastEventSink::default());
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let handle = start_bridge_server(addr, sink, Arc::new(EmptyRegistry)).await.unwrap();

        let response = reqwest_health(handle.addr()).await;
        assert!(response.contains("healthy"));

        handle.shutdown();
    }

    async fn reqwest_health(addr: SocketAddr) -> String {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut reader, mut writer) = stream.into_split();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        writer
            .write_all(format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).await.unwrap();
        buf
    }
}
