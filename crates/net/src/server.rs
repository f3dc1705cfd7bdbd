//! Listeners that turn accepted sockets into hub peers
//!
//! WebSocket clients pass their identity in the upgrade query string
//! (`/ws?userId=..&roomId=..&username=..`). Raw TCP clients send it as a
//! JSON hello in their first length-prefixed frame. A connection with an
//! incomplete identity is closed without ever joining the hub.

use std::net::SocketAddr;
use std::sync::Arc;

use signalhub_core::{HubConfig, Identity, ServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::hub::HubHandle;
use crate::protocol::Hello;
use crate::pump;
use crate::transport::{framed, websocket, FrameSink, FrameSource};

/// What every connection handler needs
struct ConnectionContext {
    hub: HubHandle,
    ws_path: String,
    mailbox_capacity: usize,
    max_frame_size: u32,
}

#[derive(Debug, Clone, Copy)]
enum Listener {
    WebSocket,
    Tcp,
}

/// Running listeners
pub struct Server {
    addr: SocketAddr,
    tcp_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the configured listeners and start accepting
    pub async fn start(server: &ServerConfig, limits: &HubConfig, hub: HubHandle) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let ctx = Arc::new(ConnectionContext {
            hub,
            ws_path: server.ws_path.clone(),
            mailbox_capacity: limits.mailbox_capacity,
            max_frame_size: limits.max_frame_size,
        });

        let listener = TcpListener::bind(server.listen).await?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, path = %server.ws_path, "WebSocket listener started");
        tokio::spawn(accept_loop(
            listener,
            Listener::WebSocket,
            ctx.clone(),
            shutdown_tx.subscribe(),
        ));

        let tcp_addr = match server.tcp_listen {
            Some(tcp_listen) => {
                let listener = TcpListener::bind(tcp_listen).await?;
                let tcp_addr = listener.local_addr()?;
                info!(addr = %tcp_addr, "TCP listener started");
                tokio::spawn(accept_loop(
                    listener,
                    Listener::Tcp,
                    ctx,
                    shutdown_tx.subscribe(),
                ));
                Some(tcp_addr)
            }
            None => None,
        };

        Ok(Server {
            addr,
            tcp_addr,
            shutdown_tx,
        })
    }

    /// WebSocket listener address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Raw TCP listener address, if enabled
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Stop accepting; established connections keep running
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Listener shutdown initiated");
    }
}

async fn accept_loop(
    listener: TcpListener,
    kind: Listener,
    ctx: Arc<ConnectionContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, listener = ?kind, "New connection");
                        let ctx = ctx.clone();
                        match kind {
                            Listener::WebSocket => tokio::spawn(handle_websocket(stream, addr, ctx)),
                            Listener::Tcp => tokio::spawn(handle_tcp(stream, addr, ctx)),
                        };
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!(listener = ?kind, "Accept loop shutting down");
                break;
            }
        }
    }
}

/// Read the identity parameters from an upgrade query string
pub fn identity_from_query(query: Option<&str>) -> Result<Identity> {
    let mut user_id = String::new();
    let mut room_id = String::new();
    let mut username = String::new();

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "userId" => user_id = value.into_owned(),
            "roomId" => room_id = value.into_owned(),
            "username" => username = value.into_owned(),
            _ => {}
        }
    }

    Ok(Identity::new(user_id, room_id, username)?)
}

async fn handle_websocket(stream: TcpStream, addr: SocketAddr, ctx: Arc<ConnectionContext>) {
    let mut query = None;
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(ctx.max_frame_size as usize);
    config.max_frame_size = Some(ctx.max_frame_size as usize);

    let callback = |request: &Request, response: Response| {
        if request.uri().path() != ctx.ws_path {
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }
        query = request.uri().query().map(str::to_string);
        Ok(response)
    };

    let mut ws =
        match tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config)).await
        {
            Ok(ws) => ws,
            Err(e) => {
                warn!(addr = %addr, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

    let identity = match identity_from_query(query.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Missing connection parameters, closing");
            let _ = ws.close(None).await;
            return;
        }
    };

    let (source, sink) = websocket(ws);
    run_peer(addr, identity, source, sink, &ctx).await;
}

async fn handle_tcp(stream: TcpStream, addr: SocketAddr, ctx: Arc<ConnectionContext>) {
    let (mut source, mut sink) = framed(stream, ctx.max_frame_size);

    let identity = match read_hello(&mut source).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Invalid hello, closing");
            let _ = sink.close().await;
            return;
        }
    };

    run_peer(addr, identity, source, sink, &ctx).await;
}

async fn read_hello<S: FrameSource>(source: &mut S) -> Result<Identity> {
    let frame = source.next_frame().await?.ok_or(Error::ConnectionClosed)?;
    let hello: Hello = serde_json::from_slice(&frame)
        .map_err(|e| Error::Rejected(format!("Bad hello: {}", e)))?;
    Ok(hello.into_identity()?)
}

async fn run_peer<S, K>(addr: SocketAddr, identity: Identity, source: S, sink: K, ctx: &ConnectionContext)
where
    S: FrameSource,
    K: FrameSink,
{
    info!(
        addr = %addr,
        peer_id = %identity.peer_id,
        room_id = %identity.room_id,
        username = %identity.username,
        "Peer connected"
    );

    if let Err(e) = pump::serve(ctx.hub.clone(), identity, source, sink, ctx.mailbox_capacity).await {
        error!(addr = %addr, error = %e, "Connection dropped");
    }

    debug!(addr = %addr, "Peer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use signalhub_core::{Config, RoomId};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (Server, HubHandle) {
        let mut config = Config::default();
        config.server.listen = "127.0.0.1:0".parse().unwrap();
        config.server.tcp_listen = Some("127.0.0.1:0".parse().unwrap());

        let hub = Hub::spawn(config.hub.event_buffer);
        let server = Server::start(&config.server, &config.hub, hub.clone())
            .await
            .unwrap();
        (server, hub)
    }

    async fn ws_connect(server: &Server, query: &str) -> Client {
        let url = format!("ws://{}/ws?{}", server.addr(), query);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    /// Next text frame as JSON; `None` once the server closed
    async fn next_json(ws: &mut Client) -> Option<Value> {
        loop {
            let message = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for message")?;
            match message {
                Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    #[test]
    fn test_identity_from_query() {
        let identity =
            identity_from_query(Some("userId=u1&roomId=r1&username=Ann%C3%A9e%20B")).unwrap();
        assert_eq!(identity.peer_id.as_str(), "u1");
        assert_eq!(identity.room_id.as_str(), "r1");
        assert_eq!(identity.username, "Année B");

        assert!(identity_from_query(Some("userId=u1&roomId=r1")).is_err());
        assert!(identity_from_query(Some("userId=u1&roomId=r1&username=")).is_err());
        assert!(identity_from_query(None).is_err());
    }

    #[tokio::test]
    async fn test_websocket_session() {
        let (server, hub) = start().await;

        let mut a = ws_connect(&server, "userId=A&roomId=r1&username=Alice").await;
        let list = next_json(&mut a).await.unwrap();
        assert_eq!(list["data"], json!([{"id": "A", "username": "Alice"}]));

        let mut b = ws_connect(&server, "userId=B&roomId=r1&username=Bob").await;
        let list = next_json(&mut b).await.unwrap();
        assert_eq!(list["data"].as_array().unwrap().len(), 2);
        assert_eq!(next_json(&mut a).await.unwrap()["type"], "user-joined");

        b.send(Message::Text(
            json!({"type": "offer", "data": {"sdp": "x"}}).to_string(),
        ))
        .await
        .unwrap();
        let offer = next_json(&mut a).await.unwrap();
        assert_eq!(offer["userId"], "B");
        assert_eq!(offer["roomId"], "r1");

        b.close(None).await.unwrap();
        assert_eq!(
            next_json(&mut a).await.unwrap(),
            json!({"type": "user-left", "userId": "B"})
        );
        assert_eq!(hub.rooms().await.unwrap(), vec![RoomId::from("r1")]);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_websocket_missing_params_closed() {
        let (server, hub) = start().await;

        let mut ws = ws_connect(&server, "userId=A&roomId=r1").await;
        assert!(next_json(&mut ws).await.is_none());
        assert!(hub.rooms().await.unwrap().is_empty());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_websocket_wrong_path_rejected() {
        let (server, _hub) = start().await;

        let url = format!("ws://{}/other?userId=A&roomId=r1&username=A", server.addr());
        assert!(connect_async(url).await.is_err());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_tcp_hello() {
        let (server, hub) = start().await;
        let tcp_addr = server.tcp_addr().unwrap();

        let stream = TcpStream::connect(tcp_addr).await.unwrap();
        let (mut source, mut sink) = framed(stream, 1024 * 1024);
        sink.send_frame(Arc::from(
            json!({"userId": "T", "roomId": "r2", "username": "Tcp"}).to_string(),
        ))
        .await
        .unwrap();

        let frame = timeout(Duration::from_secs(5), source.next_frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let list: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(list["type"], "user-list");
        assert_eq!(hub.members(RoomId::from("r2")).await.unwrap().len(), 1);

        // Bad hello: closed without joining
        let stream = TcpStream::connect(tcp_addr).await.unwrap();
        let (mut source, mut sink) = framed(stream, 1024 * 1024);
        sink.send_frame(Arc::from(r#"{"userId":"U"}"#)).await.unwrap();
        let end = timeout(Duration::from_secs(5), source.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert!(end.is_none());
        assert_eq!(hub.rooms().await.unwrap(), vec![RoomId::from("r2")]);

        server.shutdown();
    }
}
