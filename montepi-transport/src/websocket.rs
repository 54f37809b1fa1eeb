//! WebSocket sender: a Tokio server that broadcasts every frame to all
//! connected clients.

use crate::sender::{Sender, TransportError};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Frames buffered per client before a slow client starts skipping.
const CLIENT_BACKLOG: usize = 256;

pub struct WebSocketSender {
    tx: broadcast::Sender<Message>,
    clients: Arc<AtomicUsize>,
    local_addr: SocketAddr,
    // Owns the server tasks; dropping it stops the server.
    _runtime: Runtime,
}

impl WebSocketSender {
    /// Binds `host:port` and starts accepting clients in the background.
    pub fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("montepi-ws")
            .enable_all()
            .build()?;

        let addr = format!("{}:{}", host, port);
        let listener = runtime
            .block_on(TcpListener::bind(&addr))
            .map_err(|e| TransportError::WebSocket(format!("Failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let (tx, _) = broadcast::channel::<Message>(CLIENT_BACKLOG);
        let clients = Arc::new(AtomicUsize::new(0));
        runtime.spawn(accept_loop(listener, tx.clone(), Arc::clone(&clients)));

        info!("WebSocket server listening on: {}", local_addr);
        Ok(Self {
            tx,
            clients,
            local_addr,
            _runtime: runtime,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }
}

impl Sender for WebSocketSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // An error here only means nobody is connected.
        let _ = self.tx.send(frame_message(data));
        Ok(())
    }
}

/// Text frames for UTF-8 payloads, binary frames for everything else
/// (raw bincode).
fn frame_message(data: &[u8]) -> Message {
    match std::str::from_utf8(data) {
        Ok(text) => Message::Text(text.to_string()),
        Err(_) => Message::Binary(data.to_vec()),
    }
}

async fn accept_loop(listener: TcpListener, tx: broadcast::Sender<Message>, clients: Arc<AtomicUsize>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, tx.subscribe(), peer, Arc::clone(&clients)));
            }
            Err(e) => warn!("WebSocket accept error: {}", e),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut rx: broadcast::Receiver<Message>,
    peer: SocketAddr,
    clients: Arc<AtomicUsize>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Error during WebSocket handshake with {}: {}", peer, e);
            return;
        }
    };

    let count = clients.fetch_add(1, Ordering::SeqCst) + 1;
    info!("Client connected: {}. Total clients: {}", peer, count);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(message) => {
                    if let Err(e) = ws_sender.send(message).await {
                        if !is_disconnect_error(&e) {
                            warn!("WebSocket send error: {} - {}", peer, e);
                        }
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Client {} lagged, skipped {} frames", peer, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = ws_receiver.next() => match incoming {
                // Client messages are ignored.
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if !is_disconnect_error(&e) {
                        warn!("WebSocket receive error: {} - {}", peer, e);
                    }
                    break;
                }
            },
        }
    }

    let remaining = clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    info!("Client disconnected: {}. Total clients: {}", peer, remaining);
}

fn is_disconnect_error(e: &WsError) -> bool {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Io(io_err) => matches!(
            io_err.kind(),
            std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}
