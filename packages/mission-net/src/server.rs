use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mission_types::wire::{decode_payload, encode};
use mission_types::{Message, SessionErrorKind};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no peer connected")]
    NoPeer,
}

/// Callback surface matching the original `Server::handlers` struct.
#[derive(Default)]
pub struct Handlers {
    pub on_connect: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_message: Option<Box<dyn Fn(Message) + Send + Sync>>,
    pub on_error: Option<Box<dyn Fn(SessionErrorKind, String) + Send + Sync>>,
}

impl Handlers {
    fn fire_connect(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }
    fn fire_message(&self, msg: Message) {
        if let Some(f) = &self.on_message {
            f(msg);
        }
    }
    fn fire_error(&self, kind: SessionErrorKind, detail: String) {
        if let Some(f) = &self.on_error {
            f(kind, detail);
        }
    }
}

/// A framed TCP server with at most one active peer. New connections are
/// only accepted after an explicit [`SessionServer::accept_new_connection`]
/// call, mirroring the original's "post a new accept only after error"
/// discipline.
pub struct SessionServer {
    handlers: Arc<Handlers>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    shutting_down: Arc<AtomicBool>,
    accept_gate: Arc<Notify>,
}

impl SessionServer {
    pub fn new(handlers: Handlers) -> Self {
        Self {
            handlers: Arc::new(handlers),
            writer: Arc::new(Mutex::new(None)),
            shutting_down: Arc::new(AtomicBool::new(false)),
            accept_gate: Arc::new(Notify::new()),
        }
    }

    /// Bind and accept exactly one pending connection at a time.
    pub async fn listen(&self, addr: SocketAddr) -> Result<(), SessionError> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(1024)?;

        let handlers = self.handlers.clone();
        let writer = self.writer.clone();
        let shutting_down = self.shutting_down.clone();
        let accept_gate = self.accept_gate.clone();

        tokio::spawn(async move {
            loop {
                if shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!("accepted connection from {peer}");
                        run_connection(stream, handlers.clone(), writer.clone()).await;
                    }
                    Err(e) => {
                        handlers.fire_error(SessionErrorKind::Connecting, e.to_string());
                    }
                }
                if shutting_down.load(Ordering::SeqCst) {
                    return;
                }
                // Wait for an explicit re-accept request before posting another.
                accept_gate.notified().await;
            }
        });

        Ok(())
    }

    /// Dial `addr` outbound, same callback surface as `listen`.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), SessionError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            self.handlers
                .fire_error(SessionErrorKind::Connecting, e.to_string());
            e
        })?;

        let handlers = self.handlers.clone();
        let writer = self.writer.clone();
        tokio::spawn(async move {
            run_connection(stream, handlers, writer).await;
        });

        Ok(())
    }

    /// Signal that the listener should post a new accept (called after the
    /// active peer has been lost to an error).
    pub fn accept_new_connection(&self) {
        self.accept_gate.notify_one();
    }

    /// Serialize-and-send `msg` on the current peer. Raises `SENDING` on
    /// write failure or if there is no active peer.
    pub async fn deliver(&self, msg: &Message) -> Result<(), SessionError> {
        let framed = match encode(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.handlers
                    .fire_error(SessionErrorKind::Sending, e.to_string());
                return Err(SessionError::NoPeer);
            }
        };

        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(w) => {
                if let Err(e) = w.write_all(&framed).await {
                    self.handlers
                        .fire_error(SessionErrorKind::Sending, e.to_string());
                    *guard = None;
                    return Err(SessionError::Io(e));
                }
                Ok(())
            }
            None => {
                self.handlers
                    .fire_error(SessionErrorKind::Sending, "no active peer".into());
                Err(SessionError::NoPeer)
            }
        }
    }

    pub fn close(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.accept_gate.notify_one();
    }

    pub async fn has_peer(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

async fn run_connection(
    stream: TcpStream,
    handlers: Arc<Handlers>,
    writer_slot: Arc<Mutex<Option<OwnedWriteHalf>>>,
) {
    let (mut read_half, write_half) = stream.into_split();
    *writer_slot.lock().await = Some(write_half);
    handlers.fire_connect();

    loop {
        let mut len_buf = [0u8; 4];
        match read_half.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) => {
                handlers.fire_error(SessionErrorKind::Reading, e.to_string());
                break;
            }
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut payload = vec![0u8; len];
        if let Err(e) = read_half.read_exact(&mut payload).await {
            handlers.fire_error(SessionErrorKind::Reading, e.to_string());
            break;
        }

        match decode_payload(&payload) {
            Ok(msg) => handlers.fire_message(msg),
            Err(e) => warn!("discarding unparseable payload: {e}"),
        }
    }

    *writer_slot.lock().await = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn listen_then_connect_exchanges_a_message() {
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        let mut server_handlers = Handlers::default();
        server_handlers.on_message = Some(Box::new(move |msg| {
            if let Message::Status { type_status } = msg {
                assert_eq!(type_status, "WAITING_INFO");
            }
            received_clone.fetch_add(1, Ordering::SeqCst);
        }));
        let server = SessionServer::new(server_handlers);

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind(addr).unwrap();
        let bound_addr = socket.local_addr().unwrap();
        drop(socket);

        server.listen(bound_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = SessionServer::new(Handlers::default());
        client.connect(bound_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        client
            .deliver(&Message::Status {
                type_status: "WAITING_INFO".into(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
