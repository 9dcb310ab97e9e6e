//! TCP socket transport
//!
//! One persistent bidirectional connection; both directions share the
//! channel as newline-delimited JSON frames. The same type serves both
//! ends: clients dial with [`SocketTransport::connect`], a serving side
//! wraps accepted connections with [`SocketTransport::from_stream`].

use super::Transport;
use crate::BusError;
use crate::protocol::Envelope;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

type WireFramed = Framed<TcpStream, LinesCodec>;

/// Persistent socket transport
pub struct SocketTransport {
    writer: Mutex<SplitSink<WireFramed, String>>,
    reader: Mutex<SplitStream<WireFramed>>,
    connected: AtomicBool,
    peer: String,
}

impl SocketTransport {
    /// Dial a listening tool server; accepts `host:port` or `tcp://host:port`
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let addr = url.strip_prefix("tcp://").unwrap_or(url);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| BusError::connect(format!("socket connect to {} failed: {}", addr, e)))?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established connection (the accepting side)
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (writer, reader) = Framed::new(stream, LinesCodec::new()).split();
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            connected: AtomicBool::new(true),
            peer,
        }
    }

    /// Address of the remote end
    pub fn peer(&self) -> &str {
        &self.peer
    }

    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn send(&self, frame: Envelope) -> Result<(), BusError> {
        let line = serde_json::to_string(&frame)?;
        let mut writer = self.writer.lock().await;
        writer.send(line).await.map_err(|e| {
            self.mark_lost();
            BusError::connection_lost(format!("socket write to {} failed: {}", self.peer, e))
        })
    }

    async fn receive(&self) -> Result<Envelope, BusError> {
        let mut reader = self.reader.lock().await;

        loop {
            match reader.next().await {
                Some(Ok(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str(trimmed) {
                        Ok(frame) => return Ok(frame),
                        Err(e) => debug!(error = %e, peer = %self.peer, "skipping malformed frame"),
                    }
                }
                Some(Err(e)) => {
                    self.mark_lost();
                    return Err(BusError::connection_lost(format!(
                        "socket read from {} failed: {}",
                        self.peer, e
                    )));
                }
                None => {
                    self.mark_lost();
                    return Err(BusError::connection_lost(format!(
                        "peer {} closed the connection",
                        self.peer
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        self.mark_lost();
        let mut writer = self.writer.lock().await;
        // Half-close is enough; the peer sees EOF and tears down its side.
        writer.close().await.ok();
        debug!(peer = %self.peer, "socket transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
