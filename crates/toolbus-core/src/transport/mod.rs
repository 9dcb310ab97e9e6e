//! Transport layer
//!
//! A transport moves whole [`Envelope`] frames in both directions over one
//! physical channel and reports loss of that channel as a single terminal
//! event. Reconnection is never attempted here; that is client-manager
//! policy.
//!
//! ## Variants
//!
//! - [`StdioTransport`]: subprocess stdin/stdout pipes
//! - [`SseTransport`]: server-push HTTP stream (SSE inbound, POST outbound)
//! - [`SocketTransport`]: persistent bidirectional TCP connection

pub mod memory;
pub mod socket;
pub mod sse;
pub mod stdio;

pub use memory::MemoryTransport;
pub use socket::SocketTransport;
pub use sse::SseTransport;
pub use stdio::{StdioServerTransport, StdioTransport};

use crate::BusError;
use crate::config::{ServerConfig, TransportKind};
use crate::protocol::Envelope;
use async_trait::async_trait;

/// One physical channel carrying protocol frames.
///
/// Methods take `&self` so a session's receive loop and its senders can run
/// concurrently; each implementation serializes its two directions with
/// interior locks. `receive` is written for a single consumer (the session's
/// receive loop).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame
    async fn send(&self, frame: Envelope) -> Result<(), BusError>;

    /// Wait for the next inbound frame; an error is terminal
    async fn receive(&self) -> Result<Envelope, BusError>;

    /// Close the channel; idempotent
    async fn close(&self) -> Result<(), BusError>;

    /// Whether the channel is still usable
    fn is_connected(&self) -> bool;
}

/// Build and connect the transport a server entry selects.
///
/// Selection is by configuration tag only; a failure here is
/// [`BusError::Connect`].
pub async fn connect(config: &ServerConfig) -> Result<Box<dyn Transport>, BusError> {
    match config.transport {
        TransportKind::Stdio => {
            let command = config.command.as_deref().ok_or_else(|| {
                BusError::connect(format!("server '{}': stdio transport requires a command", config.name))
            })?;
            let transport = StdioTransport::spawn(command, &config.args, &config.env).await?;
            Ok(Box::new(transport))
        }
        TransportKind::PushStream => {
            let url = require_url(config)?;
            let transport = SseTransport::connect(url).await?;
            Ok(Box::new(transport))
        }
        TransportKind::Socket => {
            let url = require_url(config)?;
            let transport = SocketTransport::connect(url).await?;
            Ok(Box::new(transport))
        }
    }
}

fn require_url(config: &ServerConfig) -> Result<&str, BusError> {
    config.url.as_deref().ok_or_else(|| {
        BusError::connect(format!(
            "server '{}': {} transport requires a url",
            config.name, config.transport
        ))
    })
}
