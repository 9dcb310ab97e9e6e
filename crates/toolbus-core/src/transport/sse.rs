//! Push-stream transport
//!
//! The remote holds open one HTTP response as a Server-Sent-Events stream
//! and pushes every inbound frame (results included) down it. Outbound
//! calls each go out as their own short-lived POST to the same endpoint;
//! correlation ids tie the two directions together.

use super::Transport;
use crate::BusError;
use crate::protocol::Envelope;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Push-stream transport over HTTP + SSE
pub struct SseTransport {
    client: reqwest::Client,
    endpoint: String,
    connected: Arc<AtomicBool>,
    events: Mutex<mpsc::Receiver<Envelope>>,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the push channel; fails if the initial SSE request is refused
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BusError::connect(format!("failed to build HTTP client: {}", e)))?;

        let endpoint = url.trim_end_matches('/').to_string();

        let response = client
            .get(&endpoint)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| BusError::connect(format!("SSE connect to {} failed: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(BusError::connect(format!(
                "SSE connect to {} failed with status {}",
                endpoint,
                response.status()
            )));
        }

        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let flag = Arc::clone(&connected);
        let listener = tokio::spawn(async move {
            pump_events(response, tx, flag).await;
        });

        debug!(endpoint = %endpoint, "push-stream transport connected");

        Ok(Self {
            client,
            endpoint,
            connected,
            events: Mutex::new(rx),
            listener: parking_lot::Mutex::new(Some(listener)),
        })
    }
}

/// Read the SSE byte stream, parse complete events, forward frames.
async fn pump_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Envelope>,
    connected: Arc<AtomicBool>,
) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while connected.load(Ordering::SeqCst) {
        match stream.next().await {
            Some(Ok(chunk)) => {
                match std::str::from_utf8(&chunk) {
                    Ok(text) => buffer.push_str(text),
                    Err(e) => {
                        warn!(error = %e, "dropping non-UTF-8 SSE chunk");
                        continue;
                    }
                }

                // Events are blank-line delimited.
                while let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer.drain(..event_end + 2);

                    if let Some(frame) = parse_sse_event(&event) {
                        if tx.send(frame).await.is_err() {
                            // Receiver side is gone; nothing left to feed.
                            connected.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "push stream failed");
                break;
            }
            None => {
                debug!("push stream ended");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping `tx` here wakes the receive side with a terminal error.
}

/// Extract the frame from one SSE event block, if it carries one.
fn parse_sse_event(event: &str) -> Option<Envelope> {
    let mut data = String::new();

    for line in event.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim());
        }
    }

    if data.is_empty() {
        return None;
    }

    match serde_json::from_str(&data) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, data = %data, "discarding unparseable SSE event");
            None
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, frame: Envelope) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::connection_lost("push stream closed"));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&frame)
            .send()
            .await
            .map_err(|e| {
                self.connected.store(false, Ordering::SeqCst);
                BusError::connection_lost(format!("POST to {} failed: {}", self.endpoint, e))
            })?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(BusError::protocol(format!(
                    "server rejected frame with {}: {}",
                    status, body
                )))
            }
        }
    }

    async fn receive(&self) -> Result<Envelope, BusError> {
        let mut events = self.events.lock().await;
        events
            .recv()
            .await
            .ok_or_else(|| BusError::connection_lost("push stream closed"))
    }

    async fn close(&self) -> Result<(), BusError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        // The aborted listener drops its sender; pending receives unblock.
        self.events.lock().await.close();
        debug!("push-stream transport closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_event_with_data() {
        let event = "event: message\ndata: {\"id\":4,\"result\":\"ok\"}";
        let frame = parse_sse_event(event).expect("should parse");
        assert_eq!(frame.id(), 4);
        assert!(frame.is_result());
    }

    #[test]
    fn test_parse_sse_event_heartbeat() {
        assert!(parse_sse_event("event: heartbeat").is_none());
        assert!(parse_sse_event(": comment only").is_none());
    }

    #[test]
    fn test_parse_sse_event_bad_json() {
        assert!(parse_sse_event("data: not-json").is_none());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Port 1 is essentially never listening.
        let err = SseTransport::connect("http://127.0.0.1:1")
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, BusError::Connect { .. }));
    }
}
