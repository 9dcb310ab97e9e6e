//! Protocol session over one transport
//!
//! A [`Session`] turns a raw [`Transport`] into a call/response protocol:
//! it assigns monotonic correlation ids, keeps a table of pending calls,
//! and runs a background receive loop that resumes exactly one waiting
//! caller per inbound result frame. Any number of calls may be in flight
//! concurrently on one session; results may arrive in any order.

use crate::BusError;
use crate::config::ServerConfig;
use crate::descriptor::ToolDescriptor;
use crate::protocol::{
    ArgMap, CallEnvelope, Envelope, InitializeParams, ResultEnvelope, ServerInfo, WireError,
    WireErrorKind, methods,
};
use crate::transport::{self, Transport};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Table of calls awaiting their result, keyed by correlation id.
///
/// Shared between the issuing side (inserts, removes on timeout) and the
/// receive loop (removes and resumes); the mutex is the only thing
/// serializing them.
type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<ResultEnvelope>>>>;

/// A connected protocol session with one tool server
pub struct Session {
    server_name: String,
    transport: Arc<dyn Transport>,
    pending: PendingCalls,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    closed: AtomicBool,
    default_timeout: Duration,
    server_info: Option<ServerInfo>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Connect to a configured server and perform the initialize handshake
    pub async fn connect(
        config: &ServerConfig,
        default_timeout: Duration,
    ) -> Result<Self, BusError> {
        let transport = transport::connect(config).await?;
        Self::establish(config.name.clone(), Arc::from(transport), default_timeout).await
    }

    /// Build a session over an already-connected transport.
    ///
    /// Spawns the receive loop and performs the initialize handshake; on
    /// handshake failure the transport is closed and the error surfaced.
    pub async fn establish(
        server_name: String,
        transport: Arc<dyn Transport>,
        default_timeout: Duration,
    ) -> Result<Self, BusError> {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&pending),
            Arc::clone(&alive),
            server_name.clone(),
        ));

        let mut session = Self {
            server_name,
            transport,
            pending,
            next_id: AtomicU64::new(1),
            alive,
            closed: AtomicBool::new(false),
            default_timeout,
            server_info: None,
            receiver: Mutex::new(Some(receiver)),
        };

        match session.initialize().await {
            Ok(info) => {
                debug!(
                    server = %session.server_name,
                    remote = %info.server_name,
                    "session established"
                );
                session.server_info = Some(info);
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }

    async fn initialize(&self) -> Result<ServerInfo, BusError> {
        let params = json!(InitializeParams::default());
        let value = self
            .request(methods::INITIALIZE, Some(params), self.default_timeout)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| BusError::protocol(format!("malformed initialize response: {}", e)))
    }

    /// Name of the configured server this session talks to
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Identity the server reported during the handshake
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Whether the session can still issue calls
    pub fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && self.transport.is_connected()
    }

    /// Invoke a remote tool.
    ///
    /// Suspends the caller until the matching result arrives, the timeout
    /// elapses ([`BusError::Timeout`]), or the transport is severed
    /// ([`BusError::ConnectionLost`], which fails every pending call on
    /// this session at once).
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: ArgMap,
        timeout: Option<Duration>,
    ) -> Result<Value, BusError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let params = json!({
            "name": tool_name,
            "arguments": arguments,
        });
        self.request(methods::CALL_TOOL, Some(params), timeout).await
    }

    /// Fetch the server's tool descriptors
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BusError> {
        let value = self
            .request(methods::LIST_TOOLS, None, self.default_timeout)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| BusError::protocol(format!("malformed tool listing: {}", e)))
    }

    /// Issue one request and wait for its correlated result
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(BusError::connection_lost(format!(
                "session to '{}' is closed",
                self.server_name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // The receive loop may have swept between the check above and the
        // insert; don't leave a waiter the sweep can no longer reach.
        if !self.alive.load(Ordering::SeqCst) {
            self.pending.lock().remove(&id);
            return Err(BusError::connection_lost(format!(
                "session to '{}' is closed",
                self.server_name
            )));
        }

        let mut envelope = CallEnvelope::new(id, method);
        if let Some(params) = params {
            envelope = envelope.with_params(params);
        }

        if let Err(e) = self.transport.send(Envelope::Call(envelope)).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result.into_result().map_err(BusError::from_wire),
            Ok(Err(_)) => Err(BusError::connection_lost(format!(
                "session to '{}' is closed",
                self.server_name
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BusError::timeout(timeout))
            }
        }
    }

    /// Close the session and its transport; idempotent.
    ///
    /// Every call still pending fails with [`BusError::ConnectionLost`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);

        // Stop the receive loop before touching the transport: a blocked
        // receive holds the transport's read side, and tearing that down
        // from under it must not deadlock.
        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            receiver.abort();
            receiver.await.ok();
        }

        self.transport.close().await.ok();

        // The receive loop sweeps on transport error; cover waiters it
        // never got to see.
        sweep_pending(&self.pending, &self.server_name, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(receiver) = self.receiver.lock().take() {
            receiver.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.server_name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Background task routing inbound frames to pending callers.
///
/// Runs for the session's whole life. A result whose id has no pending
/// entry (stale after a timeout, or duplicated) is logged and dropped; a
/// transport error fails every pending call and ends the loop.
async fn receive_loop(
    transport: Arc<dyn Transport>,
    pending: PendingCalls,
    alive: Arc<AtomicBool>,
    server_name: String,
) {
    loop {
        match transport.receive().await {
            Ok(Envelope::Result(result)) => {
                let waiter = pending.lock().remove(&result.id);
                match waiter {
                    Some(tx) => {
                        if tx.send(result).is_err() {
                            debug!(server = %server_name, "caller gave up before its result arrived");
                        }
                    }
                    None => {
                        debug!(
                            server = %server_name,
                            id = result.id,
                            "discarding result with no pending call"
                        );
                    }
                }
            }
            Ok(Envelope::Call(call)) => {
                warn!(
                    server = %server_name,
                    method = %call.method,
                    "ignoring unexpected call frame from server"
                );
            }
            Err(e) => {
                alive.store(false, Ordering::SeqCst);
                sweep_pending(&pending, &server_name, &e.to_string());
                break;
            }
        }
    }
}

/// Fail every pending call with `ConnectionLost`; the all-at-once sweep.
fn sweep_pending(pending: &PendingCalls, server_name: &str, reason: &str) {
    let drained: Vec<(u64, oneshot::Sender<ResultEnvelope>)> =
        pending.lock().drain().collect();

    if drained.is_empty() {
        return;
    }

    warn!(
        server = %server_name,
        count = drained.len(),
        reason = %reason,
        "failing pending calls after connection loss"
    );
    for (id, tx) in drained {
        let _ = tx.send(ResultEnvelope::failure(
            id,
            WireError::new(WireErrorKind::ConnectionLost, reason),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    /// Minimal scripted server: answers initialize, then hands each
    /// subsequent call envelope to the given responder.
    async fn serve_scripted<F>(endpoint: MemoryTransport, mut respond: F)
    where
        F: FnMut(CallEnvelope) -> Option<ResultEnvelope> + Send,
    {
        while let Ok(frame) = endpoint.receive().await {
            if let Envelope::Call(call) = frame {
                let reply = if call.method == methods::INITIALIZE {
                    Some(ResultEnvelope::success(
                        call.id,
                        json!(ServerInfo::new("scripted", "0.0.0")),
                    ))
                } else {
                    respond(call)
                };
                if let Some(reply) = reply {
                    if endpoint.send(Envelope::Result(reply)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_establish_records_server_info() {
        let (client_end, server_end) = MemoryTransport::pair();
        let server = tokio::spawn(serve_scripted(server_end, |call| {
            Some(ResultEnvelope::success(call.id, Value::Null))
        }));

        let session = Session::establish(
            "scripted".to_string(),
            Arc::new(client_end),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(session.server_info().unwrap().server_name, "scripted");
        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_call_returns_tool_result() {
        let (client_end, server_end) = MemoryTransport::pair();
        let server = tokio::spawn(serve_scripted(server_end, |call| {
            let params = call.tool_call_params().unwrap();
            assert_eq!(params.name, "echo");
            Some(ResultEnvelope::success(call.id, json!("Echo: hi")))
        }));

        let session = Session::establish(
            "scripted".to_string(),
            Arc::new(client_end),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let mut args = ArgMap::new();
        args.insert("text".to_string(), json!("hi"));
        let value = session.call("echo", args, None).await.unwrap();
        assert_eq!(value, json!("Echo: hi"));

        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_failure_maps_to_taxonomy() {
        let (client_end, server_end) = MemoryTransport::pair();
        let server = tokio::spawn(serve_scripted(server_end, |call| {
            Some(ResultEnvelope::failure(
                call.id,
                WireError::new(WireErrorKind::UnknownTool, "frobnicate"),
            ))
        }));

        let session = Session::establish(
            "scripted".to_string(),
            Arc::new(client_end),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let err = session
            .call("frobnicate", ArgMap::new(), None)
            .await
            .err()
            .expect("call should fail");
        assert!(matches!(err, BusError::UnknownTool { .. }));

        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_after_exact_duration() {
        let (client_end, server_end) = MemoryTransport::pair();
        // Answer initialize, then go silent.
        let server = tokio::spawn(serve_scripted(server_end, |_| None));

        let session = Session::establish(
            "scripted".to_string(),
            Arc::new(client_end),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let started = tokio::time::Instant::now();
        let err = session
            .call("slow", ArgMap::new(), Some(Duration::from_secs(2)))
            .await
            .err()
            .expect("call should time out");

        assert!(matches!(err, BusError::Timeout { millis: 2000 }));
        assert_eq!(started.elapsed(), Duration::from_secs(2));

        session.close().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_calls_after_close_fail_fast() {
        let (client_end, server_end) = MemoryTransport::pair();
        let server = tokio::spawn(serve_scripted(server_end, |call| {
            Some(ResultEnvelope::success(call.id, Value::Null))
        }));

        let session = Session::establish(
            "scripted".to_string(),
            Arc::new(client_end),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        session.close().await;
        session.close().await; // idempotent

        let err = session
            .call("echo", ArgMap::new(), None)
            .await
            .err()
            .expect("call on closed session should fail");
        assert!(matches!(err, BusError::ConnectionLost { .. }));

        server.await.unwrap();
    }
}
