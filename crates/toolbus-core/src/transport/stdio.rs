//! Subprocess transport
//!
//! Spawns a tool server as a child process and exchanges newline-delimited
//! JSON frames over its stdin/stdout. The child's lifetime belongs to the
//! transport: closing the transport terminates the child, and best-effort
//! signal cleanup keeps an abruptly dying parent from leaving orphans.

use super::Transport;
use crate::BusError;
use crate::protocol::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Client-side stdio transport owning a spawned server process
pub struct StdioTransport {
    child: parking_lot::Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<BufReader<ChildStdout>>,
    connected: AtomicBool,
}

impl StdioTransport {
    /// Spawn the server process and wire up its pipes
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, BusError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in env {
            cmd.env(key, value);
        }

        // If the parent dies without running Drop, the kernel reaps the child.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            BusError::connect(format!("failed to spawn tool server '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BusError::connect("failed to capture child stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BusError::connect("failed to capture child stdout"))?;

        Ok(Self {
            child: parking_lot::Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(BufReader::new(stdout)),
            connected: AtomicBool::new(true),
        })
    }

    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, frame: Envelope) -> Result<(), BusError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| BusError::connection_lost("child stdin closed"))?;

        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');

        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            self.mark_lost();
            return Err(BusError::connection_lost(e.to_string()));
        }
        stdin
            .flush()
            .await
            .map_err(|e| {
                self.mark_lost();
                BusError::connection_lost(e.to_string())
            })
    }

    async fn receive(&self) -> Result<Envelope, BusError> {
        let mut stdout = self.stdout.lock().await;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = stdout.read_line(&mut line).await.map_err(|e| {
                self.mark_lost();
                BusError::connection_lost(e.to_string())
            })?;

            if bytes_read == 0 {
                self.mark_lost();
                return Err(BusError::connection_lost("child closed stdout"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Servers may print non-protocol chatter on stdout; skip it.
            match serde_json::from_str(trimmed) {
                Ok(frame) => return Ok(frame),
                Err(e) => debug!(error = %e, "skipping non-protocol stdout line"),
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        self.mark_lost();

        // Dropping stdin signals EOF so the child can exit on its own.
        self.stdin.lock().await.take();

        let child = self.child.lock().take();
        if let Some(mut child) = child {
            tokio::select! {
                result = child.wait() => {
                    if let Err(e) = result {
                        warn!(error = %e, "error waiting for tool server to exit");
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                    warn!("tool server did not exit after stdin close, killing");
                    child.kill().await.ok();
                }
            }
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

/// Server-side stdio transport: the child-process end of the pipe.
///
/// A tool server spawned by a [`StdioTransport`] reads calls from its own
/// stdin and answers on stdout through this type; see
/// [`serve_stdio`](crate::dispatcher::serve_stdio).
pub struct StdioServerTransport {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
    stdout: Mutex<tokio::io::Stdout>,
    connected: AtomicBool,
}

impl StdioServerTransport {
    /// Attach to the current process's stdin/stdout
    pub fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
            stdout: Mutex::new(tokio::io::stdout()),
            connected: AtomicBool::new(true),
        }
    }
}

impl Default for StdioServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioServerTransport {
    async fn send(&self, frame: Envelope) -> Result<(), BusError> {
        let mut stdout = self.stdout.lock().await;
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Envelope, BusError> {
        let mut stdin = self.stdin.lock().await;
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = stdin.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.connected.store(false, Ordering::SeqCst);
                return Err(BusError::connection_lost("stdin closed"));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(frame) => return Ok(frame),
                Err(e) => debug!(error = %e, "skipping malformed stdin line"),
            }
        }
    }

    async fn close(&self) -> Result<(), BusError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
