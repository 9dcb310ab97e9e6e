//! In-process transport pair
//!
//! [`MemoryTransport::pair`] yields two connected endpoints; frames sent on
//! one arrive at the other. Closing either end severs both. Used to run a
//! dispatcher and a session inside one process, and throughout the test
//! suite where scripted frame timing matters.

use super::Transport;
use crate::BusError;
use crate::protocol::Envelope;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

const CHANNEL_CAPACITY: usize = 64;

/// One endpoint of an in-process transport pair
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    rx: Mutex<mpsc::Receiver<Envelope>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// Create two connected endpoints
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                tx: Mutex::new(Some(a_tx)),
                rx: Mutex::new(b_rx),
                connected: AtomicBool::new(true),
            },
            Self {
                tx: Mutex::new(Some(b_tx)),
                rx: Mutex::new(a_rx),
                connected: AtomicBool::new(true),
            },
        )
    }

    fn mark_lost(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: Envelope) -> Result<(), BusError> {
        let guard = self.tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or_else(|| BusError::connection_lost("transport closed"))?;
        tx.send(frame).await.map_err(|_| {
            self.mark_lost();
            BusError::connection_lost("peer endpoint dropped")
        })
    }

    async fn receive(&self) -> Result<Envelope, BusError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or_else(|| {
            self.mark_lost();
            BusError::connection_lost("peer endpoint closed")
        })
    }

    async fn close(&self) -> Result<(), BusError> {
        self.mark_lost();
        // Dropping the sender wakes the peer's receive with a terminal error.
        self.tx.lock().await.take();
        self.rx.lock().await.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
