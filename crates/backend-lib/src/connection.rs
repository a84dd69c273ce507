// ============================
// meeting-relay-lib/src/connection.rs
// ============================
//! Outbound half of a signaling socket.
//!
//! A [`ConnectionHandle`] is what the registry stores for a participant. It
//! never blocks: frames go into a bounded queue drained by the socket's writer
//! task, and a full queue drops the frame instead of stalling the caller.
//! Closing is a shared flag, so the owning socket task and the sweeper may
//! race on it freely.
use crate::metrics::WS_FRAME_DROPPED;
use meeting_relay_common::Envelope;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use uuid::Uuid;

/// Identity token assigned to every accepted socket
pub type ConnectionId = Uuid;

/// Clonable write/close handle for one socket
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    closed: Arc<watch::Sender<bool>>,
}

/// Receiving end owned by the socket's writer task
#[derive(Debug)]
pub struct ConnectionRx {
    frames: mpsc::Receiver<String>,
    closed: watch::Receiver<bool>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh identity and an outbound queue of
    /// `capacity` frames
    pub fn channel(capacity: usize) -> (Self, ConnectionRx) {
        let (tx, frames) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed) = watch::channel(false);
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            closed: Arc::new(closed_tx),
        };
        (handle, ConnectionRx { frames, closed })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// False once closed or once the writer task is gone
    pub fn is_open(&self) -> bool {
        !*self.closed.borrow() && !self.tx.is_closed()
    }

    /// Queue `envelope` for delivery. Best effort: returns false without
    /// side effects when the connection is closed, and drops the frame when
    /// the queue is full.
    pub fn send(&self, envelope: &Envelope) -> bool {
        if !self.is_open() {
            return false;
        }
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection = %self.id, "failed to encode frame: {}", e);
                return false;
            },
        };
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                counter!(WS_FRAME_DROPPED).increment(1);
                tracing::debug!(connection = %self.id, kind = %envelope.kind, "outbound queue full, frame dropped");
                false
            },
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Mark the connection closed. Idempotent.
    pub fn close(&self) {
        if !self.closed.send_replace(true) {
            tracing::debug!(connection = %self.id, "connection closed");
        }
    }

    /// Resolves once [`close`](Self::close) has been called on any clone
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // the sender lives in `self`, so this only returns once the flag is set
        rx.wait_for(|closed| *closed).await.ok();
    }
}

impl ConnectionRx {
    /// Next frame to write. Frames queued before a close are still handed
    /// out; `None` once the queue is drained after a close, or when every
    /// handle has been dropped.
    pub async fn next_frame(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            frame = self.frames.recv() => frame,
            _ = self.closed.wait_for(|closed| *closed) => None,
        }
    }

    /// Non-blocking variant of [`next_frame`](Self::next_frame) that ignores
    /// the close flag
    #[cfg(test)]
    pub(crate) fn try_next_frame(&mut self) -> Option<String> {
        self.frames.try_recv().ok()
    }
}
