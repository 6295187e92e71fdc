//! EventNotifier - shared MPMC event queue
//!
//! All consumers publish into one FIFO queue; the manager's workers drain it.

use async_channel::{unbounded, Receiver, Sender};
use contracts::Event;

use crate::error::{Result, StreamError};

/// Cloneable handle to the shared event queue
#[derive(Debug, Clone)]
pub struct EventNotifier {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl EventNotifier {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Publish an event; never waits on an unbounded queue
    pub async fn notify(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| StreamError::NotifierClosed)
    }

    /// Next event, or `None` once the queue is closed and drained
    pub async fn next(&self) -> Option<Event> {
        self.rx.recv().await.ok()
    }

    /// Close the queue; pending events are still delivered
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Events waiting to be handled
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventNotifier {
    fn default() -> Self {
        Self::new()
    }
}
