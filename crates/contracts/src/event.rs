//! Consumer lifecycle events
//!
//! Every stream consumer reports through the same closed set of events.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one stream consumer attempt.
///
/// A fresh id is generated for every consumer; ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Generate a new random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConsumerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event emitted by a stream consumer task.
///
/// Events from one consumer arrive in causal order: at most one `Connect`,
/// then zero or more `Data`, then at most one `Exit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Upstream answered 200 and streaming started
    Connect(ConsumerId),
    /// One framed item from the upstream feed
    Data(Bytes),
    /// Consumer terminated unexpectedly
    Exit(ConsumerId),
}

impl Event {
    /// Short tag used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connect(_) => "connect",
            Event::Data(_) => "data",
            Event::Exit(_) => "exit",
        }
    }
}
