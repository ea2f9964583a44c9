use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::WsMessage;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Monitor,
    Display,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Monitor => write!(f, "monitor"),
            Role::Display => write!(f, "display"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Backpressure,
}

/// Delivery handle for one socket. The socket task keeps the receiving half;
/// once it is dropped, or the connection is closed after a failed delivery,
/// the connection reports `Closed`.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    role: Role,
    sender: mpsc::Sender<WsMessage>,
    closed: CancellationToken,
}

impl Connection {
    pub fn new(role: Role, capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            role,
            sender,
            closed: CancellationToken::new(),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        if self.sender.is_closed() || self.closed.is_cancelled() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Mark the connection closed. The socket task watches [`Connection::closed`]
    /// and tears the socket down.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Queue a message without waiting. A full queue means the socket writer
    /// is not keeping up and is reported as `Backpressure`.
    pub fn send(&self, message: WsMessage) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backpressure,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}
