use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransferError>;

/// Where in the receive protocol a connection was when the peer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LengthPrefix,
    Payload,
    Body,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::LengthPrefix => f.write_str("metadata length prefix"),
            Stage::Payload => f.write_str("metadata payload"),
            Stage::Body => f.write_str("file body"),
        }
    }
}

/// Per-connection failures. Every variant is fatal to the connection that
/// raised it and to nothing else.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("peer closed the connection during the {stage}")]
    PrematureDisconnect { stage: Stage },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
