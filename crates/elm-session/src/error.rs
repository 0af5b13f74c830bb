//! Session Error Types

use button_actions::MappingError;
use elm_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Operation requires an open device
    #[error("Cannot {0}, device not open")]
    NotOpen(&'static str),

    /// Fewer bytes reached the adapter than were sent
    #[error("Wrote {written} of {expected} bytes for command {command}")]
    TransportWrite {
        command: String,
        written: usize,
        expected: usize,
    },

    /// A configured command is unusable
    #[error("Invalid command configuration: {0}")]
    InvalidCommand(#[from] ProtocolError),

    /// The configured button table is unusable
    #[error("Invalid button configuration: {0}")]
    InvalidButtons(#[from] MappingError),
}
