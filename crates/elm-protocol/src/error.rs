//! ELM327 Protocol Error Types

use thiserror::Error;

/// Errors raised while building commands for the adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Command text is empty after trimming
    #[error("Empty command text")]
    EmptyCommand,

    /// Command text would break the line framing
    #[error("Command text contains a line terminator: {0:?}")]
    EmbeddedTerminator(String),

    /// Protocol name or number not recognised
    #[error("Protocol not supported: {0}")]
    UnsupportedProtocol(String),
}
