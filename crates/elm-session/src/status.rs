//! Session status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Device closed normally
    Closed,
    /// Device closed after a failure
    ClosedFromError,
    /// Device open, not monitoring
    OpenStopped,
    /// Device open, monitoring abandoned after the restart ladder ran out
    OpenStoppedFromError,
    /// Device open, handshake running or bus being monitored
    OpenMonitoring,
}

impl SessionStatus {
    /// Commands may only be written in an open state
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            SessionStatus::OpenStopped
                | SessionStatus::OpenStoppedFromError
                | SessionStatus::OpenMonitoring
        )
    }

    /// Whether the device is gone
    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Whether frames are being dispatched
    pub fn is_monitoring(&self) -> bool {
        *self == SessionStatus::OpenMonitoring
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionStatus::Closed => "closed",
            SessionStatus::ClosedFromError => "closed (error)",
            SessionStatus::OpenStopped => "monitoring stopped",
            SessionStatus::OpenStoppedFromError => "monitoring stopped (error)",
            SessionStatus::OpenMonitoring => "monitoring",
        };
        f.write_str(text)
    }
}
