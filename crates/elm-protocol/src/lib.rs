//! ELM327 Protocol Implementation
//!
//! This crate provides the command set and response framing used to drive an
//! ELM327-compatible adapter into bus monitor mode. It is transport agnostic:
//! callers push raw bytes into a [`ResponseFramer`] and write the bytes
//! produced by [`Command::to_wire`].

mod command;
mod error;
mod framer;
mod protocol;

pub use command::{Command, CommandKind, Completion};
pub use error::ProtocolError;
pub use framer::ResponseFramer;
pub use protocol::ObdProtocol;

/// Literal strings exchanged with the adapter
pub mod wire {
    /// Identity probe, answered with the adapter banner
    pub const IDENTIFY: &str = "ATI";
    /// Full device reset
    pub const RESET: &str = "ATZ";
    /// Echo on
    pub const ECHO_ON: &str = "ATE1";
    /// Linefeeds on
    pub const LINEFEEDS_ON: &str = "ATL1";
    /// Spaces between hex bytes on
    pub const SPACES_ON: &str = "ATS1";
    /// Headers on
    pub const HEADERS_ON: &str = "ATH1";
    /// Low power mode (newer adapters only)
    pub const LOW_POWER: &str = "LP";
    /// Monitor receiver address 0x11
    pub const DEFAULT_MONITOR: &str = "ATMR11";

    /// Command terminator on the wire
    pub const TERMINATOR: char = '\r';
    /// Prompt marking the end of a response
    pub const PROMPT: char = '>';
    /// Acknowledgement for setup commands
    pub const OK: &str = "OK";
    /// Adapter identity banner, also printed after a power-on reset
    pub const IDENTITY_BANNER: &str = "ELM327";
    /// Banner printed after a low-voltage reset
    pub const LOW_VOLTAGE_RESET: &str = "LV RESET";
}

/// Default timing contract with the adapter
pub mod timing {
    use std::time::Duration;

    /// Budget for writing one command
    pub const SEND_TIMEOUT: Duration = Duration::from_millis(250);
    /// Total budget for a setup command exchange
    pub const COMMAND_TOTAL_TIMEOUT: Duration = Duration::from_millis(2500);
    /// Inactivity budget for a setup command exchange
    pub const COMMAND_DATA_TIMEOUT: Duration = Duration::from_millis(1000);
    /// Scheduler-level retries for setup and monitor commands
    pub const COMMAND_RETRIES: u32 = 3;
    /// Total budget for the identity probe (warm start)
    pub const IDENTIFY_TOTAL_TIMEOUT: Duration = Duration::from_millis(2500);
    /// Total budget for the reset command (cold start)
    pub const RESET_TOTAL_TIMEOUT: Duration = Duration::from_millis(5000);
    /// Inactivity budget while monitoring the bus
    pub const MONITOR_DATA_TIMEOUT: Duration = Duration::from_millis(5000);
    /// Minimum gap between two accepted button actions
    pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);
    /// Consecutive warm start attempts before escalating
    pub const WARM_START_ATTEMPTS: u32 = 3;
    /// Consecutive cold start attempts before giving up
    pub const COLD_START_ATTEMPTS: u32 = 3;
}
