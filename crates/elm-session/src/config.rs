//! Session configuration

use crate::error::SessionError;
use crate::handshake::HandshakeCommands;
use button_actions::ButtonConfig;
use elm_protocol::{timing, wire, Command, CommandKind, ObdProtocol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts, retries and restart ceilings (milliseconds where applicable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Budget for writing one command
    pub send_timeout_ms: u64,
    /// Whole exchange budget of a setup command
    pub command_total_timeout_ms: u64,
    /// Inactivity budget of a setup command
    pub command_data_timeout_ms: u64,
    /// Re-sends of a setup or monitor command before restarting
    pub command_retries: u32,
    /// Budget of the `ATI` warm start probe
    pub identify_total_timeout_ms: u64,
    /// Budget of the `ATZ` cold start reset
    pub reset_total_timeout_ms: u64,
    /// Silence tolerated while monitoring before the monitor command is re-sent
    pub monitor_data_timeout_ms: u64,
    /// Warm starts before falling back to cold starts
    pub warm_start_attempts: u32,
    /// Cold starts before giving up
    pub cold_start_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: timing::SEND_TIMEOUT.as_millis() as u64,
            command_total_timeout_ms: timing::COMMAND_TOTAL_TIMEOUT.as_millis() as u64,
            command_data_timeout_ms: timing::COMMAND_DATA_TIMEOUT.as_millis() as u64,
            command_retries: timing::COMMAND_RETRIES,
            identify_total_timeout_ms: timing::IDENTIFY_TOTAL_TIMEOUT.as_millis() as u64,
            reset_total_timeout_ms: timing::RESET_TOTAL_TIMEOUT.as_millis() as u64,
            monitor_data_timeout_ms: timing::MONITOR_DATA_TIMEOUT.as_millis() as u64,
            warm_start_attempts: timing::WARM_START_ATTEMPTS,
            cold_start_attempts: timing::COLD_START_ATTEMPTS,
        }
    }
}

impl TimingConfig {
    /// Write budget as a `Duration`
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Everything a session needs besides the transport and action handler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bus protocol selected during the handshake
    pub protocol: ObdProtocol,

    /// Raw protocol-set command; overrides `protocol` when present
    pub protocol_command: Option<String>,

    /// Command that puts the adapter into monitor mode
    pub monitor_command: String,

    /// Timeouts, retries and restart ceilings
    pub timing: TimingConfig,

    /// Button table and debounce settings
    pub buttons: ButtonConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            protocol: ObdProtocol::J1850Vpw,
            protocol_command: None,
            monitor_command: wire::DEFAULT_MONITOR.to_string(),
            timing: TimingConfig::default(),
            buttons: ButtonConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Build the configurable handshake commands
    pub fn handshake_commands(&self) -> Result<HandshakeCommands, SessionError> {
        let protocol_text = self
            .protocol_command
            .as_deref()
            .unwrap_or_else(|| self.protocol.to_elm_command());

        Ok(HandshakeCommands {
            protocol_set: Command::new(CommandKind::ProtocolSet, protocol_text)?,
            monitor: Command::new(CommandKind::Monitor, &self.monitor_command)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands() {
        let commands = SessionConfig::default().handshake_commands().unwrap();
        assert_eq!(commands.protocol_set.text(), "ATSP2");
        assert_eq!(commands.monitor.text(), "ATMR11");
    }

    #[test]
    fn test_protocol_command_override() {
        let config = SessionConfig {
            protocol: ObdProtocol::Auto,
            protocol_command: Some("ATSP6".to_string()),
            monitor_command: "ATMA".to_string(),
            ..Default::default()
        };
        let commands = config.handshake_commands().unwrap();
        assert_eq!(commands.protocol_set.text(), "ATSP6");
        assert_eq!(commands.monitor.text(), "ATMA");
    }

    #[test]
    fn test_empty_monitor_command_rejected() {
        let config = SessionConfig {
            monitor_command: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.handshake_commands(),
            Err(SessionError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_default_timing() {
        let timing = TimingConfig::default();
        assert_eq!(timing.send_timeout(), Duration::from_millis(250));
        assert_eq!(timing.command_total_timeout_ms, 2500);
        assert_eq!(timing.command_data_timeout_ms, 1000);
        assert_eq!(timing.reset_total_timeout_ms, 5000);
        assert_eq!(timing.monitor_data_timeout_ms, 5000);
        assert_eq!(timing.command_retries, 3);
    }
}
