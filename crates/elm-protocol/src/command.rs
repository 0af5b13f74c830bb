//! Adapter commands and their completion rules

use crate::error::ProtocolError;
use crate::wire;

/// Identity of a command, compared by value when deciding how to frame its
/// response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `ATI`
    Identify,
    /// `ATZ`
    Reset,
    /// `ATE1`
    EchoOn,
    /// `ATL1`
    LineFeedsOn,
    /// `ATS1`
    SpacesOn,
    /// `ATH1`
    HeadersOn,
    /// Configurable `ATSPn`
    ProtocolSet,
    /// Configurable monitor command, e.g. `ATMR11`
    Monitor,
    /// `LP`
    LowPower,
}

/// What the response buffer must contain before a response counts as complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Prompt and identity banner
    Banner,
    /// Prompt and `OK`
    PromptOk,
    /// Echoed command text, prompt and `OK`
    EchoPromptOk,
    /// Any carriage return or line feed
    LineEnd,
    /// Never answered; only sent blind
    Never,
}

impl CommandKind {
    /// Completion rule for responses to this command
    pub fn completion(&self) -> Completion {
        match self {
            CommandKind::Identify | CommandKind::Reset => Completion::Banner,
            CommandKind::EchoOn => Completion::PromptOk,
            CommandKind::LineFeedsOn
            | CommandKind::SpacesOn
            | CommandKind::HeadersOn
            | CommandKind::ProtocolSet => Completion::EchoPromptOk,
            CommandKind::Monitor => Completion::LineEnd,
            CommandKind::LowPower => Completion::Never,
        }
    }

    /// Whether this is one of the restart probes
    pub fn is_probe(&self) -> bool {
        matches!(self, CommandKind::Identify | CommandKind::Reset)
    }
}

/// A single-line command for the adapter, stored without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: CommandKind,
    text: String,
}

impl Command {
    /// Build a command from user supplied text
    pub fn new(kind: CommandKind, text: impl AsRef<str>) -> Result<Self, ProtocolError> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(ProtocolError::EmptyCommand);
        }
        if text.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedTerminator(text.to_string()));
        }
        Ok(Self {
            kind,
            text: text.to_string(),
        })
    }

    fn fixed(kind: CommandKind, text: &'static str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }

    /// `ATI`
    pub fn identify() -> Self {
        Self::fixed(CommandKind::Identify, wire::IDENTIFY)
    }

    /// `ATZ`
    pub fn reset() -> Self {
        Self::fixed(CommandKind::Reset, wire::RESET)
    }

    /// `ATE1`
    pub fn echo_on() -> Self {
        Self::fixed(CommandKind::EchoOn, wire::ECHO_ON)
    }

    /// `ATL1`
    pub fn linefeeds_on() -> Self {
        Self::fixed(CommandKind::LineFeedsOn, wire::LINEFEEDS_ON)
    }

    /// `ATS1`
    pub fn spaces_on() -> Self {
        Self::fixed(CommandKind::SpacesOn, wire::SPACES_ON)
    }

    /// `ATH1`
    pub fn headers_on() -> Self {
        Self::fixed(CommandKind::HeadersOn, wire::HEADERS_ON)
    }

    /// `LP`
    pub fn low_power() -> Self {
        Self::fixed(CommandKind::LowPower, wire::LOW_POWER)
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes to write, terminated with a single carriage return
    pub fn to_wire(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.text.len() + 1);
        bytes.extend_from_slice(self.text.as_bytes());
        bytes.push(wire::TERMINATOR as u8);
        bytes
    }
}
