//! OBD-II Protocol Definitions

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every protocol, indexed by its ELM327 protocol number
const ALL: [ObdProtocol; 10] = [
    ObdProtocol::Auto,
    ObdProtocol::J1850Pwm,
    ObdProtocol::J1850Vpw,
    ObdProtocol::Iso9141_2,
    ObdProtocol::Iso14230_4Kwp,
    ObdProtocol::Iso14230_4KwpFast,
    ObdProtocol::Iso15765_4Can11bit500,
    ObdProtocol::Iso15765_4Can29bit500,
    ObdProtocol::Iso15765_4Can11bit250,
    ObdProtocol::Iso15765_4Can29bit250,
];

/// Bus protocols selectable with `ATSPn`.
///
/// Configuration accepts the variant name (`"J1850Vpw"`), the protocol
/// number (`"2"`) or the full command (`"ATSP2"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "ATSP0",
            ObdProtocol::J1850Pwm => "ATSP1",
            ObdProtocol::J1850Vpw => "ATSP2",
            ObdProtocol::Iso9141_2 => "ATSP3",
            ObdProtocol::Iso14230_4Kwp => "ATSP4",
            ObdProtocol::Iso14230_4KwpFast => "ATSP5",
            ObdProtocol::Iso15765_4Can11bit500 => "ATSP6",
            ObdProtocol::Iso15765_4Can29bit500 => "ATSP7",
            ObdProtocol::Iso15765_4Can11bit250 => "ATSP8",
            ObdProtocol::Iso15765_4Can29bit250 => "ATSP9",
        }
    }

    /// Look up a protocol by its ELM327 protocol number (`0`..=`9`)
    pub fn from_number(number: u8) -> Option<Self> {
        ALL.get(usize::from(number)).copied()
    }

    /// Variant name as written in configuration
    pub fn name(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "Auto",
            ObdProtocol::J1850Pwm => "J1850Pwm",
            ObdProtocol::J1850Vpw => "J1850Vpw",
            ObdProtocol::Iso9141_2 => "Iso9141_2",
            ObdProtocol::Iso14230_4Kwp => "Iso14230_4Kwp",
            ObdProtocol::Iso14230_4KwpFast => "Iso14230_4KwpFast",
            ObdProtocol::Iso15765_4Can11bit500 => "Iso15765_4Can11bit500",
            ObdProtocol::Iso15765_4Can29bit500 => "Iso15765_4Can29bit500",
            ObdProtocol::Iso15765_4Can11bit250 => "Iso15765_4Can11bit250",
            ObdProtocol::Iso15765_4Can29bit250 => "Iso15765_4Can29bit250",
        }
    }
}

impl fmt::Display for ObdProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObdProtocol {
    type Err = ProtocolError;

    /// Accepts a variant name ("J1850Vpw"), a bare protocol number ("2") or
    /// a full command ("ATSP2"), ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(protocol) = ALL.iter().find(|p| p.name().eq_ignore_ascii_case(trimmed)) {
            return Ok(*protocol);
        }

        let digits = match trimmed.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("ATSP") => &trimmed[4..],
            _ => trimmed,
        };

        digits
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .ok_or_else(|| ProtocolError::UnsupportedProtocol(s.to_string()))
    }
}

impl TryFrom<String> for ObdProtocol {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObdProtocol> for String {
    fn from(protocol: ObdProtocol) -> Self {
        protocol.name().to_string()
    }
}
