//! Handshake State Machine
//!
//! The adapter is brought up with a fixed, linear command sequence:
//!
//! ```text
//! ATI / ATZ -> ATE1 -> ATL1 -> ATS1 -> ATH1 -> ATSPn -> monitor
//! ```
//!
//! Recovery goes through a restart ladder: a few warm starts (identity probe,
//! the adapter is assumed alive), then a few cold starts (full reset), then
//! the session gives up until monitoring is started again.

use crate::config::TimingConfig;
use crate::scheduler::CommandTiming;
use elm_protocol::{Command, CommandKind};

/// Handshake position, named after the command being waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    ColdOrWarmProbe,
    EchoOn,
    LineFeedOn,
    SpacesOn,
    HeadersOn,
    ProtocolSet,
    Monitoring,
}

/// The two configurable handshake commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeCommands {
    /// Bus protocol selection, `ATSP2` by default
    pub protocol_set: Command,
    /// Monitor mode command, `ATMR11` by default
    pub monitor: Command,
}

/// Next rung of the restart ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restart {
    Warm { attempt: u32 },
    Cold { attempt: u32 },
    Exhausted,
}

/// Bounded warm and cold restart counters
#[derive(Debug, Clone)]
pub struct RestartLadder {
    warm_attempts: u32,
    cold_attempts: u32,
    warm_ceiling: u32,
    cold_ceiling: u32,
}

impl RestartLadder {
    /// Ladder allowing `warm_ceiling` warm then `cold_ceiling` cold starts
    pub fn new(warm_ceiling: u32, cold_ceiling: u32) -> Self {
        Self {
            warm_attempts: 0,
            cold_attempts: 0,
            warm_ceiling,
            cold_ceiling,
        }
    }

    /// Zero both counters
    pub fn reset(&mut self) {
        self.warm_attempts = 0;
        self.cold_attempts = 0;
    }

    /// Count an attempt and decide which kind it is
    pub fn next(&mut self) -> Restart {
        self.warm_attempts += 1;
        if self.warm_attempts <= self.warm_ceiling {
            return Restart::Warm {
                attempt: self.warm_attempts,
            };
        }

        self.cold_attempts += 1;
        if self.cold_attempts <= self.cold_ceiling {
            return Restart::Cold {
                attempt: self.cold_attempts,
            };
        }

        Restart::Exhausted
    }

    /// Warm starts counted so far
    pub fn warm_attempts(&self) -> u32 {
        self.warm_attempts
    }

    /// Cold starts counted so far
    pub fn cold_attempts(&self) -> u32 {
        self.cold_attempts
    }
}

/// Sequencing of the initialization commands
#[derive(Debug, Clone)]
pub struct Handshake {
    commands: HandshakeCommands,
    timing: TimingConfig,
    ladder: RestartLadder,
    step: HandshakeStep,
}

impl Handshake {
    /// Start at the probe step with a fresh ladder
    pub fn new(commands: HandshakeCommands, timing: TimingConfig) -> Self {
        let ladder = RestartLadder::new(timing.warm_start_attempts, timing.cold_start_attempts);
        Self {
            commands,
            timing,
            ladder,
            step: HandshakeStep::ColdOrWarmProbe,
        }
    }

    /// Command currently being waited on
    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    /// Restart counters
    pub fn ladder(&self) -> &RestartLadder {
        &self.ladder
    }

    /// Forget previous restart attempts
    pub fn reset_ladder(&mut self) {
        self.ladder.reset();
    }

    /// Climb the restart ladder; returns the probe to send, if any
    pub fn restart(&mut self) -> (Restart, Option<(Command, CommandTiming)>) {
        self.step = HandshakeStep::ColdOrWarmProbe;
        let rung = self.ladder.next();
        let probe = match rung {
            Restart::Warm { .. } => Some((Command::identify(), CommandTiming::identify(&self.timing))),
            Restart::Cold { .. } => Some((Command::reset(), CommandTiming::reset(&self.timing))),
            Restart::Exhausted => None,
        };
        (rung, probe)
    }

    /// Command to send after `completed` was answered; `None` once monitoring
    pub fn advance(&mut self, completed: CommandKind) -> Option<(Command, CommandTiming)> {
        let setup = CommandTiming::setup(&self.timing);
        let (step, next) = match completed {
            CommandKind::Identify | CommandKind::Reset => {
                (HandshakeStep::EchoOn, (Command::echo_on(), setup))
            }
            CommandKind::EchoOn => (HandshakeStep::LineFeedOn, (Command::linefeeds_on(), setup)),
            CommandKind::LineFeedsOn => (HandshakeStep::SpacesOn, (Command::spaces_on(), setup)),
            CommandKind::SpacesOn => (HandshakeStep::HeadersOn, (Command::headers_on(), setup)),
            CommandKind::HeadersOn => (
                HandshakeStep::ProtocolSet,
                (self.commands.protocol_set.clone(), setup),
            ),
            CommandKind::ProtocolSet => (
                HandshakeStep::Monitoring,
                (
                    self.commands.monitor.clone(),
                    CommandTiming::monitor(&self.timing),
                ),
            ),
            CommandKind::Monitor | CommandKind::LowPower => return None,
        };
        self.step = step;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;

    fn handshake() -> Handshake {
        let config = SessionConfig::default();
        Handshake::new(config.handshake_commands().unwrap(), config.timing)
    }

    #[test]
    fn test_linear_sequence() {
        let mut handshake = handshake();
        let mut completed = CommandKind::Reset;
        let mut sent = Vec::new();

        while let Some((command, _)) = handshake.advance(completed) {
            sent.push(command.text().to_string());
            completed = command.kind();
        }

        assert_eq!(sent, vec!["ATE1", "ATL1", "ATS1", "ATH1", "ATSP2", "ATMR11"]);
        assert_eq!(handshake.step(), HandshakeStep::Monitoring);
    }

    #[test]
    fn test_monitor_uses_data_timeout_only() {
        let mut handshake = handshake();
        let (command, timing) = handshake.advance(CommandKind::ProtocolSet).unwrap();
        assert_eq!(command.kind(), CommandKind::Monitor);
        assert!(timing.total.is_zero());
        assert_eq!(timing.data.as_millis(), 5000);
        assert_eq!(timing.max_retries, 3);
    }

    #[test]
    fn test_ladder_warm_then_cold_then_exhausted() {
        let mut ladder = RestartLadder::new(3, 3);
        let rungs: Vec<Restart> = (0..7).map(|_| ladder.next()).collect();

        assert_eq!(
            rungs,
            vec![
                Restart::Warm { attempt: 1 },
                Restart::Warm { attempt: 2 },
                Restart::Warm { attempt: 3 },
                Restart::Cold { attempt: 1 },
                Restart::Cold { attempt: 2 },
                Restart::Cold { attempt: 3 },
                Restart::Exhausted,
            ]
        );

        ladder.reset();
        assert_eq!(ladder.next(), Restart::Warm { attempt: 1 });
    }

    #[test]
    fn test_restart_probes() {
        let mut handshake = handshake();
        handshake.advance(CommandKind::Identify);

        let (rung, probe) = handshake.restart();
        assert_eq!(rung, Restart::Warm { attempt: 1 });
        let (command, timing) = probe.unwrap();
        assert_eq!(command.text(), "ATI");
        assert_eq!(timing.total.as_millis(), 2500);
        assert_eq!(timing.max_retries, 0);
        assert_eq!(handshake.step(), HandshakeStep::ColdOrWarmProbe);

        handshake.restart();
        handshake.restart();
        let (rung, probe) = handshake.restart();
        assert_eq!(rung, Restart::Cold { attempt: 1 });
        let (command, timing) = probe.unwrap();
        assert_eq!(command.text(), "ATZ");
        assert_eq!(timing.total.as_millis(), 5000);
    }
}
