//! Command Scheduler Implementation
//!
//! Owns the single in-flight command together with its total and data
//! deadlines. The scheduler never touches the transport; it hands back the
//! bytes to write and the session performs the write.

use crate::config::TimingConfig;
use elm_protocol::{Command, ResponseFramer};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Timeout budget and retry ceiling for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTiming {
    /// Whole exchange budget; zero disables it
    pub total: Duration,
    /// Inactivity budget, re-armed by every chunk; zero disables it
    pub data: Duration,
    /// Re-sends allowed before the command is abandoned
    pub max_retries: u32,
}

impl CommandTiming {
    /// Setup commands of the handshake
    pub fn setup(config: &TimingConfig) -> Self {
        Self {
            total: Duration::from_millis(config.command_total_timeout_ms),
            data: Duration::from_millis(config.command_data_timeout_ms),
            max_retries: config.command_retries,
        }
    }

    /// Warm start identity probe
    pub fn identify(config: &TimingConfig) -> Self {
        Self {
            total: Duration::from_millis(config.identify_total_timeout_ms),
            data: Duration::ZERO,
            max_retries: 0,
        }
    }

    /// Cold start reset
    pub fn reset(config: &TimingConfig) -> Self {
        Self {
            total: Duration::from_millis(config.reset_total_timeout_ms),
            data: Duration::ZERO,
            max_retries: 0,
        }
    }

    /// Long running monitor command; only a quiet bus times out
    pub fn monitor(config: &TimingConfig) -> Self {
        Self {
            total: Duration::ZERO,
            data: Duration::from_millis(config.monitor_data_timeout_ms),
            max_retries: config.command_retries,
        }
    }
}

/// The command awaiting a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: Command,
    pub timing: CommandTiming,
    /// Zero-based attempt index
    pub retry_count: u32,
}

impl PendingCommand {
    /// Whether another re-send is allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.timing.max_retries
    }
}

/// Bytes ready to be written, with the command text for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Command text without its terminator
    pub text: String,
    /// Terminated wire bytes
    pub bytes: Vec<u8>,
}

impl Outbound {
    fn from_command(command: &Command) -> Self {
        Self {
            text: command.text().to_string(),
            bytes: command.to_wire(),
        }
    }
}

/// Single-slot command scheduler
#[derive(Debug, Default)]
pub struct CommandScheduler {
    /// In-flight command, if any
    pending: Option<PendingCommand>,
    /// Response accumulated for `pending`
    framer: ResponseFramer,
    /// Fires once per send
    total_deadline: Option<Instant>,
    /// Pushed back by every received chunk
    data_deadline: Option<Instant>,
}

impl CommandScheduler {
    /// Scheduler with nothing in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the in-flight command and arm its deadlines
    pub fn send(
        &mut self,
        command: Command,
        timing: CommandTiming,
        is_retry: bool,
        now: Instant,
    ) -> Outbound {
        let retry_count = match (&self.pending, is_retry) {
            (Some(previous), true) => previous.retry_count + 1,
            _ => 0,
        };
        self.clear();

        debug!(retry_count, "Scheduling command: {}", command.text());

        self.total_deadline = (!timing.total.is_zero()).then(|| now + timing.total);
        self.data_deadline = (!timing.data.is_zero()).then(|| now + timing.data);

        let outbound = Outbound::from_command(&command);
        self.pending = Some(PendingCommand {
            command,
            timing,
            retry_count,
        });
        outbound
    }

    /// Fire-and-forget send: no pending command, no deadlines
    pub fn send_blind(&mut self, command: Command) -> Outbound {
        self.clear();
        debug!("Scheduling blind command: {}", command.text());
        Outbound::from_command(&command)
    }

    /// Re-send the pending command if it has retries left
    pub fn retry(&mut self, now: Instant) -> Option<Outbound> {
        let pending = self.pending.as_ref().filter(|p| p.can_retry())?;
        let command = pending.command.clone();
        let timing = pending.timing;
        Some(self.send(command, timing, true, now))
    }

    /// Append a received chunk and re-arm the data deadline
    pub fn on_chunk(&mut self, chunk: &[u8], now: Instant) {
        if let Some(pending) = &self.pending {
            if !pending.timing.data.is_zero() {
                self.data_deadline = Some(now + pending.timing.data);
            }
        }
        self.framer.push(chunk);
    }

    /// Swap the in-flight command for `command`, keeping its deadlines,
    /// timing and retry count; a retry re-sends the replacement
    pub fn replace_pending(&mut self, command: Command) {
        if let Some(pending) = self.pending.as_mut() {
            pending.command = command;
        }
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.total_deadline, self.data_deadline) {
            (Some(total), Some(data)) => Some(total.min(data)),
            (total, data) => total.or(data),
        }
    }

    /// Whether either deadline has passed
    pub fn is_timed_out(&self, now: Instant) -> bool {
        self.next_deadline().is_some_and(|deadline| deadline <= now)
    }

    /// Drop the pending command, its deadlines and any buffered response
    pub fn clear(&mut self) {
        self.pending = None;
        self.total_deadline = None;
        self.data_deadline = None;
        self.framer.clear();
    }

    /// In-flight command, if any
    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    /// Response accumulated so far
    pub fn framer(&self) -> &ResponseFramer {
        &self.framer
    }

    /// Mutable access to the accumulated response
    pub fn framer_mut(&mut self) -> &mut ResponseFramer {
        &mut self.framer
    }
}
