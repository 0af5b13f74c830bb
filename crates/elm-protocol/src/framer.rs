//! Response framing
//!
//! The adapter answers in free-form text. The framer keeps everything that
//! arrived since the last command was sent and decides, for the command that
//! is currently pending, whether the answer is complete.

use crate::command::{Command, Completion};
use crate::wire;
use tracing::warn;

/// Upper bound on buffered text before the buffer is discarded
const MAX_BUFFER: usize = 4096;

/// Accumulates adapter output for the pending command
#[derive(Debug, Default)]
pub struct ResponseFramer {
    buffer: String,
}

impl ResponseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        if self.buffer.len() > MAX_BUFFER {
            warn!(len = self.buffer.len(), "response buffer overflow, resetting");
            self.buffer.clear();
        }
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// True once the adapter printed a power-on or low-voltage reset banner
    pub fn reset_detected(&self) -> bool {
        self.buffer.contains(wire::IDENTITY_BANNER) || self.buffer.contains(wire::LOW_VOLTAGE_RESET)
    }

    /// Whether the buffered text completes the response to `command`
    pub fn is_complete(&self, command: &Command) -> bool {
        let has_prompt = self.buffer.contains(wire::PROMPT);
        match command.kind().completion() {
            Completion::Banner => has_prompt && self.buffer.contains(wire::IDENTITY_BANNER),
            Completion::PromptOk => has_prompt && self.buffer.contains(wire::OK),
            Completion::EchoPromptOk => {
                self.buffer.contains(command.text()) && has_prompt && self.buffer.contains(wire::OK)
            }
            Completion::LineEnd => self.buffer.contains(['\r', '\n']),
            Completion::Never => false,
        }
    }

    /// Remove every terminated line from the buffer and return them trimmed,
    /// skipping blank lines. An unterminated tail stays buffered.
    pub fn take_lines(&mut self) -> Vec<String> {
        let Some(end) = self.buffer.rfind(['\r', '\n']) else {
            return Vec::new();
        };

        let tail = self.buffer.split_off(end + 1);
        let complete = std::mem::replace(&mut self.buffer, tail);

        complete
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}
