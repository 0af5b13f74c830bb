//! Hardware bounce suppression

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Which frames share a debounce timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceScope {
    /// One gate for every button
    #[default]
    Global,
    /// One gate per distinct frame text
    PerFrame,
}

/// Rejects frames that arrive within `window` of the previous frame.
///
/// The timestamp is refreshed on every check, accepted or not, so a steady
/// burst of chatter never gets through.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    window: Duration,
    scope: DebounceScope,
    last: Option<Instant>,
    last_by_frame: HashMap<String, Instant>,
}

impl DebounceGate {
    pub fn new(window: Duration, scope: DebounceScope) -> Self {
        Self {
            window,
            scope,
            last: None,
            last_by_frame: HashMap::new(),
        }
    }

    /// Returns true when `frame` is a bounce and must be ignored
    pub fn is_bounce(&mut self, frame: &str, now: Instant) -> bool {
        let previous = match self.scope {
            DebounceScope::Global => self.last.replace(now),
            DebounceScope::PerFrame => {
                let window = self.window;
                self.last_by_frame
                    .retain(|_, seen| now.saturating_duration_since(*seen) <= window);
                self.last_by_frame.insert(frame.to_string(), now)
            }
        };

        match previous {
            Some(last) => now.saturating_duration_since(last) <= self.window,
            None => false,
        }
    }

    /// Minimum gap between accepted frames
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether frames share one timestamp
    pub fn scope(&self) -> DebounceScope {
        self.scope
    }
}
