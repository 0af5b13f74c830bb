//! Button configuration

use crate::debounce::{DebounceGate, DebounceScope};
use crate::mapping::{ButtonBinding, ButtonMapping, MappingError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Button table and debounce settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// Minimum gap between accepted frames (milliseconds)
    pub debounce_ms: u64,

    /// Whether the gate is shared by all buttons
    pub debounce_scope: DebounceScope,

    /// Buttons in priority order
    pub bindings: Vec<ButtonBinding>,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            debounce_scope: DebounceScope::Global,
            bindings: ButtonMapping::default_bindings(),
        }
    }
}

impl ButtonConfig {
    /// Build the validated button table
    pub fn mapping(&self) -> Result<ButtonMapping, MappingError> {
        ButtonMapping::new(self.bindings.clone())
    }

    /// Build a fresh debounce gate
    pub fn gate(&self) -> DebounceGate {
        DebounceGate::new(Duration::from_millis(self.debounce_ms), self.debounce_scope)
    }
}
