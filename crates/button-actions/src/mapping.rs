//! Button definitions and frame prefix matching

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Symbolic actions a button can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    MediaPlayPause,
    MediaPrevious,
    MediaNext,
    HomeScreen,
    VolumeDown,
    VolumeUp,
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ButtonAction::MediaPlayPause => "media_play_pause",
            ButtonAction::MediaPrevious => "media_previous",
            ButtonAction::MediaNext => "media_next",
            ButtonAction::HomeScreen => "home_screen",
            ButtonAction::VolumeDown => "volume_down",
            ButtonAction::VolumeUp => "volume_up",
        };
        f.write_str(name)
    }
}

/// One button: the start of its bus message and what it does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBinding {
    /// Human readable button name, used in logs
    pub name: String,
    /// Hex-byte prefix of the bus message, e.g. "3D 11 00 80"
    pub prefix: String,
    /// Action fired on a match
    pub action: ButtonAction,
}

impl ButtonBinding {
    pub fn new(name: &str, prefix: &str, action: ButtonAction) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            action,
        }
    }

    /// Literal, case-sensitive prefix test
    pub fn matches(&self, frame: &str) -> bool {
        frame.starts_with(&self.prefix)
    }
}

/// Errors in a user supplied button table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// An empty prefix would swallow every frame
    #[error("Button '{0}' has an empty prefix")]
    EmptyPrefix(String),
}

/// Ordered button table; the first matching prefix wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMapping {
    bindings: Vec<ButtonBinding>,
}

impl ButtonMapping {
    /// Build a mapping, keeping the given priority order
    pub fn new(bindings: Vec<ButtonBinding>) -> Result<Self, MappingError> {
        if let Some(empty) = bindings.iter().find(|b| b.prefix.trim().is_empty()) {
            return Err(MappingError::EmptyPrefix(empty.name.clone()));
        }
        Ok(Self { bindings })
    }

    /// Buttons of the reference vehicle, in priority order
    pub fn default_bindings() -> Vec<ButtonBinding> {
        vec![
            ButtonBinding::new("left center", "3D 11 00 80", ButtonAction::MediaPlayPause),
            ButtonBinding::new("left down", "3D 11 10 00", ButtonAction::MediaPrevious),
            ButtonBinding::new("left up", "3D 11 20 00", ButtonAction::MediaNext),
            ButtonBinding::new("right center", "3D 11 00 02", ButtonAction::HomeScreen),
            ButtonBinding::new("right down", "3D 11 02 00", ButtonAction::VolumeDown),
            ButtonBinding::new("right up", "3D 11 04 00", ButtonAction::VolumeUp),
        ]
    }

    /// Find the first binding whose prefix starts `frame`
    pub fn match_frame(&self, frame: &str) -> Option<&ButtonBinding> {
        self.bindings.iter().find(|binding| binding.matches(frame))
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the table has no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for ButtonMapping {
    fn default() -> Self {
        Self {
            bindings: Self::default_bindings(),
        }
    }
}
