//! Button Dispatcher Implementation

use crate::debounce::DebounceGate;
use crate::mapping::{ButtonAction, ButtonMapping};
use std::time::Instant;
use tracing::{debug, error, info};

/// Carries out a button action on the host
pub trait ActionHandler: Send {
    /// Perform `action`; any error is reported as [`DispatchResult::ActionError`]
    fn perform(&mut self, action: ButtonAction) -> anyhow::Result<()>;
}

impl<F> ActionHandler for F
where
    F: FnMut(ButtonAction) -> anyhow::Result<()> + Send,
{
    fn perform(&mut self, action: ButtonAction) -> anyhow::Result<()> {
        self(action)
    }
}

/// Outcome of dispatching one monitor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// The matching action ran
    Success(ButtonAction),
    /// Frame arrived inside the debounce window
    HardwareBounce,
    /// No button prefix matched
    UnknownButton,
    /// The matching action failed
    ActionError(ButtonAction),
}

/// Debounces frames and fires the action of the first matching button
pub struct ButtonDispatcher {
    /// Button table
    mapping: ButtonMapping,
    /// Bounce filter
    gate: DebounceGate,
    /// Host side action executor
    handler: Box<dyn ActionHandler>,
}

impl ButtonDispatcher {
    pub fn new(mapping: ButtonMapping, gate: DebounceGate, handler: Box<dyn ActionHandler>) -> Self {
        info!(
            "Creating button dispatcher with {} buttons, debounce {:?} ({:?})",
            mapping.len(),
            gate.window(),
            gate.scope()
        );
        Self {
            mapping,
            gate,
            handler,
        }
    }

    /// Classify a trimmed monitor frame and run its action unless bounced
    pub fn dispatch(&mut self, frame: &str, now: Instant) -> DispatchResult {
        if self.gate.is_bounce(frame, now) {
            debug!("Hardware bounce: {}", frame);
            return DispatchResult::HardwareBounce;
        }

        let Some(binding) = self.mapping.match_frame(frame) else {
            info!("Unknown button: {}", frame);
            return DispatchResult::UnknownButton;
        };

        let action = binding.action;
        debug!("Button '{}' pressed, performing {}", binding.name, action);

        match self.handler.perform(action) {
            Ok(()) => DispatchResult::Success(action),
            Err(e) => {
                error!("Error performing {} for button frame {}: {:#}", action, frame, e);
                DispatchResult::ActionError(action)
            }
        }
    }
}
