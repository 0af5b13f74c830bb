//! Button Actions
//!
//! Maps monitor-mode bus frames to steering wheel buttons and fires their
//! actions through a debounce gate.

mod config;
mod debounce;
mod dispatcher;
mod mapping;

pub use config::ButtonConfig;
pub use debounce::{DebounceGate, DebounceScope};
pub use dispatcher::{ActionHandler, ButtonDispatcher, DispatchResult};
pub use mapping::{ButtonAction, ButtonBinding, ButtonMapping, MappingError};
