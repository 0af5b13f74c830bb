//! Steering Wheel Interface Daemon
//!
//! Opens the serial adapter, keeps a monitor session running on it and maps
//! button presses to external programs.

pub mod actions;
pub mod logging;
pub mod settings;
pub mod supervisor;

pub use actions::CommandActionHandler;
pub use logging::init_logging;
pub use settings::{DaemonConfig, LoggingConfig, SerialConfig, DEFAULT_CONFIG_PATH};
pub use supervisor::{DeviceOpener, SerialOpener, Supervisor};
