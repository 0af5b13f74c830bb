//! ELM327 Monitor Session
//!
//! Drives an ELM327-compatible adapter through its initialization handshake
//! into bus monitor mode, recovers from stalls and uncommanded resets with a
//! warm/cold restart ladder, and hands decoded button frames to a
//! [`button_actions::ButtonDispatcher`].
//!
//! [`SessionEngine`] holds the protocol state machine and performs no I/O.
//! [`Session`] runs it inside a tokio task that owns the transport.

mod config;
mod engine;
mod error;
mod handshake;
mod scheduler;
mod session;
mod status;

pub use config::{SessionConfig, TimingConfig};
pub use engine::{Effects, ReaderControl, SessionEngine};
pub use error::SessionError;
pub use handshake::{Handshake, HandshakeCommands, HandshakeStep, Restart, RestartLadder};
pub use scheduler::{CommandScheduler, CommandTiming, Outbound, PendingCommand};
pub use session::{Session, SessionHandle};
pub use status::SessionStatus;
