//! Session protocol engine
//!
//! Pure state machine: every input (a request, a chunk of bytes, a deadline)
//! is applied at an explicit instant and the I/O it requires is returned as
//! [`Effects`] for the caller to carry out in order.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::{Handshake, HandshakeStep, Restart};
use crate::scheduler::{CommandScheduler, Outbound};
use crate::status::SessionStatus;
use button_actions::{ActionHandler, ButtonDispatcher, DispatchResult};
use elm_protocol::{Command, CommandKind};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What to do with the background byte reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderControl {
    /// Stop and start again, before any write
    Restart,
    /// Stop, after all writes
    Stop,
}

/// I/O requested by one engine step
#[derive(Debug, Default)]
pub struct Effects {
    /// Commands to write, in order
    pub writes: Vec<Outbound>,
    /// Reader lifecycle change, if any
    pub reader: Option<ReaderControl>,
    /// Results of monitor frames dispatched during this step
    pub dispatched: Vec<DispatchResult>,
}

impl Effects {
    /// Whether the step requires no I/O
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.reader.is_none() && self.dispatched.is_empty()
    }
}

/// Protocol state of one open adapter
pub struct SessionEngine {
    status: SessionStatus,
    scheduler: CommandScheduler,
    handshake: Handshake,
    dispatcher: ButtonDispatcher,
}

impl SessionEngine {
    /// Create the engine for a freshly opened device
    pub fn new(config: &SessionConfig, handler: Box<dyn ActionHandler>) -> Result<Self, SessionError> {
        let handshake = Handshake::new(config.handshake_commands()?, config.timing.clone());
        let dispatcher = ButtonDispatcher::new(
            config.buttons.mapping()?,
            config.buttons.gate(),
            handler,
        );

        Ok(Self {
            status: SessionStatus::OpenStopped,
            scheduler: CommandScheduler::new(),
            handshake,
            dispatcher,
        })
    }

    /// Current session status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Handshake progress and restart counters
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// In-flight command state
    pub fn scheduler(&self) -> &CommandScheduler {
        &self.scheduler
    }

    /// Earliest instant at which [`SessionEngine::on_timeout`] has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Begin the handshake from a warm start
    pub fn monitor_start(&mut self, now: Instant) -> Result<Effects, SessionError> {
        if self.status.is_closed() {
            warn!("Monitor start attempt while device closed");
            return Err(SessionError::NotOpen("start monitoring"));
        }

        info!("Starting monitoring");
        let mut effects = Effects {
            reader: Some(ReaderControl::Restart),
            ..Default::default()
        };

        self.status = SessionStatus::OpenMonitoring;
        self.handshake.reset_ladder();
        self.restart(now, &mut effects);
        Ok(effects)
    }

    /// Interrupt the adapter and stop reading
    pub fn monitor_stop(&mut self) -> Result<Effects, SessionError> {
        if self.status.is_closed() {
            warn!("Monitor stop attempt while device closed");
            return Err(SessionError::NotOpen("stop monitoring"));
        }

        let mut effects = Effects::default();
        self.stop(false, &mut effects);
        Ok(effects)
    }

    /// Tear the session down without running any retry or restart logic
    pub fn close(&mut self, from_error: bool) -> Effects {
        let mut effects = Effects::default();
        if self.status.is_open() {
            self.stop(false, &mut effects);
        }

        self.scheduler.clear();
        effects.reader = Some(ReaderControl::Stop);
        self.status = if from_error {
            SessionStatus::ClosedFromError
        } else {
            SessionStatus::Closed
        };
        info!("Session {}", self.status);
        effects
    }

    /// Feed a chunk of adapter output
    pub fn on_bytes(&mut self, chunk: &[u8], now: Instant) -> Effects {
        let mut effects = Effects::default();
        self.scheduler.on_chunk(chunk, now);
        debug!("Data received: {:?}", String::from_utf8_lossy(chunk));

        if !self.status.is_monitoring() {
            warn!(
                "Unexpected data received (while not monitoring): {:?}",
                self.scheduler.framer().contents()
            );
            self.scheduler.framer_mut().clear();
            return effects;
        }

        // An uncommanded adapter reset (engine crank, brown-out) prints its
        // banner; whatever was in flight is now answered as a reset.
        if self.scheduler.framer().reset_detected() {
            let pending_kind = self.scheduler.pending().map(|p| p.command.kind());
            if !pending_kind.is_some_and(|kind| kind.is_probe()) {
                warn!("Adapter reset detected, restarting handshake");
                self.scheduler.replace_pending(Command::reset());
            }
        }

        let command = match self.scheduler.pending() {
            Some(pending) => pending.command.clone(),
            None if self.scheduler.framer().reset_detected() => Command::reset(),
            None => {
                warn!(
                    "Unexpected data received (while no command pending): {:?}",
                    self.scheduler.framer().contents()
                );
                self.scheduler.framer_mut().clear();
                return effects;
            }
        };

        if !self.scheduler.framer().is_complete(&command) {
            return effects;
        }

        if command.kind() == CommandKind::Monitor {
            self.dispatch_frames(&command, now, &mut effects);
            return effects;
        }

        match command.kind() {
            CommandKind::Identify | CommandKind::Reset => info!("ELM device found"),
            kind => debug!("{:?} acknowledged", kind),
        }

        match self.handshake.advance(command.kind()) {
            Some((next, timing)) => {
                if self.handshake.step() == HandshakeStep::Monitoring {
                    info!("Handshake complete, monitoring with {}", next.text());
                }
                let outbound = self.scheduler.send(next, timing, false, now);
                effects.writes.push(outbound);
            }
            None => self.scheduler.framer_mut().clear(),
        }
        effects
    }

    /// Handle an expired deadline
    pub fn on_timeout(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::default();
        if !self.scheduler.is_timed_out(now) {
            return effects;
        }

        let Some(pending) = self.scheduler.pending() else {
            self.scheduler.clear();
            return effects;
        };

        if pending.can_retry() {
            debug!(
                "Command or data timeout - retrying {} (attempt {})",
                pending.command.text(),
                pending.retry_count + 1
            );
            if let Some(outbound) = self.scheduler.retry(now) {
                effects.writes.push(outbound);
            }
        } else {
            warn!("Command {} abandoned after timeout", pending.command.text());
            self.restart(now, &mut effects);
        }
        effects
    }

    fn dispatch_frames(&mut self, monitor: &Command, now: Instant, effects: &mut Effects) {
        for frame in self.scheduler.framer_mut().take_lines() {
            if frame == monitor.text() {
                debug!("Skipping monitor command echo");
                continue;
            }
            let result = self.dispatcher.dispatch(&frame, now.into_std());
            debug!("Frame {} -> {:?}", frame, result);
            effects.dispatched.push(result);
        }
    }

    fn restart(&mut self, now: Instant, effects: &mut Effects) {
        match self.handshake.restart() {
            (Restart::Warm { attempt }, Some((probe, timing))) => {
                debug!("Monitoring warm start attempt {}", attempt);
                effects.writes.push(self.scheduler.send(probe, timing, false, now));
            }
            (Restart::Cold { attempt }, Some((probe, timing))) => {
                warn!("Monitoring cold start attempt {}", attempt);
                effects.writes.push(self.scheduler.send(probe, timing, false, now));
            }
            _ => {
                warn!("Monitoring cold start - too many attempts, giving up");
                self.stop(true, effects);
            }
        }
    }

    fn stop(&mut self, from_error: bool, effects: &mut Effects) {
        // a neutral probe interrupts any long running command
        effects.writes.push(self.scheduler.send_blind(Command::identify()));
        // low power mode, only supported by newer adapters
        effects.writes.push(self.scheduler.send_blind(Command::low_power()));
        effects.reader = Some(ReaderControl::Stop);

        self.status = if from_error {
            SessionStatus::OpenStoppedFromError
        } else {
            SessionStatus::OpenStopped
        };
        info!("Monitoring stopped ({})", self.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use button_actions::ButtonAction;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Performed = Arc<Mutex<Vec<ButtonAction>>>;

    fn engine() -> (SessionEngine, Performed) {
        let performed = Arc::new(Mutex::new(Vec::new()));
        let sink = performed.clone();
        let handler = move |action: ButtonAction| -> anyhow::Result<()> {
            sink.lock().unwrap().push(action);
            Ok(())
        };
        let engine = SessionEngine::new(&SessionConfig::default(), Box::new(handler)).unwrap();
        (engine, performed)
    }

    fn texts(effects: &Effects) -> Vec<&str> {
        effects.writes.iter().map(|w| w.text.as_str()).collect()
    }

    /// Run the handshake to monitor mode, returning the instant reached
    fn to_monitoring(engine: &mut SessionEngine, start: Instant) -> Instant {
        engine.monitor_start(start).unwrap();
        let replies = [
            "ATI\rELM327 v1.5\r\r>",
            "ATE1\rOK\r\r>",
            "ATL1\rOK\r\r>",
            "ATS1\rOK\r\r>",
            "ATH1\rOK\r\r>",
            "ATSP2\rOK\r\r>",
        ];
        let mut now = start;
        for reply in replies {
            now += Duration::from_millis(10);
            engine.on_bytes(reply.as_bytes(), now);
        }
        assert_eq!(engine.handshake().step(), HandshakeStep::Monitoring);
        now
    }

    #[test]
    fn test_start_requires_open_device() {
        let (mut engine, _) = engine();
        engine.close(false);
        assert_eq!(
            engine.monitor_start(Instant::now()).unwrap_err(),
            SessionError::NotOpen("start monitoring")
        );
        assert!(engine.monitor_stop().is_err());
    }

    #[test]
    fn test_start_sends_warm_probe() {
        let (mut engine, _) = engine();
        let effects = engine.monitor_start(Instant::now()).unwrap();

        assert_eq!(texts(&effects), vec!["ATI"]);
        assert_eq!(effects.reader, Some(ReaderControl::Restart));
        assert_eq!(engine.status(), SessionStatus::OpenMonitoring);
    }

    #[test]
    fn test_reset_reply_advances_to_echo_on() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();

        let effects = engine.on_bytes(b"ATZ\r\rELM327 v1.5\r\r>", now);
        assert_eq!(effects.writes[0].bytes, b"ATE1\r".to_vec());
        assert!(engine.scheduler().framer().is_empty());
    }

    #[test]
    fn test_partial_reply_waits() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();

        assert!(engine.on_bytes(b"ATI\rELM3", now).is_empty());
        assert!(engine.on_bytes(b"27 v1.5\r\r", now).is_empty());
        assert_eq!(texts(&engine.on_bytes(b">", now)), vec!["ATE1"]);
    }

    #[test]
    fn test_full_handshake_reaches_monitor() {
        let (mut engine, _) = engine();
        let now = to_monitoring(&mut engine, Instant::now());

        let pending = engine.scheduler().pending().unwrap();
        assert_eq!(pending.command.text(), "ATMR11");
        assert_eq!(engine.next_deadline(), Some(now + Duration::from_millis(5000)));
    }

    #[test]
    fn test_reset_banner_overrides_any_pending_command() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();
        engine.on_bytes(b"ATI\rELM327 v1.5\r\r>", now);
        engine.on_bytes(b"ATE1\rOK\r\r>", now);

        // ATL1 is pending; the adapter resets on its own instead
        let effects = engine.on_bytes(b"\r\rLV RESET\r", now);
        assert!(effects.writes.is_empty());
        assert_eq!(
            engine.scheduler().pending().unwrap().command.kind(),
            CommandKind::Reset
        );

        let effects = engine.on_bytes(b"\rELM327 v1.5\r\r>", now);
        assert_eq!(texts(&effects), vec!["ATE1"]);
    }

    #[test]
    fn test_reset_banner_timeout_resends_reset() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();
        engine.on_bytes(b"ATI\rELM327 v1.5\r\r>", now);
        engine.on_bytes(b"ATE1\rOK\r\r>", now);

        // banner arrives while ATL1 is pending but never finishes
        engine.on_bytes(b"\r\rLV RESET\r", now);
        let pending = engine.scheduler().pending().unwrap();
        assert_eq!(pending.command.text(), "ATZ");
        assert_eq!(pending.retry_count, 0);

        let deadline = engine.next_deadline().unwrap();
        assert_eq!(deadline, now + Duration::from_millis(1000));
        let effects = engine.on_timeout(deadline);
        assert_eq!(texts(&effects), vec!["ATZ"]);
        assert_eq!(engine.scheduler().pending().unwrap().retry_count, 1);

        let effects = engine.on_bytes(b"ATZ\r\rELM327 v1.5\r\r>", deadline);
        assert_eq!(texts(&effects), vec!["ATE1"]);
    }

    #[test]
    fn test_reset_banner_while_monitoring_restarts_handshake() {
        let (mut engine, performed) = engine();
        let now = to_monitoring(&mut engine, Instant::now());

        let effects = engine.on_bytes(b"ELM327 v1.5\r\r>", now);
        assert_eq!(texts(&effects), vec!["ATE1"]);
        assert!(effects.dispatched.is_empty());
        assert!(performed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_monitor_frames_dispatched() {
        let (mut engine, performed) = engine();
        let now = to_monitoring(&mut engine, Instant::now());

        let effects = engine.on_bytes(b"ATMR11\r3D 11 04 00 00\r", now);
        assert_eq!(
            effects.dispatched,
            vec![DispatchResult::Success(ButtonAction::VolumeUp)]
        );
        assert!(effects.writes.is_empty());

        let effects = engine.on_bytes(b"3D 11 00 80 FF\r", now + Duration::from_millis(10));
        assert_eq!(effects.dispatched, vec![DispatchResult::HardwareBounce]);

        let effects = engine.on_bytes(b"3D 11 02 00", now + Duration::from_millis(200));
        assert!(effects.dispatched.is_empty());
        let effects = engine.on_bytes(b" 00\r\n", now + Duration::from_millis(210));
        assert_eq!(
            effects.dispatched,
            vec![DispatchResult::Success(ButtonAction::VolumeDown)]
        );

        assert_eq!(
            *performed.lock().unwrap(),
            vec![ButtonAction::VolumeUp, ButtonAction::VolumeDown]
        );
    }

    #[test]
    fn test_unknown_frame_reported() {
        let (mut engine, _) = engine();
        let now = to_monitoring(&mut engine, Instant::now());

        let effects = engine.on_bytes(b"48 6B 10 41 0C 1A\r", now);
        assert_eq!(effects.dispatched, vec![DispatchResult::UnknownButton]);
    }

    #[test]
    fn test_setup_timeout_retries_then_restarts() {
        let (mut engine, _) = engine();
        let mut now = Instant::now();
        engine.monitor_start(now).unwrap();
        engine.on_bytes(b"ATI\rELM327 v1.5\r\r>", now);

        // ATE1 is never answered: three retries on the 1000ms data deadline
        let mut sent = Vec::new();
        for _ in 0..4 {
            now = engine.next_deadline().unwrap();
            let effects = engine.on_timeout(now);
            sent.extend(texts(&effects).into_iter().map(str::to_string));
        }
        assert_eq!(sent, vec!["ATE1", "ATE1", "ATE1", "ATI"]);
        assert_eq!(engine.handshake().ladder().warm_attempts(), 2);
    }

    #[test]
    fn test_spurious_wakeup_is_ignored() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();
        assert!(engine.on_timeout(now + Duration::from_millis(100)).is_empty());
    }

    #[test]
    fn test_restart_ladder_exhaustion_stops_with_error() {
        let (mut engine, _) = engine();
        engine.monitor_start(Instant::now()).unwrap();

        let mut sent = Vec::new();
        while engine.status() == SessionStatus::OpenMonitoring {
            let deadline = engine.next_deadline().expect("deadline armed while monitoring");
            let effects = engine.on_timeout(deadline);
            sent.extend(texts(&effects).into_iter().map(str::to_string));
        }

        assert_eq!(
            sent,
            vec!["ATI", "ATI", "ATZ", "ATZ", "ATZ", "ATI", "LP"]
        );
        assert_eq!(engine.status(), SessionStatus::OpenStoppedFromError);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn test_restart_after_exhaustion() {
        let (mut engine, _) = engine();
        engine.monitor_start(Instant::now()).unwrap();
        while engine.status() == SessionStatus::OpenMonitoring {
            let deadline = engine.next_deadline().unwrap();
            engine.on_timeout(deadline);
        }

        let effects = engine.monitor_start(Instant::now()).unwrap();
        assert_eq!(texts(&effects), vec!["ATI"]);
        assert_eq!(engine.handshake().ladder().cold_attempts(), 0);
    }

    #[test]
    fn test_monitor_data_timeout_resends_monitor() {
        let (mut engine, _) = engine();
        let now = to_monitoring(&mut engine, Instant::now());

        let effects = engine.on_timeout(now + Duration::from_millis(5000));
        assert_eq!(texts(&effects), vec!["ATMR11"]);
        assert_eq!(engine.scheduler().pending().unwrap().retry_count, 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut engine, _) = engine();
        engine.monitor_start(Instant::now()).unwrap();

        let effects = engine.monitor_stop().unwrap();
        assert_eq!(texts(&effects), vec!["ATI", "LP"]);
        assert_eq!(effects.reader, Some(ReaderControl::Stop));
        assert_eq!(engine.status(), SessionStatus::OpenStopped);

        engine.monitor_stop().unwrap();
        assert_eq!(engine.status(), SessionStatus::OpenStopped);
        assert!(engine.next_deadline().is_none());
    }

    #[test]
    fn test_data_while_stopped_is_discarded() {
        let (mut engine, performed) = engine();
        let effects = engine.on_bytes(b"3D 11 04 00 00\r", Instant::now());
        assert!(effects.is_empty());
        assert!(engine.scheduler().framer().is_empty());
        assert!(performed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_close_discards_pending_command() {
        let (mut engine, _) = engine();
        let now = Instant::now();
        engine.monitor_start(now).unwrap();

        let effects = engine.close(true);
        assert_eq!(texts(&effects), vec!["ATI", "LP"]);
        assert_eq!(engine.status(), SessionStatus::ClosedFromError);
        assert!(engine.next_deadline().is_none());
        assert!(engine.on_timeout(now + Duration::from_secs(10)).is_empty());
    }
}
