//! Session Supervisor
//!
//! Owns the serial device lifecycle. A watchdog tick inspects the session
//! status and starts monitoring, or closes and reopens the device, until the
//! process is told to shut down.

use crate::actions::CommandActionHandler;
use crate::settings::{DaemonConfig, SerialConfig};
use anyhow::{Context, Result};
use button_actions::ButtonAction;
use elm_session::{Session, SessionConfig, SessionHandle, SessionStatus};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::MissedTickBehavior;
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info, warn};

/// Opens the byte stream to the adapter
pub trait DeviceOpener: Send {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Open a fresh stream to the adapter
    fn open(&mut self) -> Result<Self::Stream>;
}

/// Native serial port
pub struct SerialOpener {
    config: SerialConfig,
}

impl SerialOpener {
    /// Opener for the configured device
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl DeviceOpener for SerialOpener {
    type Stream = tokio_serial::SerialStream;

    fn open(&mut self) -> Result<Self::Stream> {
        tokio_serial::new(&self.config.device, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .with_context(|| {
                format!(
                    "failed to open {} at {} baud",
                    self.config.device, self.config.baud_rate
                )
            })
    }
}

/// Keeps one session alive on the device
pub struct Supervisor<O: DeviceOpener> {
    opener: O,
    session_config: SessionConfig,
    actions: HashMap<ButtonAction, Vec<String>>,
    watchdog_interval: Duration,
    session: Option<SessionHandle>,
}

impl<O: DeviceOpener> Supervisor<O> {
    /// Supervisor with no session open yet
    pub fn new(config: &DaemonConfig, opener: O) -> Self {
        Self {
            opener,
            session_config: config.session.clone(),
            actions: config.actions.clone(),
            watchdog_interval: config.watchdog_interval(),
            session: None,
        }
    }

    /// Current session, if one is open
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Run the watchdog until `shutdown` resolves, then close the session
    pub async fn run<S>(mut self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        // first tick fires immediately and doubles as startup
        let mut watchdog = tokio::time::interval(self.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = watchdog.tick() => self.check().await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// One watchdog pass
    pub async fn check(&mut self) {
        let status = self.session.as_ref().map(SessionHandle::status);
        match status {
            Some(SessionStatus::OpenMonitoring) => {}
            Some(SessionStatus::OpenStopped) => self.start_monitoring().await,
            Some(status) => {
                warn!("Session is {}, reopening device", status);
                self.reopen().await;
            }
            None => self.reopen().await,
        }
    }

    /// Close the session, if any
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn reopen(&mut self) {
        if let Some(stale) = self.session.take() {
            stale.close().await;
        }

        match self.open_session() {
            Ok(session) => {
                tokio::spawn(log_status_changes(session.clone()));
                self.session = Some(session);
                self.start_monitoring().await;
            }
            Err(e) => error!("Could not open session: {:#}", e),
        }
    }

    fn open_session(&mut self) -> Result<SessionHandle> {
        let stream = self.opener.open()?;
        let handler = CommandActionHandler::new(self.actions.clone());
        let session = Session::open(stream, &self.session_config, Box::new(handler))?;
        Ok(session)
    }

    async fn start_monitoring(&mut self) {
        if let Some(session) = &self.session {
            if let Err(e) = session.monitor_start().await {
                error!("Could not start monitoring: {}", e);
            }
        }
    }
}

async fn log_status_changes(session: SessionHandle) {
    let mut status = session.subscribe();
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        info!("Session status: {}", current);
        if current.is_closed() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    /// Hands out in-memory adapters
    struct DuplexOpener {
        adapters: mpsc::UnboundedSender<DuplexStream>,
        fail: bool,
    }

    impl DeviceOpener for DuplexOpener {
        type Stream = DuplexStream;

        fn open(&mut self) -> Result<DuplexStream> {
            if self.fail {
                anyhow::bail!("no such device");
            }
            let (host, adapter) = tokio::io::duplex(1024);
            self.adapters.send(adapter)?;
            Ok(host)
        }
    }

    fn supervisor(fail: bool) -> (Supervisor<DuplexOpener>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let opener = DuplexOpener { adapters: tx, fail };
        (Supervisor::new(&DaemonConfig::default(), opener), rx)
    }

    async fn read_command(adapter: &mut DuplexStream) -> String {
        let mut received = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            adapter.read_exact(&mut byte).await.unwrap();
            if byte[0] == b'\r' {
                return String::from_utf8(received).unwrap();
            }
            received.push(byte[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_opens_and_starts_monitoring() {
        let (mut supervisor, mut adapters) = supervisor(false);
        supervisor.check().await;

        let session = supervisor.session().unwrap();
        assert_eq!(session.status(), SessionStatus::OpenMonitoring);

        let mut adapter = adapters.recv().await.unwrap();
        assert_eq!(read_command(&mut adapter).await, "ATI");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_session_is_restarted_in_place() {
        let (mut supervisor, mut adapters) = supervisor(false);
        supervisor.check().await;
        let mut adapter = adapters.recv().await.unwrap();
        assert_eq!(read_command(&mut adapter).await, "ATI");

        supervisor.session().unwrap().monitor_stop().await.unwrap();
        assert_eq!(read_command(&mut adapter).await, "ATI");
        assert_eq!(read_command(&mut adapter).await, "LP");

        supervisor.check().await;
        assert_eq!(
            supervisor.session().unwrap().status(),
            SessionStatus::OpenMonitoring
        );
        assert_eq!(read_command(&mut adapter).await, "ATI");
        assert!(adapters.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_session_is_reopened() {
        let (mut supervisor, mut adapters) = supervisor(false);
        supervisor.check().await;
        let _silent_adapter = adapters.recv().await.unwrap();

        let first = supervisor.session().unwrap().clone();
        let mut status = first.subscribe();
        status
            .wait_for(|s| *s == SessionStatus::OpenStoppedFromError)
            .await
            .unwrap();

        supervisor.check().await;
        assert_eq!(first.status(), SessionStatus::Closed);

        let mut adapter = adapters.recv().await.unwrap();
        assert_eq!(read_command(&mut adapter).await, "ATI");
        assert_eq!(
            supervisor.session().unwrap().status(),
            SessionStatus::OpenMonitoring
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_leaves_no_session() {
        let (mut supervisor, _adapters) = supervisor(true);
        supervisor.check().await;
        assert!(supervisor.session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_closes_session_on_shutdown() {
        let (supervisor, mut adapters) = supervisor(false);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(supervisor.run(async move {
            let _ = stop_rx.await;
        }));

        let mut adapter = adapters.recv().await.unwrap();
        assert_eq!(read_command(&mut adapter).await, "ATI");
        adapter.write_all(b"ATI\rELM327 v1.5\r\r>").await.unwrap();

        stop_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        // closing writes the interrupt and low power commands
        let mut rest = String::new();
        adapter.read_to_string(&mut rest).await.unwrap();
        assert!(rest.ends_with("ATI\rLP\r"));
    }
}
