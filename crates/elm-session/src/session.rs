//! Session actor
//!
//! One tokio task owns the [`SessionEngine`] and the write half of the
//! transport. A background reader task owns the read half and pushes chunks
//! into the actor. Requests, chunks and deadlines are processed strictly one
//! at a time, so at most one command exchange is ever in flight.

use crate::config::SessionConfig;
use crate::engine::{Effects, ReaderControl, SessionEngine};
use crate::error::SessionError;
use crate::scheduler::Outbound;
use crate::status::SessionStatus;
use button_actions::{ActionHandler, DispatchResult};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Pause after a failed read before trying again
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

enum Request {
    MonitorStart {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    MonitorStop {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Close {
        from_error: bool,
        reply: oneshot::Sender<()>,
    },
}

enum ReaderEvent {
    Data(Vec<u8>),
    Error(String),
    EndOfStream,
}

/// Chunks are tagged with the reader generation that produced them so that
/// bytes from a stopped reader are never fed to a restarted handshake
struct TaggedEvent {
    generation: u64,
    event: ReaderEvent,
}

/// Entry point for opening a session on a transport
pub struct Session;

impl Session {
    /// Start a session on an opened device; the status begins at
    /// [`SessionStatus::OpenStopped`]
    pub fn open<T>(
        transport: T,
        config: &SessionConfig,
        handler: Box<dyn ActionHandler>,
    ) -> Result<SessionHandle, SessionError>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let engine = SessionEngine::new(config, handler)?;
        let (reader, writer) = tokio::io::split(transport);
        let (request_tx, request_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(engine.status());

        let actor = SessionActor {
            engine,
            writer,
            reader: Some(reader),
            reader_task: None,
            generation: 0,
            send_timeout: config.timing.send_timeout(),
            requests: request_rx,
            event_tx,
            events: event_rx,
            status_tx,
        };

        info!("Session opened");
        tokio::spawn(actor.run());

        Ok(SessionHandle {
            requests: request_tx,
            status: status_rx,
        })
    }
}

/// Cheap, cloneable handle used by the device lifecycle owner
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    /// Reset the reader and run the handshake into monitor mode
    pub async fn monitor_start(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::MonitorStart { reply }, "start monitoring")
            .await?;
        rx.await
            .map_err(|_| SessionError::NotOpen("start monitoring"))?
    }

    /// Interrupt the adapter and stop reading
    pub async fn monitor_stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::MonitorStop { reply }, "stop monitoring")
            .await?;
        rx.await
            .map_err(|_| SessionError::NotOpen("stop monitoring"))?
    }

    /// Close the session; a no-op once closed
    pub async fn close(&self) {
        self.close_with(false).await;
    }

    /// Close the session after a device failure
    pub async fn close_from_error(&self) {
        self.close_with(true).await;
    }

    async fn close_with(&self, from_error: bool) {
        let (reply, rx) = oneshot::channel();
        if self
            .requests
            .send(Request::Close { from_error, reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn request(&self, request: Request, operation: &'static str) -> Result<(), SessionError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| SessionError::NotOpen(operation))
    }

    /// Current status
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Status change notifications
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}

struct SessionActor<T> {
    engine: SessionEngine,
    writer: WriteHalf<T>,
    /// Read half while no reader task is running
    reader: Option<ReadHalf<T>>,
    reader_task: Option<(oneshot::Sender<()>, JoinHandle<ReadHalf<T>>)>,
    generation: u64,
    send_timeout: Duration,
    requests: mpsc::Receiver<Request>,
    event_tx: mpsc::UnboundedSender<TaggedEvent>,
    events: mpsc::UnboundedReceiver<TaggedEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<T> SessionActor<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        loop {
            let deadline = self.engine.next_deadline();

            tokio::select! {
                biased;

                request = self.requests.recv() => match request {
                    Some(Request::MonitorStart { reply }) => {
                        let result = match self.engine.monitor_start(Instant::now()) {
                            Ok(effects) => {
                                self.apply(effects).await;
                                Ok(())
                            }
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    }
                    Some(Request::MonitorStop { reply }) => {
                        let result = match self.engine.monitor_stop() {
                            Ok(effects) => {
                                self.apply(effects).await;
                                Ok(())
                            }
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    }
                    Some(Request::Close { from_error, reply }) => {
                        self.close(from_error).await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        debug!("All session handles dropped, closing");
                        self.close(false).await;
                        break;
                    }
                },

                Some(tagged) = self.events.recv() => {
                    if tagged.generation != self.generation {
                        debug!("Dropping data from a stopped reader");
                        continue;
                    }
                    match tagged.event {
                        ReaderEvent::Data(chunk) => {
                            let effects = self.engine.on_bytes(&chunk, Instant::now());
                            self.apply(effects).await;
                        }
                        ReaderEvent::Error(cause) => {
                            warn!("Transport error: {}", cause);
                        }
                        ReaderEvent::EndOfStream => {
                            warn!("Transport reached end of stream");
                        }
                    }
                }

                _ = wait_until(deadline) => {
                    let effects = self.engine.on_timeout(Instant::now());
                    self.apply(effects).await;
                }
            }
        }

        debug!("Session task finished");
    }

    async fn close(&mut self, from_error: bool) {
        let effects = self.engine.close(from_error);
        self.apply(effects).await;
        if let Err(e) = self.writer.shutdown().await {
            debug!("Transport shutdown failed: {}", e);
        }
    }

    /// Carry out the I/O of one engine step
    async fn apply(&mut self, effects: Effects) {
        if effects.reader == Some(ReaderControl::Restart) {
            self.restart_reader().await;
        }

        for outbound in effects.writes {
            self.write(outbound).await;
        }

        if effects.reader == Some(ReaderControl::Stop) {
            self.stop_reader().await;
        }

        for result in effects.dispatched {
            if let DispatchResult::Success(action) = result {
                info!("Button action performed: {}", action);
            }
        }

        self.publish_status();
    }

    /// Write a command within the send timeout; a short write is logged only
    async fn write(&mut self, outbound: Outbound) -> bool {
        debug!("Sending command: {}", outbound.text);

        let expected = outbound.bytes.len();
        let mut written = 0;
        let writer = &mut self.writer;
        let result = tokio::time::timeout(self.send_timeout, async {
            while written < expected {
                let n = writer.write(&outbound.bytes[written..]).await?;
                if n == 0 {
                    break;
                }
                written += n;
            }
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) if written == expected => true,
            Ok(Err(e)) => {
                error!("Error writing command {} to device: {}", outbound.text, e);
                false
            }
            _ => {
                let failure = SessionError::TransportWrite {
                    command: outbound.text,
                    written,
                    expected,
                };
                error!("{}", failure);
                false
            }
        }
    }

    async fn restart_reader(&mut self) {
        self.stop_reader().await;

        let Some(reader) = self.reader.take() else {
            error!("Serial reader unavailable, cannot restart it");
            return;
        };

        self.generation += 1;
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(read_loop(
            reader,
            self.generation,
            self.event_tx.clone(),
            stop_rx,
        ));
        self.reader_task = Some((stop_tx, task));
        debug!(generation = self.generation, "Serial reader started");
    }

    async fn stop_reader(&mut self) {
        let Some((stop, task)) = self.reader_task.take() else {
            return;
        };

        let _ = stop.send(());
        match task.await {
            Ok(reader) => self.reader = Some(reader),
            Err(e) => error!("Serial reader task failed: {}", e),
        }
        // anything still queued from this reader is stale
        self.generation += 1;
    }

    fn publish_status(&self) {
        let status = self.engine.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!("Session status: {} -> {}", current, status);
            *current = status;
            true
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Pull bytes from the transport until stopped; returns the read half so it
/// can be restarted later
async fn read_loop<R>(
    mut reader: R,
    generation: u64,
    events: mpsc::UnboundedSender<TaggedEvent>,
    mut stop: oneshot::Receiver<()>,
) -> R
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];
    let send = |event: ReaderEvent| events.send(TaggedEvent { generation, event }).is_ok();

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => break,

            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    send(ReaderEvent::EndOfStream);
                    break;
                }
                Ok(n) => {
                    if !send(ReaderEvent::Data(buf[..n].to_vec())) {
                        break;
                    }
                }
                Err(e) => {
                    if !send(ReaderEvent::Error(e.to_string())) {
                        break;
                    }
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }
    }

    reader
}
