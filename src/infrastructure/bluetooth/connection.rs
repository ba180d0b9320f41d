//! SPP Connection Module
//!
//! Transport abstraction, the serial-port backend, and the per-connection
//! session state machine.

use crate::domain::error::{LinkError, LinkResult};
use crate::domain::models::{AppEvent, DeviceRef, SessionState, Status};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{protocol, reader};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// An open bidirectional byte stream to a peripheral.
///
/// `read` blocks until data arrives or the stream fails. `close` may be called
/// from any thread, must make a blocked `read` fail, and must tolerate being
/// called more than once.
pub trait Transport: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn close(&self) -> io::Result<()>;
}

/// Opens transports to resolved devices. `open` blocks.
pub trait Connector: Send + Sync {
    fn open(&self, device: &DeviceRef, service: Uuid) -> io::Result<Arc<dyn Transport>>;
}

/// Opens the serial port the SPP link is bound to at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialConnector {
    /// Line speed of the sensor's radio module
    pub baud_rate: u32,
    /// How often a blocked read wakes up to notice a close
    pub poll_interval: Duration,
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SerialConnector {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            baud_rate: settings.baud_rate,
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self, device: &DeviceRef, service: Uuid) -> io::Result<Arc<dyn Transport>> {
        info!(
            "Opening {} for {} (service {}) at {} baud",
            device.address, device.name, service, self.baud_rate
        );
        let port = serialport::new(&device.address, self.baud_rate)
            .timeout(self.poll_interval)
            .open()?;
        Ok(Arc::new(SerialTransport::new(port)))
    }
}

/// Serial port wrapped so it can be closed from another thread
pub struct SerialTransport {
    port: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    closed: AtomicBool,
}

impl SerialTransport {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self {
            port: Mutex::new(Some(port)),
            closed: AtomicBool::new(false),
        }
    }

    fn closed_error() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "transport closed")
    }
}

impl Transport for SerialTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        // The port timeout is only a wake-up interval; a quiet line keeps
        // waiting until data arrives or the transport is closed.
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Self::closed_error());
            }
            let mut guard = self
                .port
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "serial port lock poisoned"))?;
            let port = guard.as_mut().ok_or_else(Self::closed_error)?;
            match port.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                other => return other,
            }
        }
    }

    fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Serial transport already closed");
            return Ok(());
        }
        let port = self
            .port
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "serial port lock poisoned"))?
            .take();
        drop(port);
        Ok(())
    }
}

/// Per-session behavior
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Trace every byte of every received window
    pub raw_frame_logging: bool,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            raw_frame_logging: settings.debug_raw_frame_logging,
        }
    }
}

struct SessionInner {
    state: SessionState,
    transport: Option<Arc<dyn Transport>>,
}

/// One attempt to hold an open transport to a single device.
///
/// Every event of a session is sent while holding its state lock, so the
/// consumer sees them in lifecycle order and never sees a sample after the
/// session started closing.
pub(crate) struct Session {
    id: u64,
    device: DeviceRef,
    inner: Mutex<SessionInner>,
    connect_handle: Mutex<Option<JoinHandle<()>>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: SessionConfig,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        device: DeviceRef,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            device,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                transport: None,
            }),
            connect_handle: Mutex::new(None),
            event_sender,
            config,
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Enter `Connecting` and open the transport on a connector thread.
    ///
    /// If `previous` is given, the connector thread first waits for the
    /// previous session's connector to finish so its transport can never be
    /// open at the same time as this one.
    pub(crate) fn start(
        self: &Arc<Self>,
        connector: Arc<dyn Connector>,
        previous: Option<Arc<Session>>,
    ) -> LinkResult<()> {
        {
            let mut inner = self.lock();
            inner.state = SessionState::Connecting;
            self.emit(AppEvent::StatusChanged(Status::Connecting));
        }
        info!("[session {}] Connecting to {}", self.id, self.device.name);

        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("plantar-connect-{}", self.id))
            .spawn(move || {
                if let Some(previous) = previous {
                    previous.wait_for_connector();
                }
                session.run_connect(connector.as_ref());
            });

        match spawned {
            Ok(handle) => {
                *self
                    .connect_handle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("[session {}] Could not start connector thread: {}", self.id, e);
                let err = LinkError::ConnectFailure(e);
                let mut inner = self.lock();
                inner.state = SessionState::Closed;
                self.emit(AppEvent::StatusChanged(err.to_status()));
                Err(err)
            }
        }
    }

    fn run_connect(self: &Arc<Self>, connector: &dyn Connector) {
        let transport = match connector.open(&self.device, protocol::SPP_SERVICE_UUID) {
            Ok(transport) => transport,
            Err(e) => {
                error!("[session {}] Connection failed: {}", self.id, e);
                let mut inner = self.lock();
                if inner.state == SessionState::Connecting {
                    inner.state = SessionState::Closed;
                    self.emit(AppEvent::StatusChanged(
                        LinkError::ConnectFailure(e).to_status(),
                    ));
                }
                return;
            }
        };

        {
            let mut inner = self.lock();
            if inner.state != SessionState::Connecting {
                // Disconnected or superseded while the open was in flight
                drop(inner);
                info!(
                    "[session {}] Session ended during connect, closing new transport",
                    self.id
                );
                if let Err(e) = transport.close() {
                    warn!("[session {}] Failed to close late transport: {}", self.id, e);
                }
                return;
            }
            inner.transport = Some(Arc::clone(&transport));
            inner.state = SessionState::Connected;
            self.emit(AppEvent::StatusChanged(Status::Connected));
        }
        info!("[session {}] Connected to {}", self.id, self.device.name);

        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("plantar-read-{}", self.id))
            .spawn(move || reader::run(&session, transport.as_ref()));
        if let Err(e) = spawned {
            error!("[session {}] Could not start reader thread: {}", self.id, e);
            self.fail(LinkError::StreamFailure(e));
        }
    }

    fn wait_for_connector(&self) {
        let handle = self
            .connect_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("[session {}] Connector thread panicked", self.id);
            }
        }
    }

    /// Send `event` only while the session is `Connected`.
    ///
    /// Returns false once the session has left `Connected`, which tells the
    /// read loop to stop.
    pub(crate) fn emit_if_connected(&self, event: AppEvent) -> bool {
        let inner = self.lock();
        if inner.state != SessionState::Connected {
            return false;
        }
        self.emit(event);
        true
    }

    /// Terminal stream failure reported by the read loop.
    pub(crate) fn fail(&self, err: LinkError) {
        {
            let inner = self.lock();
            if inner.state != SessionState::Connected {
                // Expected when our own close unblocked the read
                debug!("[session {}] Read ended after close: {}", self.id, err);
                return;
            }
            warn!("[session {}] {}", self.id, err);
            self.emit(AppEvent::StatusChanged(err.to_status()));
        }
        if let Err(e) = self.close() {
            warn!("[session {}] {}", self.id, e);
        }
    }

    /// Close the session. Idempotent: only the first call has an effect, any
    /// later call (from any thread) returns `Ok(())` without doing anything.
    ///
    /// A `Connected` session passes through `Closing` while its transport is
    /// closed. A `Connecting` session owns no transport yet, so it moves to
    /// `Closed` directly and the connector thread closes whatever the pending
    /// open returns.
    pub(crate) fn close(&self) -> LinkResult<()> {
        let transport = {
            let mut inner = self.lock();
            match inner.state {
                SessionState::Idle | SessionState::Closing | SessionState::Closed => {
                    return Ok(());
                }
                SessionState::Connecting => {
                    inner.state = SessionState::Closed;
                    self.emit(AppEvent::StatusChanged(Status::Disconnected));
                    info!("[session {}] Cancelled while connecting", self.id);
                    return Ok(());
                }
                SessionState::Connected => {
                    inner.state = SessionState::Closing;
                    inner.transport.take()
                }
            }
        };

        let result = match transport {
            Some(transport) => transport.close().map_err(LinkError::CloseFailure),
            None => Ok(()),
        };

        let mut inner = self.lock();
        inner.state = SessionState::Closed;
        if let Err(e) = &result {
            error!("[session {}] {}", self.id, e);
            self.emit(AppEvent::StatusChanged(e.to_status()));
        }
        self.emit(AppEvent::StatusChanged(Status::Disconnected));
        info!("[session {}] Disconnected from {}", self.id, self.device.name);
        result
    }

    fn emit(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
