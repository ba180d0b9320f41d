//! Bluetooth Service Module
//!
//! Owns the single live connection to a foot-pressure sensor and is the only
//! entry point the consumer uses to connect and disconnect.

use crate::domain::error::LinkResult;
use crate::domain::models::{AppEvent, DeviceRef, SessionState};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::connection::{
    Connector, SerialConnector, Session, SessionConfig,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Coordinates connect/disconnect for at most one session at a time
pub struct BluetoothService {
    connector: Arc<dyn Connector>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    config: SessionConfig,
    current: Option<Arc<Session>>,
    next_session_id: u64,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        connector: Arc<dyn Connector>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        config: SessionConfig,
    ) -> Self {
        Self {
            connector,
            event_sender,
            config,
            current: None,
            next_session_id: 1,
        }
    }

    /// Service backed by the serial port transport configured in `settings`
    pub fn from_settings(settings: &Settings, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self::new(
            Arc::new(SerialConnector::from_settings(settings)),
            event_sender,
            SessionConfig::from_settings(settings),
        )
    }

    /// Start connecting to `device`.
    ///
    /// Returns as soon as the connect attempt is running; progress arrives as
    /// status events. A session that is still active is closed first.
    pub fn connect(&mut self, device: DeviceRef) -> LinkResult<()> {
        let previous = self.current.take();
        if let Some(prev) = &previous {
            if !prev.state().is_resting() {
                info!(
                    "Superseding session {} to {}",
                    prev.id(),
                    prev.device().name
                );
                if let Err(e) = prev.close() {
                    debug!("Superseded session {} closed with error: {}", prev.id(), e);
                }
            }
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        let session = Session::new(id, device, self.event_sender.clone(), self.config.clone());
        self.current = Some(Arc::clone(&session));
        session.start(Arc::clone(&self.connector), previous)
    }

    /// Close the current session, if any. Calling this again, or when nothing
    /// is connected, does nothing.
    pub fn disconnect(&mut self) -> LinkResult<()> {
        match &self.current {
            Some(session) => session.close(),
            None => Ok(()),
        }
    }

    /// State of the most recent session (`Idle` before the first connect)
    pub fn state(&self) -> SessionState {
        self.current
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Device of the most recent session
    pub fn device(&self) -> Option<&DeviceRef> {
        self.current.as_ref().map(|s| s.device())
    }
}

impl Drop for BluetoothService {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::LinkError;
    use crate::domain::models::Status;
    use crate::infrastructure::bluetooth::connection::testing::*;
    use crate::infrastructure::bluetooth::protocol;
    use std::io;
    use std::sync::mpsc as std_mpsc;
    use std::thread;
    use std::time::Duration;

    fn service(outcomes: Vec<Outcome>) -> (BluetoothService, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = BluetoothService::new(
            ScriptedConnector::new(outcomes),
            tx,
            SessionConfig::default(),
        );
        (service, rx)
    }

    fn sensor(name: &str) -> DeviceRef {
        DeviceRef::new(name, format!("/dev/{}", name))
    }

    #[test]
    fn test_idle_before_connect() {
        let (mut service, mut rx) = service(Vec::new());
        assert_eq!(service.state(), SessionState::Idle);
        assert!(service.device().is_none());
        assert!(service.disconnect().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_order_for_one_session() {
        let (transport, feed) = pipe();
        let (mut service, mut rx) = service(vec![Outcome::Open(transport.clone())]);

        service.connect(sensor("ESP32test")).unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Connected));
        assert!(service.is_connected());

        let mut bytes = protocol::encode(10).to_vec();
        bytes.extend_from_slice(&protocol::encode(20));
        feed.send(bytes).unwrap();
        assert_eq!(next_event(&mut rx), sample(10));
        assert_eq!(next_event(&mut rx), sample(20));

        service.disconnect().unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        assert_eq!(service.state(), SessionState::Closed);
        assert!(transport.is_closed());

        // Frames still in flight are never delivered after the final status
        let _ = feed.send(protocol::encode(30).to_vec());
        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_connect_failure_ends_closed() {
        let (mut service, mut rx) = service(vec![Outcome::Fail(io::ErrorKind::ConnectionRefused)]);

        service.connect(sensor("ESP32test")).unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert!(matches!(
            next_event(&mut rx),
            AppEvent::StatusChanged(Status::ConnectFailed(_))
        ));
        assert!(wait_until(|| service.state() == SessionState::Closed));

        // Nothing to close afterwards
        assert!(service.disconnect().is_ok());
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_while_connecting_does_not_leak_transport() {
        let (transport, _feed) = pipe();
        let (release, gate) = std_mpsc::channel();
        let (mut service, mut rx) = service(vec![Outcome::OpenWhen(transport.clone(), gate)]);

        service.connect(sensor("ESP32test")).unwrap();
        assert_eq!(service.state(), SessionState::Connecting);
        service.disconnect().unwrap();
        assert_eq!(service.state(), SessionState::Closed);

        release.send(()).unwrap();
        assert!(wait_until(|| transport.is_closed()));
        assert_eq!(service.state(), SessionState::Closed);

        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reconnect_supersedes_connected_session() {
        let (first, _first_feed) = pipe();
        let (second, second_feed) = pipe();
        let (mut service, mut rx) = service(vec![
            Outcome::Open(first.clone()),
            Outcome::Open(second.clone()),
        ]);

        service.connect(sensor("ESP32test")).unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Connected));

        service.connect(sensor("RNBT-85CD")).unwrap();
        assert!(first.is_closed());
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Connected));
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(service.device().map(|d| d.name.as_str()), Some("RNBT-85CD"));

        second_feed.send(protocol::encode(7).to_vec()).unwrap();
        assert_eq!(next_event(&mut rx), sample(7));
    }

    #[test]
    fn test_supersede_while_connecting_waits_for_previous_open() {
        let (first, _first_feed) = pipe();
        let (second, _second_feed) = pipe();
        let (release, gate) = std_mpsc::channel();
        let (mut service, mut rx) = service(vec![
            Outcome::OpenWhen(first.clone(), gate),
            Outcome::Open(second.clone()),
        ]);

        service.connect(sensor("ESP32test")).unwrap();
        service.connect(sensor("RNBT-85CD")).unwrap();

        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        assert_eq!(next_event(&mut rx), status(Status::Connecting));

        // The new session can't open until the old open has returned
        thread::sleep(Duration::from_millis(20));
        assert_eq!(service.state(), SessionState::Connecting);

        release.send(()).unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Connected));
        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[test]
    fn test_stream_failure_then_reconnect() {
        let (first, first_feed) = pipe();
        let (second, _second_feed) = pipe();
        let (mut service, mut rx) = service(vec![
            Outcome::Open(first.clone()),
            Outcome::Open(second),
        ]);

        service.connect(sensor("ESP32test")).unwrap();
        next_event(&mut rx);
        next_event(&mut rx);

        drop(first_feed);
        assert!(matches!(
            next_event(&mut rx),
            AppEvent::StatusChanged(Status::StreamLost(_))
        ));
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        assert!(wait_until(|| service.state() == SessionState::Closed));

        // Consumer-side disconnect after the failure is a no-op
        assert!(service.disconnect().is_ok());
        assert_eq!(first.close_calls(), 1);

        service.connect(sensor("ESP32test")).unwrap();
        assert_eq!(next_event(&mut rx), status(Status::Connecting));
        assert_eq!(next_event(&mut rx), status(Status::Connected));
    }

    #[test]
    fn test_close_failure_is_reported() {
        let (transport, _feed) = pipe_with(true);
        let (mut service, mut rx) = service(vec![Outcome::Open(transport)]);

        service.connect(sensor("ESP32test")).unwrap();
        next_event(&mut rx);
        next_event(&mut rx);

        assert!(matches!(
            service.disconnect(),
            Err(LinkError::CloseFailure(_))
        ));
        assert!(matches!(
            next_event(&mut rx),
            AppEvent::StatusChanged(Status::CloseFailed(_))
        ));
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
        assert!(service.disconnect().is_ok());
    }

    #[test]
    fn test_drop_closes_live_session() {
        let (transport, _feed) = pipe();
        let (mut service, mut rx) = service(vec![Outcome::Open(transport.clone())]);

        service.connect(sensor("ESP32test")).unwrap();
        next_event(&mut rx);
        next_event(&mut rx);

        drop(service);
        assert!(transport.is_closed());
        assert_eq!(next_event(&mut rx), status(Status::Disconnected));
    }
}
