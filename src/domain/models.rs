use std::fmt;

/// A paired peripheral that can be connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    /// Advertised name, the only key used for selection
    pub name: String,
    /// Opaque transport address (serial port path for the serial backend)
    pub address: String,
}

impl DeviceRef {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    SampleReceived { magnitude: u16 },
    StatusChanged(Status),
}

/// Lifecycle of a single connection session.
///
/// `Closing` only appears while an open transport is being closed. A session
/// cancelled during `Connecting` has none and moves straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Closing,
    Closed,
}

impl SessionState {
    /// `Idle` and `Closed` hold no transport and accept a new connect.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }
}

/// Status notifications delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    DeviceFound(String),
    DeviceNotFound(String),
    DiscoveryUnavailable,
    Connecting,
    Connected,
    Disconnected,
    ConnectFailed(String),
    StreamLost(String),
    FrameFormatError([u8; 7]),
    CloseFailed(String),
}

impl Status {
    pub fn severity(&self) -> MessageSeverity {
        match self {
            Self::DeviceFound(_) | Self::Connecting | Self::Disconnected => MessageSeverity::Info,
            Self::Connected => MessageSeverity::Success,
            Self::DeviceNotFound(_)
            | Self::DiscoveryUnavailable
            | Self::FrameFormatError(_)
            | Self::CloseFailed(_) => MessageSeverity::Warning,
            Self::ConnectFailed(_) | Self::StreamLost(_) => MessageSeverity::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceFound(name) => write!(f, "device {} has been found", name),
            Self::DeviceNotFound(name) => write!(f, "device {} is not paired", name),
            Self::DiscoveryUnavailable => write!(f, "bluetooth is unavailable"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::ConnectFailed(reason) => write!(f, "could not connect to device: {}", reason),
            Self::StreamLost(reason) => write!(f, "connection to device was lost: {}", reason),
            Self::FrameFormatError(bytes) => {
                write!(f, "received data has an invalid format: {:02X?}", bytes)
            }
            Self::CloseFailed(reason) => write!(f, "failed to disconnect: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text() {
        assert_eq!(Status::Connecting.to_string(), "connecting");
        assert_eq!(Status::Connected.to_string(), "connected");
        assert_eq!(Status::Disconnected.to_string(), "disconnected");
        assert_eq!(
            Status::DeviceFound("ESP32test".into()).to_string(),
            "device ESP32test has been found"
        );
    }

    #[test]
    fn test_resting_states() {
        assert!(SessionState::Idle.is_resting());
        assert!(SessionState::Closed.is_resting());
        assert!(!SessionState::Connecting.is_resting());
        assert!(!SessionState::Connected.is_resting());
        assert!(!SessionState::Closing.is_resting());
    }

    #[test]
    fn test_severity() {
        assert_eq!(Status::Connected.severity(), MessageSeverity::Success);
        assert_eq!(
            Status::FrameFormatError([0; 7]).severity(),
            MessageSeverity::Warning
        );
        assert_eq!(
            Status::StreamLost("eof".into()).severity(),
            MessageSeverity::Error
        );
    }
}
