use crate::domain::models::Status;
use std::io;
use thiserror::Error;

/// Failures of the connection core. None of these are fatal to the process;
/// each one is also reported to the consumer as a [`Status`].
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("bluetooth peripheral subsystem is unavailable")]
    DiscoveryUnavailable,

    #[error("device {0:?} was not found among paired devices")]
    DeviceNotFound(String),

    #[error("failed to open transport: {0}")]
    ConnectFailure(#[source] io::Error),

    #[error("stream read failed: {0}")]
    StreamFailure(#[source] io::Error),

    #[error("invalid frame: {0:02X?}")]
    FrameFormat([u8; 7]),

    #[error("failed to close transport: {0}")]
    CloseFailure(#[source] io::Error),
}

impl LinkError {
    /// Status reported to the consumer for this failure
    pub fn to_status(&self) -> Status {
        match self {
            Self::DiscoveryUnavailable => Status::DiscoveryUnavailable,
            Self::DeviceNotFound(name) => Status::DeviceNotFound(name.clone()),
            Self::ConnectFailure(e) => Status::ConnectFailed(e.to_string()),
            Self::StreamFailure(e) => Status::StreamLost(e.to_string()),
            Self::FrameFormat(bytes) => Status::FrameFormatError(*bytes),
            Self::CloseFailure(e) => Status::CloseFailed(e.to_string()),
        }
    }
}

pub type LinkResult<T> = std::result::Result<T, LinkError>;
