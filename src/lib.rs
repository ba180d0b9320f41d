//! Bluetooth serial link to a foot-pressure sensor.
//!
//! Resolve a paired device with [`DeviceLocator`], hand it to
//! [`BluetoothService::connect`], and receive [`AppEvent`]s on the channel the
//! service was built with.

pub mod domain;
pub mod infrastructure;

pub use domain::error::{LinkError, LinkResult};
pub use domain::models::{AppEvent, DeviceRef, MessageSeverity, SessionState, Status};
pub use infrastructure::bluetooth::connection::{
    Connector, SerialConnector, SessionConfig, Transport,
};
pub use infrastructure::bluetooth::scanner::{
    ChainedPeripherals, ConfiguredPeripherals, DeviceLocator, PeripheralSource, SystemPeripherals,
};
pub use infrastructure::bluetooth::BluetoothService;
