//! Paired Device Lookup
//!
//! Resolves a sensor by name from the set of peripherals already paired with
//! this machine.

use crate::domain::error::{LinkError, LinkResult};
use crate::domain::models::{AppEvent, DeviceRef, Status};
use crate::domain::settings::Settings;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A read-only view of the peripherals known to the platform.
pub trait PeripheralSource: Send + Sync {
    /// Known peripherals in platform order.
    ///
    /// Returns [`LinkError::DiscoveryUnavailable`] when the subsystem is off
    /// or missing.
    fn paired_devices(&self) -> LinkResult<Vec<DeviceRef>>;
}

/// Paired-device table kept in the settings file
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPeripherals {
    enabled: bool,
    devices: Vec<DeviceRef>,
}

impl ConfiguredPeripherals {
    pub fn new(enabled: bool, devices: Vec<DeviceRef>) -> Self {
        Self { enabled, devices }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let devices = settings
            .paired_devices
            .iter()
            .map(|d| DeviceRef::new(d.name.clone(), d.port.clone()))
            .collect();
        Self::new(settings.bluetooth_enabled, devices)
    }
}

impl PeripheralSource for ConfiguredPeripherals {
    fn paired_devices(&self) -> LinkResult<Vec<DeviceRef>> {
        if !self.enabled {
            return Err(LinkError::DiscoveryUnavailable);
        }
        Ok(self.devices.clone())
    }
}

/// Bluetooth serial ports the operating system has bound
///
/// Devices are named after their port (`rfcomm0`, `COM7`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPeripherals;

impl PeripheralSource for SystemPeripherals {
    fn paired_devices(&self) -> LinkResult<Vec<DeviceRef>> {
        let ports = serialport::available_ports().map_err(|e| {
            warn!("Serial port enumeration failed: {}", e);
            LinkError::DiscoveryUnavailable
        })?;

        Ok(ports
            .into_iter()
            .filter(|p| {
                matches!(p.port_type, serialport::SerialPortType::BluetoothPort)
                    || p.port_name.contains("rfcomm")
            })
            .map(|p| DeviceRef::new(port_display_name(&p.port_name), p.port_name))
            .collect())
    }
}

fn port_display_name(port_name: &str) -> String {
    Path::new(port_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| port_name.to_string())
}

/// Devices of `first` followed by devices of `second`. Unavailable only if
/// both sources are.
pub struct ChainedPeripherals<A, B> {
    first: A,
    second: B,
}

impl<A, B> ChainedPeripherals<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: PeripheralSource, B: PeripheralSource> PeripheralSource for ChainedPeripherals<A, B> {
    fn paired_devices(&self) -> LinkResult<Vec<DeviceRef>> {
        match (self.first.paired_devices(), self.second.paired_devices()) {
            (Err(_), Err(_)) => Err(LinkError::DiscoveryUnavailable),
            (first, second) => {
                let mut devices = first.unwrap_or_default();
                devices.extend(second.unwrap_or_default());
                Ok(devices)
            }
        }
    }
}

/// Selects a paired peripheral by exact name
pub struct DeviceLocator<S> {
    source: S,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<S: PeripheralSource> DeviceLocator<S> {
    pub fn new(source: S, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            source,
            event_sender,
        }
    }

    /// Find the first paired device whose name equals `name` (case-sensitive)
    pub fn resolve(&self, name: &str) -> LinkResult<DeviceRef> {
        let result = self.source.paired_devices().and_then(|devices| {
            debug!("Searching {} paired devices for {:?}", devices.len(), name);
            devices
                .into_iter()
                .find(|d| d.name == name)
                .ok_or_else(|| LinkError::DeviceNotFound(name.to_string()))
        });

        match &result {
            Ok(device) => {
                info!("Found target device: {} at {}", device.name, device.address);
                self.send_status(Status::DeviceFound(device.name.clone()));
            }
            Err(e) => {
                warn!("Device lookup failed: {}", e);
                self.send_status(e.to_status());
            }
        }
        result
    }

    /// All peripherals the source currently knows about
    pub fn known_devices(&self) -> LinkResult<Vec<DeviceRef>> {
        self.source.paired_devices()
    }

    fn send_status(&self, status: Status) {
        let _ = self.event_sender.send(AppEvent::StatusChanged(status));
    }
}
