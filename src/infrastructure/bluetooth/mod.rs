//! Bluetooth Module
//!
//! Serial Port Profile link to a foot-pressure sensor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │   (owns the one live session - public API for consumers) │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┬──────────────┐
//!         │             │             │              │
//!         ▼             ▼             ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │  Reader  │  │ Protocol │
//! │           │  │            │  │          │  │          │
//! │ - paired  │  │ - session  │  │ - 7-byte │  │ - frame  │
//! │   lookup  │  │   states   │  │   reads  │  │   decode │
//! │           │  │ - transport│  │          │  │ - UUID   │
//! └───────────┘  └────────────┘  └──────────┘  └──────────┘
//! ```
//!
//! ## Threads
//!
//! Opening the transport runs on a per-session connector thread and reading
//! runs on a per-session reader thread, so neither blocks the consumer.
//!
//! ## Modules
//!
//! - [`protocol`] - Frame format and service UUID
//! - [`scanner`] - Paired device lookup by name
//! - [`connection`] - Transport, serial backend and session state machine
//! - [`reader`] - Blocking read loop
//! - [`service`] - Main service coordinator

pub mod connection;
pub mod protocol;
mod reader;
pub mod scanner;
pub mod service;

// Re-export main service for convenience
pub use service::BluetoothService;
