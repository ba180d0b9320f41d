//! Foot Pressure Sensor Protocol
//!
//! Wire format and service identifiers for the sensor's serial link.

use crate::domain::error::{LinkError, LinkResult};
use uuid::Uuid;

/// Standard Serial Port Profile service class UUID
pub const SPP_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Length of one frame on the wire
pub const FRAME_LEN: usize = 7;

pub const START_SENTINEL: u8 = b's';
pub const MIDDLE_SENTINEL: u8 = b'm';
pub const END_SENTINEL: u8 = b'e';

/// Decode one 7-byte frame into a sensor magnitude
///
/// # Frame Structure (7 bytes)
///
/// ```text
/// [0]   : 's'
/// [1-2] : Magnitude (u16 big-endian)
/// [3]   : 'm'
/// [4-5] : Reserved
/// [6]   : 'e'
/// ```
///
/// There is no length field. A window whose sentinels don't match is reported
/// as [`LinkError::FrameFormat`]; the caller does not try to realign.
pub fn decode(frame: &[u8; FRAME_LEN]) -> LinkResult<u16> {
    if frame[0] != START_SENTINEL || frame[3] != MIDDLE_SENTINEL || frame[6] != END_SENTINEL {
        return Err(LinkError::FrameFormat(*frame));
    }
    Ok(u16::from_be_bytes([frame[1], frame[2]]))
}

/// Build a well-formed frame carrying `magnitude`
pub fn encode(magnitude: u16) -> [u8; FRAME_LEN] {
    let [hi, lo] = magnitude.to_be_bytes();
    [START_SENTINEL, hi, lo, MIDDLE_SENTINEL, 0, 0, END_SENTINEL]
}
