//! Read loop
//!
//! Runs on its own thread for the lifetime of a connected session.

use crate::domain::error::LinkError;
use crate::domain::models::AppEvent;
use crate::infrastructure::bluetooth::connection::{Session, Transport};
use crate::infrastructure::bluetooth::protocol::{self, FRAME_LEN};
use std::io;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Read 7-byte windows until the stream fails or the session stops
/// accepting events.
///
/// Windows are taken back to back; a bad window is reported and skipped
/// without realigning on the next start sentinel.
pub(crate) fn run(session: &Arc<Session>, transport: &dyn Transport) {
    let id = session.id();
    info!("[session {}] Read loop started", id);

    let mut frame = [0u8; FRAME_LEN];
    let mut decoded: u64 = 0;
    loop {
        if let Err(e) = read_frame(transport, &mut frame) {
            session.fail(LinkError::StreamFailure(e));
            break;
        }

        if session.config().raw_frame_logging {
            for (i, byte) in frame.iter().enumerate() {
                trace!("[session {}] frame[{}]: {}", id, i, byte);
            }
        }

        let event = match protocol::decode(&frame) {
            Ok(magnitude) => {
                decoded += 1;
                debug!("[session {}] sensor value: {}", id, magnitude);
                AppEvent::SampleReceived { magnitude }
            }
            Err(e) => {
                warn!("[session {}] {}", id, e);
                AppEvent::StatusChanged(e.to_status())
            }
        };

        if !session.emit_if_connected(event) {
            break;
        }
    }

    info!("[session {}] Read loop finished after {} samples", id, decoded);
}

/// Fill `frame` completely, accumulating short reads.
fn read_frame(transport: &dyn Transport, frame: &mut [u8; FRAME_LEN]) -> io::Result<()> {
    let mut filled = 0;
    while filled < FRAME_LEN {
        match transport.read(&mut frame[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed by peer",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
