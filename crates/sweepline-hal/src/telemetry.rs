//! Telemetry decoder: refreshes the [`SensorSnapshot`] from the serial link.
//!
//! Each call to [`TelemetryDecoder::poll`] decodes zero or one frame.  A frame
//! is only attempted once a full [`TELEMETRY_FRAME_LEN`] bytes are buffered; a
//! bad header is logged and skipped, never fatal.  Whatever is left in the
//! receive buffer afterwards is discarded so the next poll starts on a fresh
//! frame boundary.

use sweepline_types::{SensorSnapshot, SweepError};
use tracing::{debug, warn};

use crate::transport::SerialLink;
use crate::wire::{TELEMETRY_FRAME_LEN, TELEMETRY_HEADER, TELEMETRY_PAYLOAD_LEN, decode_telemetry};

/// Result of a single [`TelemetryDecoder::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fewer than a full frame buffered; nothing read.
    Idle,
    /// The snapshot was overwritten with a fresh reading.
    Updated,
    /// A frame-sized chunk was read but its first byte was not
    /// [`TELEMETRY_HEADER`]; the snapshot is unchanged.
    UnknownPacket(u8),
}

/// Stateless apart from counters kept for diagnostics.
#[derive(Debug, Default)]
pub struct TelemetryDecoder {
    frames_decoded: u64,
    unknown_packets: u64,
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode at most one frame from `link` into `snapshot`.
    ///
    /// # Errors
    ///
    /// Propagates [`SweepError::Link`] from the underlying link, including a
    /// short read after the link reported a full frame available.
    pub fn poll(
        &mut self,
        link: &mut dyn SerialLink,
        snapshot: &mut SensorSnapshot,
    ) -> Result<PollOutcome, SweepError> {
        if link.available()? < TELEMETRY_FRAME_LEN {
            return Ok(PollOutcome::Idle);
        }

        let mut header = [0u8; 1];
        read_exact(link, &mut header)?;

        let outcome = if header[0] == TELEMETRY_HEADER {
            let mut payload = [0u8; TELEMETRY_PAYLOAD_LEN];
            read_exact(link, &mut payload)?;
            *snapshot = decode_telemetry(&payload);
            self.frames_decoded += 1;
            debug!(
                front = snapshot.us_front,
                left = snapshot.us_left,
                right = snapshot.us_right,
                enc_a = snapshot.encoder_a,
                enc_b = snapshot.encoder_b,
                "telemetry frame decoded"
            );
            PollOutcome::Updated
        } else {
            self.unknown_packets += 1;
            warn!(
                port = link.name(),
                header = format_args!("{:#04x}", header[0]),
                "unrecognized packet"
            );
            PollOutcome::UnknownPacket(header[0])
        };

        link.discard_input()?;
        Ok(outcome)
    }

    /// Frames successfully decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Frame-sized chunks rejected for a bad header.
    pub fn unknown_packets(&self) -> u64 {
        self.unknown_packets
    }
}

fn read_exact(link: &mut dyn SerialLink, buf: &mut [u8]) -> Result<(), SweepError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = link.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(SweepError::Link {
                port: link.name().to_string(),
                details: format!("short read: {filled} of {} bytes", buf.len()),
            });
        }
        filled += n;
    }
    Ok(())
}
