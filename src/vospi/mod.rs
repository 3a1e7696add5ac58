//! VoSPI video stream decoding.
//!
//! The Lepton streams each frame as four segments of fixed-size packets. Packets carry a
//! 16-bit identifier holding the segment number (TTT bits) and the line number within the
//! segment, a 16-bit checksum, and 160 bytes of payload. Between segments the sensor emits
//! discard packets that carry no data.
//!
//! References:
//! * FLIR Lepton 3 Engineering Datasheet, section 4 (VoSPI)
mod frame;
mod packet;
mod segment;
mod synchronizer;

#[cfg(all(feature = "linux", target_os = "linux"))]
pub mod device;

pub use frame::*;
pub use packet::*;
pub use segment::*;
pub use synchronizer::*;

use serde::{Deserialize, Serialize};

/// Size in bytes of a single VoSPI packet on the wire.
pub const PACKET_BYTES: usize = 164;
/// Size in bytes of the payload following the packet header.
pub const PAYLOAD_BYTES: usize = PACKET_BYTES - PacketHeader::LEN;
/// Packets per segment when telemetry is disabled.
pub const PACKETS_PER_SEGMENT: usize = 60;
/// Packets per segment when telemetry is enabled.
pub const PACKETS_PER_SEGMENT_TELEMETRY: usize = 61;
/// Segments making up a complete frame.
pub const SEGMENTS_PER_FRAME: usize = 4;
/// Index of the packet whose identifier carries the segment number.
pub const ANCHOR_PACKET: usize = 20;

/// Frame width in pixels.
pub const FRAME_WIDTH: usize = 160;
/// Frame height in pixels.
pub const FRAME_HEIGHT: usize = 120;

/// Whether the sensor is emitting telemetry lines, which changes the segment length.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    #[default]
    Disabled,
    Enabled,
}

impl TelemetryMode {
    #[must_use]
    pub fn packets_per_segment(self) -> usize {
        match self {
            TelemetryMode::Disabled => PACKETS_PER_SEGMENT,
            TelemetryMode::Enabled => PACKETS_PER_SEGMENT_TELEMETRY,
        }
    }

    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == TelemetryMode::Enabled
    }

    /// Value of this mode in the CCI telemetry enable enumeration.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            TelemetryMode::Disabled => 0,
            TelemetryMode::Enabled => 1,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(TelemetryMode::Disabled),
            1 => Some(TelemetryMode::Enabled),
            _ => None,
        }
    }
}
