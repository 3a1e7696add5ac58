use std::io::{ErrorKind, Read};

use tracing::trace;

use super::{PACKET_BYTES, PAYLOAD_BYTES};
use crate::{CancelToken, Error, Result};

/// VoSPI packet identifier and checksum, in host byte order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u16,
    pub crc: u16,
}

impl PacketHeader {
    /// Header length in bytes
    pub const LEN: usize = 4;
    /// Identifier bits that are all set for a discard packet
    pub const DISCARD_MASK: u16 = 0x0f00;

    /// Construct a header for the given segment and line number.
    #[must_use]
    pub fn new(segment: u8, line: u8, crc: u16) -> Self {
        PacketHeader {
            id: (u16::from(segment & 0x7) << 12) | u16::from(line),
            crc,
        }
    }

    /// A discard packet header.
    #[must_use]
    pub fn discard() -> Self {
        PacketHeader {
            id: Self::DISCARD_MASK | 0xff,
            crc: 0,
        }
    }

    /// Construct from wire bytes, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        Some(PacketHeader {
            id: u16::from_be_bytes([dat[0], dat[1]]),
            crc: u16::from_be_bytes([dat[2], dat[3]]),
        })
    }

    /// Wire encoding of this header.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let id = self.id.to_be_bytes();
        let crc = self.crc.to_be_bytes();
        [id[0], id[1], crc[0], crc[1]]
    }

    /// Segment number (TTT bits). Only meaningful on the anchor packet.
    #[must_use]
    pub fn segment(&self) -> u8 {
        ((self.id >> 12) & 0x7) as u8
    }

    /// Line number within the segment.
    #[must_use]
    pub fn line(&self) -> usize {
        usize::from(self.id & 0x00ff)
    }

    #[must_use]
    pub fn is_discard(&self) -> bool {
        self.id & Self::DISCARD_MASK == Self::DISCARD_MASK
    }
}

/// A decoded packet borrowing its payload from the owning segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Iterate the big-endian 16-bit samples in the payload.
    pub fn samples(&self) -> impl Iterator<Item = u16> + 'a {
        self.payload
            .chunks_exact(2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Issue a single read for exactly `buf.len()` bytes.
///
/// A bus transfer is one transaction, so a short read is reported rather than topped up
/// with a second transfer.
pub(crate) fn read_transfer<R: Read>(bus: &mut R, buf: &mut [u8]) -> Result<()> {
    let n = loop {
        match bus.read(buf) {
            Ok(n) => break n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    };
    if n != buf.len() {
        return Err(Error::ShortRead {
            expected: buf.len(),
            actual: n,
        });
    }
    Ok(())
}

/// Read one non-discard packet into `buf`.
///
/// Discard packets are read over in place, at most `max_discards` times. `buf` must be
/// [PACKET_BYTES] long.
///
/// # Errors
/// [Error::ShortRead] or [Error::Io] on bus failure, [Error::DiscardLimit] if only
/// discard packets were seen, [Error::Cancelled] if `cancel` fires between reads.
///
/// # Panics
/// If `buf` is not [PACKET_BYTES] long.
pub fn read_packet<R: Read>(
    bus: &mut R,
    buf: &mut [u8],
    max_discards: usize,
    cancel: &CancelToken,
) -> Result<PacketHeader> {
    assert_eq!(buf.len(), PACKET_BYTES, "packet buffer has wrong length");

    let mut discards = 0;
    loop {
        read_transfer(bus, buf)?;
        // length checked above
        let header = PacketHeader::decode(buf).unwrap_or_default();
        if !header.is_discard() {
            if discards > 0 {
                trace!(discards, "skipped discard packets");
            }
            return Ok(header);
        }
        discards += 1;
        if discards > max_discards {
            return Err(Error::DiscardLimit { count: discards });
        }
        cancel.check()?;
    }
}

/// Encode a packet into wire bytes.
///
/// The payload is truncated or zero padded to [PAYLOAD_BYTES].
#[must_use]
pub fn encode_packet(header: PacketHeader, payload: &[u8]) -> [u8; PACKET_BYTES] {
    let mut buf = [0u8; PACKET_BYTES];
    buf[..PacketHeader::LEN].copy_from_slice(&header.encode());
    let n = payload.len().min(PAYLOAD_BYTES);
    buf[PacketHeader::LEN..PacketHeader::LEN + n].copy_from_slice(&payload[..n]);
    buf
}
