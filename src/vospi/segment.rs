use std::io::Read;

use super::{
    packet::read_transfer, read_packet, Packet, PacketHeader, TelemetryMode, ANCHOR_PACKET,
    PACKETS_PER_SEGMENT_TELEMETRY, PACKET_BYTES,
};
use crate::{CancelToken, Result};

/// A fixed-capacity run of packets making up one quarter of a frame.
///
/// Storage is sized for the telemetry-enabled layout and allocated once; `count` selects
/// how many packets are active. Raw wire bytes are kept as read, headers are decoded into
/// host order alongside them.
#[derive(Debug, Clone)]
pub struct Segment {
    count: usize,
    headers: [PacketHeader; PACKETS_PER_SEGMENT_TELEMETRY],
    raw: Box<[u8]>,
}

impl Segment {
    /// Maximum number of packets a segment can hold.
    pub const CAPACITY: usize = PACKETS_PER_SEGMENT_TELEMETRY;

    #[must_use]
    pub fn new(mode: TelemetryMode) -> Self {
        Segment {
            count: mode.packets_per_segment(),
            headers: [PacketHeader::default(); Self::CAPACITY],
            raw: vec![0u8; Self::CAPACITY * PACKET_BYTES].into_boxed_slice(),
        }
    }

    /// Number of active packets.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn set_mode(&mut self, mode: TelemetryMode) {
        self.count = mode.packets_per_segment();
    }

    #[must_use]
    pub fn header(&self, idx: usize) -> Option<PacketHeader> {
        if idx >= self.count {
            return None;
        }
        Some(self.headers[idx])
    }

    #[must_use]
    pub fn packet(&self, idx: usize) -> Option<Packet<'_>> {
        let header = self.header(idx)?;
        let start = idx * PACKET_BYTES + PacketHeader::LEN;
        Some(Packet {
            header,
            payload: &self.raw[start..(idx + 1) * PACKET_BYTES],
        })
    }

    pub fn packets(&self) -> impl Iterator<Item = Packet<'_>> {
        (0..self.count).filter_map(|idx| self.packet(idx))
    }

    /// Header of the packet carrying the segment number.
    #[must_use]
    pub fn anchor(&self) -> PacketHeader {
        self.headers[ANCHOR_PACKET]
    }

    /// Segment number reported by the anchor packet.
    #[must_use]
    pub fn ttt(&self) -> u8 {
        self.anchor().segment()
    }

    /// True when every active packet's line number matches its index.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.headers[..self.count]
            .iter()
            .enumerate()
            .all(|(idx, h)| h.line() == idx)
    }

    /// Active packets as raw wire bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw[..self.count * PACKET_BYTES]
    }

    /// Overwrite this segment with the contents of `other` without reallocating.
    pub fn copy_from(&mut self, other: &Segment) {
        self.count = other.count;
        self.headers = other.headers;
        self.raw.copy_from_slice(&other.raw);
    }

    fn decode_headers(&mut self, from: usize) {
        for idx in from..self.count {
            let start = idx * PACKET_BYTES;
            self.headers[idx] =
                PacketHeader::decode(&self.raw[start..start + PacketHeader::LEN])
                    .unwrap_or_default();
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.count == other.count
            && self.headers[..self.count] == other.headers[..other.count]
            && self.as_bytes() == other.as_bytes()
    }
}

/// Reads whole segments from a VoSPI bus.
///
/// The first packet is read on its own so discard packets can be skipped, the rest of the
/// segment follows in a single bulk transfer.
#[derive(Debug, Clone, Copy)]
pub struct SegmentReader {
    max_discards: usize,
}

impl SegmentReader {
    #[must_use]
    pub fn new(max_discards: usize) -> Self {
        SegmentReader { max_discards }
    }

    /// Fill `segment` with its active number of packets.
    ///
    /// # Errors
    /// Any error from [read_packet] or a failed bulk transfer.
    pub fn read<R: Read>(
        &self,
        bus: &mut R,
        segment: &mut Segment,
        cancel: &CancelToken,
    ) -> Result<()> {
        segment.headers[0] = read_packet(
            bus,
            &mut segment.raw[..PACKET_BYTES],
            self.max_discards,
            cancel,
        )?;
        let end = segment.count * PACKET_BYTES;
        read_transfer(bus, &mut segment.raw[PACKET_BYTES..end])?;
        segment.decode_headers(1);
        Ok(())
    }
}
