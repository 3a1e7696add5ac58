use chrono::{DateTime, Utc};
use ndarray::Array2;

use super::{
    Packet, Segment, TelemetryMode, FRAME_HEIGHT, FRAME_WIDTH, PACKETS_PER_SEGMENT,
    PAYLOAD_BYTES, SEGMENTS_PER_FRAME,
};
use crate::telemetry::{TelemetryLocation, TelemetryRow};

/// Samples carried by a single packet.
const SAMPLES_PER_PACKET: usize = PAYLOAD_BYTES / 2;

/// One complete VoSPI frame: four segments in TTT order.
///
/// A frame owns all of its packet storage and is meant to be reused; see
/// [Frame::copy_from].
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    segments: [Segment; SEGMENTS_PER_FRAME],
    mode: TelemetryMode,
    captured_at: Option<DateTime<Utc>>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new(TelemetryMode::Disabled)
    }
}

impl Frame {
    #[must_use]
    pub fn new(mode: TelemetryMode) -> Self {
        Frame {
            segments: std::array::from_fn(|_| Segment::new(mode)),
            mode,
            captured_at: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> TelemetryMode {
        self.mode
    }

    /// Change the segment layout. Storage is not reallocated.
    pub fn set_mode(&mut self, mode: TelemetryMode) {
        self.mode = mode;
        for segment in &mut self.segments {
            segment.set_mode(mode);
        }
    }

    /// Segment by zero-based position.
    ///
    /// # Panics
    /// If `idx` is not less than [SEGMENTS_PER_FRAME].
    #[must_use]
    pub fn segment(&self, idx: usize) -> &Segment {
        &self.segments[idx]
    }

    pub(crate) fn segment_mut(&mut self, idx: usize) -> &mut Segment {
        &mut self.segments[idx]
    }

    pub(crate) fn swap_segments(&mut self, a: usize, b: usize) {
        self.segments.swap(a, b);
    }

    pub(crate) fn set_captured_at(&mut self, at: DateTime<Utc>) {
        self.captured_at = Some(at);
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Time the last segment of this frame was received, if it came off a bus.
    #[must_use]
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    /// Segment numbers reported by each segment's anchor packet.
    #[must_use]
    pub fn ttts(&self) -> [u8; SEGMENTS_PER_FRAME] {
        std::array::from_fn(|idx| self.segments[idx].ttt())
    }

    /// True when the segments report TTT 1 through 4 in order.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.ttts()
            .iter()
            .enumerate()
            .all(|(idx, ttt)| usize::from(*ttt) == idx + 1)
    }

    /// All packets of the frame in stream order.
    pub fn packets(&self) -> impl Iterator<Item = Packet<'_>> {
        self.segments.iter().flat_map(Segment::packets)
    }

    /// Overwrite this frame with `other` without reallocating.
    pub fn copy_from(&mut self, other: &Frame) {
        for (dst, src) in self.segments.iter_mut().zip(other.segments.iter()) {
            dst.copy_from(src);
        }
        self.mode = other.mode;
        self.captured_at = other.captured_at;
    }

    fn telemetry_packets(&self) -> usize {
        (self.segments[0].count() - PACKETS_PER_SEGMENT) * SEGMENTS_PER_FRAME
    }

    /// The packet holding telemetry row A, if telemetry is enabled.
    #[must_use]
    pub fn telemetry_packet(&self, location: TelemetryLocation) -> Option<Packet<'_>> {
        if !self.mode.is_enabled() {
            return None;
        }
        match location {
            TelemetryLocation::Header => self.segments[0].packet(0),
            TelemetryLocation::Footer => {
                let last = &self.segments[SEGMENTS_PER_FRAME - 1];
                last.packet(last.count() - self.telemetry_packets())
            }
        }
    }

    /// Decode telemetry row A, if telemetry is enabled.
    #[must_use]
    pub fn telemetry(&self, location: TelemetryLocation) -> Option<TelemetryRow> {
        self.telemetry_packet(location)
            .and_then(|p| TelemetryRow::decode(p.payload))
    }

    /// Image samples as a `FRAME_HEIGHT x FRAME_WIDTH` array.
    ///
    /// Telemetry packets are skipped according to `location`; it is ignored when telemetry
    /// is disabled.
    #[must_use]
    pub fn image(&self, location: TelemetryLocation) -> Array2<u16> {
        let skip = self.telemetry_packets();
        let (head, total) = match location {
            TelemetryLocation::Header => (skip, skip + FRAME_HEIGHT * 2),
            TelemetryLocation::Footer => (0, FRAME_HEIGHT * 2),
        };

        let mut image = Array2::<u16>::zeros((FRAME_HEIGHT, FRAME_WIDTH));
        let video = self.packets().skip(head).take(total - head);
        for (idx, packet) in video.enumerate() {
            let row = idx / 2;
            let col = (idx % 2) * SAMPLES_PER_PACKET;
            for (offset, sample) in packet.samples().enumerate() {
                image[[row, col + offset]] = sample;
            }
        }
        image
    }
}
