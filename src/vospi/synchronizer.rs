use std::io::Read;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, span, trace, warn, Level};
use typed_builder::TypedBuilder;

use super::{Frame, SegmentReader, TelemetryMode, SEGMENTS_PER_FRAME};
use crate::{CancelToken, Error, Result};

/// Options controlling synchronization and transfer.
#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct SyncOpts {
    /// Segment layout, which must match the sensor's telemetry setting.
    #[builder(default)]
    pub telemetry: TelemetryMode,
    /// Number of misaligned anchor packets tolerated before giving up on synchronizing.
    #[builder(default = SyncOpts::DEFAULT_MAX_RESETS)]
    pub max_resets: u32,
    /// Time to let the stream settle after a misaligned anchor packet. Nominally one
    /// frame period.
    #[builder(default = SyncOpts::DEFAULT_RESYNC_DELAY)]
    pub resync_delay: Duration,
    /// Consecutive discard packets tolerated while waiting for the start of a segment.
    #[builder(default = SyncOpts::DEFAULT_MAX_DISCARDS)]
    pub max_discards: usize,
    /// Consecutive stale (TTT 0) segment reads, or frame restarts, tolerated before the
    /// frame is declared invalid.
    #[builder(default = SyncOpts::DEFAULT_MAX_INVALID_FRAMES)]
    pub max_invalid_frames: u32,
}

impl SyncOpts {
    pub const DEFAULT_MAX_RESETS: u32 = 30;
    pub const DEFAULT_RESYNC_DELAY: Duration = Duration::from_millis(185);
    pub const DEFAULT_MAX_DISCARDS: usize = 4096;
    pub const DEFAULT_MAX_INVALID_FRAMES: u32 = 30;
}

impl Default for SyncOpts {
    fn default() -> Self {
        SyncOpts::builder().build()
    }
}

/// Synchronization state of a [FrameSynchronizer].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynchronized,
    SeekingFirstSegment,
    Synchronized,
    Failed,
}

/// Outcome of a successful synchronization.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Misaligned anchor packets seen before alignment was acquired.
    pub resets: u32,
}

/// Running counters for a [FrameSynchronizer].
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Complete frames transferred.
    pub frames: u64,
    /// Misaligned anchor packets.
    pub resets: u64,
    /// Segments re-read because the sensor repeated stale content.
    pub stale_reads: u64,
    /// Frames rejected after synchronization, each requiring a resync.
    pub invalid_frames: u64,
    /// Successful synchronizations.
    pub syncs: u64,
}

/// Acquires alignment with a VoSPI packet stream and assembles frames from it.
///
/// The synchronizer owns the video bus. All operations block the calling thread on bus
/// reads and on the resync backoff; use a [CancelToken] to interrupt them between reads.
///
/// # Example
/// ```no_run
/// use leptonic::vospi::{Frame, FrameSynchronizer, SyncOpts};
///
/// let bus = std::fs::File::open("/dev/spidev0.0").unwrap();
/// let mut sync = FrameSynchronizer::new(bus, SyncOpts::default());
/// let mut frame = sync.new_frame();
/// let report = sync.sync_and_transfer_frame(&mut frame).unwrap();
/// println!("synchronized after {} resets", report.resets);
/// loop {
///     sync.transfer_frame(&mut frame).unwrap();
/// }
/// ```
pub struct FrameSynchronizer<R>
where
    R: Read,
{
    bus: R,
    opts: SyncOpts,
    reader: SegmentReader,
    state: SyncState,
    cancel: CancelToken,
    stats: SyncStats,
}

impl<R> FrameSynchronizer<R>
where
    R: Read,
{
    pub fn new(bus: R, opts: SyncOpts) -> Self {
        FrameSynchronizer {
            bus,
            reader: SegmentReader::new(opts.max_discards),
            opts,
            state: SyncState::Unsynchronized,
            cancel: CancelToken::new(),
            stats: SyncStats::default(),
        }
    }

    /// Use `cancel` to interrupt blocking operations.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    pub fn opts(&self) -> &SyncOpts {
        &self.opts
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// A frame laid out for the configured telemetry mode.
    pub fn new_frame(&self) -> Frame {
        Frame::new(self.opts.telemetry)
    }

    /// Give the bus back, e.g., so it can be reopened.
    pub fn into_inner(self) -> R {
        self.bus
    }

    /// Synchronize with the stream from scratch and transfer the first complete frame.
    ///
    /// # Errors
    /// [Error::SyncFailed] if the stream stays misaligned for more than
    /// `max_resets` attempts, [Error::Cancelled], or any bus error.
    pub fn sync_and_transfer_frame(&mut self, frame: &mut Frame) -> Result<SyncReport> {
        let span = span!(Level::DEBUG, "sync");
        let _guard = span.enter();

        frame.set_mode(self.opts.telemetry);
        self.state = SyncState::SeekingFirstSegment;
        match self.seek(frame) {
            Ok(report) => {
                self.state = SyncState::Synchronized;
                self.stats.syncs += 1;
                self.stats.frames += 1;
                frame.set_captured_at(Utc::now());
                info!(resets = report.resets, "stream synchronized");
                Ok(report)
            }
            Err(err) => {
                self.state = match err {
                    Error::SyncFailed { .. } => SyncState::Failed,
                    _ => SyncState::Unsynchronized,
                };
                Err(err)
            }
        }
    }

    /// Transfer the next frame from an already synchronized stream.
    ///
    /// When the synchronizer is not synchronized this synchronizes first.
    ///
    /// # Errors
    /// [Error::FrameInvalid] when the stream slipped; the synchronizer is then
    /// unsynchronized and the next call resynchronizes. Otherwise as
    /// [FrameSynchronizer::sync_and_transfer_frame].
    pub fn transfer_frame(&mut self, frame: &mut Frame) -> Result<()> {
        if self.state != SyncState::Synchronized {
            return self.sync_and_transfer_frame(frame).map(|_| ());
        }

        match self.assemble(frame, 0) {
            Ok(()) => {
                self.stats.frames += 1;
                frame.set_captured_at(Utc::now());
                Ok(())
            }
            Err(err) => {
                if let Error::FrameInvalid {
                    segment,
                    expected,
                    actual,
                } = err
                {
                    self.stats.invalid_frames += 1;
                    info!(segment, expected, actual, "invalid frame, resync required");
                }
                self.state = SyncState::Unsynchronized;
                Err(err)
            }
        }
    }

    /// Search for the first segment of a frame, then complete the frame.
    fn seek(&mut self, frame: &mut Frame) -> Result<SyncReport> {
        let mut resets: u32 = 0;
        // Bound for how long we wait for TTT 1 on an otherwise aligned stream
        let max_skipped = (self.opts.max_invalid_frames as usize + 1) * SEGMENTS_PER_FRAME;
        let mut skipped = 0;

        loop {
            self.cancel.check()?;
            trace!("receiving first segment");
            self.reader
                .read(&mut self.bus, frame.segment_mut(0), &self.cancel)?;

            let anchor = frame.segment(0).anchor();
            let aligned = frame.segment(0).is_consistent();
            if aligned && anchor.segment() != 1 {
                skipped += 1;
                if skipped <= max_skipped {
                    trace!(ttt = anchor.segment(), "not at frame start");
                    continue;
                }
            }
            if !aligned || skipped > max_skipped {
                skipped = 0;
                debug!(line = anchor.line(), "segment misaligned");
                self.backoff(&mut resets)?;
                continue;
            }

            match self.assemble(frame, 1) {
                Ok(()) => return Ok(SyncReport { resets }),
                Err(Error::FrameInvalid {
                    segment, actual, ..
                }) => {
                    debug!(segment, ttt = actual, "frame broken while synchronizing");
                    skipped = 0;
                    self.backoff(&mut resets)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Count a reset and give the stream time to settle.
    fn backoff(&mut self, resets: &mut u32) -> Result<()> {
        *resets += 1;
        self.stats.resets += 1;
        if *resets > self.opts.max_resets {
            warn!(resets = *resets, "too many resets while synchronizing");
            return Err(Error::SyncFailed { resets: *resets });
        }
        debug!(resets = *resets, "waiting to reset");
        self.cancel.sleep(self.opts.resync_delay)
    }

    /// Read segments `start..SEGMENTS_PER_FRAME` into `frame`.
    ///
    /// A segment reporting TTT 1 part way through means a new frame started; it becomes
    /// the first segment and assembly continues from there.
    fn assemble(&mut self, frame: &mut Frame, start: usize) -> Result<()> {
        let mut restarts = 0;
        let mut idx = start;
        while idx < SEGMENTS_PER_FRAME {
            let ttt = self.read_fresh_segment(frame, idx)?;
            let expected = idx as u8 + 1;
            if ttt == expected {
                idx += 1;
                continue;
            }
            if ttt == 1 && restarts < self.opts.max_invalid_frames {
                trace!(segment = idx, "new frame started mid-frame");
                restarts += 1;
                frame.swap_segments(0, idx);
                idx = 1;
                continue;
            }
            return Err(Error::FrameInvalid {
                segment: idx,
                expected,
                actual: ttt,
            });
        }
        Ok(())
    }

    /// Read a segment into slot `idx`, re-reading while the sensor repeats stale content.
    fn read_fresh_segment(&mut self, frame: &mut Frame, idx: usize) -> Result<u8> {
        let mut stale = 0;
        loop {
            self.cancel.check()?;
            self.reader
                .read(&mut self.bus, frame.segment_mut(idx), &self.cancel)?;

            let segment = frame.segment(idx);
            let ttt = segment.ttt();
            // every line number must match its packet index, not just the anchor
            if !segment.is_consistent() {
                return Err(Error::FrameInvalid {
                    segment: idx,
                    expected: idx as u8 + 1,
                    actual: ttt,
                });
            }
            trace!(segment = idx, ttt, "received segment");
            if ttt != 0 {
                return Ok(ttt);
            }

            stale += 1;
            self.stats.stale_reads += 1;
            if stale > self.opts.max_invalid_frames {
                return Err(Error::FrameInvalid {
                    segment: idx,
                    expected: idx as u8 + 1,
                    actual: 0,
                });
            }
        }
    }
}
