use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{info, span, trace, warn, Level};
use typed_builder::TypedBuilder;

use crate::queue::FrameQueue;
use crate::vospi::{FrameSynchronizer, SyncOpts, SyncState, SyncStats};
use crate::{CancelToken, Error, Result};

/// Options for a [Capture].
#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct CaptureOpts {
    #[builder(default)]
    pub sync: SyncOpts,
    /// Consecutive failed synchronizations or invalid frames tolerated before capture
    /// gives up.
    #[builder(default = CaptureOpts::DEFAULT_MAX_SYNC_FAILURES)]
    pub max_sync_failures: u32,
}

impl CaptureOpts {
    pub const DEFAULT_MAX_SYNC_FAILURES: u32 = 10;
}

/// Undrained events kept by a [Capture]. Older events are dropped to make room.
pub const EVENT_BACKLOG: usize = 64;

impl Default for CaptureOpts {
    fn default() -> Self {
        CaptureOpts::builder().build()
    }
}

/// Why a capture thread stopped.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The frame queue was closed by a consumer.
    QueueClosed,
    /// An unrecoverable error, or too many consecutive sync failures.
    Failed(String),
}

/// Status published by a capture thread.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Synchronized { resets: u32 },
    /// The stream was lost and is being resynchronized.
    Resync { reason: String },
    Stopped { reason: StopReason, stats: SyncStats },
}

/// Handle to a background thread that owns the video bus and feeds a [FrameQueue].
///
/// The thread synchronizes with the stream, then transfers frames into the queue until
/// cancelled, resynchronizing whenever the stream slips. When it stops it closes the
/// queue, so consumers blocked in [FrameQueue::pop] are released.
///
/// Dropping the handle cancels the thread without waiting for it.
pub struct Capture {
    cancel: CancelToken,
    events: Receiver<CaptureEvent>,
    handle: Option<JoinHandle<Result<SyncStats>>>,
}

impl Capture {
    /// Start capturing from `bus` into `queue`.
    ///
    /// # Errors
    /// [Error::Io] if the thread could not be started.
    pub fn spawn<R>(bus: R, opts: CaptureOpts, queue: Arc<FrameQueue>) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let cancel = CancelToken::new();
        let (events_tx, events_rx) = bounded(EVENT_BACKLOG);

        let thread_cancel = cancel.clone();
        let events = Events {
            tx: events_tx,
            rx: events_rx.clone(),
        };
        let handle = thread::Builder::new()
            .name("lepton_capture".into())
            .spawn(move || {
                let zult = run(bus, &opts, &queue, thread_cancel, &events);
                queue.close();
                zult
            })?;

        Ok(Capture {
            cancel,
            events: events_rx,
            handle: Some(handle),
        })
    }

    /// Ask the thread to stop at its next cancellation point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Status events, ending with [CaptureEvent::Stopped].
    ///
    /// At most [EVENT_BACKLOG] events are buffered; when nobody drains them the oldest are
    /// dropped, so the final [CaptureEvent::Stopped] is always kept.
    pub fn events(&self) -> &Receiver<CaptureEvent> {
        &self.events
    }

    /// Wait for the thread to finish.
    ///
    /// # Errors
    /// The error that stopped capture, if it did not stop because of cancellation or a
    /// closed queue.
    pub fn join(mut self) -> Result<SyncStats> {
        let Some(handle) = self.handle.take() else {
            return Err(Error::Io(io::Error::other("capture already joined")));
        };
        handle
            .join()
            .map_err(|_| Error::Io(io::Error::other("capture thread panicked")))?
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sending half of the event channel. Holds a receiver so a full backlog can shed its
/// oldest event.
struct Events {
    tx: Sender<CaptureEvent>,
    rx: Receiver<CaptureEvent>,
}

impl Events {
    fn emit(&self, mut event: CaptureEvent) {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(dropped) = self.rx.try_recv() {
                        trace!(?dropped, "event backlog full, dropped oldest event");
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

fn run<R: Read>(
    bus: R,
    opts: &CaptureOpts,
    queue: &FrameQueue,
    cancel: CancelToken,
    events: &Events,
) -> Result<SyncStats> {
    let span = span!(Level::INFO, "capture");
    let _guard = span.enter();

    let mut sync = FrameSynchronizer::new(bus, opts.sync.clone()).with_cancel(cancel);
    let mut frame = sync.new_frame();
    let mut failures = 0;

    let zult = loop {
        let zult = if sync.state() == SyncState::Synchronized {
            sync.transfer_frame(&mut frame)
        } else {
            sync.sync_and_transfer_frame(&mut frame).map(|report| {
                failures = 0;
                events.emit(CaptureEvent::Synchronized {
                    resets: report.resets,
                });
            })
        };

        match zult {
            Ok(()) => {
                if queue.push(&frame).is_err() {
                    info!("frame queue closed, stopping capture");
                    break Ok(StopReason::QueueClosed);
                }
            }
            Err(Error::Cancelled) => break Ok(StopReason::Cancelled),
            Err(err) if err.is_recoverable() => {
                failures += 1;
                if failures > opts.max_sync_failures {
                    warn!(failures, "giving up after repeated sync failures");
                    break Err(err);
                }
                info!(failures, "resynchronizing: {err}");
                events.emit(CaptureEvent::Resync {
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                warn!("capture failed: {err}");
                break Err(err);
            }
        }
    };

    let stats = sync.stats();
    let reason = match &zult {
        Ok(reason) => reason.clone(),
        Err(err) => StopReason::Failed(err.to_string()),
    };
    info!(frames = stats.frames, ?reason, "capture stopped");
    events.emit(CaptureEvent::Stopped { reason, stats });
    zult.map(|_| stats)
}
