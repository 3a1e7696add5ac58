use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::{Error, Result};

/// Cooperative cancellation shared between a blocking worker and its supervisor.
///
/// Cancelling drops the only sender, so every clone observes a disconnected channel.
/// Sleeping on the token wakes early when cancelled.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        CancelToken {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        match self.tx.lock() {
            Ok(mut tx) => {
                tx.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Returns [Error::Cancelled] if cancellation was requested.
    ///
    /// # Errors
    /// [Error::Cancelled]
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Block for `dur`, or until cancelled.
    ///
    /// # Errors
    /// [Error::Cancelled] if cancelled before or during the sleep.
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        self.check()?;
        if dur.is_zero() {
            return Ok(());
        }
        match self.rx.recv_timeout(dur) {
            Err(RecvTimeoutError::Disconnected) => Err(Error::Cancelled),
            Err(RecvTimeoutError::Timeout) | Ok(()) => Ok(()),
        }
    }
}
