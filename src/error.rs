use std::time::Duration;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A bus read returned fewer bytes than requested.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// The sensor produced nothing but discard packets for too long.
    #[error("no valid packet after {count} discard packets")]
    DiscardLimit { count: usize },

    /// Alignment with the packet stream could not be acquired.
    #[error("failed to synchronize after {resets} resets")]
    SyncFailed { resets: u32 },

    /// A frame failed validation mid-stream and the stream must be resynchronized.
    #[error("invalid frame at segment {segment}: expected TTT {expected}, got {actual}")]
    FrameInvalid {
        segment: usize,
        expected: u8,
        actual: u8,
    },

    /// The CCI busy bit never cleared.
    #[error("CCI command {command:#06x} still busy after {elapsed:?}")]
    CciTimeout { command: u16, elapsed: Duration },

    /// The sensor completed a CCI command with a non-zero response code.
    #[error("CCI command {command:#06x} failed with response code {code}")]
    CciCommand { command: u16, code: i8 },

    /// A CCI get command returned a value outside its enumeration.
    #[error("CCI command {command:#06x} returned unexpected value {value}")]
    CciValue { command: u16, value: u32 },

    /// The frame queue was closed and holds no more frames.
    #[error("frame queue closed")]
    QueueClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller may retry the failed operation without reopening any device.
    ///
    /// I/O faults are not recoverable at this level; a supervisor decides whether the
    /// device should be reopened.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DiscardLimit { .. }
                | Error::SyncFailed { .. }
                | Error::FrameInvalid { .. }
                | Error::CciTimeout { .. }
                | Error::CciCommand { .. }
                | Error::CciValue { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_faults_are_not_recoverable() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(!err.is_recoverable());
        assert!(!Error::ShortRead {
            expected: 164,
            actual: 0
        }
        .is_recoverable());
    }

    #[test]
    fn protocol_faults_are_recoverable() {
        assert!(Error::SyncFailed { resets: 31 }.is_recoverable());
        assert!(Error::FrameInvalid {
            segment: 2,
            expected: 3,
            actual: 1
        }
        .is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
    }
}
