#![doc = include_str!("../README.md")]

mod cancel;
mod error;

pub mod capture;
pub mod cci;
pub mod config;
pub mod queue;
pub mod telemetry;
pub mod vospi;

pub use cancel::CancelToken;
pub use capture::{Capture, CaptureEvent, CaptureOpts, StopReason};
pub use cci::{CciChannel, CciOpts};
pub use config::Config;
pub use error::{Error, Result};
pub use queue::FrameQueue;
pub use telemetry::{TelemetryLocation, TelemetryRow};
pub use vospi::{Frame, FrameSynchronizer, SyncOpts, TelemetryMode};
