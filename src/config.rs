use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::CaptureOpts;
use crate::cci::CciOpts;
use crate::telemetry::TelemetryLocation;
use crate::vospi::{SyncOpts, TelemetryMode};
use crate::{Error, Result};

/// Highest bus clock the sensor supports.
pub const MAX_SPI_SPEED_HZ: u32 = 20_000_000;

/// Device and engine settings for a capture session.
///
/// Every field has a default, so a config file only needs the values that differ.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub spi_device: PathBuf,
    pub spi_speed_hz: u32,
    pub i2c_device: PathBuf,
    pub telemetry: TelemetryMode,
    pub telemetry_location: TelemetryLocation,
    pub queue_capacity: usize,
    pub max_resets: u32,
    pub resync_delay_ms: u64,
    pub max_discards: usize,
    pub max_invalid_frames: u32,
    pub max_sync_failures: u32,
    pub cci_busy_timeout_ms: u64,
    pub cci_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spi_device: PathBuf::from("/dev/spidev0.0"),
            spi_speed_hz: MAX_SPI_SPEED_HZ,
            i2c_device: PathBuf::from("/dev/i2c-1"),
            telemetry: TelemetryMode::default(),
            telemetry_location: TelemetryLocation::default(),
            queue_capacity: 4,
            max_resets: SyncOpts::DEFAULT_MAX_RESETS,
            resync_delay_ms: SyncOpts::DEFAULT_RESYNC_DELAY.as_millis() as u64,
            max_discards: SyncOpts::DEFAULT_MAX_DISCARDS,
            max_invalid_frames: SyncOpts::DEFAULT_MAX_INVALID_FRAMES,
            max_sync_failures: CaptureOpts::DEFAULT_MAX_SYNC_FAILURES,
            cci_busy_timeout_ms: CciOpts::DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            cci_poll_interval_ms: CciOpts::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    /// [Error::Io] if the file cannot be read, [Error::Config] if it cannot be parsed or
    /// fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dat = fs::read_to_string(path)?;
        Self::from_json(&dat)
    }

    /// Parse and validate a JSON config.
    ///
    /// # Errors
    /// [Error::Config] if `dat` cannot be parsed or fails validation.
    pub fn from_json(dat: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(dat).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// [Error::Config] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.spi_speed_hz == 0 || self.spi_speed_hz > MAX_SPI_SPEED_HZ {
            return Err(Error::Config(format!(
                "spi_speed_hz must be in 1..={MAX_SPI_SPEED_HZ}, got {}",
                self.spi_speed_hz
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be non-zero".into()));
        }
        if self.cci_busy_timeout_ms == 0 {
            return Err(Error::Config("cci_busy_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn sync_opts(&self) -> SyncOpts {
        SyncOpts::builder()
            .telemetry(self.telemetry)
            .max_resets(self.max_resets)
            .resync_delay(Duration::from_millis(self.resync_delay_ms))
            .max_discards(self.max_discards)
            .max_invalid_frames(self.max_invalid_frames)
            .build()
    }

    #[must_use]
    pub fn capture_opts(&self) -> CaptureOpts {
        CaptureOpts::builder()
            .sync(self.sync_opts())
            .max_sync_failures(self.max_sync_failures)
            .build()
    }

    #[must_use]
    pub fn cci_opts(&self) -> CciOpts {
        CciOpts::builder()
            .busy_timeout(Duration::from_millis(self.cci_busy_timeout_ms))
            .poll_interval(Duration::from_millis(self.cci_poll_interval_ms))
            .build()
    }
}
