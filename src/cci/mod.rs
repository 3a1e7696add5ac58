//! Command and Control Interface (CCI).
//!
//! The CCI is a small register file on the control bus. Commands are issued by writing
//! their parameters into the data registers, the parameter length into the length register,
//! and finally the opcode into the command register, then polling the status register until
//! the busy bit clears.
//!
//! References:
//! * FLIR Lepton Software Interface Description Document, section 2 (CCI)
#[cfg(all(feature = "linux", target_os = "linux"))]
pub mod device;

use std::fmt::Debug;
use std::time::{Duration, Instant};

use embedded_hal::blocking::i2c;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use crate::telemetry::TelemetryLocation;
use crate::vospi::TelemetryMode;
use crate::{CancelToken, Error, Result};

/// Control bus device address.
pub const ADDRESS: u8 = 0x2A;

pub const REG_STATUS: u16 = 0x0002;
pub const REG_COMMAND: u16 = 0x0004;
pub const REG_DATA_LENGTH: u16 = 0x0006;
pub const REG_DATA_0: u16 = 0x0008;

/// Number of data registers.
pub const DATA_REGISTERS: usize = 16;

pub const CMD_AGC_GET_ENABLE: u16 = 0x0100;
pub const CMD_AGC_SET_ENABLE: u16 = 0x0101;
pub const CMD_SYS_GET_UPTIME: u16 = 0x020C;
pub const CMD_SYS_GET_TELEMETRY_ENABLE: u16 = 0x0218;
pub const CMD_SYS_SET_TELEMETRY_ENABLE: u16 = 0x0219;
pub const CMD_SYS_GET_TELEMETRY_LOCATION: u16 = 0x021C;
pub const CMD_SYS_SET_TELEMETRY_LOCATION: u16 = 0x021D;
pub const CMD_SYS_RUN_FFC: u16 = 0x0242;

/// Automatic gain control setting.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgcMode {
    #[default]
    Disabled,
    Enabled,
}

impl AgcMode {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            AgcMode::Disabled => 0,
            AgcMode::Enabled => 1,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(AgcMode::Disabled),
            1 => Some(AgcMode::Enabled),
            _ => None,
        }
    }
}

/// CCI status register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u16);

impl Status {
    /// A command is executing; no other register may be written.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.0 & 0x1 != 0
    }

    /// The sensor booted from its main firmware.
    #[must_use]
    pub fn boot_mode(&self) -> bool {
        self.0 & 0x2 != 0
    }

    /// The sensor finished booting and accepts commands.
    #[must_use]
    pub fn booted(&self) -> bool {
        self.0 & 0x4 != 0
    }

    /// Result of the last command. Negative values are errors.
    #[must_use]
    pub fn response_code(&self) -> i8 {
        (self.0 >> 8) as u8 as i8
    }
}

/// Options for a [CciChannel].
#[derive(TypedBuilder, Debug, Clone, PartialEq, Eq)]
pub struct CciOpts {
    /// How long to wait for the busy bit to clear.
    #[builder(default = CciOpts::DEFAULT_BUSY_TIMEOUT)]
    pub busy_timeout: Duration,
    /// Pause between status polls.
    #[builder(default = CciOpts::DEFAULT_POLL_INTERVAL)]
    pub poll_interval: Duration,
}

impl CciOpts {
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
}

impl Default for CciOpts {
    fn default() -> Self {
        CciOpts::builder().build()
    }
}

fn bus_error<E: Debug>(err: E) -> Error {
    Error::Io(std::io::Error::other(format!("i2c: {err:?}")))
}

/// Register and command access to a sensor on the control bus.
///
/// Every operation is synchronous and requires exclusive access, so a channel can only
/// have one command in flight.
pub struct CciChannel<I2C> {
    bus: I2C,
    opts: CciOpts,
    cancel: CancelToken,
}

impl<I2C> CciChannel<I2C>
where
    I2C: i2c::Write + i2c::WriteRead,
    <I2C as i2c::Write>::Error: Debug,
    <I2C as i2c::WriteRead>::Error: Debug,
{
    pub fn new(bus: I2C, opts: CciOpts) -> Self {
        CciChannel {
            bus,
            opts,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` to interrupt busy polling.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn opts(&self) -> &CciOpts {
        &self.opts
    }

    pub fn into_inner(self) -> I2C {
        self.bus
    }

    /// # Errors
    /// [Error::Io] if the bus transaction fails.
    pub fn write_register(&mut self, reg: u16, value: u16) -> Result<()> {
        trace!(reg, value, "write register");
        let [reg_hi, reg_lo] = reg.to_be_bytes();
        let [value_hi, value_lo] = value.to_be_bytes();
        self.bus
            .write(ADDRESS, &[reg_hi, reg_lo, value_hi, value_lo])
            .map_err(bus_error)
    }

    /// # Errors
    /// [Error::Io] if the bus transaction fails.
    pub fn read_register(&mut self, reg: u16) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.bus
            .write_read(ADDRESS, &reg.to_be_bytes(), &mut buf)
            .map_err(bus_error)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// # Errors
    /// [Error::Io] if the bus transaction fails.
    pub fn status(&mut self) -> Result<Status> {
        self.read_register(REG_STATUS).map(Status)
    }

    /// Poll the status register until the busy bit clears.
    ///
    /// # Errors
    /// [Error::CciTimeout] if still busy after `busy_timeout`, [Error::Cancelled], or a
    /// bus error.
    pub fn wait_ready(&mut self, command: u16) -> Result<Status> {
        let start = Instant::now();
        loop {
            self.cancel.check()?;
            let status = self.status()?;
            if !status.busy() {
                return Ok(status);
            }
            let elapsed = start.elapsed();
            if elapsed >= self.opts.busy_timeout {
                return Err(Error::CciTimeout { command, elapsed });
            }
            self.cancel.sleep(self.opts.poll_interval)?;
        }
    }

    /// Execute `command` with `params` written to the data registers and `data_len` words
    /// in the length register, waiting for it to complete.
    ///
    /// # Errors
    /// [Error::CciCommand] if the sensor reports a negative response code, otherwise as
    /// [CciChannel::wait_ready].
    ///
    /// # Panics
    /// If `params` does not fit in the data registers.
    pub fn command(&mut self, command: u16, params: &[u16], data_len: u16) -> Result<()> {
        assert!(params.len() <= DATA_REGISTERS, "too many command parameters");

        self.wait_ready(command)?;
        for (idx, value) in params.iter().enumerate() {
            self.write_register(REG_DATA_0 + 2 * idx as u16, *value)?;
        }
        self.write_register(REG_DATA_LENGTH, data_len)?;
        self.write_register(REG_COMMAND, command)?;

        let status = self.wait_ready(command)?;
        let code = status.response_code();
        if code < 0 {
            debug!(command, code, "command failed");
            return Err(Error::CciCommand { command, code });
        }
        Ok(())
    }

    /// Execute a get `command` and return its two-word result.
    fn get_u32(&mut self, command: u16) -> Result<u32> {
        self.command(command, &[], 2)?;
        let lsw = self.read_register(REG_DATA_0)?;
        let msw = self.read_register(REG_DATA_0 + 2)?;
        Ok(u32::from(msw) << 16 | u32::from(lsw))
    }

    fn get_enum<T>(&mut self, command: u16, from_code: fn(u16) -> Option<T>) -> Result<T> {
        let value = self.get_u32(command)?;
        u16::try_from(value)
            .ok()
            .and_then(from_code)
            .ok_or(Error::CciValue { command, value })
    }

    fn set_enum(&mut self, command: u16, code: u16) -> Result<()> {
        self.command(command, &[code, 0], 2)
    }

    /// Trigger a flat-field correction. Returns once the sensor accepted the command; the
    /// correction itself runs asynchronously on the sensor.
    ///
    /// # Errors
    /// As [CciChannel::command].
    pub fn run_ffc(&mut self) -> Result<()> {
        debug!("running FFC");
        self.command(CMD_SYS_RUN_FFC, &[], 0)
    }

    /// Milliseconds since the sensor booted.
    ///
    /// # Errors
    /// As [CciChannel::command].
    pub fn uptime(&mut self) -> Result<u32> {
        self.get_u32(CMD_SYS_GET_UPTIME)
    }

    /// # Errors
    /// As [CciChannel::command], or [Error::CciValue] for an unknown mode.
    pub fn telemetry_mode(&mut self) -> Result<TelemetryMode> {
        self.get_enum(CMD_SYS_GET_TELEMETRY_ENABLE, TelemetryMode::from_code)
    }

    /// # Errors
    /// As [CciChannel::command].
    pub fn set_telemetry_mode(&mut self, mode: TelemetryMode) -> Result<()> {
        debug!(?mode, "setting telemetry mode");
        self.set_enum(CMD_SYS_SET_TELEMETRY_ENABLE, mode.code())
    }

    /// # Errors
    /// As [CciChannel::command], or [Error::CciValue] for an unknown location.
    pub fn telemetry_location(&mut self) -> Result<TelemetryLocation> {
        self.get_enum(CMD_SYS_GET_TELEMETRY_LOCATION, TelemetryLocation::from_code)
    }

    /// # Errors
    /// As [CciChannel::command].
    pub fn set_telemetry_location(&mut self, location: TelemetryLocation) -> Result<()> {
        debug!(?location, "setting telemetry location");
        self.set_enum(CMD_SYS_SET_TELEMETRY_LOCATION, location.code())
    }

    /// # Errors
    /// As [CciChannel::command], or [Error::CciValue] for an unknown mode.
    pub fn agc_mode(&mut self) -> Result<AgcMode> {
        self.get_enum(CMD_AGC_GET_ENABLE, AgcMode::from_code)
    }

    /// # Errors
    /// As [CciChannel::command].
    pub fn set_agc_mode(&mut self, mode: AgcMode) -> Result<()> {
        debug!(?mode, "setting AGC mode");
        self.set_enum(CMD_AGC_SET_ENABLE, mode.code())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug)]
    struct Nak;

    /// Register file answering like a sensor that finishes every command after
    /// `busy_reads` status polls.
    #[derive(Default)]
    struct FakeSensor {
        regs: HashMap<u16, u16>,
        writes: Vec<(u16, u16)>,
        busy_reads: usize,
        busy_left: usize,
        response: i8,
        fail: bool,
    }

    impl FakeSensor {
        fn reg(&self, reg: u16) -> u16 {
            self.regs.get(&reg).copied().unwrap_or_default()
        }

        fn execute(&mut self, command: u16) {
            let data0 = self.reg(REG_DATA_0);
            match command {
                CMD_SYS_GET_UPTIME => {
                    self.regs.insert(REG_DATA_0, 0x5678);
                    self.regs.insert(REG_DATA_0 + 2, 0x1234);
                }
                c if c & 0x3 == 0 => {
                    // get returns what the matching set stored
                    let value = self.reg(0x8000 | (c + 1));
                    self.regs.insert(REG_DATA_0, value);
                    self.regs.insert(REG_DATA_0 + 2, 0);
                }
                c if c & 0x3 == 1 => {
                    self.regs.insert(0x8000 | c, data0);
                }
                _ => {}
            }
            self.busy_left = self.busy_reads;
        }
    }

    impl i2c::Write for FakeSensor {
        type Error = Nak;

        fn write(&mut self, address: u8, bytes: &[u8]) -> std::result::Result<(), Nak> {
            if self.fail || address != ADDRESS || bytes.len() != 4 {
                return Err(Nak);
            }
            let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
            let value = u16::from_be_bytes([bytes[2], bytes[3]]);
            self.writes.push((reg, value));
            self.regs.insert(reg, value);
            if reg == REG_COMMAND {
                self.execute(value);
            }
            Ok(())
        }
    }

    impl i2c::WriteRead for FakeSensor {
        type Error = Nak;

        fn write_read(
            &mut self,
            address: u8,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> std::result::Result<(), Nak> {
            if self.fail || address != ADDRESS || bytes.len() != 2 || buffer.len() != 2 {
                return Err(Nak);
            }
            let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
            let value = if reg == REG_STATUS {
                let busy = u16::from(self.busy_left > 0);
                self.busy_left = self.busy_left.saturating_sub(1);
                (u16::from(self.response as u8) << 8) | 0x6 | busy
            } else {
                self.reg(reg)
            };
            buffer.copy_from_slice(&value.to_be_bytes());
            Ok(())
        }
    }

    fn channel(sensor: FakeSensor) -> CciChannel<FakeSensor> {
        let opts = CciOpts::builder()
            .busy_timeout(Duration::from_millis(50))
            .poll_interval(Duration::ZERO)
            .build();
        CciChannel::new(sensor, opts)
    }

    #[test]
    fn register_roundtrip() {
        let mut cci = channel(FakeSensor::default());
        cci.write_register(REG_DATA_0 + 6, 0xbeef).unwrap();
        assert_eq!(cci.read_register(REG_DATA_0 + 6).unwrap(), 0xbeef);
    }

    #[test]
    fn decode_status() {
        let status = Status(0xfe07);
        assert!(status.busy());
        assert!(status.boot_mode());
        assert!(status.booted());
        assert_eq!(status.response_code(), -2);
        assert_eq!(Status(0x0006).response_code(), 0);
    }

    #[test]
    fn command_writes_length_then_opcode() {
        let mut cci = channel(FakeSensor::default());
        cci.set_telemetry_mode(TelemetryMode::Enabled).unwrap();

        let writes = cci.into_inner().writes;
        assert_eq!(
            writes,
            vec![
                (REG_DATA_0, 1),
                (REG_DATA_0 + 2, 0),
                (REG_DATA_LENGTH, 2),
                (REG_COMMAND, CMD_SYS_SET_TELEMETRY_ENABLE),
            ]
        );
    }

    #[test]
    fn uptime_is_lsw_first() {
        let mut cci = channel(FakeSensor::default());
        assert_eq!(cci.uptime().unwrap(), 0x1234_5678);
    }

    #[test]
    fn set_then_get_enums() {
        let mut cci = channel(FakeSensor {
            busy_reads: 3,
            ..Default::default()
        });

        cci.set_telemetry_location(TelemetryLocation::Footer).unwrap();
        assert_eq!(cci.telemetry_location().unwrap(), TelemetryLocation::Footer);
        cci.set_agc_mode(AgcMode::Enabled).unwrap();
        assert_eq!(cci.agc_mode().unwrap(), AgcMode::Enabled);
        assert_eq!(cci.telemetry_mode().unwrap(), TelemetryMode::Disabled);
    }

    #[test]
    fn unknown_enum_value_is_error() {
        let mut sensor = FakeSensor::default();
        sensor.regs.insert(0x8000 | CMD_AGC_SET_ENABLE, 9);
        let mut cci = channel(sensor);

        let zult = cci.agc_mode();
        assert!(matches!(
            zult,
            Err(Error::CciValue {
                command: CMD_AGC_GET_ENABLE,
                value: 9
            })
        ));
    }

    #[test]
    fn busy_sensor_times_out() {
        let mut cci = channel(FakeSensor {
            busy_reads: usize::MAX,
            ..Default::default()
        });

        let zult = cci.run_ffc();
        assert!(matches!(
            zult,
            Err(Error::CciTimeout {
                command: CMD_SYS_RUN_FFC,
                ..
            })
        ));
    }

    #[test]
    fn negative_response_code_is_error() {
        let mut cci = channel(FakeSensor {
            response: -3,
            ..Default::default()
        });

        let zult = cci.run_ffc();
        assert!(matches!(
            zult,
            Err(Error::CciCommand {
                command: CMD_SYS_RUN_FFC,
                code: -3
            })
        ));
    }

    #[test]
    fn bus_failure_is_io_error() {
        let mut cci = channel(FakeSensor {
            fail: true,
            ..Default::default()
        });
        assert!(matches!(cci.status(), Err(Error::Io(_))));
    }

    #[test]
    fn cancelled_poll() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut cci = channel(FakeSensor::default()).with_cancel(cancel);
        assert!(matches!(cci.run_ffc(), Err(Error::Cancelled)));
    }
}
