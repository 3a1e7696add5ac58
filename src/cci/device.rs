use std::io;
use std::path::Path;

use embedded_hal::blocking::i2c;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
use tracing::debug;

use super::ADDRESS;
use crate::{Error, Result};

/// Linux i2c-dev control bus.
///
/// Register reads are a write of the register address followed by a separate read, the
/// sequence the sensor expects.
pub struct I2cBus {
    dev: LinuxI2CDevice,
    address: u8,
}

impl I2cBus {
    /// Open `path` addressed at the sensor.
    ///
    /// # Errors
    /// [Error::Io] if the device cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dev = LinuxI2CDevice::new(path, u16::from(ADDRESS)).map_err(|err| {
            Error::Io(io::Error::other(format!("{}: {err}", path.display())))
        })?;
        debug!(path = %path.display(), "control bus opened");
        Ok(I2cBus {
            dev,
            address: ADDRESS,
        })
    }

    fn select(&mut self, address: u8) -> std::result::Result<(), LinuxI2CError> {
        if address != self.address {
            self.dev.set_slave_address(u16::from(address))?;
            self.address = address;
        }
        Ok(())
    }
}

impl i2c::Write for I2cBus {
    type Error = LinuxI2CError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> std::result::Result<(), Self::Error> {
        self.select(address)?;
        self.dev.write(bytes)
    }
}

impl i2c::WriteRead for I2cBus {
    type Error = LinuxI2CError;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> std::result::Result<(), Self::Error> {
        self.select(address)?;
        self.dev.write(bytes)?;
        self.dev.read(buffer)
    }
}
