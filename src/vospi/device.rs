use std::fs;
use std::path::Path;

use spidev::{SpiModeFlags, Spidev, SpidevOptions};
use tracing::{debug, warn};

use super::{PACKETS_PER_SEGMENT_TELEMETRY, PACKET_BYTES};
use crate::Result;

/// Bus clock the sensor is specified for.
pub const DEFAULT_SPEED_HZ: u32 = 20_000_000;

/// Largest single transfer made on the bus: a telemetry segment after its first packet.
pub const MAX_TRANSFER_BYTES: usize = (PACKETS_PER_SEGMENT_TELEMETRY - 1) * PACKET_BYTES;

const BUFSIZ_PARAM: &str = "/sys/module/spidev/parameters/bufsiz";

/// The spidev `bufsiz` parameter, if it is too small for a segment transfer.
fn undersized_bufsiz(param: &str) -> Option<usize> {
    let bufsiz = param.trim().parse::<usize>().ok()?;
    (bufsiz < MAX_TRANSFER_BYTES).then_some(bufsiz)
}

/// Open and configure a spidev device as a VoSPI bus.
///
/// VoSPI runs in SPI mode 3 with 8 bit words. The returned device implements
/// [std::io::Read] and can be handed straight to a
/// [FrameSynchronizer](super::FrameSynchronizer).
///
/// Segments are read in one transfer of up to [MAX_TRANSFER_BYTES], which is larger than
/// the kernel's default spidev `bufsiz` of 4096. Reads fail with an I/O error unless the
/// module is loaded with a larger buffer, e.g., `spidev.bufsiz=65536` on the kernel
/// command line. A warning is logged when the limit is found to be too small.
///
/// # Errors
/// [crate::Error::Io] if the device cannot be opened or configured.
pub fn open<P: AsRef<Path>>(path: P, speed_hz: u32) -> Result<Spidev> {
    let path = path.as_ref();
    let mut spi = Spidev::open(path)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(speed_hz)
        .mode(SpiModeFlags::SPI_MODE_3)
        .build();
    spi.configure(&options)?;
    if let Some(bufsiz) = fs::read_to_string(BUFSIZ_PARAM)
        .ok()
        .and_then(|param| undersized_bufsiz(&param))
    {
        warn!(
            bufsiz,
            required = MAX_TRANSFER_BYTES,
            "spidev bufsiz is too small for segment transfers, raise spidev.bufsiz"
        );
    }
    debug!(path = %path.display(), speed_hz, "video bus configured");
    Ok(spi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bufsiz_check() {
        assert_eq!(undersized_bufsiz("4096\n"), Some(4096));
        assert_eq!(undersized_bufsiz("65536\n"), None);
        assert_eq!(undersized_bufsiz(&MAX_TRANSFER_BYTES.to_string()), None);
        assert_eq!(undersized_bufsiz("garbage"), None);
    }
}
