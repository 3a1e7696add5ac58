//! Telemetry row A decoding.
//!
//! When telemetry is enabled the sensor carries three extra lines per frame, either ahead of
//! or behind the video lines. Only the first line (row A) is decoded. Multi-word values are
//! sent least significant word first, each word big-endian.
use serde::{Deserialize, Serialize};

/// Where the sensor places telemetry lines within the frame.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLocation {
    #[default]
    Header,
    Footer,
}

impl TelemetryLocation {
    /// Value of this location in the CCI telemetry location enumeration.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            TelemetryLocation::Header => 0,
            TelemetryLocation::Footer => 1,
        }
    }

    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(TelemetryLocation::Header),
            1 => Some(TelemetryLocation::Footer),
            _ => None,
        }
    }
}

/// Flat-field correction progress reported in the status bits.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfcState {
    NeverCommanded,
    Imminent,
    InProgress,
    Complete,
}

impl FfcState {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => FfcState::NeverCommanded,
            1 => FfcState::Imminent,
            2 => FfcState::InProgress,
            _ => FfcState::Complete,
        }
    }
}

/// Decoded telemetry status word.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusBits {
    pub raw: u32,
    pub ffc_desired: bool,
    pub ffc_state: FfcState,
    pub agc_enabled: bool,
    pub shutter_lockout: bool,
    pub overtemp_shutdown_imminent: bool,
}

impl StatusBits {
    #[must_use]
    pub fn new(raw: u32) -> Self {
        StatusBits {
            raw,
            ffc_desired: raw & (1 << 3) != 0,
            ffc_state: FfcState::from_bits(raw >> 4),
            agc_enabled: raw & (1 << 12) != 0,
            shutter_lockout: raw & (1 << 15) != 0,
            overtemp_shutdown_imminent: raw & (1 << 20) != 0,
        }
    }
}

/// AGC region of interest, in pixels.
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub top: u16,
    pub left: u16,
    pub bottom: u16,
    pub right: u16,
}

/// Telemetry row A.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryRow {
    pub revision: u16,
    pub msec_since_boot: u32,
    pub status: StatusBits,
    pub software_rev: u64,
    pub frame_count: u32,
    pub frame_mean: u16,
    pub fpa_temp_count: u16,
    pub fpa_temp_kelvin_100: u16,
    pub fpa_temp_last_ffc_kelvin_100: u16,
    pub msec_since_last_ffc: u32,
    pub agc_roi: Roi,
    pub agc_clip_limit_high: u16,
    pub agc_clip_limit_low: u16,
    pub video_output_format: u32,
}

struct Words<'a>(&'a [u8]);

impl Words<'_> {
    fn word(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.0[offset], self.0[offset + 1]])
    }

    fn dword(&self, offset: usize) -> u32 {
        u32::from(self.word(offset + 2)) << 16 | u32::from(self.word(offset))
    }

    fn qword(&self, offset: usize) -> u64 {
        u64::from(self.dword(offset + 4)) << 32 | u64::from(self.dword(offset))
    }
}

impl TelemetryRow {
    /// Bytes of a telemetry line, the same as a packet payload.
    pub const LEN: usize = 160;

    /// Decode row A from a packet payload, or `None` if `dat` is too short.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        let w = Words(dat);
        Some(TelemetryRow {
            revision: w.word(0),
            msec_since_boot: w.dword(2),
            status: StatusBits::new(w.dword(6)),
            software_rev: w.qword(26),
            frame_count: w.dword(40),
            frame_mean: w.word(44),
            fpa_temp_count: w.word(46),
            fpa_temp_kelvin_100: w.word(48),
            fpa_temp_last_ffc_kelvin_100: w.word(58),
            msec_since_last_ffc: w.dword(60),
            agc_roi: Roi {
                top: w.word(68),
                left: w.word(70),
                bottom: w.word(72),
                right: w.word(74),
            },
            agc_clip_limit_high: w.word(76),
            agc_clip_limit_low: w.word(78),
            video_output_format: w.dword(144),
        })
    }

    /// Focal plane array temperature in degrees Celsius.
    #[must_use]
    pub fn fpa_temp_celsius(&self) -> f64 {
        kelvin_100_to_celsius(self.fpa_temp_kelvin_100)
    }

    /// Focal plane array temperature at the last FFC in degrees Celsius.
    #[must_use]
    pub fn fpa_temp_last_ffc_celsius(&self) -> f64 {
        kelvin_100_to_celsius(self.fpa_temp_last_ffc_kelvin_100)
    }
}

fn kelvin_100_to_celsius(k100: u16) -> f64 {
    f64::from(k100) / 100.0 - 273.15
}
