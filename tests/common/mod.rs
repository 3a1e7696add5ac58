#![allow(dead_code)]
use std::collections::HashMap;

use embedded_hal::blocking::i2c;
use leptonic::cci::{ADDRESS, REG_COMMAND, REG_DATA_0, REG_STATUS};
use leptonic::vospi::{encode_packet, PacketHeader, TelemetryMode, ANCHOR_PACKET};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Builds a synthetic VoSPI byte stream.
pub struct StreamBuilder {
    mode: TelemetryMode,
    rng: StdRng,
    wire: Vec<u8>,
}

impl StreamBuilder {
    pub fn new(mode: TelemetryMode) -> Self {
        StreamBuilder {
            mode,
            rng: StdRng::seed_from_u64(0x1e9),
            wire: Vec::new(),
        }
    }

    /// A segment reporting `ttt` whose payloads are all `marker`.
    pub fn segment(mut self, ttt: u8, marker: u8) -> Self {
        self.push_segment(ttt, ANCHOR_PACKET as u8, |_| vec![marker; 160]);
        self
    }

    /// A segment reporting `ttt` with random payloads.
    pub fn noisy_segment(mut self, ttt: u8) -> Self {
        let mut payloads: Vec<Vec<u8>> = Vec::new();
        for _ in 0..self.mode.packets_per_segment() {
            let mut payload = vec![0u8; 160];
            self.rng.fill(&mut payload[..]);
            payloads.push(payload);
        }
        self.push_segment(ttt, ANCHOR_PACKET as u8, |line| payloads[line].clone());
        self
    }

    /// A segment whose anchor packet carries the wrong line number.
    pub fn misaligned_segment(mut self) -> Self {
        self.push_segment(1, 3, |_| vec![0; 160]);
        self
    }

    /// A segment whose first packet payload is `first`.
    pub fn segment_with_first_packet(mut self, ttt: u8, first: &[u8]) -> Self {
        let first = first.to_vec();
        self.push_segment(ttt, ANCHOR_PACKET as u8, |line| {
            if line == 0 {
                first.clone()
            } else {
                vec![ttt; 160]
            }
        });
        self
    }

    /// The four segments of a frame, each filled with its segment number.
    pub fn frame(self) -> Self {
        (1..=4).fold(self, |b, ttt| b.segment(ttt, ttt))
    }

    pub fn discards(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.wire
                .extend_from_slice(&encode_packet(PacketHeader::discard(), &[0xde; 160]));
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.wire
    }

    fn push_segment(&mut self, ttt: u8, anchor_line: u8, payload: impl Fn(usize) -> Vec<u8>) {
        for line in 0..self.mode.packets_per_segment() {
            let header = if line == ANCHOR_PACKET {
                PacketHeader::new(ttt, anchor_line, 0)
            } else {
                PacketHeader::new(0, line as u8, 0)
            };
            self.wire
                .extend_from_slice(&encode_packet(header, &payload(line)));
        }
    }
}

/// Telemetry row A with a frame counter and FPA temperature set.
pub fn telemetry_row(frame_count: u32, fpa_temp_kelvin_100: u16) -> Vec<u8> {
    let mut dat = vec![0u8; 160];
    dat[40..42].copy_from_slice(&((frame_count & 0xffff) as u16).to_be_bytes());
    dat[42..44].copy_from_slice(&((frame_count >> 16) as u16).to_be_bytes());
    dat[48..50].copy_from_slice(&fpa_temp_kelvin_100.to_be_bytes());
    dat
}

#[derive(Debug)]
pub struct Nak;

/// Register file that executes get/set commands the way the sensor does: a get returns
/// what the matching set stored.
#[derive(Default)]
pub struct FakeSensor {
    pub regs: HashMap<u16, u16>,
    pub commands: Vec<u16>,
    stored: HashMap<u16, u16>,
}

impl FakeSensor {
    fn reg(&self, reg: u16) -> u16 {
        self.regs.get(&reg).copied().unwrap_or_default()
    }
}

impl i2c::Write for FakeSensor {
    type Error = Nak;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Nak> {
        if address != ADDRESS || bytes.len() != 4 {
            return Err(Nak);
        }
        let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
        let value = u16::from_be_bytes([bytes[2], bytes[3]]);
        self.regs.insert(reg, value);
        if reg == REG_COMMAND {
            self.commands.push(value);
            match value & 0x3 {
                0 => {
                    let stored = self.stored.get(&(value + 1)).copied().unwrap_or_default();
                    self.regs.insert(REG_DATA_0, stored);
                    self.regs.insert(REG_DATA_0 + 2, 0);
                }
                1 => {
                    let param = self.reg(REG_DATA_0);
                    self.stored.insert(value, param);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl i2c::WriteRead for FakeSensor {
    type Error = Nak;

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<(), Nak> {
        if address != ADDRESS || bytes.len() != 2 || buffer.len() != 2 {
            return Err(Nak);
        }
        let reg = u16::from_be_bytes([bytes[0], bytes[1]]);
        // booted, never busy
        let value = if reg == REG_STATUS { 0x0006 } else { self.reg(reg) };
        buffer.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}
