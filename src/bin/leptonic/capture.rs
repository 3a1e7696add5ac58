use std::io::{stdout, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use leptonic::vospi::{self, Frame};
use leptonic::{Capture, CaptureEvent, Config, FrameQueue};
use serde::Serialize;
use tracing::{info, warn};

use crate::Format;

#[derive(Debug, Serialize)]
struct FrameSummary {
    index: usize,
    captured_at: Option<DateTime<Utc>>,
    ttts: [u8; vospi::SEGMENTS_PER_FRAME],
    min: u16,
    max: u16,
    mean: f64,
    frame_count: Option<u32>,
}

fn summarize(index: usize, frame: &Frame, config: &Config) -> FrameSummary {
    let image = frame.image(config.telemetry_location);
    let min = image.iter().copied().min().unwrap_or_default();
    let max = image.iter().copied().max().unwrap_or_default();
    let mean = image.iter().map(|v| f64::from(*v)).sum::<f64>() / image.len() as f64;
    FrameSummary {
        index,
        captured_at: frame.captured_at(),
        ttts: frame.ttts(),
        min,
        max,
        mean,
        frame_count: frame
            .telemetry(config.telemetry_location)
            .map(|t| t.frame_count),
    }
}

pub fn capture(config: &Config, frames: usize, format: Format) -> Result<()> {
    let bus = vospi::device::open(&config.spi_device, config.spi_speed_hz)
        .with_context(|| format!("opening video bus {:?}", config.spi_device))?;
    let queue = Arc::new(FrameQueue::new(config.queue_capacity, config.telemetry));
    let capture = Capture::spawn(bus, config.capture_opts(), Arc::clone(&queue))?;

    let mut frame = Frame::new(config.telemetry);
    let mut out = stdout().lock();
    for index in 0..frames {
        if queue.pop(&mut frame).is_err() {
            warn!("capture stopped after {index} frames");
            break;
        }
        let summary = summarize(index, &frame, config);
        match format {
            Format::Json => serde_json::to_writer(&mut out, &summary)?,
            Format::Text => write!(
                out,
                "{:>4} ttt={:?} min={} max={} mean={:.1}",
                summary.index, summary.ttts, summary.min, summary.max, summary.mean
            )?,
        }
        writeln!(out)?;
    }

    capture.cancel();
    for event in capture.events().try_iter() {
        if let CaptureEvent::Resync { reason } = event {
            info!("resynchronized: {reason}");
        }
    }
    let stats = capture.join().map_err(|err| {
        let hint = if matches!(err, leptonic::Error::Io(_)) {
            format!(
                "capture failed, check spidev bufsiz is at least {} bytes",
                vospi::device::MAX_TRANSFER_BYTES
            )
        } else {
            "capture failed".to_string()
        };
        anyhow::Error::new(err).context(hint)
    })?;
    info!(
        frames = stats.frames,
        resets = stats.resets,
        stale_reads = stats.stale_reads,
        dropped = queue.dropped(),
        "capture done"
    );
    Ok(())
}
