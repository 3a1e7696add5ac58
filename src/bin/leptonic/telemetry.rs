use anyhow::{Context, Result};
use leptonic::cci::{device::I2cBus, CciChannel};
use leptonic::vospi::{self, FrameSynchronizer};
use leptonic::{Config, TelemetryMode, TelemetryRow};
use tracing::{info, warn};

use crate::Format;

fn grab(config: &Config) -> Result<TelemetryRow> {
    let bus = vospi::device::open(&config.spi_device, config.spi_speed_hz)
        .with_context(|| format!("opening video bus {:?}", config.spi_device))?;
    let opts = config.sync_opts();
    let opts = vospi::SyncOpts {
        telemetry: TelemetryMode::Enabled,
        ..opts
    };
    let mut sync = FrameSynchronizer::new(bus, opts);
    let mut frame = sync.new_frame();
    let report = sync
        .sync_and_transfer_frame(&mut frame)
        .context("synchronizing")?;
    info!(resets = report.resets, "synchronized");

    frame
        .telemetry(config.telemetry_location)
        .context("frame has no telemetry")
}

pub fn telemetry(config: &Config, cci: &mut CciChannel<I2cBus>, format: Format) -> Result<()> {
    cci.set_telemetry_location(config.telemetry_location)
        .context("setting telemetry location")?;
    cci.set_telemetry_mode(TelemetryMode::Enabled)
        .context("enabling telemetry")?;

    let zult = grab(config);

    if let Err(err) = cci.set_telemetry_mode(TelemetryMode::Disabled) {
        warn!("failed to disable telemetry: {err}");
    }

    let row = zult?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&row)?),
        Format::Text => {
            println!("revision:          {:#06x}", row.revision);
            println!("uptime:            {} ms", row.msec_since_boot);
            println!("software rev:      {:#018x}", row.software_rev);
            println!("frame count:       {}", row.frame_count);
            println!("frame mean:        {}", row.frame_mean);
            println!("fpa temp:          {:.2} C", row.fpa_temp_celsius());
            println!("fpa temp last ffc: {:.2} C", row.fpa_temp_last_ffc_celsius());
            println!("since last ffc:    {} ms", row.msec_since_last_ffc);
            println!("ffc state:         {:?}", row.status.ffc_state);
            println!("ffc desired:       {}", row.status.ffc_desired);
            println!("agc enabled:       {}", row.status.agc_enabled);
            println!("agc roi:           {:?}", row.agc_roi);
            println!(
                "agc clip limits:   {}..{}",
                row.agc_clip_limit_low, row.agc_clip_limit_high
            );
            println!("video format:      {}", row.video_output_format);
        }
    }
    Ok(())
}
