mod common;

use std::time::Duration;

use common::FakeSensor;
use leptonic::cci::{
    AgcMode, CciChannel, CciOpts, CMD_SYS_GET_TELEMETRY_ENABLE, CMD_SYS_RUN_FFC,
    CMD_SYS_SET_TELEMETRY_ENABLE, CMD_SYS_SET_TELEMETRY_LOCATION,
};
use leptonic::{TelemetryLocation, TelemetryMode};

fn channel() -> CciChannel<FakeSensor> {
    let opts = CciOpts::builder()
        .busy_timeout(Duration::from_millis(100))
        .poll_interval(Duration::ZERO)
        .build();
    CciChannel::new(FakeSensor::default(), opts)
}

#[test]
fn configure_telemetry_session() {
    let mut cci = channel();

    cci.set_telemetry_location(TelemetryLocation::Footer)
        .expect("set location");
    cci.set_telemetry_mode(TelemetryMode::Enabled)
        .expect("set mode");
    assert_eq!(cci.telemetry_mode().expect("get mode"), TelemetryMode::Enabled);
    assert_eq!(
        cci.telemetry_location().expect("get location"),
        TelemetryLocation::Footer
    );
    cci.set_telemetry_mode(TelemetryMode::Disabled)
        .expect("set mode");
    assert_eq!(cci.telemetry_mode().expect("get mode"), TelemetryMode::Disabled);

    let sensor = cci.into_inner();
    assert_eq!(
        &sensor.commands[..3],
        &[
            CMD_SYS_SET_TELEMETRY_LOCATION,
            CMD_SYS_SET_TELEMETRY_ENABLE,
            CMD_SYS_GET_TELEMETRY_ENABLE
        ]
    );
}

#[test]
fn agc_and_ffc() {
    let mut cci = channel();
    assert_eq!(cci.agc_mode().expect("get agc"), AgcMode::Disabled);
    cci.set_agc_mode(AgcMode::Enabled).expect("set agc");
    assert_eq!(cci.agc_mode().expect("get agc"), AgcMode::Enabled);

    cci.run_ffc().expect("ffc");
    let sensor = cci.into_inner();
    assert_eq!(sensor.commands.last(), Some(&CMD_SYS_RUN_FFC));
}

#[test]
fn status_reports_boot() {
    let mut cci = channel();
    let status = cci.status().expect("status");
    assert!(status.booted());
    assert!(!status.busy());
    assert_eq!(status.response_code(), 0);
}
