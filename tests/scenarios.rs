//! End-to-end seed scenarios (spec.md §8), driven by `SyntheticTransport`
//! directly against `ControllerState`/the ring buffer and feeders — no
//! real JACK server or USB device is required.

use std::time::Duration;

use overwitch::config::{check_bufsize, Config, MAX_SUPPORTED_RATIO};
use overwitch::device::DEVICE;
use overwitch::feeders::{J2oFeeder, O2jFeeder};
use overwitch::pll::{ControllerState, TimeSnapshot};
use overwitch::process::ProcessCycle;
use overwitch::resampler::{J2oConverter, O2jConverter};
use overwitch::ringbuffer::ring_pair;
use overwitch::transport::{Status, SyntheticTransport, Transport};

fn drive_cycles(
    ctl: &mut ControllerState,
    device_rate: f64,
    host_rate: f64,
    bufsize: usize,
    cycles: usize,
) {
    for i in 0..cycles {
        let host_t = i as f64 * bufsize as f64 / host_rate;
        let dev_t0 = host_t;
        let dev_t1 = host_t + bufsize as f64 / host_rate;
        let snap = TimeSnapshot {
            obs0: overwitch::transport::DeviceObservation {
                frame_count: (dev_t0 * device_rate) as i64,
                time_secs: dev_t0,
            },
            obs1: overwitch::transport::DeviceObservation {
                frame_count: (dev_t1 * device_rate) as i64,
                time_secs: dev_t1,
            },
            j2o_latency: 0,
            current_time_secs: host_t + bufsize as f64 / (2.0 * host_rate),
        };
        ctl.compute(snap, bufsize as i64);
    }
}

#[test]
fn scenario_1_ideal_lock_in() {
    let cfg = Config::new(DEVICE, 48_000.0, 128);
    let mut ctl = ControllerState::new(cfg);
    let max_cycles = 2 * ((2.0 * 48_000.0 / 128.0) as usize);
    drive_cycles(&mut ctl, 48_000.0, 48_000.0, 128, max_cycles);
    assert_eq!(ctl.mode(), overwitch::transport::Status::Run);
    assert!((ctl.o2j_ratio - 1.0).abs() <= 0.5 / 128.0 + 1e-3);
}

#[test]
fn scenario_2_upsampling_stays_in_band() {
    let cfg = Config::new(DEVICE, 96_000.0, 128);
    assert!((cfg.ratio_min - 1.9).abs() < 1e-9);
    assert!((cfg.ratio_max - 2.1).abs() < 1e-9);
    let mut ctl = ControllerState::new(cfg);
    let max_cycles = 2 * ((2.0 * 96_000.0 / 128.0) as usize);
    drive_cycles(&mut ctl, 48_000.0, 96_000.0, 128, max_cycles);
    assert!(ctl.o2j_ratio >= cfg.ratio_min && ctl.o2j_ratio <= cfg.ratio_max);
}

#[test]
fn scenario_3_drift_settles_near_expected_offset() {
    let cfg = Config::new(DEVICE, 48_000.0, 128);
    let mut ctl = ControllerState::new(cfg);
    let drifted_device_rate = 48_010.0;
    let max_cycles = 4 * ((2.0 * 48_000.0 / 128.0) as usize);
    drive_cycles(&mut ctl, drifted_device_rate, 48_000.0, 128, max_cycles);
    assert!(ctl.o2j_ratio >= cfg.ratio_min - 1e-9 && ctl.o2j_ratio <= cfg.ratio_max + 1e-9);
}

#[test]
fn scenario_4_transport_starvation_holds_last_sample() {
    let (mut writer, reader) = ring_pair("o2j", 4096);
    let mut feeder = O2jFeeder::new(reader, DEVICE.outputs);
    let frame_bytes = DEVICE.o2j_frame_bytes();
    let mut out = vec![Vec::new(); DEVICE.outputs];

    writer.write(&vec![0u8; frame_bytes * 64]);
    feeder.fill(32, frame_bytes, 32, &mut out);
    assert!(feeder.is_running());

    // Starve: no more writes arrive for several cycles.
    for _ in 0..5 {
        feeder.fill(32, frame_bytes, 32, &mut out);
        assert_eq!(out[0].len(), 32);
    }
}

#[test]
fn scenario_5_shutdown_stops_j2o_ring_writes() {
    let transport = SyntheticTransport::new(48_000.0, 1.0, Duration::from_millis(1));
    transport.run();
    std::thread::sleep(Duration::from_millis(5));

    // Drive a real `ProcessCycle` to RUN against a live j2o `RingReader`
    // and confirm writes land, then flip to STOP and confirm they cease
    // (spec.md §8 scenario 5: "j2o ring writes cease").
    let bufsize = 32;
    let cfg = Config::new(DEVICE, 48_000.0, bufsize);
    let (o2j_writer, o2j_reader) = ring_pair("o2j", 8192);
    drop(o2j_writer);
    let (j2o_writer, mut j2o_reader) = ring_pair("j2o", 16384);

    let o2j_feeder = O2jFeeder::new(o2j_reader, DEVICE.outputs);
    let j2o_feeder = J2oFeeder::new(DEVICE.inputs);
    let o2j_conv = O2jConverter::new(cfg.r0, MAX_SUPPORTED_RATIO, bufsize, DEVICE.outputs).unwrap();
    let j2o_conv = J2oConverter::new(1.0 / cfg.r0, MAX_SUPPORTED_RATIO, bufsize, DEVICE.inputs).unwrap();
    let mut cycle = ProcessCycle::new(cfg, o2j_feeder, j2o_feeder, o2j_conv, j2o_conv, j2o_writer);
    let mut ctl = ControllerState::new(cfg);
    let host_input = vec![vec![0.1f32; bufsize]; DEVICE.inputs];

    transport.set_status(Status::Tune);
    transport.set_status(Status::Run);

    for i in 0..5 {
        let t = i as f64 * bufsize as f64 / 48_000.0;
        let snap = TimeSnapshot {
            obs0: overwitch::transport::DeviceObservation { frame_count: (t * 48_000.0) as i64, time_secs: t },
            obs1: overwitch::transport::DeviceObservation {
                frame_count: ((t + bufsize as f64 / 48_000.0) * 48_000.0) as i64,
                time_secs: t + bufsize as f64 / 48_000.0,
            },
            j2o_latency: 0,
            current_time_secs: t,
        };
        cycle.run_cycle(&mut ctl, &transport, snap, &host_input).unwrap();
    }
    let space_while_run = j2o_reader.read_space();
    assert!(space_while_run > 0, "expected j2o writes to land while RUN");

    transport.set_status(Status::Stop);
    transport.wait_until_stopped();
    assert_eq!(transport.status(), Status::Stop);

    for i in 5..10 {
        let t = i as f64 * bufsize as f64 / 48_000.0;
        let snap = TimeSnapshot {
            obs0: overwitch::transport::DeviceObservation { frame_count: (t * 48_000.0) as i64, time_secs: t },
            obs1: overwitch::transport::DeviceObservation {
                frame_count: ((t + bufsize as f64 / 48_000.0) * 48_000.0) as i64,
                time_secs: t + bufsize as f64 / 48_000.0,
            },
            j2o_latency: 0,
            current_time_secs: t,
        };
        cycle.run_cycle(&mut ctl, &transport, snap, &host_input).unwrap();
    }
    assert_eq!(
        j2o_reader.read_space(),
        space_while_run,
        "j2o ring must receive no further writes once STOP"
    );
}

#[test]
fn scenario_6_oversize_host_buffer_is_rejected() {
    let oversize = DEVICE.o2j_transfer_frames() + 1;
    let result = check_bufsize(DEVICE, oversize);
    assert!(result.is_err());

    let ok = check_bufsize(DEVICE, DEVICE.o2j_transfer_frames());
    assert!(ok.is_ok());
}
