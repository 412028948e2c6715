//! C6: JACK integration. A `jack::NotificationHandler` maps the
//! sample-rate/buffer-size/xrun callbacks of spec.md §4.6/§6 onto the
//! `jack` crate's trait methods, and a `jack::ProcessHandler` runs the
//! full C5 cycle once per callback.
//!
//! Grounded in the teacher's own `engine/src/hw/jack.rs`, which already
//! pairs a `NotificationHandler`/`ProcessHandler` for a (simpler, DAW-
//! shaped) audio bridge: client creation via
//! `Client::new(name, ClientOptions::NO_START_SERVER)`, per-channel port
//! registration, and `activate_async`/`deactivate` lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jack::{AudioIn, AudioOut, Client, ClientOptions, Control, NotificationHandler, Port, ProcessHandler, ProcessScope};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::device::DeviceDescriptor;
use crate::error::{BridgeError, Result};
use crate::feeders::{J2oFeeder, O2jFeeder};
use crate::pll::{ControllerState, TimeSnapshot};
use crate::process::ProcessCycle;
use crate::resampler::{J2oConverter, O2jConverter};
use crate::ringbuffer::{ring_pair, RingReader, RingWriter};
use crate::transport::{DeviceObservation, Status, Transport};

/// Tracks whether the sample-rate/buffer-size callbacks have already
/// fired, so a second invocation can be rejected (spec.md §6).
struct Notifications {
    device: DeviceDescriptor,
    transport: Arc<dyn Transport + Send + Sync>,
    sample_rate_set: AtomicBool,
    buffer_size_set: AtomicBool,
    expected_sample_rate: u32,
    expected_bufsize: u32,
}

impl NotificationHandler for Notifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        if self.sample_rate_set.swap(true, Ordering::SeqCst) {
            if srate != self.expected_sample_rate {
                error!(got = srate, expected = self.expected_sample_rate, "sample rate changed after setup, rejecting");
                self.transport.set_status(Status::Stop);
                return Control::Quit;
            }
            return Control::Continue;
        }
        info!(sample_rate = srate, "JACK sample rate");
        Control::Continue
    }

    fn buffer_size(&mut self, _client: &Client, nframes: jack::Frames) -> Control {
        if nframes as usize > self.device.o2j_transfer_frames() {
            error!(
                got = nframes,
                max = self.device.o2j_transfer_frames(),
                "JACK buffer size is greater than device buffer size"
            );
            self.transport.set_status(Status::Stop);
            return Control::Quit;
        }
        if self.buffer_size_set.swap(true, Ordering::SeqCst) {
            if nframes != self.expected_bufsize {
                error!(got = nframes, expected = self.expected_bufsize, "buffer size changed after setup, rejecting");
                self.transport.set_status(Status::Stop);
                return Control::Quit;
            }
            return Control::Continue;
        }
        info!(buffer_size = nframes, "JACK buffer size");
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        warn!("JACK xrun");
        Control::Continue
    }
}

struct Process {
    output_ports: Vec<Port<AudioOut>>,
    input_ports: Vec<Port<AudioIn>>,
    cycle: ProcessCycle,
    ctl: ControllerState,
    transport: Arc<dyn Transport + Send + Sync>,
    host_sample_rate: f64,
    /// Per-input-port scratch, refilled every cycle via `clear()` +
    /// `extend_from_slice` instead of allocating a fresh `Vec` (spec.md
    /// §5: the realtime callback never allocates).
    host_input: Vec<Vec<f32>>,
}

impl ProcessHandler for Process {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let nframes = ps.n_frames() as usize;

        // `last_frame_time` is the host frame clock at the start of this
        // cycle; dividing by the host sample rate gives the same
        // "current time in seconds" `jack_get_cycle_times` supplies in
        // the original source.
        let current_time_secs = ps.last_frame_time() as f64 / self.host_sample_rate;

        let (obs0, obs1) = self.transport.snapshot();
        let snap = TimeSnapshot {
            obs0: DeviceObservation { frame_count: obs0.frame_count, time_secs: obs0.time_secs },
            obs1: DeviceObservation { frame_count: obs1.frame_count, time_secs: obs1.time_secs },
            j2o_latency: self.transport.j2o_latency(),
            current_time_secs,
        };

        for (port, scratch) in self.input_ports.iter().zip(self.host_input.iter_mut()) {
            scratch.clear();
            scratch.extend_from_slice(&port.as_slice(ps)[..nframes]);
        }

        match self.cycle.run_cycle(&mut self.ctl, self.transport.as_ref(), snap, &self.host_input) {
            Ok(frames) => {
                let o2j_out = self.cycle.o2j_output();
                for (idx, port) in self.output_ports.iter_mut().enumerate() {
                    let dst = port.as_mut_slice(ps);
                    if let Some(src) = o2j_out.get(idx) {
                        let n = frames.min(src.len()).min(dst.len());
                        dst[..n].copy_from_slice(&src[..n]);
                        for s in dst[n..].iter_mut() {
                            *s = 0.0;
                        }
                    } else {
                        dst.fill(0.0);
                    }
                }
            }
            Err(()) => {
                for port in self.output_ports.iter_mut() {
                    port.as_mut_slice(ps).fill(0.0);
                }
            }
        }

        if self.transport.status() == Status::Stop {
            return Control::Quit;
        }
        Control::Continue
    }
}

/// Owns the activated JACK client and every resource it was handed at
/// setup, released in reverse on drop (spec.md §4.6: "every resource
/// acquired is released exactly once").
pub struct JackBridge {
    client: Option<jack::AsyncClient<Notifications, Process>>,
}

impl JackBridge {
    pub fn start(device: DeviceDescriptor, transport: Arc<dyn Transport + Send + Sync>) -> Result<Self> {
        let (client, _status) = Client::new(device.name, ClientOptions::NO_START_SERVER)
            .map_err(|e| BridgeError::Setup(format!("jack client open: {e}")))?;

        let host_sample_rate = client.sample_rate() as f64;
        let bufsize = client.buffer_size() as usize;

        if let Err(e) = crate::config::check_bufsize(device, bufsize) {
            transport.set_status(Status::Stop);
            return Err(e);
        }

        let cfg = Config::new(device, host_sample_rate, bufsize);

        let mut output_ports = Vec::with_capacity(device.outputs);
        for name in device.output_track_names.iter().copied() {
            let p = client
                .register_port(name, AudioOut::default())
                .map_err(|e| BridgeError::Setup(format!("register output port {name}: {e}")))?;
            output_ports.push(p);
        }
        let mut input_ports = Vec::with_capacity(device.inputs);
        for name in device.input_track_names.iter().copied() {
            let p = client
                .register_port(name, AudioIn::default())
                .map_err(|e| BridgeError::Setup(format!("register input port {name}: {e}")))?;
            input_ports.push(p);
        }

        let o2j_frame_bytes = cfg.device.o2j_frame_bytes();
        let j2o_frame_bytes = cfg.device.j2o_frame_bytes();
        let (o2j_writer, o2j_reader): (RingWriter, RingReader) =
            ring_pair("o2j", cfg.ring_capacity_bytes(o2j_frame_bytes));
        let (j2o_writer, _j2o_reader): (RingWriter, RingReader) =
            ring_pair("j2o", cfg.ring_capacity_bytes(j2o_frame_bytes));
        // `_j2o_reader`/`o2j_writer`'s matching ends would be owned by a
        // real USB transport worker; spec.md places that worker out of
        // scope, so they are simply not driven here (see DESIGN.md).
        drop(o2j_writer);

        let o2j_conv = O2jConverter::new(cfg.r0, crate::config::MAX_SUPPORTED_RATIO, bufsize, device.outputs)?;
        let j2o_conv = J2oConverter::new(1.0 / cfg.r0, crate::config::MAX_SUPPORTED_RATIO, bufsize, device.inputs)?;

        let o2j_feeder = O2jFeeder::new(o2j_reader, device.outputs);
        let j2o_feeder = J2oFeeder::new(device.inputs);

        let cycle = ProcessCycle::new(cfg, o2j_feeder, j2o_feeder, o2j_conv, j2o_conv, j2o_writer);
        let ctl = ControllerState::new(cfg);

        let notifications = Notifications {
            device,
            transport: Arc::clone(&transport),
            sample_rate_set: AtomicBool::new(true),
            buffer_size_set: AtomicBool::new(true),
            expected_sample_rate: host_sample_rate as u32,
            expected_bufsize: bufsize as u32,
        };
        let host_input = vec![Vec::with_capacity(bufsize); device.inputs];
        let process = Process {
            output_ports,
            input_ports,
            cycle,
            ctl,
            transport: Arc::clone(&transport),
            host_sample_rate,
            host_input,
        };

        let async_client = client
            .activate_async(notifications, process)
            .map_err(|e| BridgeError::Setup(format!("jack activate: {e}")))?;

        Ok(JackBridge { client: Some(async_client) })
    }
}

impl Drop for JackBridge {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.deactivate();
        }
    }
}
