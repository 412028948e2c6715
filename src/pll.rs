//! C4: the digital phase-locked loop that estimates the momentary ratio
//! between the device clock and the host clock.
//!
//! Coefficients and state transitions follow
//! `examples/original_source/src/overwitch.c`'s
//! `overwitch_set_loop_filter`/`overwitch_compute_ratios` verbatim; the
//! loop filter itself is credited there to
//! <https://github.com/jackaudio/tools/blob/master/zalsa/jackclient.cc>.

use std::f64::consts::PI;

use tracing::{debug, info};

use crate::config::Config;
use crate::transport::{DeviceObservation, Status as Mode};

/// Snapshot a single `compute` call needs from the transport.
pub struct TimeSnapshot {
    pub obs0: DeviceObservation,
    pub obs1: DeviceObservation,
    pub j2o_latency: usize,
    pub current_time_secs: f64,
}

/// The mutable state of the controller: filter taps, running frame
/// count, clamped ratios, mode, and the "static across calls" locals
/// the C source kept at file scope (`i`, `sum_o2j_ratio`, `sum_j2o_ratio`,
/// `last_o2j_ratio`), folded into this struct per spec.md §9's design
/// note.
pub struct ControllerState {
    cfg: Config,

    w0: f64,
    w1: f64,
    w2: f64,
    z1: f64,
    z2: f64,
    z3: f64,

    pub o2j_ratio: f64,
    pub j2o_ratio: f64,

    /// Running count of host-consumed device frames.
    kj: f64,

    mode: Mode,

    cycles_since_log: u32,
    sum_o2j_ratio: f64,
    sum_j2o_ratio: f64,
    last_o2j_ratio: f64,

    o2j_latency_high_water: usize,
}

impl ControllerState {
    pub fn new(cfg: Config) -> Self {
        let o2j_ratio = cfg.r0;
        let mut state = ControllerState {
            cfg,
            w0: 0.0,
            w1: 0.0,
            w2: 0.0,
            z1: 0.0,
            z2: 0.0,
            z3: 0.0,
            o2j_ratio,
            j2o_ratio: 1.0 / o2j_ratio,
            kj: cfg.bufsize as f64 / -o2j_ratio,
            mode: Mode::Startup,
            cycles_since_log: 0,
            sum_o2j_ratio: 0.0,
            sum_j2o_ratio: 0.0,
            last_o2j_ratio: 0.0,
            o2j_latency_high_water: 0,
        };
        state.set_loop_filter(1.0);
        state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// `set_loop_filter(bw)` from the original source, verbatim.
    pub fn set_loop_filter(&mut self, bw: f64) {
        let w = 2.0 * PI * 20.0 * bw * self.cfg.bufsize as f64 / self.cfg.host_sample_rate;
        self.w0 = 1.0 - (-w).exp();
        let w = 2.0 * PI * bw * self.o2j_ratio / self.cfg.host_sample_rate;
        self.w1 = w * 1.6;
        self.w2 = w * self.cfg.bufsize as f64 / 1.6;
    }

    pub fn note_o2j_latency(&mut self, read_space: usize) {
        if read_space > self.o2j_latency_high_water {
            self.o2j_latency_high_water = read_space;
        }
    }

    pub fn o2j_latency_high_water(&self) -> usize {
        self.o2j_latency_high_water
    }

    /// The per-cycle time-error computation and loop-filter step of
    /// spec.md §4.4. `read_frames` is the consumed-frames counter
    /// accumulated by the o2j feeder during the previous cycle.
    pub fn compute(&mut self, snap: TimeSnapshot, read_frames: i64) {
        if self.mode == Mode::Stop {
            return;
        }

        self.kj += read_frames as f64;

        let ko0 = snap.obs0.frame_count as f64;
        let to0 = snap.obs0.time_secs;
        let ko1 = snap.obs1.frame_count as f64;
        let to1 = snap.obs1.time_secs;

        let dt = to1 - to0;
        let dob = if dt != 0.0 {
            (ko1 - ko0) * (snap.current_time_secs - to0) / dt
        } else {
            0.0
        };
        let mut err = (ko0 - self.kj) + dob - self.cfg.kdel as f64;

        self.z1 += self.w0 * (self.w1 * err - self.z1);
        self.z2 += self.w0 * (self.z1 - self.z2);
        self.z3 += self.w2 * self.z2;

        let mut o2j_ratio = 1.0 - self.z2 - self.z3;
        if o2j_ratio > self.cfg.ratio_max {
            o2j_ratio = self.cfg.ratio_max;
        }
        if o2j_ratio < self.cfg.ratio_min {
            o2j_ratio = self.cfg.ratio_min;
        }
        self.o2j_ratio = o2j_ratio;
        self.j2o_ratio = 1.0 / o2j_ratio;

        self.cycles_since_log += 1;
        self.sum_o2j_ratio += self.o2j_ratio;
        self.sum_j2o_ratio += self.j2o_ratio;

        if self.cycles_since_log >= self.cfg.log_interval {
            info!(
                o2j_latency_ms = self.o2j_latency_high_water as f64 * 1000.0
                    / (self.cfg.device.o2j_frame_bytes() as f64 * self.cfg.host_sample_rate),
                j2o_latency_ms = snap.j2o_latency as f64 * 1000.0
                    / (self.cfg.device.j2o_frame_bytes() as f64 * self.cfg.host_sample_rate),
                avg_o2j_ratio = self.sum_o2j_ratio / self.cycles_since_log as f64,
                avg_j2o_ratio = self.sum_j2o_ratio / self.cycles_since_log as f64,
                "periodic report"
            );

            self.cycles_since_log = 0;
            self.sum_o2j_ratio = 0.0;
            self.sum_j2o_ratio = 0.0;

            if self.mode == Mode::Startup {
                debug!("retuning loop filter");
                self.set_loop_filter(0.05);

                let n = (err + 0.5).floor();
                self.kj += n;
                err -= n;

                self.advance_to(Mode::Tune);
                self.last_o2j_ratio = self.o2j_ratio;
                return;
            }
        }

        if self.mode == Mode::Tune && (self.last_o2j_ratio - self.o2j_ratio).abs() < 0.0000001 {
            self.advance_to(Mode::Run);
        }

        if self.mode < Mode::Run {
            self.last_o2j_ratio = self.o2j_ratio;
        }
    }

    pub fn stop(&mut self) {
        self.advance_to(Mode::Stop);
    }

    fn advance_to(&mut self, next: Mode) {
        debug_assert!(self.mode.can_advance_to(next), "illegal transition {:?} -> {:?}", self.mode, next);
        self.mode = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEVICE;
    use crate::transport::DeviceObservation;

    fn make(host_sr: f64, bufsize: usize) -> ControllerState {
        ControllerState::new(Config::new(DEVICE, host_sr, bufsize))
    }

    #[test]
    fn ratio_stays_within_clamp_band() {
        let mut ctl = make(48_000.0, 128);
        for i in 0..4000 {
            let t = i as f64 * 128.0 / 48_000.0;
            let snap = TimeSnapshot {
                obs0: DeviceObservation { frame_count: (i as i64) * 128, time_secs: t },
                obs1: DeviceObservation { frame_count: (i as i64 + 1) * 128, time_secs: t + 128.0 / 48_000.0 },
                j2o_latency: 0,
                current_time_secs: t + 64.0 / 48_000.0,
            };
            ctl.compute(snap, 128);
            assert!(ctl.o2j_ratio >= ctl.cfg.ratio_min - 1e-9);
            assert!(ctl.o2j_ratio <= ctl.cfg.ratio_max + 1e-9);
        }
    }

    #[test]
    fn reaches_run_with_matched_clocks() {
        let mut ctl = make(48_000.0, 128);
        let cycles = 2 * ((2.0 * 48_000.0 / 128.0) as i64);
        for i in 0..cycles {
            let t = i as f64 * 128.0 / 48_000.0;
            let snap = TimeSnapshot {
                obs0: DeviceObservation { frame_count: i * 128, time_secs: t },
                obs1: DeviceObservation { frame_count: (i + 1) * 128, time_secs: t + 128.0 / 48_000.0 },
                j2o_latency: 0,
                current_time_secs: t + 64.0 / 48_000.0,
            };
            ctl.compute(snap, 128);
        }
        assert_eq!(ctl.mode(), Mode::Run);
        assert!((ctl.o2j_ratio - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn mode_never_reverses_except_into_stop() {
        assert!(Mode::Startup.can_advance_to(Mode::Tune));
        assert!(!Mode::Tune.can_advance_to(Mode::Startup));
        assert!(!Mode::Run.can_advance_to(Mode::Tune));
        assert!(Mode::Run.can_advance_to(Mode::Stop));
        assert!(Mode::Stop.can_advance_to(Mode::Stop));
    }
}
