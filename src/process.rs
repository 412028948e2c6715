//! C5: the per-cycle orchestrator, invoked once per host process
//! callback with borrowed port buffers. Sequence and ordering follow
//! spec.md §4.5 and `examples/original_source/src/overwitch.c`'s
//! `overwitch_process_cb` exactly: compute ratios, then o2j, then j2o.
//!
//! Every scratch buffer used along the way (`o2j_input`, `j2o_input`,
//! `j2o_scratch_bytes`) is owned by `ProcessCycle` and sized once at
//! construction, so a realtime callback never allocates (spec.md §5).

use tracing::error;

use crate::config::{Config, MAX_READ_FRAMES, MAX_SUPPORTED_RATIO};
use crate::feeders::{commit_j2o, O2jFeeder, J2oFeeder};
use crate::pll::{ControllerState, TimeSnapshot};
use crate::resampler::{J2oConverter, O2jConverter};
use crate::ringbuffer::RingWriter;
use crate::transport::{Status, Transport};

/// The fractional-carry accumulator from spec.md §4.5 step 3
/// (`j2o_acc` in the original). Per-instance state, not a local
/// static, per spec.md §9's design note — but it's only ever read and
/// written by `ProcessCycle`, hence not folded into `ControllerState`
/// (which spec.md ties to the ratio/mode machinery specifically).
pub struct ProcessCycle {
    cfg: Config,
    o2j_feeder: O2jFeeder,
    j2o_feeder: J2oFeeder,
    o2j_conv: O2jConverter,
    j2o_conv: J2oConverter,
    j2o_writer: RingWriter,
    j2o_acc: f64,
    o2j_input: Vec<Vec<f32>>,
    j2o_input: Vec<Vec<f32>>,
    j2o_scratch_bytes: Vec<u8>,
}

impl ProcessCycle {
    pub fn new(
        cfg: Config,
        o2j_feeder: O2jFeeder,
        j2o_feeder: J2oFeeder,
        o2j_conv: O2jConverter,
        j2o_conv: J2oConverter,
        j2o_writer: RingWriter,
    ) -> Self {
        // Upper bound on frames either feeder can be asked to hand back
        // in one cycle, matching the ring sizing in `Config::ring_capacity_bytes`.
        let max_frames = (cfg.bufsize as f64 * MAX_SUPPORTED_RATIO).ceil() as usize + MAX_READ_FRAMES;
        let o2j_input = vec![Vec::with_capacity(max_frames); cfg.device.outputs];
        let j2o_input = vec![Vec::with_capacity(max_frames); cfg.device.inputs];
        let j2o_scratch_bytes = Vec::with_capacity(max_frames * cfg.device.j2o_frame_bytes());
        ProcessCycle {
            cfg,
            o2j_feeder,
            j2o_feeder,
            o2j_conv,
            j2o_conv,
            j2o_writer,
            j2o_acc: 0.0,
            o2j_input,
            j2o_input,
            j2o_scratch_bytes,
        }
    }

    /// The o2j converter's own output buffer, valid for the first
    /// `frames` values returned by the last `run_cycle` call, per
    /// channel.
    pub fn o2j_output(&self) -> &[Vec<f32>] {
        self.o2j_conv.output()
    }

    /// Runs one full cycle: compute ratios, o2j path, j2o path. Returns
    /// the number of o2j output frames produced (always `bufsize`); the
    /// frames themselves are read back via `o2j_output()`.
    pub fn run_cycle(
        &mut self,
        ctl: &mut ControllerState,
        transport: &dyn Transport,
        snap: TimeSnapshot,
        host_input: &[Vec<f32>],
    ) -> Result<usize, ()> {
        // 1. Compute ratios (unconditional; drives state transitions).
        ctl.compute(snap, self.o2j_feeder.read_frames);

        // 2. o2j path.
        self.o2j_conv.set_ratio(ctl.o2j_ratio).map_err(|e| error!(%e, "o2j ratio"))?;
        let needed = self.o2j_conv.input_frames_next();
        let frame_bytes = self.cfg.device.o2j_frame_bytes();
        self.o2j_feeder.fill(needed, frame_bytes, self.cfg.bufsize, &mut self.o2j_input);
        ctl.note_o2j_latency(self.o2j_feeder.note_latency());
        transport.set_j2o_latency(ctl.o2j_latency_high_water());

        let o2j_frames = self
            .o2j_conv
            .process(&self.o2j_input)
            .map_err(|e| error!(%e, "o2j process"))?;
        if o2j_frames != self.cfg.bufsize {
            error!(
                ratio = ctl.o2j_ratio,
                got = o2j_frames,
                want = self.cfg.bufsize,
                "o2j: unexpected frame count"
            );
        }

        // 3. j2o path.
        self.j2o_feeder.push(host_input);
        self.j2o_acc += self.cfg.bufsize as f64 * (ctl.j2o_ratio - 1.0);
        let inc = self.j2o_acc.trunc();
        self.j2o_acc -= inc;
        let frames_wanted = (self.cfg.bufsize as i64 + inc as i64).max(0) as usize;

        self.j2o_conv.set_ratio(ctl.j2o_ratio).map_err(|e| error!(%e, "j2o ratio"))?;
        self.j2o_feeder.drain(frames_wanted, &mut self.j2o_input);
        // The SRC's own expectation, not our accumulator-derived
        // `frames_wanted`: `SincFixedIn`'s natural output for a given
        // input count rarely lands exactly on `frames_wanted`, so
        // comparing against that would spam this diagnostic every
        // cycle the ratio isn't unity.
        let expected_j2o_frames = self.j2o_conv.output_frames_next();
        let j2o_frames = self
            .j2o_conv
            .process(&self.j2o_input)
            .map_err(|e| error!(%e, "j2o process"))?;
        if j2o_frames != expected_j2o_frames {
            error!(
                ratio = ctl.j2o_ratio,
                got = j2o_frames,
                want = expected_j2o_frames,
                "j2o: unexpected frame count"
            );
        }

        // Only RUN enables the j2o writer (spec.md §4.4, §4.6, §8
        // scenario 5) — `Status`'s ordering ranks `Stop` above `Run`,
        // so this must be an equality check, not `>=`.
        if transport.status() == Status::Run {
            let j2o_out = self.j2o_conv.output();
            if !commit_j2o(&mut self.j2o_writer, j2o_out, j2o_frames, &mut self.j2o_scratch_bytes) {
                error!("j2o: buffer overflow, discarding data");
            }
        }

        Ok(o2j_frames)
    }
}
