//! C3 (part 1): the asynchronous sample-rate converter pair, wrapping
//! `rubato` (already a teacher dependency, used there for offline
//! bulk resampling) in the *pull* calling convention spec.md §4.3
//! requires.
//!
//! The original calls libsamplerate's `src_callback_read`, which lets
//! the caller ask for exactly N output frames and pulls whatever input
//! it needs through a supplied callback. `rubato` has no callback mode;
//! instead `SincFixedOut` exposes `input_frames_next()` so the caller can
//! ask the converter how much input it wants *before* calling `process`,
//! which is this crate's in-ecosystem equivalent: the o2j feeder uses it
//! to decide how many frames to pull from the ring buffer each cycle.
//! `SincFixedIn` is the mirror for j2o, where the input count (host
//! frames per cycle plus the PLL's fractional carry) is already known
//! and the output count varies instead.
//!
//! Quality mirrors `SRC_SINC_FASTEST`: a short sinc, linear interpolation
//! between oversampled table entries.

use rubato::{
    Resampler, SincFixedIn, SincFixedOut, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::error::{BridgeError, Result};

fn fastest_sinc_parameters() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Wraps `SincFixedOut<f32>`, the o2j direction: fixed output length
/// (the host's bufsize `B`), variable input length told to the caller
/// via `input_frames_next`.
///
/// Holds its output in a buffer allocated once at construction
/// (`Resampler::output_buffer_allocate`) and reused by every `process`
/// call, so the realtime callback path never allocates (spec.md §5).
pub struct O2jConverter {
    inner: SincFixedOut<f32>,
    output: Vec<Vec<f32>>,
}

impl O2jConverter {
    pub fn new(initial_ratio: f64, max_ratio: f64, bufsize: usize, channels: usize) -> Result<Self> {
        let inner = SincFixedOut::new(initial_ratio, max_ratio, fastest_sinc_parameters(), bufsize, channels)
            .map_err(|e| BridgeError::Setup(format!("o2j resampler: {e}")))?;
        let output = inner.output_buffer_allocate(true);
        Ok(O2jConverter { inner, output })
    }

    /// Frames the converter needs pulled from the source before the next
    /// `process` call can produce a full output block.
    pub fn input_frames_next(&self) -> usize {
        self.inner.input_frames_next()
    }

    pub fn set_ratio(&mut self, ratio: f64) -> Result<()> {
        self.inner
            .set_resample_ratio(ratio, true)
            .map_err(|e| BridgeError::Transport(format!("o2j ratio update: {e}")))
    }

    /// Runs one conversion, writing into the converter's own output
    /// buffer (see `output()`) and returning the number of frames
    /// produced — always `bufsize` for a fixed-output converter.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Result<usize> {
        let (_, frames_out) = self
            .inner
            .process_into_buffer(input, &mut self.output, None)
            .map_err(|e| BridgeError::Transport(format!("o2j process: {e}")))?;
        Ok(frames_out)
    }

    /// The buffer the last `process` call wrote into; valid for the
    /// first value returned by that call, per channel.
    pub fn output(&self) -> &[Vec<f32>] {
        &self.output
    }
}

/// Wraps `SincFixedIn<f32>`, the j2o direction: fixed input length
/// (`frames_wanted` from the PLL's fractional accumulator), variable
/// output length. Output buffer is preallocated the same way as
/// `O2jConverter`'s.
pub struct J2oConverter {
    inner: SincFixedIn<f32>,
    output: Vec<Vec<f32>>,
}

impl J2oConverter {
    pub fn new(initial_ratio: f64, max_ratio: f64, bufsize: usize, channels: usize) -> Result<Self> {
        let inner = SincFixedIn::new(initial_ratio, max_ratio, fastest_sinc_parameters(), bufsize, channels)
            .map_err(|e| BridgeError::Setup(format!("j2o resampler: {e}")))?;
        let output = inner.output_buffer_allocate(true);
        Ok(J2oConverter { inner, output })
    }

    pub fn set_ratio(&mut self, ratio: f64) -> Result<()> {
        self.inner
            .set_resample_ratio(ratio, true)
            .map_err(|e| BridgeError::Transport(format!("j2o ratio update: {e}")))
    }

    /// The SRC's own expectation of how many output frames the next
    /// `process` call will produce, for the current input/ratio — the
    /// yardstick the caller should diagnose against instead of its own
    /// accumulator-derived estimate.
    pub fn output_frames_next(&self) -> usize {
        self.inner.output_frames_next()
    }

    /// Runs one conversion over exactly `input[_][i].len()` input frames
    /// per channel, writing into the converter's own output buffer and
    /// returning the number of output frames actually produced.
    pub fn process(&mut self, input: &[Vec<f32>]) -> Result<usize> {
        let (_, frames_out) = self
            .inner
            .process_into_buffer(input, &mut self.output, None)
            .map_err(|e| BridgeError::Transport(format!("j2o process: {e}")))?;
        Ok(frames_out)
    }

    pub fn output(&self) -> &[Vec<f32>] {
        &self.output
    }
}
