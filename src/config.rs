//! Configuration derived once from the first sample-rate and buffer-size
//! callbacks (spec.md §3, §6: both callbacks reject a second invocation).

use crate::device::{DeviceDescriptor, OB_FRAMES_PER_TRANSFER, OB_SAMPLE_RATE};
use crate::error::{BridgeError, Result};

/// Rejects a host buffer size larger than the device's per-transfer
/// frame count (spec.md §6, §8 scenario 6).
pub fn check_bufsize(device: DeviceDescriptor, bufsize: usize) -> Result<()> {
    let max = device.o2j_transfer_frames();
    if bufsize > max {
        return Err(BridgeError::ConfigRejected(format!(
            "JACK buffer size {bufsize} exceeds device transfer size {max}"
        )));
    }
    Ok(())
}

/// Upper bound on the host/device sample-rate ratio used to size scratch
/// and ring buffers, independent of the PLL's `[0.95, 1.05]` clamp band
/// (spec.md §9 Open Question: the reference used `4.5x` for buffer sizing
/// while the clamp band assumes `r0 ∈ [0.95, 1.05] * S_h/S_d`; this
/// implementation keeps both, sizing buffers loosely and clamping the
/// ratio tightly).
pub const MAX_SUPPORTED_RATIO: f64 = 4.5;

/// `MAX_READ_FRAMES` from the original source. The lower the value, the
/// lower the error at startup; a multiple of 2 can hide convergence bugs,
/// so 5 is kept deliberately odd.
pub const MAX_READ_FRAMES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub device: DeviceDescriptor,
    /// Host sample rate (`S_h`), fixed for the process lifetime.
    pub host_sample_rate: f64,
    /// Host frames per cycle (`B`).
    pub bufsize: usize,
    /// Nominal o2j ratio `r0 = S_h / S_d`.
    pub r0: f64,
    pub ratio_min: f64,
    pub ratio_max: f64,
    /// Target o2j pipeline depth in device frames.
    pub kdel: i64,
    /// Cycles between periodic ratio/latency log lines.
    pub log_interval: u32,
}

impl Config {
    pub fn new(device: DeviceDescriptor, host_sample_rate: f64, bufsize: usize) -> Self {
        let r0 = host_sample_rate / OB_SAMPLE_RATE as f64;
        let kdel = OB_FRAMES_PER_TRANSFER as i64 + (1.5 * bufsize as f64) as i64;
        let log_interval = ((2.0 * host_sample_rate / bufsize as f64).round() as u32).max(1);
        Config {
            device,
            host_sample_rate,
            bufsize,
            r0,
            ratio_min: 0.95 * r0,
            ratio_max: 1.05 * r0,
            kdel,
            log_interval,
        }
    }

    /// Byte capacity for a ring buffer that must absorb up to
    /// `MAX_SUPPORTED_RATIO` worth of host cycles without reallocating.
    pub fn ring_capacity_bytes(&self, frame_bytes: usize) -> usize {
        let frames = (self.bufsize as f64 * MAX_SUPPORTED_RATIO).ceil() as usize;
        frames * frame_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEVICE;

    #[test]
    fn nominal_ratio_and_clamp_band() {
        let cfg = Config::new(DEVICE, 48_000.0, 128);
        assert!((cfg.r0 - 1.0).abs() < 1e-9);
        assert!((cfg.ratio_min - 0.95).abs() < 1e-9);
        assert!((cfg.ratio_max - 1.05).abs() < 1e-9);
    }

    #[test]
    fn target_delay_matches_formula() {
        let cfg = Config::new(DEVICE, 48_000.0, 128);
        assert_eq!(cfg.kdel, 256 + (1.5 * 128.0) as i64);
    }

    #[test]
    fn upsampling_clamp_band() {
        let cfg = Config::new(DEVICE, 96_000.0, 128);
        assert!((cfg.r0 - 2.0).abs() < 1e-9);
        assert!((cfg.ratio_min - 1.9).abs() < 1e-9);
        assert!((cfg.ratio_max - 2.1).abs() < 1e-9);
    }
}
