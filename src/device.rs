//! Static device descriptor for the Overbridge USB audio contract.
//!
//! Format negotiation and device discovery are explicitly out of scope
//! (spec Non-goals); the descriptor below is the one statically-known
//! device shape this bridge supports, modeled on the Elektron Digitakt's
//! two-pair (main + cue) Overbridge layout.

/// Device sample rate. Fixed per the Overbridge protocol; never negotiated.
pub const OB_SAMPLE_RATE: u32 = 48_000;

/// Device-side frames carried per USB transfer.
pub const OB_FRAMES_PER_TRANSFER: usize = 256;

/// Bytes per sample in the device-side frame (32-bit float).
pub const OB_BYTES_PER_SAMPLE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct DeviceDescriptor {
    pub name: &'static str,
    pub outputs: usize,
    pub inputs: usize,
    pub output_track_names: &'static [&'static str],
    pub input_track_names: &'static [&'static str],
}

impl DeviceDescriptor {
    pub const fn o2j_frame_bytes(&self) -> usize {
        self.outputs * OB_BYTES_PER_SAMPLE
    }

    pub const fn j2o_frame_bytes(&self) -> usize {
        self.inputs * OB_BYTES_PER_SAMPLE
    }

    /// Device frames-per-transfer; the upper bound a host buffer size
    /// must not exceed (spec.md §6).
    pub const fn o2j_transfer_frames(&self) -> usize {
        OB_FRAMES_PER_TRANSFER
    }
}

/// The one statically-known device this bridge targets.
pub const DEVICE: DeviceDescriptor = DeviceDescriptor {
    name: "Digitakt",
    outputs: 4,
    inputs: 2,
    output_track_names: &["main_out_1", "main_out_2", "cue_out_1", "cue_out_2"],
    input_track_names: &["main_in_1", "main_in_2"],
};
