pub mod config;
pub mod device;
pub mod error;
pub mod feeders;
pub mod pll;
pub mod process;
pub mod resampler;
pub mod ringbuffer;
pub mod transport;

#[cfg(unix)]
pub mod jack_io;
#[cfg(unix)]
pub mod signals;

pub use device::DEVICE;
pub use error::{BridgeError, Result};
