//! Signal handling: not present in the teacher (a GUI app with no signal
//! handling of its own), grounded instead in
//! `examples/original_source/src/overwitch.c`'s `overwitch_exit` +
//! `sigaction` installation for `SIGHUP`/`SIGINT`/`SIGTERM`.
//!
//! Per spec.md §9's design note the handler does only one thing: flip
//! the shared transport status to `Stop`. It holds no other state and
//! performs no I/O.

use std::sync::{Arc, OnceLock};

use nix::sys::signal::{self, SigHandler, Signal};

use crate::error::{BridgeError, Result};
use crate::transport::{Status, Transport};

static TRANSPORT: OnceLock<Arc<dyn Transport + Send + Sync>> = OnceLock::new();

extern "C" fn on_terminate(_signo: nix::libc::c_int) {
    if let Some(transport) = TRANSPORT.get() {
        transport.set_status(Status::Stop);
    }
}

/// Installs handlers for `SIGHUP`, `SIGINT`, `SIGTERM`. Must be called
/// at most once; the shared state is latched into a process-wide static
/// because a C signal handler cannot capture anything.
pub fn install(transport: Arc<dyn Transport + Send + Sync>) -> Result<()> {
    TRANSPORT
        .set(transport)
        .map_err(|_| BridgeError::Setup("signal handlers already installed".into()))?;

    let handler = SigHandler::Handler(on_terminate);
    for sig in [Signal::SIGHUP, Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::signal(sig, handler) }
            .map_err(|e| BridgeError::Setup(format!("sigaction({sig:?}): {e}")))?;
    }
    Ok(())
}
