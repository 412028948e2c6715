use thiserror::Error;

/// Errors that can abort setup or force a clean shutdown (spec.md §7).
///
/// Transient realtime warnings (SRC frame mismatches, ring overflow,
/// empty o2j ring, xrun) are *not* represented here: the realtime
/// callback cannot propagate an error anywhere useful, so those are
/// logged in place and concealed (spec.md §7 category 3).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("configuration rejected: {0}")]
    ConfigRejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
