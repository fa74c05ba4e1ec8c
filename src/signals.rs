//! Interrupt handling for graceful shutdown
//!
//! Ctrl+C flips a global flag and cancels the shutdown token; the serve loop
//! and in-flight retrieval operations observe the token and wind down so the
//! store handles can be torn down cleanly.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use tokio_util::sync::CancellationToken;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Token cancelled on shutdown; operations derive child tokens from it.
static SHUTDOWN: Lazy<CancellationToken> = Lazy::new(CancellationToken::new);

/// Check if the process was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Set the interrupted flag and cancel the shutdown token (called from the
/// signal handler).
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    SHUTDOWN.cancel();
}

/// The process-wide shutdown token.
pub fn shutdown_token() -> CancellationToken {
    SHUTDOWN.clone()
}
