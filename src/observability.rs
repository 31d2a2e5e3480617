//! Tracing setup and span helpers.

use tracing::{Level, Span, span};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "shm_compose=info";

/// Install a formatting subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`].
///
/// Calling this more than once is harmless; only the first call installs.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Span covering one run of the demonstration.
#[inline]
pub fn span_demo(first: &str, second: &str, window_len: usize) -> Span {
    span!(
        Level::INFO,
        "demo",
        first = %first,
        second = %second,
        window_len
    )
}

/// Span covering one step of the demonstration.
#[inline]
pub fn span_step(step: &'static str) -> Span {
    span!(Level::DEBUG, "step", step)
}
