//! Process-level default logging initializer.
//!
//! Every subsystem in this crate logs through `tracing` spans/events
//! directly rather than taking an injected logger handle (matching the
//! teacher's usage in `src/main.rs`); this function is only a convenience
//! for binaries embedding the crate that don't want to configure
//! `tracing-subscriber` themselves.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a `tracing-subscriber` formatting layer driven by `RUST_LOG`,
/// defaulting to `info` if unset. Safe to call more than once; only the
/// first call takes effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    });
}
