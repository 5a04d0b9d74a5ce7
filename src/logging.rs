//! Tracing setup for the binaries.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the host application's job. For the bundled CLI (and anyone else who
//! wants the same behavior) this module wires one up behind the `logging`
//! feature.

/// Install the global subscriber: JSON lines, filtered by `CLIPCUT_LOG`.
///
/// With no env var set only errors are emitted, which keeps the CLI quiet
/// by default; `CLIPCUT_LOG=clipcut=debug` opens up the per-stage pipeline
/// events. Calling this more than once is harmless; the first installation
/// wins.
#[cfg(feature = "logging")]
pub fn init() {
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::ERROR.into())
        .with_env_var("CLIPCUT_LOG")
        .from_env_lossy();

    // Span context rides along on every line so one export's events can be
    // correlated when several requests interleave.
    let events = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(events)
        .try_init();
}

/// Stub used when the `logging` feature is off: embedding applications own
/// their subscriber, and nothing here should fight them for it.
#[cfg(not(feature = "logging"))]
pub fn init() {}
