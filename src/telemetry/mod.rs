//! Tracing initialization.
//!
//! The crate emits structured `tracing` events throughout; this module wires
//! up a reasonable default subscriber for binaries and tests. Library users
//! with their own subscriber simply skip it.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the default subscriber: env-filtered fmt output plus span traces
/// on errors.
///
/// Respects `RUST_LOG`; defaults to `info` for this crate. Calling it twice
/// is harmless — the second attempt is ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("qasida=info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .try_init();
}
