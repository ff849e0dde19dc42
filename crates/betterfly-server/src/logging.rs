//! ANSI-colored, level-stamped logging, mirroring the original deployment's
//! `[timestamp] - LEVEL - message` handler while routing through `tracing`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .init();
}
