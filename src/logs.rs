//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; binaries embedding the engine
//! call [`init_tracing`] once. The per-job execution log lives in
//! `recipe::run_logs`.

use tracing_subscriber::EnvFilter;

/// Env var consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "TRAINSH_LOG";

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV)
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr `fmt` subscriber. Later calls are no-ops.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init();
}

/// Like [`init_tracing`] but routed through the test harness's capture.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_test_writer()
    .try_init();
}
