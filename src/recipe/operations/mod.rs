//! Step handlers
//!
//! Each module adds one family of handlers to the executor. Handlers return
//! `Ok(StepResult)` for outcomes a recipe author should see (usage errors,
//! non-zero exits, timeouts) and `Err` only for unexpected failures, which
//! the run loop turns into a failed step.

mod execute;
mod notify;
mod tmux;
mod transfer;
mod vast;
mod wait;

pub use execute::{find_marker, marker_trailer};
