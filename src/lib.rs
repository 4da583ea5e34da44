//! trainsh: resumable, tmux-backed training recipes.
//!
//! A recipe drives named tmux windows on local and remote hosts, moves data
//! between hosts and storages, and manages Vast.ai instances. See
//! [`recipe::run_recipe`] and [`recipe::resume_recipe`].

pub mod config;
pub mod error;
pub mod host;
pub mod job;
pub mod logs;
pub mod notify;
pub mod recipe;
pub mod secrets;
pub mod ssh;
pub mod tmux;
pub mod transfer;
pub mod vast;

#[cfg(test)]
pub(crate) mod testing;

pub use error::AppError;
