//! Local tmux via direct process invocation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{attach_script, TmuxClient};
use crate::config::StatusMode;
use crate::error::AppError;
use crate::ssh::{run_with_timeout, shell_quote, CmdOut, LOCAL_HOST};

#[derive(Debug, Clone, Default)]
pub struct LocalTmuxClient;

impl LocalTmuxClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TmuxClient for LocalTmuxClient {
    fn location(&self) -> &str {
        LOCAL_HOST
    }

    async fn tmux(&self, args: &[String], time_limit: Duration) -> Result<CmdOut, AppError> {
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        run_with_timeout(cmd, time_limit).await
    }

    async fn shell(&self, script: &str, time_limit: Duration) -> Result<CmdOut, AppError> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        run_with_timeout(cmd, time_limit).await
    }

    /// Nested attach from inside another tmux client needs `TMUX` unset.
    fn build_attach_command(&self, session: &str, status: StatusMode) -> String {
        format!("env -u TMUX sh -c {}", shell_quote(&attach_script(session, status)))
    }
}
