//! Remote tmux tunnelled through SSH.
//!
//! Polling calls never request a TTY (`ssh -T`); only the attach command
//! does, together with a known `TERM` and locale.

use std::time::Duration;

use async_trait::async_trait;

use super::{attach_script, TmuxClient};
use crate::config::StatusMode;
use crate::error::AppError;
use crate::ssh::{run_remote, shell_quote, CmdOut, SshSpec};

const ATTACH_ENV: &str = "env TERM=xterm-256color LANG=C.UTF-8 LC_ALL=C.UTF-8";

#[derive(Debug, Clone)]
pub struct RemoteTmuxClient {
    spec_text: String,
    ssh: SshSpec,
}

impl RemoteTmuxClient {
    pub fn new(spec_text: &str) -> Result<Self, AppError> {
        Ok(Self {
            spec_text: spec_text.trim().to_string(),
            ssh: SshSpec::parse(spec_text)?,
        })
    }

    pub fn ssh(&self) -> &SshSpec {
        &self.ssh
    }
}

fn tmux_command_line(args: &[String]) -> String {
    let mut parts = vec!["tmux".to_string()];
    parts.extend(args.iter().map(|a| shell_quote(a)));
    parts.join(" ")
}

#[async_trait]
impl TmuxClient for RemoteTmuxClient {
    fn location(&self) -> &str {
        &self.spec_text
    }

    async fn tmux(&self, args: &[String], time_limit: Duration) -> Result<CmdOut, AppError> {
        run_remote(&self.ssh, &tmux_command_line(args), time_limit).await
    }

    async fn shell(&self, script: &str, time_limit: Duration) -> Result<CmdOut, AppError> {
        run_remote(&self.ssh, &format!("bash -lc {}", shell_quote(script)), time_limit).await
    }

    fn build_attach_command(&self, session: &str, status: StatusMode) -> String {
        let remote = format!("{ATTACH_ENV} sh -c {}", shell_quote(&attach_script(session, status)));
        self.ssh.command_line(&remote, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmux_args_are_quoted_for_remote_shell() {
        let line = tmux_command_line(&[
            "send-keys".to_string(),
            "-t".to_string(),
            "s".to_string(),
            "-l".to_string(),
            "echo $HOME; ls".to_string(),
        ]);
        assert_eq!(line, "tmux send-keys -t s -l 'echo $HOME; ls'");
    }

    #[test]
    fn attach_command_requests_tty_and_term() {
        let client = RemoteTmuxClient::new("root@gpu -p 2222").unwrap();
        let cmd = client.build_attach_command("train_r_ab_0", StatusMode::Keep);
        assert!(cmd.starts_with("ssh -t -p 2222 "));
        assert!(cmd.contains("root@gpu"));
        assert!(cmd.contains("TERM=xterm-256color"));
        assert!(cmd.contains("attach-session"));
        assert!(!cmd.contains("BatchMode"));
    }

    #[test]
    fn location_is_the_spec() {
        let client = RemoteTmuxClient::new(" me@box ").unwrap();
        assert_eq!(client.location(), "me@box");
        assert!(!client.is_local());
    }
}
