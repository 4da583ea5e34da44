//! SSH connection specs and process helpers.
//!
//! A host is described by a free-form connection spec, the same string a user
//! would type after `ssh`: `user@host -p PORT -i KEY -J JUMP -o ProxyCommand=...`.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::AppError;

/// Literal host spec meaning "this machine, no SSH".
pub const LOCAL_HOST: &str = "local";

/// ssh reserves exit status 255 for its own (connection/auth) failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

pub fn is_local_spec(spec: &str) -> bool {
  let s = spec.trim();
  s.is_empty() || s == LOCAL_HOST || s == "localhost"
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshSpec {
  pub host: String,
  pub port: Option<u16>,
  pub user: Option<String>,
  pub key_path: Option<String>,
  pub jump_host: Option<String>,
  #[serde(default)]
  pub extra_args: Vec<String>,
}

impl SshSpec {
  /// Parse a connection spec string into its parts.
  pub fn parse(spec: &str) -> Result<Self, AppError> {
    let mut tokens = shell_words::split(spec.trim())
      .map_err(|e| AppError::invalid_input(format!("Invalid host spec '{spec}': {e}")))?;
    if tokens.first().map(|t| t == "ssh").unwrap_or(false) {
      tokens.remove(0);
    }

    let mut out = SshSpec {
      host: String::new(),
      port: None,
      user: None,
      key_path: None,
      jump_host: None,
      extra_args: vec![],
    };

    let mut iter = tokens.into_iter();
    while let Some(tok) = iter.next() {
      match tok.as_str() {
        "-p" => {
          let value = iter
            .next()
            .ok_or_else(|| AppError::invalid_input(format!("Missing value for -p in '{spec}'")))?;
          out.port = Some(parse_port(&value, spec)?);
        }
        "-i" => {
          out.key_path = Some(
            iter
              .next()
              .ok_or_else(|| AppError::invalid_input(format!("Missing value for -i in '{spec}'")))?,
          );
        }
        "-J" => {
          out.jump_host = Some(
            iter
              .next()
              .ok_or_else(|| AppError::invalid_input(format!("Missing value for -J in '{spec}'")))?,
          );
        }
        "-o" => {
          let value = iter
            .next()
            .ok_or_else(|| AppError::invalid_input(format!("Missing value for -o in '{spec}'")))?;
          out.extra_args.push("-o".to_string());
          out.extra_args.push(value);
        }
        t if t.starts_with("-o") && t.len() > 2 => {
          out.extra_args.push("-o".to_string());
          out.extra_args.push(t[2..].to_string());
        }
        t if t.starts_with("-p") && t.len() > 2 => {
          out.port = Some(parse_port(&t[2..], spec)?);
        }
        t if t.starts_with('-') => out.extra_args.push(t.to_string()),
        _ => {
          if !out.host.is_empty() {
            return Err(AppError::invalid_input(format!(
              "Unexpected token '{tok}' in host spec '{spec}'"
            )));
          }
          let (user, host) = match tok.split_once('@') {
            Some((u, h)) => (Some(u.to_string()), h.to_string()),
            None => (None, tok.clone()),
          };
          // `host:port` shorthand.
          let host = match host.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
              out.port = Some(parse_port(p, spec)?);
              h.to_string()
            }
            _ => host,
          };
          out.user = user.filter(|u| !u.trim().is_empty());
          out.host = host;
        }
      }
    }

    out.validate()?;
    Ok(out)
  }

  pub fn validate(&self) -> Result<(), AppError> {
    if self.host.trim().is_empty() {
      return Err(AppError::invalid_input("ssh host is required"));
    }
    if self.port == Some(0) {
      return Err(AppError::invalid_input("ssh port must be in [1, 65535]"));
    }
    Ok(())
  }

  pub fn target(&self) -> String {
    match &self.user {
      Some(user) => format!("{}@{}", user.trim(), self.host.trim()),
      None => self.host.trim().to_string(),
    }
  }

  /// Options for non-interactive calls (BatchMode, never a TTY).
  pub fn common_ssh_options(&self) -> Vec<String> {
    self.build_ssh_options(true)
  }

  /// SSH options for interactive terminal sessions (no BatchMode)
  pub fn interactive_ssh_options(&self) -> Vec<String> {
    self.build_ssh_options(false)
  }

  fn build_ssh_options(&self, batch_mode: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![];
    if let Some(port) = self.port {
      args.push("-p".to_string());
      args.push(port.to_string());
    }
    if batch_mode {
      args.push("-o".to_string());
      args.push("BatchMode=yes".to_string());
    }
    args.extend([
      "-o".to_string(),
      "ConnectTimeout=15".to_string(),
      "-o".to_string(),
      "ServerAliveInterval=30".to_string(),
      "-o".to_string(),
      "ServerAliveCountMax=4".to_string(),
      "-o".to_string(),
      "StrictHostKeyChecking=accept-new".to_string(),
    ]);
    if let Some(k) = &self.key_path {
      if !k.trim().is_empty() {
        args.push("-i".to_string());
        args.push(k.clone());
      }
    }
    if let Some(j) = &self.jump_host {
      if !j.trim().is_empty() {
        args.push("-J".to_string());
        args.push(j.clone());
      }
    }
    // Let callers override via extra args (last one wins).
    args.extend(self.extra_args.clone());
    args
  }

  /// Full argv (after the `ssh` program name) for running `remote_command`.
  pub fn command_argv(&self, remote_command: &str, tty: bool) -> Vec<String> {
    let mut argv = if tty {
      let mut a = vec!["-t".to_string()];
      a.extend(self.interactive_ssh_options());
      a
    } else {
      let mut a = vec!["-T".to_string()];
      a.extend(self.common_ssh_options());
      a
    };
    argv.push(self.target());
    argv.push(remote_command.to_string());
    argv
  }

  /// The same invocation rendered as one shell command string.
  pub fn command_line(&self, remote_command: &str, tty: bool) -> String {
    let mut parts = vec!["ssh".to_string()];
    parts.extend(self.command_argv(remote_command, tty).iter().map(|a| shell_quote(a)));
    parts.join(" ")
  }

  /// The SSH `-e` string handed to rsync.
  pub fn rsync_rsh(&self) -> String {
    let mut parts = vec!["ssh".to_string()];
    parts.extend(self.common_ssh_options().iter().map(|a| shell_quote(a)));
    parts.join(" ")
  }
}

fn parse_port(value: &str, spec: &str) -> Result<u16, AppError> {
  value
    .trim()
    .parse::<u16>()
    .ok()
    .filter(|p| *p > 0)
    .ok_or_else(|| AppError::invalid_input(format!("Invalid port '{value}' in host spec '{spec}'")))
}

pub fn shell_quote(s: &str) -> String {
  shell_escape::unix::escape(s.into()).to_string()
}

#[derive(Debug, Clone, Default)]
pub struct CmdOut {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CmdOut {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  pub fn combined(&self) -> String {
    let out = self.stdout.trim();
    let err = self.stderr.trim();
    match (out.is_empty(), err.is_empty()) {
      (false, false) => format!("{out}\n--- stderr ---\n{err}"),
      (false, true) => out.to_string(),
      (true, false) => format!("(stderr only)\n{err}"),
      (true, true) => String::new(),
    }
  }
}

/// Run a command, returning its output whatever the exit status.
pub async fn run_with_timeout(mut cmd: Command, time_limit: Duration) -> Result<CmdOut, AppError> {
  cmd.stdin(Stdio::null());
  cmd.kill_on_drop(true);
  let out = match timeout(time_limit, cmd.output()).await {
    Ok(Ok(output)) => output,
    Ok(Err(e)) => return Err(AppError::command(format!("Command execution error: {}", e))),
    Err(_) => {
      return Err(AppError::timeout(format!(
        "Command timed out after {} seconds",
        time_limit.as_secs()
      )))
    }
  };
  Ok(CmdOut {
    code: out.status.code(),
    stdout: String::from_utf8_lossy(&out.stdout).to_string(),
    stderr: String::from_utf8_lossy(&out.stderr).to_string(),
  })
}

/// Run a command with a custom timeout, failing on non-zero exit.
pub async fn run_checked_with_timeout(cmd: Command, time_limit: Duration) -> Result<CmdOut, AppError> {
  let out = run_with_timeout(cmd, time_limit).await?;
  if !out.success() {
    return Err(AppError::command(format!(
      "Command failed (code={:?}): {}{}",
      out.code, out.stdout, out.stderr
    )));
  }
  Ok(out)
}

/// Run `remote_command` over SSH without a TTY.
///
/// ssh's own failures surface as `transport` errors so callers can tell them
/// apart from the remote command exiting non-zero.
pub async fn run_remote(spec: &SshSpec, remote_command: &str, time_limit: Duration) -> Result<CmdOut, AppError> {
  let mut cmd = Command::new("ssh");
  cmd.args(spec.command_argv(remote_command, false));
  let out = match run_with_timeout(cmd, time_limit).await {
    Ok(out) => out,
    Err(e) if e.is_timeout() => return Err(e),
    Err(e) => return Err(AppError::transport(format!("ssh {}: {}", spec.target(), e.message))),
  };
  if out.code == Some(SSH_TRANSPORT_EXIT) || out.code.is_none() {
    return Err(AppError::transport(format!(
      "ssh {} failed: {}",
      spec.target(),
      out.stderr.trim()
    )));
  }
  Ok(out)
}

pub fn ensure_bin(name: &str) -> Result<(), AppError> {
  which::which(name).map_err(|_| AppError::command(format!("Required binary not found: {name}")))?;
  Ok(())
}
