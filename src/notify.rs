//! Notification delivery.
//!
//! A channel is one of `log`, `system`, `webhook:<url>` or `command:<shell>`.
//! Every channel is attempted; the outcome summarises each one.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::ssh::run_with_timeout;

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
  #[default]
  Info,
  Success,
  Warning,
  Error,
}

impl FromStr for NotifyLevel {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "info" => Ok(Self::Info),
      "success" | "ok" => Ok(Self::Success),
      "warning" | "warn" => Ok(Self::Warning),
      "error" | "fail" => Ok(Self::Error),
      other => Err(AppError::invalid_input(format!("Unknown notify level: {other}"))),
    }
  }
}

impl fmt::Display for NotifyLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Info => "info",
      Self::Success => "success",
      Self::Warning => "warning",
      Self::Error => "error",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub message: String,
  pub level: NotifyLevel,
  pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotifyOutcome {
  pub ok: bool,
  pub summary: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
  async fn notify(&self, notification: &Notification) -> Result<NotifyOutcome, AppError>;
}

pub struct ChannelNotifier {
  http: reqwest::Client,
}

impl ChannelNotifier {
  pub fn new() -> Result<Self, AppError> {
    let http = reqwest::Client::builder()
      .timeout(CHANNEL_TIMEOUT)
      .build()
      .map_err(|e| AppError::http(format!("Failed to create HTTP client: {e}")))?;
    Ok(Self { http })
  }

  async fn system(&self, n: &Notification) -> Result<(), AppError> {
    let cmd = if cfg!(target_os = "macos") {
      let script = format!(
        "display notification {} with title {}",
        applescript_string(&n.message),
        applescript_string(&n.title)
      );
      let mut c = Command::new("osascript");
      c.arg("-e").arg(script);
      c
    } else if which::which("notify-send").is_ok() {
      let urgency = match n.level {
        NotifyLevel::Error => "critical",
        _ => "normal",
      };
      let mut c = Command::new("notify-send");
      c.args(["-u", urgency]).arg(&n.title).arg(&n.message);
      c
    } else {
      return Err(AppError::not_implemented("No system notifier available (osascript / notify-send)"));
    };
    let out = run_with_timeout(cmd, CHANNEL_TIMEOUT).await?;
    if !out.success() {
      return Err(AppError::command(format!("system notification failed: {}", out.combined())));
    }
    Ok(())
  }

  async fn webhook(&self, url: &str, n: &Notification) -> Result<(), AppError> {
    let body = serde_json::json!({
      "title": n.title,
      "message": n.message,
      "level": n.level.to_string(),
      "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    let resp = self.http.post(url).json(&body).send().await?;
    let status = resp.status();
    if !status.is_success() {
      let text = resp.text().await.unwrap_or_default();
      return Err(AppError::http(format!("webhook returned {status}: {text}")));
    }
    Ok(())
  }

  async fn command(&self, shell: &str, n: &Notification) -> Result<(), AppError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(shell);
    cmd.env("TRAINSH_TITLE", &n.title);
    cmd.env("TRAINSH_MESSAGE", &n.message);
    cmd.env("TRAINSH_LEVEL", n.level.to_string());
    let out = run_with_timeout(cmd, CHANNEL_TIMEOUT).await?;
    if !out.success() {
      return Err(AppError::command(format!(
        "notify command exited with {:?}: {}",
        out.code,
        out.combined()
      )));
    }
    Ok(())
  }

  async fn deliver(&self, channel: &str, n: &Notification) -> Result<(), AppError> {
    match channel {
      "log" => {
        match n.level {
          NotifyLevel::Error => error!(title = %n.title, "{}", n.message),
          NotifyLevel::Warning => warn!(title = %n.title, "{}", n.message),
          _ => info!(title = %n.title, level = %n.level, "{}", n.message),
        }
        Ok(())
      }
      "system" => self.system(n).await,
      c => {
        if let Some(url) = c.strip_prefix("webhook:") {
          self.webhook(url, n).await
        } else if let Some(shell) = c.strip_prefix("command:") {
          self.command(shell, n).await
        } else {
          Err(AppError::invalid_input(format!("Unknown notify channel: {c}")))
        }
      }
    }
  }
}

fn applescript_string(s: &str) -> String {
  format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn channel_label(channel: &str) -> &str {
  channel.split(':').next().unwrap_or(channel)
}

#[async_trait]
impl Notifier for ChannelNotifier {
  async fn notify(&self, n: &Notification) -> Result<NotifyOutcome, AppError> {
    if n.channels.is_empty() {
      return Err(AppError::invalid_input("No notification channels configured"));
    }
    let mut ok = true;
    let mut parts = Vec::with_capacity(n.channels.len());
    for channel in &n.channels {
      let channel = channel.trim();
      match self.deliver(channel, n).await {
        Ok(()) => parts.push(format!("{}: sent", channel_label(channel))),
        Err(e) => {
          ok = false;
          warn!(channel, error = %e, "notification channel failed");
          parts.push(format!("{}: failed ({})", channel_label(channel), e.message));
        }
      }
    }
    Ok(NotifyOutcome {
      ok,
      summary: parts.join("; "),
    })
  }
}
