use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Get the trainsh data directory
///
/// - macOS: ~/Library/Application Support/trainsh/
/// - Linux: ~/.local/share/trainsh/
/// - Windows: %APPDATA%\trainsh\
///
/// Can be overridden with TRAINSH_DATA_DIR environment variable.
pub fn trainsh_data_dir() -> PathBuf {
  if let Ok(env) = std::env::var("TRAINSH_DATA_DIR") {
    if !env.trim().is_empty() {
      return PathBuf::from(env);
    }
  }

  dirs::data_dir()
    .unwrap_or_else(|| {
      dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
    })
    .join("trainsh")
}

pub fn default_config_path() -> PathBuf {
  trainsh_data_dir().join("config.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VastConfig {
  pub api_key: Option<String>,
  pub url: String,
  pub ssh_user: String,
  pub ssh_key_path: Option<String>,
}

impl Default for VastConfig {
  fn default() -> Self {
    Self {
      api_key: None,
      url: "https://cloud.vast.ai/".to_string(),
      ssh_user: "root".to_string(),
      ssh_key_path: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
  /// Let `@alias > cmd` run straight on a host when no window was opened for it.
  pub allow_host_execute: bool,
  /// Type foreground commands into the bridge pane when one mirrors the window.
  pub prefer_bridge_exec: bool,
  pub wait_poll_secs: u64,
  pub default_wait_timeout_secs: u64,
  pub idle_confirm_count: u32,
  pub idle_max_interval_secs: u64,
  pub ssh_retry_base_secs: u64,
  pub ssh_retry_max_secs: u64,
  pub ssh_max_retries: u32,
  pub vast_poll_secs: u64,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      allow_host_execute: false,
      prefer_bridge_exec: true,
      wait_poll_secs: 30,
      default_wait_timeout_secs: 300,
      idle_confirm_count: 3,
      idle_max_interval_secs: 10,
      ssh_retry_base_secs: 30,
      ssh_retry_max_secs: 300,
      ssh_max_retries: 10,
      vast_poll_secs: 10,
    }
  }
}

/// What happens to the remote tmux status bar while a bridge pane is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusMode {
  Keep,
  #[default]
  Off,
  Bottom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmuxConfig {
  pub auto_bridge: bool,
  /// Allow a detached local bridge session when not already inside tmux.
  pub bridge_outside_tmux: bool,
  pub bridge_status: StatusMode,
  /// Lines written by `tmux.config`.
  pub config_lines: Vec<String>,
}

pub fn default_tmux_config_lines() -> Vec<String> {
  [
    "set -g mouse on",
    "set -g history-limit 50000",
    "set -g default-terminal \"screen-256color\"",
    "set -g allow-rename off",
    "set -g base-index 0",
    "set -g status-interval 5",
    "setw -g mode-keys vi",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

impl Default for TmuxConfig {
  fn default() -> Self {
    Self {
      auto_bridge: true,
      bridge_outside_tmux: true,
      bridge_status: StatusMode::Off,
      config_lines: default_tmux_config_lines(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
  pub enabled: bool,
  pub default_channels: Vec<String>,
}

impl Default for NotificationsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      default_channels: vec!["log".to_string()],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrainshConfig {
  pub vast: VastConfig,
  pub executor: ExecutorConfig,
  pub tmux: TmuxConfig,
  pub notifications: NotificationsConfig,
}

pub async fn load_config() -> Result<TrainshConfig, AppError> {
  let path = default_config_path();
  if !path.exists() {
    return Ok(TrainshConfig::default());
  }
  let raw = tokio::fs::read_to_string(&path).await?;
  let cfg: TrainshConfig = serde_json::from_str(&raw)
    .map_err(|e| AppError::io(format!("Invalid config JSON at {}: {e}", path.display())))?;
  Ok(cfg)
}

pub async fn save_config(cfg: &TrainshConfig) -> Result<(), AppError> {
  let path = default_config_path();
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let data = serde_json::to_string_pretty(cfg)
    .map_err(|e| AppError::io(format!("Failed to serialize config: {e}")))?;
  tokio::fs::write(&path, format!("{data}\n")).await?;
  Ok(())
}

/// Values inherited from the parent process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
  /// Pane we are running in, when started from inside a tmux client.
  pub tmux_pane: Option<String>,
  /// Job id handed down by a tmux-wrapped re-invocation.
  pub job_id: Option<String>,
  /// First free window index handed down alongside `job_id`.
  pub window_index: Option<u32>,
}

pub const ENV_JOB_ID: &str = "TRAINSH_JOB_ID";
pub const ENV_WINDOW_INDEX: &str = "TRAINSH_WINDOW_INDEX";

impl ProcessEnv {
  pub fn from_env() -> Self {
    Self::from_lookup(|k| std::env::var(k).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let non_empty = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    Self {
      tmux_pane: non_empty("TMUX_PANE"),
      job_id: non_empty(ENV_JOB_ID),
      window_index: non_empty(ENV_WINDOW_INDEX).and_then(|v| v.parse().ok()),
    }
  }

  pub fn inside_tmux(&self) -> bool {
    self.tmux_pane.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn partial_config_fills_defaults() {
    let cfg: TrainshConfig =
      serde_json::from_str(r#"{"executor": {"allow_host_execute": true}, "tmux": {"bridge_status": "bottom"}}"#).unwrap();
    assert!(cfg.executor.allow_host_execute);
    assert_eq!(cfg.executor.ssh_max_retries, 10);
    assert_eq!(cfg.executor.wait_poll_secs, 30);
    assert_eq!(cfg.tmux.bridge_status, StatusMode::Bottom);
    assert!(!cfg.tmux.config_lines.is_empty());
    assert_eq!(cfg.notifications.default_channels, vec!["log".to_string()]);
  }

  #[test]
  fn process_env_reads_markers() {
    let vars: HashMap<&str, &str> = [("TMUX_PANE", "%3"), (ENV_JOB_ID, "abc"), (ENV_WINDOW_INDEX, "4")]
      .into_iter()
      .collect();
    let env = ProcessEnv::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
    assert!(env.inside_tmux());
    assert_eq!(env.job_id.as_deref(), Some("abc"));
    assert_eq!(env.window_index, Some(4));

    let empty = ProcessEnv::from_lookup(|k| if k == "TMUX_PANE" { Some(String::new()) } else { None });
    assert!(!empty.inside_tmux());
  }
}
