//! Saved hosts and storages.
//!
//! Recipes may refer to an alias they never define; such aliases are looked
//! up in the global registry (`<data_dir>/hosts`, `<data_dir>/storages`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::trainsh_data_dir;
use crate::error::AppError;
use crate::ssh::{shell_quote, SshSpec, LOCAL_HOST};

// ============================================================
// Types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostType {
  Vast,
  #[default]
  Custom,
  Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
  pub name: String,
  #[serde(rename = "type", default)]
  pub host_type: HostType,
  pub ssh: Option<SshSpec>,
  // Vast specific
  pub vast_instance_id: Option<i64>,
  #[serde(default)]
  pub env_vars: HashMap<String, String>,
}

impl Host {
  /// The host as a recipe host spec: `local`, `vast:<id>` or an SSH spec.
  pub fn spec_string(&self) -> Result<String, AppError> {
    match (self.host_type, &self.ssh, self.vast_instance_id) {
      (HostType::Local, _, _) => Ok(LOCAL_HOST.to_string()),
      (HostType::Vast, None, Some(id)) => Ok(format!("vast:{id}")),
      (_, Some(ssh), _) => Ok(render_ssh_spec(ssh)),
      _ => Err(AppError::invalid_input(format!(
        "Host '{}' has no SSH connection configured",
        self.name
      ))),
    }
  }
}

/// Render a parsed SSH spec back to the string form `SshSpec::parse` accepts.
pub fn render_ssh_spec(ssh: &SshSpec) -> String {
  let mut parts = vec![ssh.target()];
  if let Some(port) = ssh.port {
    parts.push(format!("-p {port}"));
  }
  if let Some(key) = ssh.key_path.as_deref().filter(|k| !k.trim().is_empty()) {
    parts.push(format!("-i {}", shell_quote(key)));
  }
  if let Some(jump) = ssh.jump_host.as_deref().filter(|j| !j.trim().is_empty()) {
    parts.push(format!("-J {}", shell_quote(jump)));
  }
  parts.extend(ssh.extra_args.iter().map(|a| shell_quote(a)));
  parts.join(" ")
}

/// Backend configuration for different storage types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
  /// Local filesystem
  Local { root_path: String },
  /// A directory on a saved or recipe-defined host
  SshRemote { host: String, root_path: String },
  /// Any remote the `rclone` CLI already knows, e.g. `r2:bucket/prefix`
  Rclone { remote: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
  pub name: String,
  pub backend: StorageBackend,
  #[serde(default)]
  pub readonly: bool,
}

impl Storage {
  /// Interpret a recipe `storage NAME = spec` right-hand side.
  ///
  /// `/abs/path`, `~/path` and `local:path` are local directories,
  /// `@host:path` lives on a host, anything else is an rclone remote.
  pub fn from_spec(name: &str, spec: &str) -> Result<Self, AppError> {
    let spec = spec.trim();
    if spec.is_empty() {
      return Err(AppError::invalid_input(format!("Storage '{name}' has an empty spec")));
    }
    let backend = if let Some(path) = spec.strip_prefix("local:") {
      StorageBackend::Local {
        root_path: path.to_string(),
      }
    } else if spec.starts_with('/') || spec.starts_with('~') || spec.starts_with('.') {
      StorageBackend::Local {
        root_path: spec.to_string(),
      }
    } else if let Some(rest) = spec.strip_prefix('@') {
      let (host, path) = rest.split_once(':').unwrap_or((rest, ""));
      StorageBackend::SshRemote {
        host: host.to_string(),
        root_path: path.to_string(),
      }
    } else {
      StorageBackend::Rclone {
        remote: spec.strip_prefix("rclone:").unwrap_or(spec).to_string(),
      }
    };
    Ok(Self {
      name: name.to_string(),
      backend,
      readonly: false,
    })
  }
}

// ============================================================
// Registry
// ============================================================

#[async_trait]
pub trait HostRegistry: Send + Sync {
  async fn load_hosts(&self) -> Result<HashMap<String, Host>, AppError>;
  async fn load_storages(&self) -> Result<HashMap<String, Storage>, AppError>;
}

/// Registry backed by one JSON file per entry.
#[derive(Debug, Clone)]
pub struct FileRegistry {
  root: PathBuf,
}

impl Default for FileRegistry {
  fn default() -> Self {
    Self::new(trainsh_data_dir())
  }
}

impl FileRegistry {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn hosts_dir(&self) -> PathBuf {
    self.root.join("hosts")
  }

  fn storages_dir(&self) -> PathBuf {
    self.root.join("storages")
  }

  pub async fn save_host(&self, host: &Host) -> Result<(), AppError> {
    save_entry(&self.hosts_dir(), &host.name, host).await
  }

  pub async fn save_storage(&self, storage: &Storage) -> Result<(), AppError> {
    save_entry(&self.storages_dir(), &storage.name, storage).await
  }
}

async fn save_entry<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), AppError> {
  if name.trim().is_empty() || name.contains('/') {
    return Err(AppError::invalid_input(format!("Invalid registry name: '{name}'")));
  }
  tokio::fs::create_dir_all(dir).await?;
  let data = serde_json::to_string_pretty(value)
    .map_err(|e| AppError::io(format!("Failed to serialize {name}: {e}")))?;
  tokio::fs::write(dir.join(format!("{name}.json")), format!("{data}\n")).await?;
  Ok(())
}

/// Every parseable `*.json` in `dir`, keyed by file stem.
async fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<HashMap<String, T>, AppError> {
  let mut out = HashMap::new();
  if !dir.exists() {
    return Ok(out);
  }
  let mut entries = tokio::fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().map_or(true, |e| e != "json") {
      continue;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
      continue;
    };
    let data = tokio::fs::read_to_string(&path).await?;
    match serde_json::from_str::<T>(&data) {
      Ok(value) => {
        out.insert(stem, value);
      }
      Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable registry entry"),
    }
  }
  Ok(out)
}

#[async_trait]
impl HostRegistry for FileRegistry {
  async fn load_hosts(&self) -> Result<HashMap<String, Host>, AppError> {
    load_dir(&self.hosts_dir()).await
  }

  async fn load_storages(&self) -> Result<HashMap<String, Storage>, AppError> {
    load_dir(&self.storages_dir()).await
  }
}
