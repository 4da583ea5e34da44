//! File transfer between local paths, hosts and storages.
//!
//! Hosts go through `rsync` over the host's SSH spec; rclone remotes go
//! through the `rclone` CLI. Both report how many bytes moved.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::AppError;
use crate::host::{Storage, StorageBackend};
use crate::ssh::{ensure_bin, is_local_spec, run_remote, run_with_timeout, shell_quote, SshSpec};
use crate::tmux::shell_path;

// ============================================================
// Types
// ============================================================

/// One side of a transfer, already resolved against hosts and storages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Path on this machine
    Local { path: String },
    /// Path on a host (`spec` is an SSH spec or `local`)
    Host { alias: String, spec: String, path: String },
    /// Path inside a storage
    Storage { storage: Storage, path: String },
}

impl Endpoint {
    pub fn describe(&self) -> String {
        match self {
            Endpoint::Local { path } => path.clone(),
            Endpoint::Host { alias, path, .. } => format!("@{alias}:{path}"),
            Endpoint::Storage { storage, path } => format!("@{}:{path}", storage.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub bytes_transferred: u64,
    pub message: String,
}

#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn transfer(&self, source: &Endpoint, dest: &Endpoint) -> Result<TransferOutcome, AppError>;
}

/// Where a resolved endpoint actually lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Local(String),
    Ssh(SshSpec, String),
    Rclone(String),
}

/// `path` inside `root`; absolute or home-relative paths stand alone.
pub fn join_path(root: &str, path: &str) -> String {
    let path = path.trim();
    if path.is_empty() {
        return root.to_string();
    }
    if root.is_empty() || path.starts_with('/') || path.starts_with('~') {
        return path.to_string();
    }
    format!("{}/{}", root.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn locate(endpoint: &Endpoint) -> Result<Location, AppError> {
    match endpoint {
        Endpoint::Local { path } => Ok(Location::Local(path.clone())),
        Endpoint::Host { spec, path, .. } if is_local_spec(spec) => Ok(Location::Local(path.clone())),
        Endpoint::Host { spec, path, .. } => Ok(Location::Ssh(SshSpec::parse(spec)?, path.clone())),
        Endpoint::Storage { storage, path } => match &storage.backend {
            StorageBackend::Local { root_path } => Ok(Location::Local(join_path(root_path, path))),
            StorageBackend::Rclone { remote } => Ok(Location::Rclone(join_path(remote, path))),
            StorageBackend::SshRemote { host, .. } => Err(AppError::invalid_input(format!(
                "Storage '{}' lives on host '{host}' and must be resolved to that host first",
                storage.name
            ))),
        },
    }
}

pub fn expand_local(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

/// `Total transferred file size: 1,234 bytes` from `rsync --stats`.
pub fn parse_rsync_bytes(output: &str) -> u64 {
    output
        .lines()
        .find_map(|l| l.trim().strip_prefix("Total transferred file size:"))
        .map(|rest| {
            rest.chars()
                .take_while(|c| c.is_ascii_digit() || *c == ',' || c.is_whitespace())
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Bytes from the final `Transferred: 1.5 MiB / 1.5 MiB, 100%` rclone stats line.
pub fn parse_rclone_bytes(output: &str) -> u64 {
    let mut bytes = 0;
    for line in output.lines() {
        let Some(rest) = line.split("Transferred:").nth(1) else {
            continue;
        };
        let Some(amount) = rest.split('/').next() else {
            continue;
        };
        if !rest.contains('/') {
            continue;
        }
        let mut parts = amount.split_whitespace();
        // The file-count line has no unit.
        let (Some(num), Some(unit)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = num.parse::<f64>() else {
            continue;
        };
        let scale: f64 = match unit {
            "B" | "Bytes" => 1.0,
            "KiB" => 1024.0,
            "MiB" => 1024.0 * 1024.0,
            "GiB" => 1024.0 * 1024.0 * 1024.0,
            "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            _ => continue,
        };
        bytes = (value * scale).round() as u64;
    }
    bytes
}

// ============================================================
// rsync / rclone engine
// ============================================================

#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    time_limit: Duration,
}

impl Default for RsyncTransfer {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl RsyncTransfer {
    pub fn new(time_limit: Duration) -> Self {
        Self { time_limit }
    }

    async fn rsync(&self, rsh: Option<String>, src: &str, dst: &str) -> Result<TransferOutcome, AppError> {
        ensure_bin("rsync")?;
        let mut cmd = Command::new("rsync");
        cmd.args(["-az", "--stats"]);
        if let Some(rsh) = rsh {
            cmd.arg("-e").arg(rsh);
        }
        cmd.arg(src).arg(dst);
        debug!(src, dst, "rsync");
        let out = run_with_timeout(cmd, self.time_limit).await?;
        if !out.success() {
            return Ok(TransferOutcome {
                success: false,
                bytes_transferred: 0,
                message: format!("rsync failed (code={:?}): {}", out.code, out.combined()),
            });
        }
        Ok(TransferOutcome {
            success: true,
            bytes_transferred: parse_rsync_bytes(&out.stdout),
            message: format!("{src} -> {dst}"),
        })
    }

    async fn rclone(&self, src: &str, dst: &str) -> Result<TransferOutcome, AppError> {
        ensure_bin("rclone")?;
        let mut cmd = Command::new("rclone");
        cmd.args(["copy", "-v", "--stats", "0"]).arg(src).arg(dst);
        debug!(src, dst, "rclone");
        let out = run_with_timeout(cmd, self.time_limit).await?;
        if !out.success() {
            return Ok(TransferOutcome {
                success: false,
                bytes_transferred: 0,
                message: format!("rclone failed (code={:?}): {}", out.code, out.combined()),
            });
        }
        // rclone logs its stats on stderr.
        Ok(TransferOutcome {
            success: true,
            bytes_transferred: parse_rclone_bytes(&format!("{}\n{}", out.stdout, out.stderr)),
            message: format!("{src} -> {dst}"),
        })
    }

    async fn copy_on_host(&self, spec: &SshSpec, src: &str, dst: &str) -> Result<TransferOutcome, AppError> {
        let script = format!("mkdir -p \"$(dirname {d})\" && cp -a {} {d}", shell_path(src), d = shell_path(dst));
        let out = run_remote(spec, &format!("bash -lc {}", shell_quote(&script)), self.time_limit).await?;
        Ok(TransferOutcome {
            success: out.success(),
            bytes_transferred: 0,
            message: if out.success() {
                format!("copied {src} -> {dst} on {}", spec.target())
            } else {
                out.combined()
            },
        })
    }
}

#[async_trait]
impl TransferEngine for RsyncTransfer {
    async fn transfer(&self, source: &Endpoint, dest: &Endpoint) -> Result<TransferOutcome, AppError> {
        let outcome = match (locate(source)?, locate(dest)?) {
            (Location::Local(s), Location::Local(d)) => self.rsync(None, &expand_local(&s), &expand_local(&d)).await?,
            (Location::Local(s), Location::Ssh(spec, d)) => {
                let remote = format!("{}:{d}", spec.target());
                self.rsync(Some(spec.rsync_rsh()), &expand_local(&s), &remote).await?
            }
            (Location::Ssh(spec, s), Location::Local(d)) => {
                let remote = format!("{}:{s}", spec.target());
                self.rsync(Some(spec.rsync_rsh()), &remote, &expand_local(&d)).await?
            }
            (Location::Ssh(a, s), Location::Ssh(b, d)) if a == b => self.copy_on_host(&a, &s, &d).await?,
            (Location::Local(s), Location::Rclone(d)) => self.rclone(&expand_local(&s), &d).await?,
            (Location::Rclone(s), Location::Local(d)) => self.rclone(&s, &expand_local(&d)).await?,
            (Location::Rclone(s), Location::Rclone(d)) => self.rclone(&s, &d).await?,
            _ => {
                return Err(AppError::not_implemented(format!(
                    "Direct transfer {} -> {} is not supported; stage it through a local path",
                    source.describe(),
                    dest.describe()
                )))
            }
        };
        info!(
            source = %source.describe(),
            dest = %dest.describe(),
            success = outcome.success,
            bytes = outcome.bytes_transferred,
            "transfer finished"
        );
        Ok(outcome)
    }
}
