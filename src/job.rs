//! Resumable job checkpoints.
//!
//! One JSON file per job id under `<data_dir>/jobs/`. Files are replaced
//! atomically so a crash mid-write leaves the previous checkpoint intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::trainsh_data_dir;
use crate::error::AppError;

// ============================================================
// Types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  #[default]
  Running,
  Completed,
  Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct JobState {
  pub job_id: String,
  /// Absolute recipe path; the resume lookup key.
  pub recipe_path: String,
  pub recipe_name: String,
  /// Step about to run, or the step that failed.
  pub current_step: usize,
  pub total_steps: usize,
  pub status: JobStatus,
  pub variables: HashMap<String, String>,
  pub hosts: HashMap<String, String>,
  /// Window alias -> tmux session name.
  pub window_sessions: HashMap<String, String>,
  /// Window alias -> resolved host spec the window was opened on.
  pub window_hosts: HashMap<String, String>,
  pub next_window_index: u32,
  pub bridge_session: String,
  pub vast_instance_id: String,
  pub vast_start_time: String,
  pub created_at: String,
  pub updated_at: String,
}

pub fn now_timestamp() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn new_job_id() -> String {
  Uuid::new_v4().simple().to_string()
}

impl JobState {
  pub fn new(job_id: &str, recipe_path: &str, recipe_name: &str, total_steps: usize) -> Self {
    let now = now_timestamp();
    Self {
      job_id: job_id.to_string(),
      recipe_path: recipe_path.to_string(),
      recipe_name: recipe_name.to_string(),
      total_steps,
      created_at: now.clone(),
      updated_at: now,
      ..Default::default()
    }
  }

  pub fn is_resumable(&self) -> bool {
    self.status != JobStatus::Completed
  }
}

// ============================================================
// Storage
// ============================================================

#[derive(Debug, Clone)]
pub struct JobStateStore {
  dir: PathBuf,
}

impl Default for JobStateStore {
  fn default() -> Self {
    Self::new(trainsh_data_dir().join("jobs"))
  }
}

fn validate_job_id(job_id: &str) -> Result<(), AppError> {
  let ok = !job_id.trim().is_empty() && job_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
  if !ok {
    return Err(AppError::invalid_input(format!("Invalid job id: '{job_id}'")));
  }
  Ok(())
}

impl JobStateStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn job_path(&self, job_id: &str) -> PathBuf {
    self.dir.join(format!("{job_id}.json"))
  }

  /// Write `state`, stamping `updated_at`.
  pub async fn save(&self, state: &mut JobState) -> Result<(), AppError> {
    validate_job_id(&state.job_id)?;
    state.updated_at = now_timestamp();
    if state.created_at.is_empty() {
      state.created_at = state.updated_at.clone();
    }
    tokio::fs::create_dir_all(&self.dir).await?;
    let data = serde_json::to_string_pretty(state)
      .map_err(|e| AppError::io(format!("Failed to serialize job state: {e}")))?;
    let path = self.job_path(&state.job_id);
    let tmp = self.dir.join(format!(".{}.json.tmp", state.job_id));
    tokio::fs::write(&tmp, format!("{data}\n")).await?;
    tokio::fs::rename(&tmp, &path).await?;
    debug!(job_id = %state.job_id, step = state.current_step, status = ?state.status, "checkpoint written");
    Ok(())
  }

  pub async fn load(&self, job_id: &str) -> Result<Option<JobState>, AppError> {
    validate_job_id(job_id)?;
    let path = self.job_path(job_id);
    if !path.exists() {
      return Ok(None);
    }
    let data = tokio::fs::read_to_string(&path).await?;
    let state = serde_json::from_str(&data)
      .map_err(|e| AppError::io(format!("Invalid job state JSON at {}: {e}", path.display())))?;
    Ok(Some(state))
  }

  pub async fn delete(&self, job_id: &str) -> Result<(), AppError> {
    validate_job_id(job_id)?;
    let path = self.job_path(job_id);
    if path.exists() {
      tokio::fs::remove_file(&path).await?;
    }
    Ok(())
  }

  /// All readable checkpoints, most recently updated first.
  pub async fn list(&self) -> Result<Vec<JobState>, AppError> {
    if !self.dir.exists() {
      return Ok(vec![]);
    }
    let mut jobs = vec![];
    let mut entries = tokio::fs::read_dir(&self.dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      let name = entry.file_name().to_string_lossy().to_string();
      if name.starts_with('.') || path.extension().map_or(true, |e| e != "json") {
        continue;
      }
      let data = tokio::fs::read_to_string(&path).await?;
      match serde_json::from_str::<JobState>(&data) {
        Ok(job) => jobs.push(job),
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job state"),
      }
    }
    jobs.sort_by(|a, b| {
      b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| b.created_at.cmp(&a.created_at))
    });
    Ok(jobs)
  }

  /// Most recently updated non-completed job for `recipe_path`.
  pub async fn find_resumable(&self, recipe_path: &str) -> Result<Option<JobState>, AppError> {
    Ok(self
      .list()
      .await?
      .into_iter()
      .find(|j| j.is_resumable() && j.recipe_path == recipe_path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> (tempfile::TempDir, JobStateStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStateStore::new(dir.path().join("jobs"));
    (dir, store)
  }

  #[test]
  fn serializes_with_camel_case_keys() {
    let mut state = JobState::new("abc", "/r/train.recipe", "train", 4);
    state.window_sessions.insert("w".into(), "train_train_abc_0".into());
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["jobId"], "abc");
    assert_eq!(json["recipePath"], "/r/train.recipe");
    assert_eq!(json["windowSessions"]["w"], "train_train_abc_0");
    assert_eq!(json["status"], "running");
    assert_eq!(json["nextWindowIndex"], 0);
  }

  #[tokio::test]
  async fn save_load_delete() {
    let (_tmp, store) = store();
    let mut state = JobState::new("job1", "/r/a.recipe", "a", 3);
    state.current_step = 2;
    store.save(&mut state).await.unwrap();
    let loaded = store.load("job1").await.unwrap().unwrap();
    assert_eq!(loaded, state);
    store.delete("job1").await.unwrap();
    assert!(store.load("job1").await.unwrap().is_none());
    assert!(store.load("../etc").await.is_err());
  }

  #[tokio::test]
  async fn find_resumable_prefers_newest_unfinished() {
    let (_tmp, store) = store();
    let mut old = JobState::new("old", "/r/a.recipe", "a", 3);
    store.save(&mut old).await.unwrap();
    let mut other = JobState::new("other", "/r/b.recipe", "b", 3);
    store.save(&mut other).await.unwrap();
    let mut newer = JobState::new("newer", "/r/a.recipe", "a", 3);
    newer.status = JobStatus::Failed;
    store.save(&mut newer).await.unwrap();
    let mut done = JobState::new("done", "/r/a.recipe", "a", 3);
    done.status = JobStatus::Completed;
    store.save(&mut done).await.unwrap();

    let found = store.find_resumable("/r/a.recipe").await.unwrap().unwrap();
    assert_eq!(found.job_id, "newer");
    assert!(store.find_resumable("/r/c.recipe").await.unwrap().is_none());
    assert_eq!(store.list().await.unwrap().len(), 4);
  }

  #[tokio::test]
  async fn ignores_temp_and_broken_files() {
    let (_tmp, store) = store();
    let mut state = JobState::new("ok", "/r/a.recipe", "a", 1);
    store.save(&mut state).await.unwrap();
    tokio::fs::write(store.dir().join(".x.json.tmp"), "{").await.unwrap();
    tokio::fs::write(store.dir().join("broken.json"), "{").await.unwrap();
    let jobs = store.list().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, "ok");
  }
}
