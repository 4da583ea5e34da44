//! Recipe System
//!
//! Recipes are line-oriented programs that drive tmux windows on local and
//! remote hosts. A run is checkpointed before every step so that a killed
//! process can be resumed from the step it was in.

pub mod execution;
pub mod idle;
pub mod operations;
pub mod parser;
pub mod run_logs;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::TrainshConfig;
use crate::error::AppError;
use crate::host::FileRegistry;
use crate::notify::ChannelNotifier;
use crate::secrets::FileSecrets;
use crate::transfer::RsyncTransfer;
use crate::vast::{GpuMarketplace, VastClient};

pub use execution::*;
pub use parser::*;
pub use types::*;

// ============================================================
// Loading
// ============================================================

/// Absolute form of `path`, the key checkpoints are stored under.
pub fn canonical_recipe_path(path: &Path) -> Result<PathBuf, AppError> {
    std::fs::canonicalize(path)
        .map_err(|e| AppError::io(format!("Cannot resolve recipe path {}: {e}", path.display())))
}

/// Read and compile a recipe file. The recipe is named after the file stem.
pub async fn load_recipe(path: &Path) -> Result<Recipe, AppError> {
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::io(format!("Failed to read recipe {}: {e}", path.display())))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::invalid_input(format!("Recipe path has no file name: {}", path.display())))?;
    Ok(parse_recipe(&name, &source)?)
}

// ============================================================
// Running
// ============================================================

/// Outcome of [`run_recipe`] / [`resume_recipe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub job_id: String,
    pub success: bool,
}

/// Collaborators backed by the data directory, the Vast API and rsync.
pub fn default_services(config: &TrainshConfig) -> Result<Services, AppError> {
    let marketplace = match VastClient::from_cfg(&config.vast) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn GpuMarketplace>),
        Err(e) => {
            warn!(error = %e, "vast marketplace unavailable");
            None
        }
    };
    Ok(Services {
        secrets: Arc::new(FileSecrets::default()),
        marketplace,
        transfer: Arc::new(RsyncTransfer::default()),
        notifier: Arc::new(ChannelNotifier::new()?),
        registry: Arc::new(FileRegistry::default()),
    })
}

/// Start a fresh job for the recipe at `path`.
pub async fn run_recipe(path: &Path, services: Services, options: ExecutorOptions) -> Result<RunSummary, AppError> {
    let path = canonical_recipe_path(path)?;
    let recipe = load_recipe(&path).await?;
    let mut executor = Executor::new(recipe, &path.to_string_lossy(), services, options)?;
    let success = executor.execute(0).await;
    Ok(RunSummary {
        job_id: executor.job_id().to_string(),
        success,
    })
}

/// Continue the newest unfinished job of the recipe at `path`, starting at
/// the step it was in.
pub async fn resume_recipe(path: &Path, services: Services, options: ExecutorOptions) -> Result<RunSummary, AppError> {
    let path = canonical_recipe_path(path)?;
    let key = path.to_string_lossy().into_owned();
    let state = options
        .store
        .find_resumable(&key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No resumable job for {key}")))?;
    let recipe = load_recipe(&path).await?;
    if recipe.steps.len() != state.total_steps {
        warn!(
            job_id = %state.job_id,
            saved = state.total_steps,
            current = recipe.steps.len(),
            "recipe changed since the checkpoint was written"
        );
    }
    info!(job_id = %state.job_id, step = state.current_step + 1, "resuming job");
    let resume_from = state.current_step;
    let mut executor = Executor::from_checkpoint(recipe, &key, &state, services, options)?;
    let success = executor.execute(resume_from).await;
    Ok(RunSummary {
        job_id: executor.job_id().to_string(),
        success,
    })
}
