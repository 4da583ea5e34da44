//! `src -> dst` transfer steps
//!
//! An endpoint is a local path or `@name[:path]`, where `name` is a recipe
//! storage, a recipe host, an open window, or (failing those) an entry of the
//! saved host/storage registry.

use tracing::info;

use crate::error::AppError;
use crate::host::{Storage, StorageBackend};
use crate::recipe::execution::Executor;
use crate::recipe::types::{StepResult, TransferStep};
use crate::ssh::is_local_spec;
use crate::transfer::{join_path, Endpoint};

impl Executor {
    pub(crate) async fn run_transfer(&mut self, step: &TransferStep) -> Result<StepResult, AppError> {
        let source = self.resolve_endpoint(&self.interpolate(&step.source)).await?;
        let dest = self.resolve_endpoint(&self.interpolate(&step.dest)).await?;
        info!(source = %source.describe(), dest = %dest.describe(), "transfer");

        let outcome = self.services.transfer.transfer(&source, &dest).await?;
        if outcome.success {
            Ok(StepResult::success(format!(
                "Transferred {} bytes: {} -> {}",
                outcome.bytes_transferred,
                source.describe(),
                dest.describe()
            )))
        } else {
            Ok(StepResult::failure(format!("Transfer failed: {}", outcome.message)))
        }
    }

    pub(crate) async fn resolve_endpoint(&self, text: &str) -> Result<Endpoint, AppError> {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('@') else {
            return Ok(Endpoint::Local { path: text.to_string() });
        };
        let (name, path) = rest.split_once(':').unwrap_or((rest, ""));

        if let Some(spec) = self.recipe.storages.get(name) {
            let storage = Storage::from_spec(name, &self.interpolate(spec))?;
            return self.storage_endpoint(storage, path).await;
        }
        if self.recipe.hosts.contains_key(name) {
            let spec = self.resolve_host(name).await?;
            return Ok(host_endpoint(name, spec, path));
        }
        if let Some(window) = self.ctx.windows.get(name) {
            return Ok(host_endpoint(name, window.host.clone(), path));
        }
        if self.services.registry.load_hosts().await?.contains_key(name) {
            let spec = self.resolve_host(name).await?;
            return Ok(host_endpoint(name, spec, path));
        }
        if let Some(storage) = self.services.registry.load_storages().await?.remove(name) {
            return self.storage_endpoint(storage, path).await;
        }
        Err(AppError::not_found(format!("Unknown host or storage: @{name}")))
    }

    /// Storages that live on a host become plain host endpoints.
    async fn storage_endpoint(&self, storage: Storage, path: &str) -> Result<Endpoint, AppError> {
        if let StorageBackend::SshRemote { host, root_path } = &storage.backend {
            let spec = self.resolve_host(host).await?;
            return Ok(host_endpoint(host, spec, &join_path(root_path, path)));
        }
        Ok(Endpoint::Storage {
            storage,
            path: path.to_string(),
        })
    }
}

fn host_endpoint(alias: &str, spec: String, path: &str) -> Endpoint {
    if is_local_spec(&spec) {
        Endpoint::Local { path: path.to_string() }
    } else {
        Endpoint::Host {
            alias: alias.to_string(),
            spec,
            path: path.to_string(),
        }
    }
}
