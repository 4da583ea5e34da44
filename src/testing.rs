//! In-memory collaborators and an executor harness shared by unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::config::{ProcessEnv, TrainshConfig};
use crate::error::AppError;
use crate::host::{Host, HostRegistry, Storage};
use crate::job::{JobState, JobStateStore};
use crate::notify::{Notification, Notifier, NotifyOutcome};
use crate::recipe::execution::{Executor, ExecutorOptions, Services};
use crate::recipe::parser::parse_recipe;
use crate::secrets::{SecretsManager, StaticSecrets};
use crate::tmux::fake::FakeTmux;
use crate::tmux::TmuxClient;
use crate::transfer::{Endpoint, TransferEngine, TransferOutcome};
use crate::vast::{GpuMarketplace, OfferFilters, VastInstance, VastOffer};

pub(crate) const RECIPE_NAME: &str = "e2e";

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failure: Mutex<Option<String>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn fail_with(&self, message: &str) {
        if let Ok(mut f) = self.failure.lock() {
            *f = Some(message.to_string());
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<NotifyOutcome, AppError> {
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(AppError::http(message));
        }
        if let Ok(mut s) = self.sent.lock() {
            s.push(notification.clone());
        }
        Ok(NotifyOutcome {
            ok: true,
            summary: format!("sent via {}", notification.channels.join(",")),
        })
    }
}

#[derive(Default)]
pub(crate) struct StaticMarketplace {
    instances: Mutex<Vec<VastInstance>>,
    started: Mutex<Vec<i64>>,
    stopped: Mutex<Vec<i64>>,
}

impl StaticMarketplace {
    pub(crate) fn set(&self, instances: Vec<VastInstance>) {
        if let Ok(mut i) = self.instances.lock() {
            *i = instances;
        }
    }

    pub(crate) fn started(&self) -> Vec<i64> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub(crate) fn stopped(&self) -> Vec<i64> {
        self.stopped.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn set_status(&self, id: i64, status: &str) -> Result<(), AppError> {
        let mut list = self
            .instances
            .lock()
            .map_err(|_| AppError::internal("marketplace state poisoned"))?;
        let inst = list
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::not_found(format!("Instance {id} not found")))?;
        inst.actual_status = Some(status.to_string());
        Ok(())
    }
}

#[async_trait]
impl GpuMarketplace for StaticMarketplace {
    async fn get_instance(&self, id: i64) -> Result<VastInstance, AppError> {
        self.list_instances()
            .await?
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| AppError::not_found(format!("Instance {id} not found")))
    }

    async fn list_instances(&self) -> Result<Vec<VastInstance>, AppError> {
        Ok(self.instances.lock().map(|i| i.clone()).unwrap_or_default())
    }

    async fn start_instance(&self, id: i64) -> Result<(), AppError> {
        self.set_status(id, "running")?;
        if let Ok(mut s) = self.started.lock() {
            s.push(id);
        }
        Ok(())
    }

    async fn stop_instance(&self, id: i64) -> Result<(), AppError> {
        self.set_status(id, "stopped")?;
        if let Ok(mut s) = self.stopped.lock() {
            s.push(id);
        }
        Ok(())
    }

    async fn search_offers(&self, _filters: OfferFilters) -> Result<Vec<VastOffer>, AppError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub(crate) struct StaticTransfer {
    calls: Mutex<Vec<(Endpoint, Endpoint)>>,
    failure: Mutex<Option<String>>,
}

impl StaticTransfer {
    pub(crate) fn calls(&self) -> Vec<(Endpoint, Endpoint)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub(crate) fn fail_with(&self, message: &str) {
        if let Ok(mut f) = self.failure.lock() {
            *f = Some(message.to_string());
        }
    }
}

#[async_trait]
impl TransferEngine for StaticTransfer {
    async fn transfer(&self, source: &Endpoint, dest: &Endpoint) -> Result<TransferOutcome, AppError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push((source.clone(), dest.clone()));
        }
        Ok(match self.failure.lock().ok().and_then(|f| f.clone()) {
            Some(message) => TransferOutcome {
                success: false,
                bytes_transferred: 0,
                message,
            },
            None => TransferOutcome {
                success: true,
                bytes_transferred: 42,
                message: String::new(),
            },
        })
    }
}

#[derive(Default)]
pub(crate) struct StaticRegistry {
    hosts: Mutex<HashMap<String, Host>>,
    storages: Mutex<HashMap<String, Storage>>,
}

impl StaticRegistry {
    pub(crate) fn add_host(&self, host: Host) {
        if let Ok(mut h) = self.hosts.lock() {
            h.insert(host.name.clone(), host);
        }
    }

    pub(crate) fn add_storage(&self, storage: Storage) {
        if let Ok(mut s) = self.storages.lock() {
            s.insert(storage.name.clone(), storage);
        }
    }
}

#[async_trait]
impl HostRegistry for StaticRegistry {
    async fn load_hosts(&self) -> Result<HashMap<String, Host>, AppError> {
        Ok(self.hosts.lock().map(|h| h.clone()).unwrap_or_default())
    }

    async fn load_storages(&self) -> Result<HashMap<String, Storage>, AppError> {
        Ok(self.storages.lock().map(|s| s.clone()).unwrap_or_default())
    }
}

/// Temp data dir, fake tmux clients for `local` and every remote host, and
/// recording collaborators.
pub(crate) struct Harness {
    pub(crate) dir: TempDir,
    pub(crate) local: Arc<FakeTmux>,
    pub(crate) remote: Arc<FakeTmux>,
    pub(crate) notifier: Arc<RecordingNotifier>,
    pub(crate) marketplace: Arc<StaticMarketplace>,
    pub(crate) transfer: Arc<StaticTransfer>,
    pub(crate) registry: Arc<StaticRegistry>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            local: Arc::new(FakeTmux::new("local")),
            remote: Arc::new(FakeTmux::new("root@gpu")),
            notifier: Arc::new(RecordingNotifier::default()),
            marketplace: Arc::new(StaticMarketplace::default()),
            transfer: Arc::new(StaticTransfer::default()),
            registry: Arc::new(StaticRegistry::default()),
        }
    }

    /// Defaults with every delay shortened for tests.
    pub(crate) fn config(&self) -> TrainshConfig {
        let mut cfg = TrainshConfig::default();
        cfg.tmux.auto_bridge = false;
        cfg.executor.idle_max_interval_secs = 0;
        cfg.executor.wait_poll_secs = 1;
        cfg.executor.ssh_retry_base_secs = 0;
        cfg.executor.vast_poll_secs = 0;
        cfg
    }

    pub(crate) fn store(&self) -> JobStateStore {
        JobStateStore::new(self.dir.path().join("jobs"))
    }

    pub(crate) fn recipe_path(&self) -> String {
        self.dir.path().join("e2e.recipe").to_string_lossy().into_owned()
    }

    fn services(&self, secrets: Arc<dyn SecretsManager>) -> Services {
        Services {
            secrets,
            marketplace: Some(self.marketplace.clone()),
            transfer: self.transfer.clone(),
            notifier: self.notifier.clone(),
            registry: self.registry.clone(),
        }
    }

    fn options(&self, config: TrainshConfig, env: ProcessEnv) -> ExecutorOptions {
        let remote = self.remote.clone();
        ExecutorOptions {
            config,
            store: self.store(),
            logs_dir: self.dir.path().join("logs"),
            env,
            local: self.local.clone(),
            remote_factory: Arc::new(move |_spec: &str| Ok(remote.clone() as Arc<dyn TmuxClient>)),
        }
    }

    fn build(&self, source: &str, config: TrainshConfig, env: ProcessEnv, secrets: Arc<dyn SecretsManager>) -> Executor {
        let recipe = parse_recipe(RECIPE_NAME, source).unwrap();
        Executor::new(recipe, &self.recipe_path(), self.services(secrets), self.options(config, env)).unwrap()
    }

    pub(crate) fn executor(&self, source: &str, config: TrainshConfig) -> Executor {
        self.build(source, config, ProcessEnv::default(), Arc::new(StaticSecrets::default()))
    }

    pub(crate) fn executor_in_env(&self, source: &str, config: TrainshConfig, env: ProcessEnv) -> Executor {
        self.build(source, config, env, Arc::new(StaticSecrets::default()))
    }

    pub(crate) fn executor_with_secrets(
        &self,
        source: &str,
        config: TrainshConfig,
        secrets: Arc<dyn SecretsManager>,
    ) -> Executor {
        self.build(source, config, ProcessEnv::default(), secrets)
    }

    pub(crate) fn resumed_executor(&self, source: &str, state: &JobState, config: TrainshConfig) -> Executor {
        let recipe = parse_recipe(RECIPE_NAME, source).unwrap();
        Executor::from_checkpoint(
            recipe,
            &self.recipe_path(),
            state,
            self.services(Arc::new(StaticSecrets::default())),
            self.options(config, ProcessEnv::default()),
        )
        .unwrap()
    }
}
