//! Recipe step executor
//!
//! Walks a parsed recipe one step at a time. A checkpoint is written before
//! every step, so an interrupted run resumes *at* the step that was running
//! (at-least-once). The first failing step stops the run and is recorded as
//! the resume point.
//!
//! Step handlers live in `operations`; this module owns the run loop, the
//! runtime context and resume reconstruction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use super::parser::interpolate;
use super::run_logs::{default_logs_dir, ExecutionLog, LogStream};
use super::types::{ControlCommand, ControlStep, Recipe, Step, StepKind, StepResult, WindowInfo};
use crate::config::{ProcessEnv, TrainshConfig};
use crate::error::AppError;
use crate::host::HostRegistry;
use crate::job::{new_job_id, JobState, JobStateStore, JobStatus};
use crate::notify::Notifier;
use crate::secrets::SecretsManager;
use crate::ssh::{is_local_spec, LOCAL_HOST};
use crate::tmux::{BridgeManager, BridgeOptions, LocalTmuxClient, RemoteTmuxClient, SessionNamer, TmuxClient};
use crate::transfer::TransferEngine;
use crate::vast::GpuMarketplace;

pub const VAR_VAST_ID: &str = "VAST_ID";
pub const VAR_VAST_START_TIME: &str = "VAST_START_TIME";

// ============================================================
// Collaborators
// ============================================================

/// Everything the engine talks to but does not implement itself.
#[derive(Clone)]
pub struct Services {
    pub secrets: Arc<dyn SecretsManager>,
    /// `None` when no marketplace account is configured
    pub marketplace: Option<Arc<dyn GpuMarketplace>>,
    pub transfer: Arc<dyn TransferEngine>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<dyn HostRegistry>,
}

pub type RemoteClientFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn TmuxClient>, AppError> + Send + Sync>;

pub fn ssh_client_factory() -> RemoteClientFactory {
    Arc::new(|spec: &str| Ok(Arc::new(RemoteTmuxClient::new(spec)?) as Arc<dyn TmuxClient>))
}

/// One client per host spec, created on first use.
pub struct SessionClients {
    local: Arc<dyn TmuxClient>,
    remote: HashMap<String, Arc<dyn TmuxClient>>,
    factory: RemoteClientFactory,
}

impl SessionClients {
    pub fn new(local: Arc<dyn TmuxClient>, factory: RemoteClientFactory) -> Self {
        Self {
            local,
            remote: HashMap::new(),
            factory,
        }
    }

    pub fn local(&self) -> Arc<dyn TmuxClient> {
        self.local.clone()
    }

    pub fn get(&mut self, host: &str) -> Result<Arc<dyn TmuxClient>, AppError> {
        let host = host.trim();
        if is_local_spec(host) {
            return Ok(self.local.clone());
        }
        if let Some(client) = self.remote.get(host) {
            return Ok(client.clone());
        }
        let client = (self.factory)(host)?;
        self.remote.insert(host.to_string(), client.clone());
        Ok(client)
    }
}

/// Process-level settings for an [`Executor`].
pub struct ExecutorOptions {
    pub config: TrainshConfig,
    pub store: JobStateStore,
    pub logs_dir: PathBuf,
    pub env: ProcessEnv,
    pub local: Arc<dyn TmuxClient>,
    pub remote_factory: RemoteClientFactory,
}

impl ExecutorOptions {
    pub fn new(config: TrainshConfig) -> Self {
        Self {
            config,
            store: JobStateStore::default(),
            logs_dir: default_logs_dir(),
            env: ProcessEnv::from_env(),
            local: Arc::new(LocalTmuxClient::new()),
            remote_factory: ssh_client_factory(),
        }
    }
}

fn bridge_options(config: &TrainshConfig, env: &ProcessEnv, restore_session: Option<String>) -> BridgeOptions {
    BridgeOptions {
        enabled: config.tmux.auto_bridge,
        allow_detached: config.tmux.bridge_outside_tmux,
        current_pane: env.tmux_pane.clone(),
        restore_session,
        status: config.tmux.bridge_status,
    }
}

// ============================================================
// Executor
// ============================================================

/// Runtime state of one run.
pub struct ExecutionContext {
    pub job_id: String,
    pub variables: HashMap<String, String>,
    pub windows: HashMap<String, WindowInfo>,
    /// Owns `nextWindowIndex`
    pub namer: SessionNamer,
    pub start_time: Instant,
}

pub struct Executor {
    pub(crate) recipe: Recipe,
    recipe_path: String,
    pub(crate) ctx: ExecutionContext,
    pub(crate) config: TrainshConfig,
    pub(crate) services: Services,
    pub(crate) clients: SessionClients,
    pub(crate) bridge: BridgeManager,
    store: JobStateStore,
    log: ExecutionLog,
    env: ProcessEnv,
    /// Set while the step interrupted by a previous process is re-run.
    pub(crate) resuming: bool,
    current_step: Option<usize>,
    created_at: String,
}

impl Executor {
    /// Fresh job. The job id comes from the environment when a wrapping
    /// invocation handed one down, otherwise a new one is generated.
    pub fn new(recipe: Recipe, recipe_path: &str, services: Services, options: ExecutorOptions) -> Result<Self, AppError> {
        let job_id = options.env.job_id.clone().unwrap_or_else(new_job_id);
        let log = ExecutionLog::new(&options.logs_dir, &job_id)?;
        let namer = SessionNamer::new(&recipe.name, &job_id, options.env.window_index.unwrap_or(0));
        let bridge = BridgeManager::new(options.local.clone(), bridge_options(&options.config, &options.env, None));
        let ctx = ExecutionContext {
            job_id,
            variables: recipe.variables.clone(),
            windows: HashMap::new(),
            namer,
            start_time: Instant::now(),
        };
        Ok(Self {
            recipe,
            recipe_path: recipe_path.to_string(),
            ctx,
            config: options.config,
            services,
            clients: SessionClients::new(options.local, options.remote_factory),
            bridge,
            store: options.store,
            log,
            env: options.env,
            resuming: false,
            current_step: None,
            created_at: String::new(),
        })
    }

    /// Continue the job recorded in `state`.
    pub fn from_checkpoint(
        recipe: Recipe,
        recipe_path: &str,
        state: &JobState,
        services: Services,
        mut options: ExecutorOptions,
    ) -> Result<Self, AppError> {
        options.env.job_id = Some(state.job_id.clone());
        let mut executor = Self::new(recipe, recipe_path, services, options)?;
        executor.restore(state);
        Ok(executor)
    }

    pub fn job_id(&self) -> &str {
        &self.ctx.job_id
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    fn restore(&mut self, state: &JobState) {
        for (k, v) in &state.variables {
            self.ctx.variables.insert(k.clone(), v.clone());
        }
        for (k, v) in &state.hosts {
            self.recipe.hosts.insert(k.clone(), v.clone());
        }

        let mut highest: Option<u32> = None;
        for (alias, session) in &state.window_sessions {
            let host = state
                .window_hosts
                .get(alias)
                .or_else(|| state.hosts.get(alias))
                .cloned()
                .unwrap_or_else(|| LOCAL_HOST.to_string());
            highest = highest.max(self.ctx.namer.index_of(session));
            self.ctx.windows.insert(
                alias.clone(),
                WindowInfo {
                    name: alias.clone(),
                    host,
                    remote_session: session.clone(),
                },
            );
        }
        highest = highest.max(self.ctx.namer.index_of(&state.bridge_session));

        let mut next = state.next_window_index.max(self.ctx.windows.len() as u32);
        if let Some(index) = highest {
            next = next.max(index.saturating_add(1));
        }
        if let Some(index) = self.env.window_index {
            next = next.max(index);
        }
        self.ctx.namer.raise_to(next);

        let restore_session = Some(state.bridge_session.clone()).filter(|s| !s.trim().is_empty());
        self.bridge = BridgeManager::new(
            self.clients.local(),
            bridge_options(&self.config, &self.env, restore_session),
        );
        self.created_at = state.created_at.clone();
        self.resuming = true;
        info!(
            job_id = %self.ctx.job_id,
            windows = self.ctx.windows.len(),
            next_window_index = self.ctx.namer.next_index(),
            "restored job state"
        );
    }

    pub(crate) fn interpolate(&self, text: &str) -> String {
        interpolate(text, &self.ctx.variables)
    }

    /// Append to the job's execution log; failures only warn.
    pub(crate) async fn emit(&self, stream: LogStream, message: &str) {
        if let Err(e) = self.log.write(stream, self.current_step, message).await {
            warn!(error = %e, "failed to append execution log");
        }
    }

    /// Ask the bridge to mirror `window`. Bridge problems never fail a step.
    pub(crate) async fn connect_bridge(&mut self, window: &WindowInfo) {
        if !self.bridge.is_enabled() || window.remote_session.is_empty() {
            return;
        }
        let client = match self.clients.get(&window.host) {
            Ok(c) => c,
            Err(e) => {
                warn!(window = %window.name, error = %e, "cannot bridge window");
                return;
            }
        };
        let attach = client.build_attach_command(&window.remote_session, self.bridge.status_mode());
        if let Err(e) = self.bridge.connect(&window.name, &attach, &mut self.ctx.namer).await {
            warn!(window = %window.name, error = %e, "bridge pane unavailable");
        }
    }

    async fn reconnect_bridges(&mut self) {
        let mut windows: Vec<WindowInfo> = self.ctx.windows.values().cloned().collect();
        windows.sort_by_key(|w| (self.ctx.namer.index_of(&w.remote_session), w.name.clone()));
        for window in windows {
            self.connect_bridge(&window).await;
        }
    }

    async fn checkpoint(&self, step: usize, status: JobStatus) -> Result<(), AppError> {
        let mut state = JobState::new(&self.ctx.job_id, &self.recipe_path, &self.recipe.name, self.recipe.steps.len());
        state.current_step = step;
        state.status = status;
        state.variables = self.ctx.variables.clone();
        state.hosts = self.recipe.hosts.clone();
        for (alias, window) in &self.ctx.windows {
            if !window.remote_session.is_empty() {
                state.window_sessions.insert(alias.clone(), window.remote_session.clone());
            }
            state.window_hosts.insert(alias.clone(), window.host.clone());
        }
        state.next_window_index = self.ctx.namer.next_index();
        state.bridge_session = self.bridge.get_state_session();
        state.vast_instance_id = self.ctx.variables.get(VAR_VAST_ID).cloned().unwrap_or_default();
        state.vast_start_time = self.ctx.variables.get(VAR_VAST_START_TIME).cloned().unwrap_or_default();
        if !self.created_at.is_empty() {
            state.created_at = self.created_at.clone();
        }
        self.store.save(&mut state).await
    }

    /// Run every step from `resume_from` on. Returns overall success.
    pub async fn execute(&mut self, resume_from: usize) -> bool {
        let total = self.recipe.steps.len();
        self.ctx.start_time = Instant::now();
        if self.created_at.is_empty() {
            self.created_at = crate::job::now_timestamp();
        }
        info!(job_id = %self.ctx.job_id, recipe = %self.recipe.name, total, resume_from, "starting recipe");
        self.emit(
            LogStream::System,
            &format!("Job {} running {} ({total} steps)", self.ctx.job_id, self.recipe.name),
        )
        .await;

        if self.resuming && !self.ctx.windows.is_empty() {
            self.reconnect_bridges().await;
        }

        for index in 0..total {
            let step = self.recipe.steps[index].clone();
            self.current_step = Some(index);
            if index < resume_from {
                info!(step = index + 1, total, "skipping (already done)");
                self.emit(LogStream::Progress, &format!("Step {}/{total} skipped: {}", index + 1, step.raw))
                    .await;
                continue;
            }

            info!(step = index + 1, total, "{}", crate::secrets::redact_secret_refs(&step.raw));
            self.emit(LogStream::Progress, &format!("Step {}/{total}: {}", index + 1, step.raw)).await;

            if let Err(e) = self.checkpoint(index, JobStatus::Running).await {
                error!(step = index + 1, error = %e, "cannot write checkpoint; stopping");
                return false;
            }

            let started = Instant::now();
            let result = match self.dispatch(&step).await {
                Ok(result) => result,
                Err(e) => {
                    error!(step = index + 1, code = e.code, error = %e.message, kind = step.kind.label(), "step raised an error");
                    StepResult::failure(format!("{} ({})", e.message, e.code))
                }
            };
            self.resuming = false;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if result.ok {
                info!(step = index + 1, total, elapsed_ms, "{}", result.message);
                self.emit(LogStream::Progress, &format!("Step {} done in {elapsed_ms} ms: {}", index + 1, result.message))
                    .await;
                continue;
            }

            error!(step = index + 1, total, elapsed_ms, "step failed: {}", result.message);
            self.emit(LogStream::Stderr, &format!("Step {} failed: {}", index + 1, result.message)).await;
            if let Err(e) = self.checkpoint(index, JobStatus::Failed).await {
                error!(step = index + 1, error = %e, "cannot write failure checkpoint");
            }
            return false;
        }

        self.current_step = None;
        if let Err(e) = self.checkpoint(total, JobStatus::Completed).await {
            error!(error = %e, "cannot mark job completed");
            return false;
        }
        let elapsed = self.ctx.start_time.elapsed().as_secs();
        info!(job_id = %self.ctx.job_id, elapsed_secs = elapsed, "recipe completed");
        self.emit(LogStream::System, &format!("Completed in {elapsed}s")).await;
        true
    }

    async fn dispatch(&mut self, step: &Step) -> Result<StepResult, AppError> {
        match &step.kind {
            StepKind::Control(control) => self.run_control(control).await,
            StepKind::Execute(exec) => self.run_execute(exec).await,
            StepKind::Transfer(transfer) => self.run_transfer(transfer).await,
            StepKind::Wait(wait) => self.run_wait(wait).await,
        }
    }

    async fn run_control(&mut self, step: &ControlStep) -> Result<StepResult, AppError> {
        let args: Vec<String> = step.args.iter().map(|a| self.interpolate(a)).collect();
        match step.command {
            ControlCommand::TmuxOpen => self.tmux_open(&args).await,
            ControlCommand::TmuxClose => self.tmux_close(&args).await,
            ControlCommand::TmuxConfig => self.tmux_config(&args).await,
            ControlCommand::Notify => self.notify(&args).await,
            ControlCommand::Sleep => self.sleep(&args).await,
            ControlCommand::VastPick => self.vast_pick(&args).await,
            ControlCommand::VastStart => self.vast_start(&args).await,
            ControlCommand::VastStop => self.vast_stop(&args).await,
            ControlCommand::VastWait => self.vast_wait(&args).await,
            ControlCommand::VastCost => self.vast_cost(&args).await,
        }
    }

    /// Host spec for an alias: recipe hosts, then the saved registry, else
    /// the text itself. `vast:<id>` is looked up on the marketplace.
    pub(crate) async fn resolve_host(&self, name: &str) -> Result<String, AppError> {
        let name = name.trim().trim_start_matches('@');
        let spec = match self.recipe.hosts.get(name) {
            Some(spec) => spec.clone(),
            None => match self.services.registry.load_hosts().await?.get(name) {
                Some(host) => host.spec_string()?,
                None => name.to_string(),
            },
        };
        let spec = self.interpolate(&spec);
        if let Some(id) = spec.strip_prefix("vast:") {
            return self.vast_ssh_spec(id).await;
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parser::parse_recipe;
    use crate::testing::Harness;
    use crate::tmux::fake::{exit, ok};
    use crate::tmux::get_window_session_name;

    const E2E: &str = "var M=x\nhost g=local\ntmux.open @g as w\n@w > echo $M\nwait @w idle timeout=10\ntmux.close @w\n";

    fn idle_local(h: &Harness) {
        h.local.respond("has-session", exit(1, "can't find session"));
        h.local.respond("display-message", ok("bash\t100\n"));
        h.local.on_shell(|_| Ok(ok("0\n")));
    }

    #[tokio::test]
    async fn runs_open_execute_wait_close() {
        crate::logs::init_test_tracing();
        let h = Harness::new();
        idle_local(&h);
        let mut ex = h.executor(E2E, h.config());
        let job = ex.job_id().to_string();

        assert!(ex.execute(0).await);

        let session = get_window_session_name("e2e", &job, 0);
        let created = h.local.calls_to("new-session");
        assert_eq!(created, vec![vec!["new-session", "-d", "-s", session.as_str()]]);
        let sent = h.local.calls_to("send-keys");
        assert_eq!(sent[0][2], session);
        assert!(sent[0][4].starts_with("echo x\ntmux wait-for -S trainsh_"));
        assert_eq!(h.local.calls_to("wait-for").len(), 1);
        assert_eq!(h.local.calls_to("kill-session")[0][2], format!("={session}"));

        let state = h.store().load(&job).await.unwrap().unwrap();
        assert_eq!(state.status, JobStatus::Completed);
        assert_eq!(state.current_step, 4);
        assert!(h.store().find_resumable(&h.recipe_path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failure_checkpoint_points_at_failing_step_and_resume_reruns_it() {
        let h = Harness::new();
        let src = "host g = root@gpu\nnotify hello\n@g > nvidia-smi\nnotify bye\n";
        let mut ex = h.executor(src, h.config());
        let job = ex.job_id().to_string();

        assert!(!ex.execute(0).await);
        let state = h.store().load(&job).await.unwrap().unwrap();
        assert_eq!(state.status, JobStatus::Failed);
        assert_eq!(state.current_step, 1);
        assert_eq!(h.notifier.sent().len(), 1);

        let found = h.store().find_resumable(&h.recipe_path()).await.unwrap().unwrap();
        assert_eq!(found.job_id, job);

        let mut cfg = h.config();
        cfg.executor.allow_host_execute = true;
        h.remote.on_shell(|_| Ok(ok("GPU 0: H100\n")));
        let mut resumed = h.resumed_executor(src, &found, cfg);
        assert!(resumed.execute(found.current_step).await);

        assert_eq!(h.remote.shell_calls(), vec!["nvidia-smi".to_string()]);
        let messages: Vec<String> = h.notifier.sent().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["hello", "bye"]);
        let done = h.store().load(&job).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn host_execute_never_creates_a_session() {
        let h = Harness::new();
        h.remote.on_shell(|_| Ok(ok("ok\n")));
        let mut cfg = h.config();
        cfg.executor.allow_host_execute = true;
        let mut ex = h.executor("host g = root@gpu\n@g > python -V\n", cfg);

        assert!(ex.execute(0).await);
        assert_eq!(h.remote.shell_calls(), vec!["python -V".to_string()]);
        assert!(h.remote.calls_to("new-session").is_empty());
        assert!(h.local.tmux_calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_window_fails_without_host_execute() {
        let h = Harness::new();
        let mut ex = h.executor("@w > ls\n", h.config());
        assert!(!ex.execute(0).await);
        assert!(h.remote.shell_calls().is_empty());
        assert!(h.local.shell_calls().is_empty());
    }

    #[tokio::test]
    async fn restore_rebuilds_windows_and_window_index() {
        let h = Harness::new();
        let recipe = parse_recipe("e2e", E2E).unwrap();
        let mut state = JobState::new("abcdef1234", &h.recipe_path(), "e2e", recipe.steps.len());
        state.current_step = 2;
        state.next_window_index = 2;
        state.window_sessions.insert("w".into(), get_window_session_name("e2e", "abcdef1234", 4));
        state.window_hosts.insert("w".into(), "root@gpu".into());
        state.variables.insert("M".into(), "y".into());

        let ex = h.resumed_executor(E2E, &state, h.config());
        assert_eq!(ex.job_id(), "abcdef1234");
        assert_eq!(ex.context().namer.next_index(), 5);
        assert_eq!(ex.context().variables["M"], "y");
        let w = &ex.context().windows["w"];
        assert_eq!(w.host, "root@gpu");
        assert_eq!(w.remote_session, "train_e2e_abcdef12_4");
        assert!(ex.resuming);
    }

    #[tokio::test]
    async fn resumed_foreground_command_waits_for_idle_instead_of_resending() {
        let h = Harness::new();
        let src = "host g = root@gpu\ntmux.open @g as w\n@w > python train.py\n";
        let recipe = parse_recipe("e2e", src).unwrap();
        let mut state = JobState::new("feedbeef00", &h.recipe_path(), "e2e", recipe.steps.len());
        state.current_step = 1;
        state.window_sessions.insert("w".into(), get_window_session_name("e2e", "feedbeef00", 0));
        state.window_hosts.insert("w".into(), "root@gpu".into());

        h.remote.queue("display-message", Ok(ok("python\t77\n")));
        h.remote.respond("display-message", ok("bash\t77\n"));
        h.remote.on_shell(|_| Ok(ok("0\n")));
        let mut ex = h.resumed_executor(src, &state, h.config());

        assert!(ex.execute(1).await);
        assert!(h.remote.calls_to("send-keys").is_empty());
        assert!(h.remote.calls_to("wait-for").is_empty());
        assert!(h.remote.calls_to("new-session").is_empty());
    }

    #[tokio::test]
    async fn detached_bridge_session_is_persisted() {
        let h = Harness::new();
        h.local.respond("has-session", exit(1, "can't find session"));
        h.local.respond("list-panes", ok("%3\t\tsh\t900\n"));
        let mut cfg = h.config();
        cfg.tmux.auto_bridge = true;
        cfg.tmux.bridge_outside_tmux = true;
        let mut ex = h.executor("host g = root@gpu\ntmux.open @g as w\nnotify opened\n", cfg);
        let job = ex.job_id().to_string();

        assert!(ex.execute(0).await);
        let state = h.store().load(&job).await.unwrap().unwrap();
        assert_eq!(state.window_sessions["w"], get_window_session_name("e2e", &job, 0));
        assert_eq!(state.bridge_session, get_window_session_name("e2e", &job, 1));
        assert_eq!(state.next_window_index, 2);
        let titled = h.local.calls_to("select-pane");
        assert_eq!(titled[0], vec!["select-pane", "-t", "%3", "-T", "train:w"]);
    }

    #[tokio::test]
    async fn resume_reattaches_existing_bridge_panes() {
        let h = Harness::new();
        let src = "host g = root@gpu\ntmux.open @g as a\ntmux.open @g as b\nnotify done\n";
        let recipe = parse_recipe("e2e", src).unwrap();
        let bridge_session = get_window_session_name("e2e", "feedbeef00", 2);
        let mut state = JobState::new("feedbeef00", &h.recipe_path(), "e2e", recipe.steps.len());
        state.current_step = 2;
        for (idx, alias) in ["a", "b"].iter().enumerate() {
            state.window_sessions.insert(alias.to_string(), get_window_session_name("e2e", "feedbeef00", idx as u32));
            state.window_hosts.insert(alias.to_string(), "root@gpu".into());
        }
        state.next_window_index = 3;
        state.bridge_session = bridge_session.clone();

        h.local.respond("list-panes", ok("%5\ttrain:a\tssh\t1\n%6\ttrain:b\tssh\t2\n"));
        let mut cfg = h.config();
        cfg.tmux.auto_bridge = true;
        cfg.tmux.bridge_outside_tmux = true;
        let mut ex = h.resumed_executor(src, &state, cfg);

        assert!(ex.execute(2).await);
        assert_eq!(ex.bridge.get_pane("a").map(|p| p.pane_id.as_str()), Some("%5"));
        assert_eq!(ex.bridge.get_pane("b").map(|p| p.pane_id.as_str()), Some("%6"));
        assert!(h.local.calls_to("new-session").is_empty());
        assert!(h.local.calls_to("split-window").is_empty());
        assert!(h.remote.calls_to("new-session").is_empty());
        assert!(h
            .local
            .calls_to("has-session")
            .iter()
            .all(|c| c.iter().any(|a| a.contains(&bridge_session))));

        let saved = h.store().load("feedbeef00").await.unwrap().unwrap();
        assert_eq!(saved.bridge_session, bridge_session);
        assert_eq!(saved.next_window_index, 3);
        assert_eq!(h.notifier.sent().len(), 1);
    }
}
