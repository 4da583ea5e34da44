//! `wait` steps
//!
//! Every condition is a polling loop bounded by the step timeout. Only the
//! remote `file=` check distinguishes SSH failures (retried with backoff, up
//! to a limit); for the others a failed probe just means "not yet".

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::recipe::execution::Executor;
use crate::recipe::idle::{backoff_delay, detect_idle, idle_interval, IdleProbe, PaneProbe};
use crate::recipe::run_logs::LogStream;
use crate::recipe::types::{StepResult, WaitCondition, WaitStep, WindowInfo};
use crate::ssh::{is_local_spec, SshSpec};
use crate::tmux::{shell_path, TmuxClient, TMUX_CALL_TIMEOUT};
use crate::transfer::expand_local;

const LONG_WAIT: Duration = Duration::from_secs(3600);
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CAPTURE_LINES: i64 = 2000;

impl Executor {
    pub(crate) async fn run_wait(&mut self, step: &WaitStep) -> Result<StepResult, AppError> {
        let cfg = &self.config.executor;
        let timeout = Duration::from_secs(step.timeout_secs.unwrap_or(cfg.default_wait_timeout_secs));
        let poll = Duration::from_secs(step.poll_secs.unwrap_or(cfg.wait_poll_secs).max(1));
        if timeout > LONG_WAIT {
            let notice = format!(
                "Waiting up to {}h on @{}; if this terminal disconnects, resume the job to pick up here",
                timeout.as_secs() / 3600,
                step.target
            );
            info!("{notice}");
            self.emit(LogStream::System, &notice).await;
        }

        match &step.condition {
            WaitCondition::File(path) => self.wait_file(&step.target, path, timeout, poll).await,
            WaitCondition::Port(port) => self.wait_port(&step.target, *port, timeout, poll).await,
            WaitCondition::Idle => {
                let Some(window) = self.window(&step.target) else {
                    return Ok(unknown_window(&step.target));
                };
                if self.wait_idle(&window, timeout, poll).await? {
                    Ok(StepResult::success(format!("{} is idle", window.name)))
                } else {
                    Ok(StepResult::timeout(format!(
                        "{} still busy after {}s",
                        window.name,
                        timeout.as_secs()
                    )))
                }
            }
            WaitCondition::Pattern => {
                let Some(window) = self.window(&step.target) else {
                    return Ok(unknown_window(&step.target));
                };
                let pattern = step.pattern.as_deref().unwrap_or_default();
                self.wait_pattern(&window, pattern, timeout, poll).await
            }
        }
    }

    fn window(&self, alias: &str) -> Option<WindowInfo> {
        self.ctx.windows.get(alias).filter(|w| !w.remote_session.is_empty()).cloned()
    }

    /// Host spec of a window, or of a host alias.
    async fn wait_host(&self, alias: &str) -> Result<String, AppError> {
        match self.ctx.windows.get(alias) {
            Some(window) => Ok(window.host.clone()),
            None => self.resolve_host(alias).await,
        }
    }

    /// Idle probe for `window`. Remote windows read recent output from their
    /// bridge pane when there is one; local windows always use their own pane.
    pub(crate) fn idle_probe(&mut self, window: &WindowInfo) -> Result<PaneProbe, AppError> {
        let client = self.clients.get(&window.host)?;
        let remote = !client.is_local();
        let mut probe = PaneProbe::new(client, &window.remote_session);
        if remote {
            if let Some(pane) = self.bridge.get_pane(&window.name) {
                probe = probe.with_output(self.clients.local(), &pane.pane_id);
            }
        }
        Ok(probe)
    }

    /// Block until `window` is confirmed idle; `false` on timeout.
    pub(crate) async fn wait_idle(&mut self, window: &WindowInfo, timeout: Duration, poll: Duration) -> Result<bool, AppError> {
        let probe = self.idle_probe(window)?;
        let confirm = self.config.executor.idle_confirm_count;
        let interval = idle_interval(
            timeout,
            confirm,
            Duration::from_secs(self.config.executor.idle_max_interval_secs),
        );
        let started = Instant::now();
        let mut streak = 0;
        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if detect_idle(&probe, &mut streak, confirm, interval, poll.min(remaining)).await {
                return Ok(true);
            }
            if streak == 0 {
                self.log_busy(window, &probe, started.elapsed(), timeout).await;
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
        }
    }

    async fn log_busy(&self, window: &WindowInfo, probe: &dyn IdleProbe, elapsed: Duration, timeout: Duration) {
        let status = probe.status().await;
        let remaining = timeout.saturating_sub(elapsed);
        info!(
            window = %window.name,
            elapsed_secs = elapsed.as_secs(),
            remaining_secs = remaining.as_secs(),
            command = %status.command,
            "still running"
        );
        let mut lines = vec![format!(
            "{} busy: {}s elapsed, {}s left, running {}",
            window.name,
            elapsed.as_secs(),
            remaining.as_secs(),
            if status.command.is_empty() { "?" } else { status.command.as_str() }
        )];
        lines.extend(status.process_tree.iter().map(|l| format!("  {l}")));
        lines.extend(status.recent_output.iter().map(|l| format!("  | {l}")));
        for line in &lines[1..] {
            info!(window = %window.name, "{line}");
        }
        self.emit(LogStream::Progress, &lines.join("\n")).await;
    }

    async fn wait_file(&mut self, target: &str, path: &str, timeout: Duration, poll: Duration) -> Result<StepResult, AppError> {
        let host = self.wait_host(target).await?;
        let client = self.clients.get(&host)?;
        let cfg = self.config.executor.clone();
        let base = Duration::from_secs(cfg.ssh_retry_base_secs);
        let max = Duration::from_secs(cfg.ssh_retry_max_secs);
        let started = Instant::now();
        let mut failures = 0u32;
        loop {
            match file_exists(client.as_ref(), path).await {
                Ok(true) => return Ok(StepResult::success(format!("{path} exists on {target}"))),
                Ok(false) => failures = 0,
                Err(e) if e.is_transport() => {
                    failures += 1;
                    if failures >= cfg.ssh_max_retries {
                        return Ok(StepResult::failure(format!(
                            "Giving up on {path}: {failures} consecutive SSH failures ({})",
                            e.message
                        )));
                    }
                    let delay = backoff_delay(base, max, failures);
                    warn!(target, failures, delay_secs = delay.as_secs(), error = %e, "SSH check failed; backing off");
                    tokio::time::sleep(delay.min(timeout.saturating_sub(started.elapsed()))).await;
                    if started.elapsed() >= timeout {
                        return Ok(file_timeout(path, timeout));
                    }
                    continue;
                }
                Err(e) => {
                    debug!(target, error = %e, "file check failed");
                    failures = 0;
                }
            }
            if started.elapsed() >= timeout {
                return Ok(file_timeout(path, timeout));
            }
            debug!(target, path, elapsed_secs = started.elapsed().as_secs(), "file not there yet");
            tokio::time::sleep(poll.min(timeout.saturating_sub(started.elapsed()))).await;
        }
    }

    async fn wait_port(&mut self, target: &str, port: u16, timeout: Duration, poll: Duration) -> Result<StepResult, AppError> {
        let spec = self.wait_host(target).await?;
        let hostname = if is_local_spec(&spec) {
            "127.0.0.1".to_string()
        } else {
            SshSpec::parse(&spec)?.host
        };
        let started = Instant::now();
        loop {
            let probe = tokio::time::timeout(PORT_PROBE_TIMEOUT, TcpStream::connect((hostname.as_str(), port))).await;
            if let Ok(Ok(_)) = probe {
                return Ok(StepResult::success(format!("{hostname}:{port} is open")));
            }
            if started.elapsed() >= timeout {
                return Ok(StepResult::timeout(format!(
                    "{hostname}:{port} not open after {}s",
                    timeout.as_secs()
                )));
            }
            debug!(host = %hostname, port, "port not open yet");
            tokio::time::sleep(poll.min(timeout.saturating_sub(started.elapsed()))).await;
        }
    }

    async fn wait_pattern(&mut self, window: &WindowInfo, pattern: &str, timeout: Duration, poll: Duration) -> Result<StepResult, AppError> {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return Ok(StepResult::failure(format!("Invalid pattern '{pattern}': {e}"))),
        };
        let client: Arc<dyn TmuxClient> = self.clients.get(&window.host)?;
        let started = Instant::now();
        loop {
            match client.capture_pane(&window.remote_session, Some(-CAPTURE_LINES), None).await {
                Ok(text) => {
                    if let Some(m) = re.find(&text) {
                        return Ok(StepResult::success(format!("Matched '{}' in {}", m.as_str(), window.name)));
                    }
                }
                Err(e) => debug!(window = %window.name, error = %e, "capture failed"),
            }
            if started.elapsed() >= timeout {
                return Ok(StepResult::timeout(format!(
                    "pattern '{pattern}' not seen in {} after {}s",
                    window.name,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(poll.min(timeout.saturating_sub(started.elapsed()))).await;
        }
    }
}

async fn file_exists(client: &dyn TmuxClient, path: &str) -> Result<bool, AppError> {
    if client.is_local() {
        let meta = tokio::fs::metadata(expand_local(path)).await;
        return Ok(meta.map(|m| m.is_file()).unwrap_or(false));
    }
    let out = client
        .shell(&format!("test -f {}", shell_path(path)), TMUX_CALL_TIMEOUT)
        .await?;
    Ok(out.success())
}

fn file_timeout(path: &str, timeout: Duration) -> StepResult {
    StepResult::timeout(format!("{path} did not appear within {}s", timeout.as_secs()))
}

fn unknown_window(alias: &str) -> StepResult {
    StepResult::failure(format!("Unknown window: @{alias}"))
}
