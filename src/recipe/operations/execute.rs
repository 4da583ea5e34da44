//! `@window > command` steps
//!
//! Foreground commands on a fresh run are followed by `tmux wait-for -S`
//! and the engine blocks on that signal. When a bridge pane mirrors the
//! window the command is typed there instead, followed by a completion
//! marker carrying the exit code. The step interrupted by a previous process
//! is finished by idle detection, since its exit status is gone.

use std::time::{Duration, Instant};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::recipe::execution::Executor;
use crate::recipe::run_logs::LogStream;
use crate::recipe::types::{ExecuteStep, StepResult, WindowInfo};
use crate::recipe::idle::IdleProbe;
use crate::secrets::interpolate_secrets;
use crate::ssh::shell_quote;
use crate::tmux::{TMUX_CALL_TIMEOUT, UNBOUNDED};

const MARKER_PREFIX: &str = "__TRAINSH_DONE_";
const MARKER_POLL: Duration = Duration::from_secs(2);
const MARKER_SCROLLBACK: i64 = 5000;
const OUTPUT_TAIL: usize = 20;

/// Shell line printing the completion marker for `token`.
///
/// The marker text is assembled by `printf`, so the echoed command line
/// itself never contains it.
pub fn marker_trailer(token: &str) -> String {
    format!("printf '__TRAINSH_%s_{token}:%s\\n' DONE \"$?\"")
}

/// Exit code from a `__TRAINSH_DONE_<token>:<rc>` line in captured output.
pub fn find_marker(capture: &str, token: &str) -> Option<i32> {
    let prefix = format!("{MARKER_PREFIX}{token}:");
    capture.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(&prefix)?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}

fn short_token() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

fn limit_of(step: &ExecuteStep) -> Duration {
    if step.timeout_secs == 0 {
        UNBOUNDED
    } else {
        Duration::from_secs(step.timeout_secs)
    }
}

impl Executor {
    pub(crate) async fn run_execute(&mut self, step: &ExecuteStep) -> Result<StepResult, AppError> {
        let display = self.interpolate(&step.command);
        let command = match interpolate_secrets(&display, self.services.secrets.as_ref()) {
            Ok(command) => command,
            Err(e) => return Ok(StepResult::failure(e.message)),
        };
        self.emit(LogStream::Stdout, &format!("@{} > {display}", step.session)).await;

        let window = match self.ctx.windows.get(&step.session).cloned() {
            Some(w) if !w.remote_session.is_empty() => w,
            Some(w) => return self.host_execute(&w.host, &command, step).await,
            None if self.config.executor.allow_host_execute => {
                let host = self.resolve_host(&step.session).await?;
                return self.host_execute(&host, &command, step).await;
            }
            None => {
                return Ok(StepResult::failure(format!(
                    "Unknown window: @{} (open it with tmux.open, or enable executor.allow_host_execute)",
                    step.session
                )))
            }
        };

        let client = self.clients.get(&window.host)?;
        if step.background {
            client.send_keys(&window.remote_session, &command, true, true).await?;
            return Ok(StepResult::success(format!("Started in background on {}", window.name)));
        }
        let limit = limit_of(step);
        if self.resuming {
            return self.finish_interrupted(&window, &command, limit).await;
        }
        if self.config.executor.prefer_bridge_exec {
            if let Some(pane) = self.bridge.get_pane(&window.name).map(|p| p.pane_id.clone()) {
                return self.bridge_execute(&window, &pane, &command, limit).await;
            }
        }

        let signal = format!("trainsh_{}", short_token());
        client
            .send_keys(
                &window.remote_session,
                &format!("{command}\ntmux wait-for -S {signal}"),
                true,
                true,
            )
            .await?;
        match client.wait_for(&signal, limit).await {
            Ok(()) => Ok(StepResult::success(format!("Command finished on {}", window.name))),
            Err(e) if e.is_timeout() => Ok(StepResult::timeout(format!(
                "command on {} still running after {}s",
                window.name,
                limit.as_secs()
            ))),
            Err(e) => Ok(StepResult::failure(format!("Waiting for {signal} failed: {}", e.message))),
        }
    }

    /// Run on the host itself, outside tmux.
    async fn host_execute(&mut self, host: &str, command: &str, step: &ExecuteStep) -> Result<StepResult, AppError> {
        let client = self.clients.get(host)?;
        if step.background {
            let script = format!("nohup sh -c {} >/dev/null 2>&1 &", shell_quote(command));
            let out = client.shell(&script, TMUX_CALL_TIMEOUT).await?;
            return Ok(if out.success() {
                StepResult::success(format!("Started in background on @{}", step.session))
            } else {
                StepResult::failure(format!("Failed to start background command: {}", out.combined()))
            });
        }

        let limit = limit_of(step);
        let out = match client.shell(command, limit).await {
            Ok(out) => out,
            Err(e) if e.is_timeout() => {
                return Ok(StepResult::timeout(format!(
                    "command on @{} still running after {}s",
                    step.session,
                    limit.as_secs()
                )))
            }
            Err(e) => return Err(e),
        };
        if !out.stdout.trim().is_empty() {
            self.emit(LogStream::Stdout, out.stdout.trim_end()).await;
        }
        if !out.stderr.trim().is_empty() {
            self.emit(LogStream::Stderr, out.stderr.trim_end()).await;
        }
        if out.success() {
            Ok(StepResult::success(tail(out.stdout.trim_end(), 1)))
        } else {
            Ok(StepResult::failure(format!(
                "Command exited with {:?} on @{}: {}",
                out.code,
                step.session,
                tail(&out.combined(), OUTPUT_TAIL)
            )))
        }
    }

    /// Type the command into the bridge pane and watch for its marker.
    async fn bridge_execute(&mut self, window: &WindowInfo, pane: &str, command: &str, limit: Duration) -> Result<StepResult, AppError> {
        let token = short_token();
        let local = self.clients.local();
        local
            .send_keys(pane, &format!("{command}\n{}", marker_trailer(&token)), true, true)
            .await?;
        let client = self.clients.get(&window.host)?;
        let started = Instant::now();
        loop {
            match client
                .capture_pane(&window.remote_session, Some(-MARKER_SCROLLBACK), None)
                .await
            {
                Ok(text) => {
                    if let Some(code) = find_marker(&text, &token) {
                        return Ok(if code == 0 {
                            StepResult::success(format!("Command finished on {}", window.name))
                        } else {
                            StepResult::failure(format!("Command exited with {code} on {}", window.name))
                        });
                    }
                }
                Err(e) => debug!(window = %window.name, error = %e, "capture for marker failed"),
            }
            if started.elapsed() >= limit {
                return Ok(StepResult::timeout(format!(
                    "command on {} still running after {}s",
                    window.name,
                    limit.as_secs()
                )));
            }
            tokio::time::sleep(MARKER_POLL.min(limit.saturating_sub(started.elapsed()))).await;
        }
    }

    /// Re-run of the step a previous process was in. If its command is still
    /// running, wait for it rather than typing it again.
    async fn finish_interrupted(&mut self, window: &WindowInfo, command: &str, limit: Duration) -> Result<StepResult, AppError> {
        let probe = self.idle_probe(window)?;
        let busy = !probe.sample().await.map(|s| s.is_idle()).unwrap_or(false);
        if busy {
            info!(window = %window.name, "command from the interrupted run is still active; waiting for it");
        } else {
            let client = self.clients.get(&window.host)?;
            client.send_keys(&window.remote_session, command, true, true).await?;
        }
        let poll = Duration::from_secs(self.config.executor.wait_poll_secs.max(1));
        if self.wait_idle(window, limit, poll).await? {
            Ok(StepResult::success(format!("{} is idle again", window.name)))
        } else {
            Ok(StepResult::timeout(format!(
                "command on {} still running after {}s",
                window.name,
                limit.as_secs()
            )))
        }
    }
}
