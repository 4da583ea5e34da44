//! `tmux.open`, `tmux.close` and `tmux.config`

use tracing::{info, warn};

use crate::error::AppError;
use crate::recipe::execution::Executor;
use crate::recipe::types::{StepResult, WindowInfo};
use crate::tmux::{is_no_server, TMUX_CALL_TIMEOUT};

const TMUX_CONF: &str = "~/.tmux.conf";

fn alias(arg: &str) -> Option<&str> {
    arg.strip_prefix('@').filter(|a| !a.is_empty())
}

impl Executor {
    /// `tmux.open @host as NAME`
    pub(crate) async fn tmux_open(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let (host_alias, name) = match args {
            [host, kw, name] if kw == "as" => match alias(host) {
                Some(host) => (host, name.trim_start_matches('@')),
                None => return Ok(StepResult::failure("Usage: tmux.open @host as <name>")),
            },
            _ => return Ok(StepResult::failure("Usage: tmux.open @host as <name>")),
        };
        if let Some(existing) = self.ctx.windows.get(name).filter(|w| !w.remote_session.is_empty()) {
            return Ok(StepResult::success(format!(
                "Window {name} already open ({})",
                existing.remote_session
            )));
        }

        let host = self.resolve_host(host_alias).await?;
        let client = self.clients.get(&host)?;
        let session = self.ctx.namer.allocate();
        if client.has_session(&session).await? {
            info!(window = name, session = %session, "reusing tmux session");
        } else {
            client.new_session(&session, true, None).await?;
        }

        let window = WindowInfo {
            name: name.to_string(),
            host: host.clone(),
            remote_session: session.clone(),
        };
        self.ctx.windows.insert(name.to_string(), window.clone());
        self.connect_bridge(&window).await;
        Ok(StepResult::success(format!("Opened {name} on {host_alias} ({session})")))
    }

    /// `tmux.close @NAME`
    pub(crate) async fn tmux_close(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let [target] = args else {
            return Ok(StepResult::failure("Usage: tmux.close @<name>"));
        };
        let Some(name) = alias(target) else {
            return Ok(StepResult::failure("Usage: tmux.close @<name>"));
        };
        let Some(window) = self.ctx.windows.get(name).cloned() else {
            return Ok(StepResult::failure(format!("Unknown window: @{name}")));
        };

        if !window.remote_session.is_empty() {
            let client = self.clients.get(&window.host)?;
            client.kill_session(&window.remote_session).await?;
        }
        self.ctx.windows.remove(name);
        if let Err(e) = self.bridge.disconnect(name).await {
            warn!(window = name, error = %e, "failed to remove bridge pane");
        }
        Ok(StepResult::success(format!("Closed {name}")))
    }

    /// `tmux.config @host`: install the configured `~/.tmux.conf` and reload it.
    pub(crate) async fn tmux_config(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let Some(host_alias) = args.first().and_then(|a| alias(a)) else {
            return Ok(StepResult::failure("Usage: tmux.config @host"));
        };
        let host = self.resolve_host(host_alias).await?;
        let client = self.clients.get(&host)?;

        let mut content = self.config.tmux.config_lines.join("\n");
        content.push('\n');
        client.write_text(TMUX_CONF, &content).await?;

        let out = client
            .shell("tmux source-file \"$HOME/.tmux.conf\"", TMUX_CALL_TIMEOUT)
            .await?;
        if out.success() || is_no_server(&out) {
            Ok(StepResult::success(format!("tmux configured on {host_alias}")))
        } else {
            Ok(StepResult::failure(format!(
                "tmux source-file failed on {host_alias}: {}",
                out.combined()
            )))
        }
    }
}
