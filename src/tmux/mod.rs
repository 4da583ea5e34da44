//! Tmux session clients
//!
//! One trait, two transports: [`LocalTmuxClient`] runs the local `tmux`
//! binary, [`RemoteTmuxClient`] tunnels the same primitives through SSH.
//! Every primitive is built on the two required methods (`tmux` and `shell`),
//! so the transports only differ in how a command line reaches the host.

pub mod bridge;
#[cfg(test)]
pub(crate) mod fake;
pub mod local;
pub mod naming;
pub mod remote;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::StatusMode;
use crate::error::AppError;
use crate::ssh::{is_local_spec, shell_quote, CmdOut};

pub use bridge::{BridgeManager, BridgeMode, BridgeOptions, BridgePane};
pub use local::LocalTmuxClient;
pub use naming::{
    bridge_pane_title, get_window_session_name, parse_window_session_index, SessionNamer,
};
pub use remote::RemoteTmuxClient;

/// Upper bound for a single tmux primitive (not for `wait-for`).
pub const TMUX_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Stand-in for "no limit" where a Duration is required.
pub const UNBOUNDED: Duration = Duration::from_secs(60 * 60 * 24 * 365);

const PANE_FORMAT: &str = "#{pane_id}\t#{pane_title}\t#{pane_current_command}\t#{pane_pid}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneInfo {
    pub id: String,
    pub title: String,
    pub current_command: String,
    pub pid: Option<u32>,
}

fn parse_panes(output: &str) -> Vec<PaneInfo> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let id = parts.next()?.trim().to_string();
            if id.is_empty() {
                return None;
            }
            Some(PaneInfo {
                id,
                title: parts.next().unwrap_or_default().to_string(),
                current_command: parts.next().unwrap_or_default().trim().to_string(),
                pid: parts.next().and_then(|p| p.trim().parse().ok()),
            })
        })
        .collect()
}

/// `tmux` exits non-zero with this when nothing has started a server yet.
pub fn is_no_server(out: &CmdOut) -> bool {
    let err = out.stderr.to_lowercase();
    err.contains("no server running") || err.contains("error connecting to") || err.contains("no such file or directory")
}

fn exact(session: &str) -> String {
    format!("={session}")
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn check(out: CmdOut, what: &str) -> Result<CmdOut, AppError> {
    if out.success() {
        Ok(out)
    } else {
        Err(AppError::command(format!("tmux {what} failed: {}", out.combined())))
    }
}

#[async_trait]
pub trait TmuxClient: Send + Sync {
    /// `local`, or the host spec this client talks to.
    fn location(&self) -> &str;

    /// Run `tmux <args>` on the host. A non-zero exit is returned, not raised.
    async fn tmux(&self, args: &[String], time_limit: Duration) -> Result<CmdOut, AppError>;

    /// Run a shell script on the host, without a TTY.
    async fn shell(&self, script: &str, time_limit: Duration) -> Result<CmdOut, AppError>;

    /// Shell command (not a client call) that attaches a terminal to `session`.
    fn build_attach_command(&self, session: &str, status: StatusMode) -> String;

    fn is_local(&self) -> bool {
        is_local_spec(self.location())
    }

    async fn has_session(&self, session: &str) -> Result<bool, AppError> {
        let out = self
            .tmux(&args(&["has-session", "-t", &exact(session)]), TMUX_CALL_TIMEOUT)
            .await?;
        Ok(out.success())
    }

    async fn new_session(&self, session: &str, detached: bool, command: Option<&str>) -> Result<(), AppError> {
        let mut a = args(&["new-session"]);
        if detached {
            a.push("-d".to_string());
        }
        a.push("-s".to_string());
        a.push(session.to_string());
        if let Some(cmd) = command {
            a.push(cmd.to_string());
        }
        let out = self.tmux(&a, TMUX_CALL_TIMEOUT).await?;
        if !out.success() && !out.stderr.contains("duplicate session") {
            return Err(AppError::command(format!(
                "Failed to create tmux session {session}: {}",
                out.combined()
            )));
        }
        Ok(())
    }

    async fn kill_session(&self, session: &str) -> Result<(), AppError> {
        let out = self
            .tmux(&args(&["kill-session", "-t", &exact(session)]), TMUX_CALL_TIMEOUT)
            .await?;
        if !out.success() && !is_no_server(&out) && !out.stderr.contains("can't find session") {
            return Err(AppError::command(format!(
                "Failed to kill tmux session {session}: {}",
                out.combined()
            )));
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>, AppError> {
        let out = self
            .tmux(&args(&["list-sessions", "-F", "#{session_name}"]), TMUX_CALL_TIMEOUT)
            .await?;
        if !out.success() {
            if is_no_server(&out) {
                return Ok(vec![]);
            }
            return Err(AppError::command(format!("tmux list-sessions failed: {}", out.combined())));
        }
        Ok(out.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    async fn list_windows(&self, session: &str) -> Result<Vec<String>, AppError> {
        let out = self
            .tmux(
                &args(&["list-windows", "-t", &exact(session), "-F", "#{window_id}\t#{window_name}"]),
                TMUX_CALL_TIMEOUT,
            )
            .await?;
        let out = check(out, "list-windows")?;
        Ok(out.stdout.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Panes of the window `target` resolves to.
    async fn list_panes(&self, target: &str) -> Result<Vec<PaneInfo>, AppError> {
        let out = self
            .tmux(&args(&["list-panes", "-t", target, "-F", PANE_FORMAT]), TMUX_CALL_TIMEOUT)
            .await?;
        let out = check(out, "list-panes")?;
        Ok(parse_panes(&out.stdout))
    }

    /// Literal mode sends `text` byte-for-byte; Enter then goes as a second call.
    async fn send_keys(&self, target: &str, text: &str, enter: bool, literal: bool) -> Result<(), AppError> {
        if literal {
            let out = self
                .tmux(&args(&["send-keys", "-t", target, "-l", text]), TMUX_CALL_TIMEOUT)
                .await?;
            check(out, "send-keys")?;
            if enter {
                let out = self
                    .tmux(&args(&["send-keys", "-t", target, "Enter"]), TMUX_CALL_TIMEOUT)
                    .await?;
                check(out, "send-keys")?;
            }
        } else {
            let mut a = args(&["send-keys", "-t", target, text]);
            if enter {
                a.push("Enter".to_string());
            }
            let out = self.tmux(&a, TMUX_CALL_TIMEOUT).await?;
            check(out, "send-keys")?;
        }
        Ok(())
    }

    async fn capture_pane(&self, target: &str, start: Option<i64>, end: Option<i64>) -> Result<String, AppError> {
        let mut a = args(&["capture-pane", "-p", "-J", "-t", target]);
        if let Some(s) = start {
            a.push("-S".to_string());
            a.push(s.to_string());
        }
        if let Some(e) = end {
            a.push("-E".to_string());
            a.push(e.to_string());
        }
        let out = self.tmux(&a, TMUX_CALL_TIMEOUT).await?;
        Ok(check(out, "capture-pane")?.stdout)
    }

    async fn display_message(&self, target: &str, format: &str) -> Result<String, AppError> {
        let out = self
            .tmux(&args(&["display-message", "-p", "-t", target, format]), TMUX_CALL_TIMEOUT)
            .await?;
        Ok(check(out, "display-message")?.stdout.trim_end_matches('\n').to_string())
    }

    /// Split `target`, returning the new pane id.
    async fn split_window(&self, target: &str, horizontal: bool, command: Option<&str>) -> Result<String, AppError> {
        let mut a = args(&["split-window", "-t", target]);
        a.push(if horizontal { "-h" } else { "-v" }.to_string());
        a.extend(args(&["-P", "-F", "#{pane_id}"]));
        if let Some(cmd) = command {
            a.push(cmd.to_string());
        }
        let out = self.tmux(&a, TMUX_CALL_TIMEOUT).await?;
        let out = check(out, "split-window")?;
        let pane = out.stdout.trim().to_string();
        if pane.is_empty() {
            return Err(AppError::command("tmux split-window returned no pane id"));
        }
        Ok(pane)
    }

    async fn select_layout(&self, target: &str, layout: &str) -> Result<(), AppError> {
        let out = self
            .tmux(&args(&["select-layout", "-t", target, layout]), TMUX_CALL_TIMEOUT)
            .await?;
        check(out, "select-layout")?;
        Ok(())
    }

    async fn set_pane_title(&self, pane: &str, title: &str) -> Result<(), AppError> {
        let out = self
            .tmux(&args(&["select-pane", "-t", pane, "-T", title]), TMUX_CALL_TIMEOUT)
            .await?;
        check(out, "select-pane")?;
        Ok(())
    }

    async fn kill_pane(&self, pane: &str) -> Result<(), AppError> {
        let out = self.tmux(&args(&["kill-pane", "-t", pane]), TMUX_CALL_TIMEOUT).await?;
        check(out, "kill-pane")?;
        Ok(())
    }

    /// Block until `signal` is raised with `wait-for -S`, or `time_limit` passes.
    async fn wait_for(&self, signal: &str, time_limit: Duration) -> Result<(), AppError> {
        let out = self.tmux(&args(&["wait-for", signal]), time_limit).await?;
        check(out, "wait-for")?;
        Ok(())
    }

    async fn write_text(&self, path: &str, content: &str) -> Result<(), AppError> {
        let out = self.shell(&heredoc_write_script(path, content), TMUX_CALL_TIMEOUT).await?;
        if !out.success() {
            return Err(AppError::command(format!("Failed to write {path}: {}", out.combined())));
        }
        Ok(())
    }
}

/// Shell-safe form of `path`, keeping a leading `~` expandable.
pub fn shell_path(path: &str) -> String {
    if path == "~" {
        "\"$HOME\"".to_string()
    } else if let Some(rest) = path.strip_prefix("~/") {
        format!("\"$HOME\"/{}", shell_quote(rest))
    } else {
        shell_quote(path)
    }
}

fn heredoc_delimiter(content: &str) -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string().to_uppercase();
        let delim = format!("TRAINSH_EOF_{}", id.chars().take(8).collect::<String>());
        if !content.contains(&delim) {
            return delim;
        }
    }
}

/// Script that writes `content` to `path` through a quoted heredoc.
pub fn heredoc_write_script(path: &str, content: &str) -> String {
    let delim = heredoc_delimiter(content);
    let target = shell_path(path);
    let body = content.strip_suffix('\n').unwrap_or(content);
    format!("mkdir -p \"$(dirname {target})\" && cat > {target} <<'{delim}'\n{body}\n{delim}\n")
}

/// The attach idiom shared by both transports.
///
/// With a status mode other than `keep`, the session option is saved, changed
/// for the duration of the attach and put back once the client detaches.
pub fn attach_script(session: &str, status: StatusMode) -> String {
    let target = shell_quote(&exact(session));
    let (option, value, fallback) = match status {
        StatusMode::Keep => return format!("exec tmux attach-session -t {target}"),
        StatusMode::Off => ("status", "off", "on"),
        StatusMode::Bottom => ("status-position", "bottom", "bottom"),
    };
    format!(
        "orig=$(tmux show-options -v -t {target} {option} 2>/dev/null); \
         tmux set-option -t {target} {option} {value} >/dev/null 2>&1; \
         tmux attach-session -t {target}; rc=$?; \
         tmux set-option -t {target} {option} \"${{orig:-{fallback}}}\" >/dev/null 2>&1; \
         exit $rc"
    )
}
