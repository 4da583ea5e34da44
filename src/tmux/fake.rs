//! Scripted in-memory tmux client for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::TmuxClient;
use crate::config::StatusMode;
use crate::error::AppError;
use crate::ssh::CmdOut;

type ShellHandler = Arc<dyn Fn(&str) -> Result<CmdOut, AppError> + Send + Sync>;

#[derive(Default)]
struct State {
    tmux_calls: Vec<Vec<String>>,
    shell_calls: Vec<String>,
    /// Responses keyed by tmux subcommand; queued ones are consumed first.
    queued: HashMap<String, VecDeque<Result<CmdOut, AppError>>>,
    sticky: HashMap<String, Result<CmdOut, AppError>>,
}

pub(crate) struct FakeTmux {
    location: String,
    state: Mutex<State>,
    shell_handler: Mutex<Option<ShellHandler>>,
}

pub(crate) fn ok(stdout: &str) -> CmdOut {
    CmdOut {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub(crate) fn exit(code: i32, stderr: &str) -> CmdOut {
    CmdOut {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl FakeTmux {
    pub(crate) fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            state: Mutex::new(State::default()),
            shell_handler: Mutex::new(None),
        }
    }

    /// Answer every `tmux <subcommand>` with `out` (unless something is queued).
    pub(crate) fn respond(&self, subcommand: &str, out: CmdOut) {
        if let Ok(mut s) = self.state.lock() {
            s.sticky.insert(subcommand.to_string(), Ok(out));
        }
    }

    pub(crate) fn respond_err(&self, subcommand: &str, err: AppError) {
        if let Ok(mut s) = self.state.lock() {
            s.sticky.insert(subcommand.to_string(), Err(err));
        }
    }

    /// Answer the next `tmux <subcommand>` call with `out`, once.
    pub(crate) fn queue(&self, subcommand: &str, out: Result<CmdOut, AppError>) {
        if let Ok(mut s) = self.state.lock() {
            s.queued.entry(subcommand.to_string()).or_default().push_back(out);
        }
    }

    pub(crate) fn on_shell(&self, handler: impl Fn(&str) -> Result<CmdOut, AppError> + Send + Sync + 'static) {
        if let Ok(mut h) = self.shell_handler.lock() {
            *h = Some(Arc::new(handler));
        }
    }

    pub(crate) fn tmux_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().map(|s| s.tmux_calls.clone()).unwrap_or_default()
    }

    pub(crate) fn shell_calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.shell_calls.clone()).unwrap_or_default()
    }

    pub(crate) fn calls_to(&self, subcommand: &str) -> Vec<Vec<String>> {
        self.tmux_calls()
            .into_iter()
            .filter(|c| c.first().map(|s| s == subcommand).unwrap_or(false))
            .collect()
    }
}

#[async_trait]
impl TmuxClient for FakeTmux {
    fn location(&self) -> &str {
        &self.location
    }

    async fn tmux(&self, args: &[String], _time_limit: Duration) -> Result<CmdOut, AppError> {
        let mut s = self
            .state
            .lock()
            .map_err(|_| AppError::internal("fake tmux state poisoned"))?;
        s.tmux_calls.push(args.to_vec());
        let sub = args.first().cloned().unwrap_or_default();
        if let Some(next) = s.queued.get_mut(&sub).and_then(|q| q.pop_front()) {
            return next;
        }
        match s.sticky.get(&sub) {
            Some(out) => out.clone(),
            None => Ok(ok("")),
        }
    }

    async fn shell(&self, script: &str, _time_limit: Duration) -> Result<CmdOut, AppError> {
        if let Ok(mut s) = self.state.lock() {
            s.shell_calls.push(script.to_string());
        }
        let handler = self.shell_handler.lock().ok().and_then(|h| h.clone());
        match handler {
            Some(h) => h(script),
            None => Ok(ok("")),
        }
    }

    fn build_attach_command(&self, session: &str, _status: StatusMode) -> String {
        format!("attach {}:{session}", self.location)
    }
}
