//! Recipe types and data models
//!
//! A recipe is a flat program: name bindings (`var`, `host`, `storage`) plus
//! an ordered list of steps. Steps never change after parsing; only the
//! variable and host maps are updated while a recipe runs.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================
// Recipe Definition
// ============================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    /// Variables available for `$NAME` interpolation
    pub variables: HashMap<String, String>,
    /// Host alias -> connection spec (`local`, `vast:<id>` or an SSH spec)
    pub hosts: HashMap<String, String>,
    /// Storage name -> storage spec
    pub storages: HashMap<String, String>,
    pub steps: Vec<Step>,
}

/// One executable line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based source line the step starts on
    pub line: usize,
    /// Source text as written (continuations and heredocs included)
    pub raw: String,
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Control(ControlStep),
    Execute(ExecuteStep),
    Transfer(TransferStep),
    Wait(WaitStep),
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Control(_) => "control",
            StepKind::Execute(_) => "execute",
            StepKind::Transfer(_) => "transfer",
            StepKind::Wait(_) => "wait",
        }
    }
}

// ============================================================
// Step kinds
// ============================================================

/// The closed set of control verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlCommand {
    TmuxOpen,
    TmuxClose,
    TmuxConfig,
    Notify,
    Sleep,
    VastPick,
    VastStart,
    VastStop,
    VastWait,
    VastCost,
}

impl ControlCommand {
    pub const ALL: [ControlCommand; 10] = [
        ControlCommand::TmuxOpen,
        ControlCommand::TmuxClose,
        ControlCommand::TmuxConfig,
        ControlCommand::Notify,
        ControlCommand::Sleep,
        ControlCommand::VastPick,
        ControlCommand::VastStart,
        ControlCommand::VastStop,
        ControlCommand::VastWait,
        ControlCommand::VastCost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::TmuxOpen => "tmux.open",
            ControlCommand::TmuxClose => "tmux.close",
            ControlCommand::TmuxConfig => "tmux.config",
            ControlCommand::Notify => "notify",
            ControlCommand::Sleep => "sleep",
            ControlCommand::VastPick => "vast.pick",
            ControlCommand::VastStart => "vast.start",
            ControlCommand::VastStop => "vast.stop",
            ControlCommand::VastWait => "vast.wait",
            ControlCommand::VastCost => "vast.cost",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStep {
    pub command: ControlCommand,
    /// Arguments after the verb, shell-word split, not yet interpolated
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteStep {
    /// Window (or host) alias, without the `@`
    pub session: String,
    pub command: String,
    pub background: bool,
    /// 0 means no limit
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStep {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WaitCondition {
    File(String),
    Port(u16),
    Idle,
    /// Regex over captured pane text
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStep {
    /// Window alias, without the `@`
    pub target: String,
    pub pattern: Option<String>,
    pub condition: WaitCondition,
    /// `None` uses the configured default
    pub timeout_secs: Option<u64>,
    /// `None` uses the configured polling interval
    pub poll_secs: Option<u64>,
}

// ============================================================
// Runtime types
// ============================================================

/// A recipe-local window bound to a tmux session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub name: String,
    /// Resolved connection spec or `local`
    pub host: String,
    /// Backing tmux session; empty for a bare host-execute target
    pub remote_session: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    Failure,
    Timeout,
}

/// Outcome of one step handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub ok: bool,
    pub message: String,
    pub kind: ResultKind,
}

impl StepResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            kind: ResultKind::Success,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            kind: ResultKind::Failure,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: format!("Timeout: {}", message.into()),
            kind: ResultKind::Timeout,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ResultKind::Timeout
    }
}
