//! Local bridge panes mirroring recipe windows.
//!
//! Each recipe window gets a local pane that runs its attach command, so a
//! human can watch (and type into) the session the engine drives. Panes are
//! found again by title after a restart, which keeps resume from stacking up
//! duplicate panes.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::naming::{bridge_pane_title, SessionNamer};
use super::TmuxClient;
use crate::config::StatusMode;
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    pub enabled: bool,
    /// Create a detached local session when we are not inside tmux.
    pub allow_detached: bool,
    /// `TMUX_PANE` of the invoking client, if any.
    pub current_pane: Option<String>,
    /// Detached session recorded by a previous run of this job.
    pub restore_session: Option<String>,
    pub status: StatusMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMode {
    /// Split the window the invoking tmux client is showing.
    CurrentWindow { pane: String },
    /// A local session of its own, attached to by the user when they want.
    DetachedSession { session: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePane {
    pub window_name: String,
    pub pane_id: String,
    pub attach_command: String,
}

pub struct BridgeManager {
    local: Arc<dyn TmuxClient>,
    options: BridgeOptions,
    mode: Option<BridgeMode>,
    decided: bool,
    panes: HashMap<String, BridgePane>,
    splits: usize,
}

impl BridgeManager {
    pub fn new(local: Arc<dyn TmuxClient>, options: BridgeOptions) -> Self {
        Self {
            local,
            options,
            mode: None,
            decided: false,
            panes: HashMap::new(),
            splits: 0,
        }
    }

    pub fn disabled(local: Arc<dyn TmuxClient>) -> Self {
        Self::new(local, BridgeOptions::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub fn status_mode(&self) -> StatusMode {
        self.options.status
    }

    pub fn mode(&self) -> Option<&BridgeMode> {
        self.mode.as_ref()
    }

    /// Detached session name to persist with the job; empty in other modes.
    pub fn get_state_session(&self) -> String {
        match &self.mode {
            Some(BridgeMode::DetachedSession { session }) => session.clone(),
            _ => String::new(),
        }
    }

    pub fn get_pane(&self, window: &str) -> Option<&BridgePane> {
        self.panes.get(window)
    }

    fn decide_mode(&mut self, namer: &mut SessionNamer) -> Option<BridgeMode> {
        if self.decided {
            return self.mode.clone();
        }
        self.decided = true;
        if !self.options.enabled {
            return None;
        }
        self.mode = if let Some(pane) = self.options.current_pane.clone() {
            Some(BridgeMode::CurrentWindow { pane })
        } else if self.options.allow_detached {
            let session = self
                .options
                .restore_session
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| namer.allocate());
            Some(BridgeMode::DetachedSession { session })
        } else {
            None
        };
        if let Some(mode) = &self.mode {
            info!(?mode, "bridge mode selected");
        }
        self.mode.clone()
    }

    fn window_target(mode: &BridgeMode) -> String {
        match mode {
            BridgeMode::CurrentWindow { pane } => pane.clone(),
            BridgeMode::DetachedSession { session } => format!("={session}"),
        }
    }

    async fn find_by_title(&self, mode: &BridgeMode, title: &str) -> Result<Option<String>, AppError> {
        let panes = self.local.list_panes(&Self::window_target(mode)).await?;
        Ok(panes.into_iter().find(|p| p.title == title).map(|p| p.id))
    }

    fn register(&mut self, window: &str, pane_id: String, attach_command: &str) -> BridgePane {
        let pane = BridgePane {
            window_name: window.to_string(),
            pane_id,
            attach_command: attach_command.to_string(),
        };
        self.panes.insert(window.to_string(), pane.clone());
        pane
    }

    /// Ensure a pane mirrors `window`. `Ok(None)` when bridging is off.
    pub async fn connect(
        &mut self,
        window: &str,
        attach_command: &str,
        namer: &mut SessionNamer,
    ) -> Result<Option<BridgePane>, AppError> {
        if let Some(pane) = self.panes.get(window) {
            return Ok(Some(pane.clone()));
        }
        let Some(mode) = self.decide_mode(namer) else {
            return Ok(None);
        };
        let title = bridge_pane_title(window);

        if let BridgeMode::DetachedSession { session } = &mode {
            if !self.local.has_session(session).await? {
                self.local.new_session(session, true, Some(attach_command)).await?;
                let first = self
                    .local
                    .list_panes(&Self::window_target(&mode))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| AppError::command(format!("bridge session {session} has no pane")))?;
                self.local.set_pane_title(&first.id, &title).await?;
                info!(window, pane = %first.id, session = %session, "bridge session created");
                return Ok(Some(self.register(window, first.id, attach_command)));
            }
        }

        if let Some(pane_id) = self.find_by_title(&mode, &title).await? {
            debug!(window, pane = %pane_id, "bridge pane rediscovered");
            return Ok(Some(self.register(window, pane_id, attach_command)));
        }

        let horizontal = self.splits % 2 == 0;
        self.splits += 1;
        let target = Self::window_target(&mode);
        let pane_id = self.local.split_window(&target, horizontal, Some(attach_command)).await?;
        self.local.set_pane_title(&pane_id, &title).await?;
        if let Err(e) = self.local.select_layout(&target, "tiled").await {
            warn!(error = %e, "bridge layout re-flow failed");
        }
        info!(window, pane = %pane_id, "bridge pane created");
        Ok(Some(self.register(window, pane_id, attach_command)))
    }

    pub async fn disconnect(&mut self, window: &str) -> Result<(), AppError> {
        let pane_id = match self.panes.remove(window) {
            Some(pane) => Some(pane.pane_id),
            None => match self.mode.clone() {
                Some(mode) => self.find_by_title(&mode, &bridge_pane_title(window)).await?,
                None => None,
            },
        };
        if let Some(pane_id) = pane_id {
            self.local.kill_pane(&pane_id).await?;
            info!(window, pane = %pane_id, "bridge pane closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::{exit, ok, FakeTmux};

    fn manager(fake: &Arc<FakeTmux>, options: BridgeOptions) -> BridgeManager {
        BridgeManager::new(fake.clone(), options)
    }

    #[tokio::test]
    async fn disabled_bridge_does_nothing() {
        let fake = Arc::new(FakeTmux::new("local"));
        let mut bridge = BridgeManager::disabled(fake.clone());
        let mut namer = SessionNamer::new("r", "abcdef12", 0);
        assert!(bridge.connect("w", "attach", &mut namer).await.unwrap().is_none());
        assert!(fake.tmux_calls().is_empty());
        assert_eq!(namer.next_index(), 0);
    }

    #[tokio::test]
    async fn current_window_mode_splits_and_alternates() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.respond("list-panes", ok("%3\t\tzsh\t10\n"));
        fake.queue("split-window", Ok(ok("%4\n")));
        fake.queue("split-window", Ok(ok("%5\n")));
        let mut bridge = manager(
            &fake,
            BridgeOptions {
                enabled: true,
                current_pane: Some("%3".to_string()),
                ..Default::default()
            },
        );
        let mut namer = SessionNamer::new("r", "abcdef12", 0);

        let a = bridge.connect("a", "attach-a", &mut namer).await.unwrap().unwrap();
        let b = bridge.connect("b", "attach-b", &mut namer).await.unwrap().unwrap();
        assert_eq!(a.pane_id, "%4");
        assert_eq!(b.pane_id, "%5");
        assert_eq!(bridge.mode(), Some(&BridgeMode::CurrentWindow { pane: "%3".to_string() }));
        assert_eq!(bridge.get_state_session(), "");

        let splits = fake.calls_to("split-window");
        assert_eq!(splits[0][3], "-h");
        assert_eq!(splits[1][3], "-v");
        assert_eq!(splits[0].last().map(String::as_str), Some("attach-a"));
        let titles = fake.calls_to("select-pane");
        assert_eq!(titles[0], vec!["select-pane", "-t", "%4", "-T", "train:a"]);
        assert_eq!(fake.calls_to("select-layout").len(), 2);

        // Second connect for the same window is served from memory.
        let again = bridge.connect("a", "attach-a", &mut namer).await.unwrap().unwrap();
        assert_eq!(again.pane_id, "%4");
        assert_eq!(fake.calls_to("split-window").len(), 2);
    }

    #[tokio::test]
    async fn rediscovers_pane_by_title_after_restart() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.respond("list-panes", ok("%3\t\tzsh\t10\n%7\ttrain:w\tssh\t11\n"));
        let mut bridge = manager(
            &fake,
            BridgeOptions {
                enabled: true,
                current_pane: Some("%3".to_string()),
                ..Default::default()
            },
        );
        let mut namer = SessionNamer::new("r", "abcdef12", 0);
        let pane = bridge.connect("w", "attach-w", &mut namer).await.unwrap().unwrap();
        assert_eq!(pane.pane_id, "%7");
        assert!(fake.calls_to("split-window").is_empty());
    }

    #[tokio::test]
    async fn detached_mode_allocates_session_from_namer() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.queue("has-session", Ok(exit(1, "can't find session")));
        fake.queue("list-panes", Ok(ok("%0\t\tbash\t5\n")));
        fake.respond("has-session", ok(""));
        fake.respond("list-panes", ok("%0\ttrain:a\tssh\t5\n"));
        fake.respond("split-window", ok("%1\n"));
        let mut bridge = manager(
            &fake,
            BridgeOptions {
                enabled: true,
                allow_detached: true,
                ..Default::default()
            },
        );
        let mut namer = SessionNamer::new("r", "abcdef12", 2);

        let a = bridge.connect("a", "attach-a", &mut namer).await.unwrap().unwrap();
        assert_eq!(a.pane_id, "%0");
        assert_eq!(bridge.get_state_session(), "train_r_abcdef12_2");
        assert_eq!(namer.next_index(), 3);
        let created = fake.calls_to("new-session");
        assert_eq!(created[0], vec!["new-session", "-d", "-s", "train_r_abcdef12_2", "attach-a"]);

        let b = bridge.connect("b", "attach-b", &mut namer).await.unwrap().unwrap();
        assert_eq!(b.pane_id, "%1");
        assert_eq!(fake.calls_to("split-window")[0][2], "=train_r_abcdef12_2");
    }

    #[tokio::test]
    async fn restored_detached_session_is_reused() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.respond("has-session", ok(""));
        fake.respond("list-panes", ok("%2\ttrain:w\tssh\t5\n"));
        let mut bridge = manager(
            &fake,
            BridgeOptions {
                enabled: true,
                allow_detached: true,
                restore_session: Some("train_r_abcdef12_1".to_string()),
                ..Default::default()
            },
        );
        let mut namer = SessionNamer::new("r", "abcdef12", 4);
        let pane = bridge.connect("w", "attach", &mut namer).await.unwrap().unwrap();
        assert_eq!(pane.pane_id, "%2");
        assert_eq!(namer.next_index(), 4);
        assert_eq!(bridge.get_state_session(), "train_r_abcdef12_1");
        assert!(fake.calls_to("new-session").is_empty());
    }

    #[tokio::test]
    async fn disconnect_kills_pane_found_by_title() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.respond("list-panes", ok("%3\t\tzsh\t10\n%8\ttrain:w\tssh\t11\n"));
        fake.respond("split-window", ok("%9\n"));
        let mut bridge = manager(
            &fake,
            BridgeOptions {
                enabled: true,
                current_pane: Some("%3".to_string()),
                ..Default::default()
            },
        );
        let mut namer = SessionNamer::new("r", "abcdef12", 0);
        // Decide the mode without registering "w" in memory.
        bridge.connect("other", "attach", &mut namer).await.unwrap();
        bridge.panes.remove("w");
        bridge.disconnect("w").await.unwrap();
        let kills = fake.calls_to("kill-pane");
        assert_eq!(kills, vec![vec!["kill-pane".to_string(), "-t".to_string(), "%8".to_string()]]);
    }
}
