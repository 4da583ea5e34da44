//! Idle detection and retry pacing
//!
//! A pane is idle when its foreground process is an interactive shell with
//! no children. A single observation is not trusted: pipelines briefly show
//! the shell between stages, so idleness has to be seen several times in a
//! row.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::AppError;
use crate::tmux::{TmuxClient, TMUX_CALL_TIMEOUT};

pub const SHELLS: [&str; 8] = ["bash", "zsh", "sh", "fish", "tcsh", "csh", "dash", "ksh"];

const TREE_LINES: usize = 5;
const OUTPUT_LINES: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneSample {
    pub command: String,
    pub pid: Option<u32>,
    pub child_count: usize,
}

impl PaneSample {
    pub fn is_idle(&self) -> bool {
        is_shell(&self.command) && self.child_count == 0
    }
}

/// `-bash`, `/bin/zsh` and `zsh` all count.
pub fn is_shell(command: &str) -> bool {
    let name = command.trim().trim_start_matches('-');
    let name = name.rsplit('/').next().unwrap_or(name);
    SHELLS.contains(&name)
}

/// Context logged while a long wait is still busy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneStatus {
    pub command: String,
    pub process_tree: Vec<String>,
    pub recent_output: Vec<String>,
}

#[async_trait]
pub trait IdleProbe: Send + Sync {
    async fn sample(&self) -> Result<PaneSample, AppError>;
    async fn status(&self) -> PaneStatus;
}

/// Sample until `confirm` consecutive idle observations, or `budget` runs out.
///
/// `streak` carries consecutive idle samples between calls, so a caller that
/// polls in short slices still converges. Only a busy sample resets it. A
/// failed sample counts as busy.
pub async fn detect_idle(
    probe: &dyn IdleProbe,
    streak: &mut u32,
    confirm: u32,
    interval: Duration,
    budget: Duration,
) -> bool {
    let started = Instant::now();
    let confirm = confirm.max(1);
    loop {
        let idle = probe.sample().await.map(|s| s.is_idle()).unwrap_or(false);
        if idle {
            *streak += 1;
            if *streak >= confirm {
                return true;
            }
        } else {
            *streak = 0;
        }
        if started.elapsed() >= budget {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Spacing between confirmation samples: `timeout / (confirm + 2)`, capped.
pub fn idle_interval(timeout: Duration, confirm: u32, max: Duration) -> Duration {
    (timeout / (confirm + 2)).min(max)
}

/// Delay before retry number `failures` (1-based): doubling from `base`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exp).unwrap_or(max).min(max)
}

/// Up to `limit` lines of the process tree under `root`, from `ps -o pid=,ppid=,args=`.
pub fn process_tree(ps_output: &str, root: u32, limit: usize) -> Vec<String> {
    let procs: Vec<(u32, u32, String)> = ps_output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse().ok()?;
            let ppid = parts.next()?.parse().ok()?;
            let args = parts.collect::<Vec<_>>().join(" ");
            Some((pid, ppid, args))
        })
        .collect();

    let mut out = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((pid, depth)) = stack.pop() {
        if out.len() >= limit {
            break;
        }
        if let Some((_, _, args)) = procs.iter().find(|(p, _, _)| *p == pid) {
            out.push(format!("{}{pid} {args}", "  ".repeat(depth)));
        }
        let mut children: Vec<u32> = procs.iter().filter(|(_, pp, _)| *pp == pid).map(|(p, _, _)| *p).collect();
        children.sort_unstable_by(|a, b| b.cmp(a));
        stack.extend(children.into_iter().map(|c| (c, depth + 1)));
    }
    out
}

fn last_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.trim_end().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(n)..].to_vec()
}

/// Probes a pane through its session client.
///
/// `output` optionally names a different pane to read recent output from,
/// such as the local bridge pane mirroring a remote window.
pub struct PaneProbe {
    client: Arc<dyn TmuxClient>,
    target: String,
    output: Option<(Arc<dyn TmuxClient>, String)>,
}

impl PaneProbe {
    pub fn new(client: Arc<dyn TmuxClient>, target: &str) -> Self {
        Self {
            client,
            target: target.to_string(),
            output: None,
        }
    }

    pub fn with_output(mut self, client: Arc<dyn TmuxClient>, target: &str) -> Self {
        self.output = Some((client, target.to_string()));
        self
    }

    async fn foreground(&self) -> Result<(String, Option<u32>), AppError> {
        let line = self
            .client
            .display_message(&self.target, "#{pane_current_command}\t#{pane_pid}")
            .await?;
        let (command, pid) = line.split_once('\t').unwrap_or((line.as_str(), ""));
        Ok((command.trim().to_string(), pid.trim().parse().ok()))
    }
}

#[async_trait]
impl IdleProbe for PaneProbe {
    async fn sample(&self) -> Result<PaneSample, AppError> {
        let (command, pid) = self.foreground().await?;
        let Some(pid) = pid else {
            return Ok(PaneSample {
                command,
                pid: None,
                child_count: 0,
            });
        };
        let out = self
            .client
            .shell(&format!("pgrep -P {pid} 2>/dev/null | wc -l"), TMUX_CALL_TIMEOUT)
            .await?;
        let child_count = out.stdout.trim().parse().map_err(|_| {
            AppError::command(format!("Unexpected child count for pid {pid}: {}", out.combined()))
        })?;
        Ok(PaneSample {
            command,
            pid: Some(pid),
            child_count,
        })
    }

    async fn status(&self) -> PaneStatus {
        let mut status = PaneStatus::default();
        if let Ok((command, pid)) = self.foreground().await {
            status.command = command;
            if let Some(pid) = pid {
                if let Ok(out) = self.client.shell("ps -ax -o pid=,ppid=,args=", TMUX_CALL_TIMEOUT).await {
                    status.process_tree = process_tree(&out.stdout, pid, TREE_LINES);
                }
            }
        }
        let (client, target) = match &self.output {
            Some((c, t)) => (c, t.as_str()),
            None => (&self.client, self.target.as_str()),
        };
        if let Ok(text) = client.capture_pane(target, Some(-50), None).await {
            status.recent_output = last_lines(&text, OUTPUT_LINES);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::{ok, FakeTmux};
    use std::sync::Mutex;

    struct Scripted {
        samples: Mutex<Vec<bool>>,
        taken: Mutex<usize>,
    }

    impl Scripted {
        fn new(seq: &[bool]) -> Self {
            Self {
                samples: Mutex::new(seq.iter().rev().copied().collect()),
                taken: Mutex::new(0),
            }
        }

        fn taken(&self) -> usize {
            *self.taken.lock().unwrap()
        }
    }

    #[async_trait]
    impl IdleProbe for Scripted {
        async fn sample(&self) -> Result<PaneSample, AppError> {
            *self.taken.lock().unwrap() += 1;
            let idle = self.samples.lock().unwrap().pop().unwrap_or(false);
            Ok(PaneSample {
                command: if idle { "bash" } else { "python" }.into(),
                pid: Some(1),
                child_count: 0,
            })
        }

        async fn status(&self) -> PaneStatus {
            PaneStatus::default()
        }
    }

    #[tokio::test]
    async fn idle_needs_consecutive_confirmations() {
        let probe = Scripted::new(&[false, true, true, false, true, true, true]);
        let idle = detect_idle(&probe, &mut 0, 3, Duration::ZERO, Duration::from_secs(3600)).await;
        assert!(idle);
        assert_eq!(probe.taken(), 7);
    }

    #[tokio::test]
    async fn busy_pane_gives_up_when_budget_is_spent() {
        let probe = Scripted::new(&[false, false]);
        assert!(!detect_idle(&probe, &mut 0, 3, Duration::ZERO, Duration::ZERO).await);
        assert_eq!(probe.taken(), 1);
    }

    #[tokio::test]
    async fn streak_survives_short_polls() {
        let probe = Scripted::new(&[true, true, false, true, true, true]);
        let mut streak = 0;
        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(detect_idle(&probe, &mut streak, 3, Duration::ZERO, Duration::ZERO).await);
        }
        assert_eq!(results, vec![false, false, false, false, false, true]);
        assert_eq!(probe.taken(), 6);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let delays: Vec<u64> = (1..=10)
            .map(|n| backoff_delay(Duration::from_secs(30), Duration::from_secs(300), n).as_secs())
            .collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300, 300, 300, 300, 300]);
        assert_eq!(backoff_delay(Duration::from_secs(30), Duration::from_secs(300), 64).as_secs(), 300);
    }

    #[test]
    fn interval_is_capped() {
        assert_eq!(idle_interval(Duration::from_secs(10), 3, Duration::from_secs(10)), Duration::from_secs(2));
        assert_eq!(idle_interval(Duration::from_secs(3600), 3, Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[test]
    fn recognises_shells() {
        assert!(is_shell("-zsh"));
        assert!(is_shell("/bin/bash"));
        assert!(!is_shell("python3"));
        assert!(!PaneSample { command: "bash".into(), pid: Some(1), child_count: 1 }.is_idle());
    }

    #[test]
    fn renders_process_tree() {
        let ps = "  10     1 -bash\n  11    10 python train.py\n  12    11 nvidia-smi\n  20     1 sshd\n";
        let tree = process_tree(ps, 10, 5);
        assert_eq!(tree, vec!["10 -bash", "  11 python train.py", "    12 nvidia-smi"]);
        assert_eq!(process_tree(ps, 10, 1).len(), 1);
    }

    #[tokio::test]
    async fn pane_probe_counts_children() {
        let fake = Arc::new(FakeTmux::new("local"));
        fake.respond("display-message", ok("bash\t4242\n"));
        fake.on_shell(|script| {
            assert!(script.starts_with("pgrep -P 4242"));
            Ok(ok("0\n"))
        });
        let probe = PaneProbe::new(fake.clone(), "train_x_1");
        let sample = probe.sample().await.unwrap();
        assert!(sample.is_idle());
        assert_eq!(sample.pid, Some(4242));
    }
}
