//! Vast.ai steps: `vast.pick`, `vast.start`, `vast.stop`, `vast.wait`, `vast.cost`
//!
//! The selected instance id is kept in `VAST_ID`; later steps default to it.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::AppError;
use crate::job::now_timestamp;
use crate::recipe::execution::{Executor, VAR_VAST_ID, VAR_VAST_START_TIME};
use crate::recipe::parser::parse_duration;
use crate::recipe::types::StepResult;
use crate::vast::{GpuMarketplace, VastInstance};

pub const VAR_VAST_SSH: &str = "VAST_SSH";
pub const VAR_VAST_COST: &str = "VAST_COST";

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Default)]
struct PickFilters {
    gpu: Option<String>,
    num_gpus: Option<i64>,
    max_price: Option<f64>,
}

impl PickFilters {
    fn matches(&self, inst: &VastInstance) -> bool {
        if let Some(gpu) = &self.gpu {
            let want = gpu.replace('_', " ").to_lowercase();
            let have = inst.gpu_name.as_deref().unwrap_or_default().to_lowercase();
            if !have.contains(&want) {
                return false;
            }
        }
        if let Some(n) = self.num_gpus {
            if inst.num_gpus.unwrap_or(0) < n {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if inst.dph_total.map_or(true, |p| p > max) {
                return false;
            }
        }
        true
    }
}

/// Running instances first, then cheapest.
fn pick_order(a: &VastInstance, b: &VastInstance) -> Ordering {
    b.is_running()
        .cmp(&a.is_running())
        .then_with(|| {
            let pa = a.dph_total.unwrap_or(f64::MAX);
            let pb = b.dph_total.unwrap_or(f64::MAX);
            pa.partial_cmp(&pb).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn split_options(args: &[String]) -> (Vec<&str>, Vec<(&str, &str)>) {
    let mut positional = Vec::new();
    let mut options = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((k, v)) => options.push((k, v)),
            None => positional.push(arg.as_str()),
        }
    }
    (positional, options)
}

impl Executor {
    fn marketplace(&self) -> Result<Arc<dyn GpuMarketplace>, AppError> {
        self.services
            .marketplace
            .clone()
            .ok_or_else(|| AppError::invalid_input("Vast is not configured (set vast.api_key)"))
    }

    /// Explicit id, `vast:<id>`, `@alias` bound to `vast:<id>`, or `VAST_ID`.
    fn instance_id(&self, arg: Option<&str>) -> Result<i64, AppError> {
        let raw = match arg {
            Some(a) if a.starts_with('@') => {
                let alias = a.trim_start_matches('@');
                let spec = self
                    .recipe
                    .hosts
                    .get(alias)
                    .ok_or_else(|| AppError::not_found(format!("Unknown host: @{alias}")))?;
                spec.strip_prefix("vast:")
                    .ok_or_else(|| AppError::invalid_input(format!("Host @{alias} is not a Vast instance ({spec})")))?
                    .to_string()
            }
            Some(a) => a.trim_start_matches("vast:").to_string(),
            None => self.ctx.variables.get(VAR_VAST_ID).cloned().ok_or_else(|| {
                AppError::invalid_input("No Vast instance selected (run vast.pick or pass an id)")
            })?,
        };
        raw.trim()
            .parse()
            .map_err(|_| AppError::invalid_input(format!("Invalid Vast instance id: {raw}")))
    }

    /// SSH spec of a `vast:<id>` host.
    pub(crate) async fn vast_ssh_spec(&self, id: &str) -> Result<String, AppError> {
        let id: i64 = id
            .trim()
            .parse()
            .map_err(|_| AppError::invalid_input(format!("Invalid Vast instance id: {id}")))?;
        let inst = self.marketplace()?.get_instance(id).await?;
        inst.ssh_spec(&self.config.vast.ssh_user, self.config.vast.ssh_key_path.as_deref())
            .ok_or_else(|| {
                AppError::vast_api(format!(
                    "Vast instance {id} has no SSH endpoint yet (status: {})",
                    inst.status()
                ))
            })
    }

    /// `vast.pick @alias [gpu=NAME] [num_gpus=N] [max_price=X]`
    pub(crate) async fn vast_pick(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let (positional, options) = split_options(args);
        let Some(alias) = positional.first().and_then(|a| a.strip_prefix('@')) else {
            return Ok(StepResult::failure(
                "Usage: vast.pick @alias [gpu=NAME] [num_gpus=N] [max_price=X]",
            ));
        };
        let mut filters = PickFilters::default();
        for (k, v) in options {
            match k {
                "gpu" => filters.gpu = Some(v.to_string()),
                "num_gpus" => match v.parse() {
                    Ok(n) => filters.num_gpus = Some(n),
                    Err(_) => return Ok(StepResult::failure(format!("Invalid num_gpus: {v}"))),
                },
                "max_price" => match v.parse() {
                    Ok(p) => filters.max_price = Some(p),
                    Err(_) => return Ok(StepResult::failure(format!("Invalid max_price: {v}"))),
                },
                other => return Ok(StepResult::failure(format!("Unknown vast.pick option: {other}"))),
            }
        }

        let mut candidates: Vec<VastInstance> = self
            .marketplace()?
            .list_instances()
            .await?
            .into_iter()
            .filter(|i| filters.matches(i))
            .collect();
        candidates.sort_by(pick_order);
        let Some(inst) = candidates.into_iter().next() else {
            return Ok(StepResult::failure(format!("No Vast instance matches {filters:?}")));
        };

        self.recipe.hosts.insert(alias.to_string(), format!("vast:{}", inst.id));
        self.ctx.variables.insert(VAR_VAST_ID.to_string(), inst.id.to_string());
        info!(alias, instance = inst.id, status = inst.status(), "picked vast instance");
        Ok(StepResult::success(format!(
            "Picked instance {} for @{alias} ({}, ${:.3}/h, {})",
            inst.id,
            inst.gpu_name.as_deref().unwrap_or("unknown GPU"),
            inst.dph_total.unwrap_or(0.0),
            inst.status()
        )))
    }

    /// `vast.start [id]`
    pub(crate) async fn vast_start(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let id = self.instance_id(args.first().map(String::as_str))?;
        let market = self.marketplace()?;
        let inst = market.get_instance(id).await?;
        if inst.is_running() {
            info!(instance = id, "vast instance already running");
        } else {
            market.start_instance(id).await?;
        }
        self.ctx.variables.insert(VAR_VAST_ID.to_string(), id.to_string());
        self.ctx.variables.insert(VAR_VAST_START_TIME.to_string(), now_timestamp());
        Ok(StepResult::success(format!("Started instance {id}")))
    }

    /// `vast.stop [id]`
    pub(crate) async fn vast_stop(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let id = self.instance_id(args.first().map(String::as_str))?;
        self.marketplace()?.stop_instance(id).await?;
        Ok(StepResult::success(format!("Stopped instance {id}")))
    }

    /// `vast.wait [id] [timeout=D]`: until running with SSH metadata.
    pub(crate) async fn vast_wait(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let (positional, options) = split_options(args);
        let mut limit = DEFAULT_READY_TIMEOUT;
        for (k, v) in options {
            match (k, parse_duration(v)) {
                ("timeout", Ok(secs)) => limit = Duration::from_secs(secs),
                ("timeout", Err(message)) => return Ok(StepResult::failure(message)),
                (other, _) => return Ok(StepResult::failure(format!("Unknown vast.wait option: {other}"))),
            }
        }
        let id = self.instance_id(positional.first().copied())?;
        let market = self.marketplace()?;
        let poll = Duration::from_secs(self.config.executor.vast_poll_secs);
        let started = Instant::now();
        let mut status = String::from("unknown");
        loop {
            match market.get_instance(id).await {
                Ok(inst) => {
                    status = inst.status().to_string();
                    let ssh = inst.ssh_spec(&self.config.vast.ssh_user, self.config.vast.ssh_key_path.as_deref());
                    if let (true, Some(spec)) = (inst.is_running(), ssh) {
                        self.ctx.variables.insert(VAR_VAST_SSH.to_string(), spec.clone());
                        return Ok(StepResult::success(format!("Instance {id} ready: {spec}")));
                    }
                }
                Err(e) => warn!(instance = id, error = %e, "vast status check failed"),
            }
            if started.elapsed() >= limit {
                return Ok(StepResult::timeout(format!(
                    "instance {id} not ready after {}s (status: {status})",
                    limit.as_secs()
                )));
            }
            info!(instance = id, status = %status, elapsed_secs = started.elapsed().as_secs(), "waiting for vast instance");
            tokio::time::sleep(poll).await;
        }
    }

    /// `vast.cost [id]`: hourly price times time since `vast.start`.
    pub(crate) async fn vast_cost(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let id = self.instance_id(args.first().map(String::as_str))?;
        let inst = self.marketplace()?.get_instance(id).await?;
        let hourly = inst.dph_total.unwrap_or(0.0);
        let hours = self
            .ctx
            .variables
            .get(VAR_VAST_START_TIME)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|start| (Utc::now() - start.with_timezone(&Utc)).num_seconds().max(0) as f64 / 3600.0)
            .unwrap_or(0.0);
        let cost = hourly * hours;
        self.ctx.variables.insert(VAR_VAST_COST.to_string(), format!("{cost:.4}"));
        Ok(StepResult::success(format!(
            "Instance {id}: ${hourly:.3}/h x {hours:.2}h = ${cost:.2}"
        )))
    }
}
