//! `notify` and `sleep`

use std::time::Duration;

use tracing::warn;

use crate::error::AppError;
use crate::notify::{Notification, NotifyLevel};
use crate::recipe::execution::Executor;
use crate::recipe::parser::{format_duration, parse_duration};
use crate::recipe::types::StepResult;

const NOTIFY_USAGE: &str = "Usage: notify <message> [title=T] [level=info|success|warning|error] [channels=a,b]";

impl Executor {
    /// Delivery problems are logged; they never fail the recipe.
    pub(crate) async fn notify(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        if !self.config.notifications.enabled {
            return Ok(StepResult::success("Notifications disabled"));
        }
        let mut words = Vec::new();
        let mut title = None;
        let mut level = NotifyLevel::Info;
        let mut channels = None;
        for arg in args {
            if let Some(v) = arg.strip_prefix("title=") {
                title = Some(v.to_string());
            } else if let Some(v) = arg.strip_prefix("level=") {
                level = match v.parse() {
                    Ok(level) => level,
                    Err(e) => return Ok(StepResult::failure(format!("{}. {NOTIFY_USAGE}", e.message))),
                };
            } else if let Some(v) = arg.strip_prefix("channels=") {
                channels = Some(
                    v.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect::<Vec<_>>(),
                );
            } else {
                words.push(arg.as_str());
            }
        }
        if words.is_empty() {
            return Ok(StepResult::failure(NOTIFY_USAGE));
        }

        let notification = Notification {
            title: title.unwrap_or_else(|| format!("trainsh: {}", self.recipe.name)),
            message: words.join(" "),
            level,
            channels: channels.unwrap_or_else(|| self.config.notifications.default_channels.clone()),
        };
        match self.services.notifier.notify(&notification).await {
            Ok(outcome) => {
                if !outcome.ok {
                    warn!(summary = %outcome.summary, "notification partly failed");
                }
                Ok(StepResult::success(outcome.summary))
            }
            Err(e) => {
                warn!(error = %e, "notification not sent");
                Ok(StepResult::success(format!("Notification not sent: {}", e.message)))
            }
        }
    }

    /// `sleep D`
    pub(crate) async fn sleep(&mut self, args: &[String]) -> Result<StepResult, AppError> {
        let [duration] = args else {
            return Ok(StepResult::failure("Usage: sleep <duration>"));
        };
        let secs = match parse_duration(duration) {
            Ok(secs) => secs,
            Err(message) => return Ok(StepResult::failure(message)),
        };
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(StepResult::success(format!("Slept {}", format_duration(secs))))
    }
}
