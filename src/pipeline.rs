use crate::alerts::{self, RouteSelectors};
use crate::config::{AlertOrder, Config};
use crate::email::Notifier;
use crate::feed::{Feed, FeedSource};
use crate::notification::Formatter;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a single check ended. Every variant is a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    FetchFailed,
    ParseFailed,
    NothingToReport,
    Sent { operation_id: String, alerts: usize },
    SendFailed,
    Unexpected,
}

/// One alert check: fetch, select, render, send.
///
/// Holds only immutable configuration so it can be shared across ticks.
pub struct AlertCheck {
    source: Box<dyn FeedSource>,
    notifier: Box<dyn Notifier>,
    selectors: RouteSelectors,
    order: AlertOrder,
    formatter: Formatter,
    sender: String,
    recipient: String,
    save_response: Option<PathBuf>,
}

impl AlertCheck {
    pub fn new(config: &Config, source: Box<dyn FeedSource>, notifier: Box<dyn Notifier>) -> Self {
        Self {
            source,
            notifier,
            selectors: config.selectors.clone(),
            order: config.order,
            formatter: Formatter::new(config.line_name.clone()),
            sender: config.sender_address.clone(),
            recipient: config.recipient_address.clone(),
            save_response: config
                .save_response
                .then(|| config.sample_response_path.clone()),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> RunOutcome {
        tracing::info!("Alert check starting at: {}", Utc::now().to_rfc3339());
        let outcome = self.check().await;
        tracing::info!("Alert check completed at: {}", Utc::now().to_rfc3339());
        outcome
    }

    async fn check(&self) -> RunOutcome {
        tracing::info!("Fetching alerts from MTA...");
        let body = match self.source.fetch().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to fetch alerts: {}", e);
                return RunOutcome::FetchFailed;
            }
        };

        let raw: serde_json::Value = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("Failed to parse JSON response: {}", e);
                return RunOutcome::ParseFailed;
            }
        };
        tracing::info!("Successfully retrieved alerts");
        tracing::info!("Response contains {} characters", body.chars().count());

        if let Some(path) = &self.save_response {
            save_sample(path, &raw).await;
        }

        let feed = match Feed::from_value(raw) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::error!("Failed to parse alert feed: {}", e);
                return RunOutcome::ParseFailed;
            }
        };

        let mut active = alerts::collect_active_alerts(&feed, &self.selectors);
        tracing::info!(
            "Found {} active alerts in {} entities",
            active.len(),
            feed.entity.len()
        );
        self.order.apply(&mut active);

        let Some(payload) = self.formatter.format(active, &self.recipient, &self.sender) else {
            tracing::info!("No active alerts to report");
            return RunOutcome::NothingToReport;
        };

        let count = payload.alerts.len();
        match self.notifier.send(&payload.to_message()).await {
            Ok(operation_id) => {
                tracing::info!("Email sent for {} alerts, operation id {}", count, operation_id);
                RunOutcome::Sent {
                    operation_id,
                    alerts: count,
                }
            }
            Err(e) => {
                tracing::error!("Failed to send email: {:#}", e);
                RunOutcome::SendFailed
            }
        }
    }
}

/// Runs one check on its own task so a panic is logged instead of
/// taking the scheduler down.
pub async fn run_tick(check: Arc<AlertCheck>) -> RunOutcome {
    let handle = tokio::spawn(async move { check.run().await });
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Unexpected error: {}", e);
            RunOutcome::Unexpected
        }
    }
}

async fn save_sample(path: &Path, raw: &serde_json::Value) {
    tracing::info!("Saving sample response to {}", path.display());

    let pretty = match serde_json::to_string_pretty(raw) {
        Ok(pretty) => pretty,
        Err(e) => {
            tracing::error!("Failed to save sample response: {}", e);
            return;
        }
    };

    match tokio::fs::write(path, pretty).await {
        Ok(()) => tracing::info!("Sample response saved successfully"),
        Err(e) => tracing::error!("Failed to save sample response: {}", e),
    }
}
