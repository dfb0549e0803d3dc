use crate::alerts::RouteSelectors;
use crate::feed::ALERTS_URL;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_FILE: &str = ".env";

/// How matched alerts are ordered in the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertOrder {
    /// First alert in the feed appears last.
    #[default]
    Reversed,
    FeedOrder,
}

impl AlertOrder {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reversed" | "reverse" => Ok(AlertOrder::Reversed),
            "feed" | "feed-order" => Ok(AlertOrder::FeedOrder),
            other => anyhow::bail!(
                "unknown ALERT_ORDER '{}', expected 'reversed' or 'feed'",
                other
            ),
        }
    }

    pub fn apply<T>(self, items: &mut [T]) {
        if self == AlertOrder::Reversed {
            items.reverse();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sender_address: String,
    pub recipient_address: String,
    pub connection_string: String,
    pub save_response: bool,
    pub sample_response_path: PathBuf,
    pub feed_url: String,
    pub selectors: RouteSelectors,
    pub order: AlertOrder,
    pub line_name: String,
    pub check_interval: Duration,
}

/// Process environment layered over an optional `.env` file.
/// Real env vars take precedence.
#[derive(Debug, Default)]
pub struct Env {
    vars: HashMap<String, String>,
    file: HashMap<String, String>,
}

impl Env {
    pub fn load() -> Self {
        let file = std::fs::read_to_string(Path::new(ENV_FILE))
            .map(|content| parse_env_file(&content))
            .unwrap_or_default();
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            file,
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            file: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .or_else(|| self.file.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(str::to_string)
            .with_context(|| format!("missing required environment variable {}", key))
    }
}

fn parse_env_file(content: &str) -> HashMap<String, String> {
    // Strip BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim().trim_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            out.insert(key.trim().to_string(), value.to_string());
        }
    }
    out
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&Env::load())
    }

    pub fn from_source(env: &Env) -> Result<Self> {
        tracing::info!("Loading config from environment");

        let selectors = match env.get("ROUTE_SELECTORS") {
            Some(raw) => {
                let listed = raw.split(',').map(str::trim).filter(|s| !s.is_empty());
                let selectors = RouteSelectors::new(listed);
                if selectors.as_slice().is_empty() {
                    anyhow::bail!("ROUTE_SELECTORS contains no selectors");
                }
                selectors
            }
            None => RouteSelectors::default(),
        };

        let order = env
            .get("ALERT_ORDER")
            .map(AlertOrder::parse)
            .transpose()?
            .unwrap_or_default();

        let check_interval = match env.get("CHECK_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("invalid CHECK_INTERVAL_SECS '{}'", raw))?;
                if secs == 0 {
                    anyhow::bail!("CHECK_INTERVAL_SECS must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(60),
        };

        Ok(Self {
            sender_address: env.require("SENDER_ADDRESS")?,
            recipient_address: env.require("RECIPIENT_ADDRESS")?,
            connection_string: env.require("COMMUNICATION_SERVICES_CONNECTION_STRING")?,
            save_response: env
                .get("SAVE_RESPONSE")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            sample_response_path: env
                .get("SAMPLE_RESPONSE_PATH")
                .unwrap_or("sample_response.json")
                .into(),
            feed_url: env.get("FEED_URL").unwrap_or(ALERTS_URL).to_string(),
            selectors,
            order,
            line_name: env.get("LINE_NAME").unwrap_or("7").to_string(),
            check_interval,
        })
    }
}
