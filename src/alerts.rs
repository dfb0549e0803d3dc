use crate::feed::{Entity, Feed, TranslatedString};

pub const DEFAULT_SORT_ORDER: &str = "MTASBWY:7:20";
const ENGLISH: &str = "en";

/// Exact `sort_order` strings that select an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelectors(Vec<String>);

impl RouteSelectors {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for selector in selectors {
            let selector = selector.into();
            if !out.contains(&selector) {
                out.push(selector);
            }
        }
        Self(out)
    }

    pub fn matches(&self, sort_order: &str) -> bool {
        self.0.iter().any(|s| s == sort_order)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for RouteSelectors {
    fn default() -> Self {
        Self::new([DEFAULT_SORT_ORDER])
    }
}

/// Header and active period pulled from one alert; either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertDetail {
    pub header: Option<String>,
    pub active_period: Option<String>,
}

/// An alert with both fields present, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAlert {
    pub header: String,
    pub active_period: String,
}

impl AlertDetail {
    pub fn complete(self) -> Option<ActiveAlert> {
        Some(ActiveAlert {
            header: self.header?,
            active_period: self.active_period?,
        })
    }
}

/// Entities with at least one informed entity matching a selector, in feed order.
pub fn filter<'a>(feed: &'a Feed, selectors: &RouteSelectors) -> Vec<&'a Entity> {
    feed.entity
        .iter()
        .filter(|entity| {
            entity
                .informed_entities()
                .iter()
                .any(|ie| ie.sort_order().is_some_and(|so| selectors.matches(so)))
        })
        .collect()
}

/// Text of the first English translation. Later English entries are ignored.
pub fn english_text(translated: &TranslatedString) -> Option<&str> {
    translated
        .translation
        .iter()
        .find(|t| t.language.as_deref() == Some(ENGLISH))
        .and_then(|t| t.text.as_deref())
}

pub fn extract(entity: &Entity) -> AlertDetail {
    let alert = entity.alert.as_ref();

    let header = alert
        .and_then(|a| a.header_text.as_ref())
        .and_then(english_text)
        .map(str::to_string);

    let active_period = alert
        .and_then(|a| a.mercury_alert.as_ref())
        .and_then(|m| m.human_readable_active_period.as_ref())
        .and_then(english_text)
        .map(str::to_string);

    AlertDetail {
        header,
        active_period,
    }
}

/// Filter, extract and keep only complete alerts, preserving feed order.
pub fn collect_active_alerts(feed: &Feed, selectors: &RouteSelectors) -> Vec<ActiveAlert> {
    filter(feed, selectors)
        .into_iter()
        .filter_map(|entity| {
            let complete = extract(entity).complete();
            if complete.is_none() {
                tracing::debug!(
                    "Skipping incomplete alert {}",
                    entity.id.as_deref().unwrap_or("<no id>")
                );
            }
            complete
        })
        .collect()
}
