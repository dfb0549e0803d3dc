use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::fmt;

pub const ALERTS_URL: &str =
    "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/camsys%2Fsubway-alerts.json";

/// Root of the GTFS-realtime alert feed in its JSON rendition.
///
/// Every level is defaulted so that absent keys deserialize to empty values
/// instead of failing the whole feed.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Feed {
    pub entity: Vec<Entity>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Entity {
    #[serde(deserialize_with = "string_or_none")]
    pub id: Option<String>,
    pub alert: Option<Alert>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Alert {
    pub header_text: Option<TranslatedString>,
    pub informed_entity: Vec<InformedEntity>,
    #[serde(rename = "transit_realtime.mercury_alert")]
    pub mercury_alert: Option<MercuryAlert>,
}

/// MTA extension carried on each alert.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct MercuryAlert {
    pub human_readable_active_period: Option<TranslatedString>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct TranslatedString {
    pub translation: Vec<Translation>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct Translation {
    #[serde(deserialize_with = "string_or_none")]
    pub language: Option<String>,
    #[serde(deserialize_with = "string_or_none")]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct InformedEntity {
    #[serde(deserialize_with = "string_or_none")]
    pub agency_id: Option<String>,
    #[serde(deserialize_with = "string_or_none")]
    pub route_id: Option<String>,
    #[serde(deserialize_with = "string_or_none")]
    pub stop_id: Option<String>,
    #[serde(rename = "transit_realtime.mercury_entity_selector")]
    pub mercury_entity_selector: Option<MercuryEntitySelector>,
}

/// Selector whose `sort_order` encodes agency, route and segment,
/// e.g. `MTASBWY:7:20`.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct MercuryEntitySelector {
    #[serde(deserialize_with = "string_or_none")]
    pub sort_order: Option<String>,
}

/// Keeps string values; any other JSON type reads as absent.
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

impl Feed {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

impl Entity {
    pub fn informed_entities(&self) -> &[InformedEntity] {
        self.alert
            .as_ref()
            .map(|alert| alert.informed_entity.as_slice())
            .unwrap_or_default()
    }
}

impl InformedEntity {
    pub fn sort_order(&self) -> Option<&str> {
        self.mercury_entity_selector
            .as_ref()
            .and_then(|selector| selector.sort_order.as_deref())
    }
}

#[derive(Debug)]
pub enum FetchError {
    Transport(reqwest::Error),
    Status(reqwest::StatusCode),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(e) => write!(f, "request failed: {}", e),
            FetchError::Status(status) => write!(f, "feed returned {}", status),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport(e) => Some(e),
            FetchError::Status(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e)
    }
}

/// Source of the raw alert feed body.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;
}

pub struct HttpFeedSource {
    client: Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_example() {
        let content = fs::read_to_string("example.json").expect("Failed to read example.json");
        let feed = Feed::from_json(&content).expect("Failed to parse feed");

        assert_eq!(feed.entity.len(), 4);

        let first = &feed.entity[0];
        assert_eq!(first.id.as_deref(), Some("lmm:planned_work:21577"));
        let sort_orders: Vec<_> = first
            .informed_entities()
            .iter()
            .filter_map(InformedEntity::sort_order)
            .collect();
        assert_eq!(sort_orders, vec!["MTASBWY:7:20", "MTASBWY:7:20"]);

        let period = first
            .alert
            .as_ref()
            .and_then(|a| a.mercury_alert.as_ref())
            .and_then(|m| m.human_readable_active_period.as_ref())
            .expect("active period present");
        assert_eq!(period.translation.len(), 2);
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let feed = Feed::from_json(r#"{"header": {"gtfs_realtime_version": "1.0"}}"#).unwrap();
        assert!(feed.entity.is_empty());

        let feed = Feed::from_json(r#"{"entity": [{"id": "a"}, {"alert": {}}]}"#).unwrap();
        assert_eq!(feed.entity.len(), 2);
        assert!(feed.entity[0].informed_entities().is_empty());
        assert!(feed.entity[1].informed_entities().is_empty());
    }

    #[test]
    fn selector_without_sort_order() {
        let feed = Feed::from_json(
            r#"{"entity": [{"alert": {"informed_entity": [
                {"route_id": "7"},
                {"transit_realtime.mercury_entity_selector": {}}
            ]}}]}"#,
        )
        .unwrap();
        let informed = feed.entity[0].informed_entities();
        assert_eq!(informed.len(), 2);
        assert!(informed.iter().all(|ie| ie.sort_order().is_none()));
    }

    #[test]
    fn rejects_malformed_body() {
        assert!(Feed::from_json("<html>Service Unavailable</html>").is_err());
        assert!(Feed::from_json(r#"{"entity": "nope"}"#).is_err());
    }

    #[test]
    fn non_string_identifiers_read_as_absent() {
        let feed = Feed::from_json(
            r#"{"entity": [{
                "id": 21577,
                "alert": {
                    "informed_entity": [
                        {"agency_id": "MTASBWY", "route_id": 7, "stop_id": null,
                         "transit_realtime.mercury_entity_selector": {"sort_order": 720}},
                        {"route_id": "7",
                         "transit_realtime.mercury_entity_selector": {"sort_order": "MTASBWY:7:20"}}
                    ],
                    "header_text": {"translation": [{"language": "en", "text": "Delays"}]}
                }
            }]}"#,
        )
        .expect("feed with numeric identifiers parses");

        let entity = &feed.entity[0];
        assert!(entity.id.is_none());

        let informed = entity.informed_entities();
        assert_eq!(informed[0].agency_id.as_deref(), Some("MTASBWY"));
        assert!(informed[0].route_id.is_none());
        assert!(informed[0].stop_id.is_none());
        assert!(informed[0].sort_order().is_none());
        assert_eq!(informed[1].sort_order(), Some("MTASBWY:7:20"));
    }

    /// Serves one canned HTTP response on a local port and returns its URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                concat!(
                    "HTTP/1.1 {}\r\n",
                    "Content-Type: application/json\r\n",
                    "Content-Length: {}\r\n",
                    "Connection: close\r\n",
                    "\r\n",
                    "{}"
                ),
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/alerts.json", addr)
    }

    #[tokio::test]
    async fn http_source_returns_body() {
        let url = serve_once("200 OK", r#"{"entity": []}"#).await;
        let body = HttpFeedSource::new(url).fetch().await.unwrap();
        assert_eq!(body, r#"{"entity": []}"#);
    }

    #[tokio::test]
    async fn http_source_rejects_error_status() {
        let url = serve_once("503 Service Unavailable", "busy").await;
        match HttpFeedSource::new(url).fetch().await {
            Err(FetchError::Status(status)) => {
                assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE)
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn http_source_reports_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = HttpFeedSource::new(format!("http://{}/alerts.json", addr))
            .fetch()
            .await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
