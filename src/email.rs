use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::{Client, Url};
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2023-03-31";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub content: EmailContent,
    pub recipients: Recipients,
    pub sender_address: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailContent {
    pub subject: String,
    pub plain_text: String,
    pub html: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<EmailAddress>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub address: String,
    pub display_name: String,
}

#[derive(Deserialize, Debug)]
struct SendResponse {
    id: String,
}

/// Sends a rendered message, returning the provider's operation id.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String>;
}

/// Parsed `endpoint=...;accesskey=...` connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub endpoint: Url,
    access_key: Vec<u8>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut endpoint = None;
        let mut access_key = None;

        for part in raw.split(';') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim()),
                "accesskey" => access_key = Some(value.trim()),
                _ => {}
            }
        }

        let endpoint = endpoint.context("connection string is missing endpoint")?;
        let access_key = access_key.context("connection string is missing accesskey")?;

        Ok(Self {
            endpoint: Url::parse(endpoint)
                .with_context(|| format!("invalid endpoint in connection string: {}", endpoint))?,
            access_key: base64::engine::general_purpose::STANDARD
                .decode(access_key)
                .context("Failed to decode access key base64")?,
        })
    }
}

/// Azure Communication Services email client using HMAC request signing.
pub struct AcsEmailClient {
    client: Client,
    connection: ConnectionString,
}

impl AcsEmailClient {
    pub fn new(connection: ConnectionString) -> Self {
        Self {
            client: Client::new(),
            connection,
        }
    }

    fn send_url(&self) -> Url {
        // `join` would read "emails:" as a scheme
        let mut url = self.connection.endpoint.clone();
        let path = format!("{}/emails:send", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(Some(&format!("api-version={}", API_VERSION)));
        url
    }
}

/// Headers for a signed request: `x-ms-date`, `x-ms-content-sha256`, `Authorization`.
pub fn sign_request(
    key: &[u8],
    method: &str,
    url: &Url,
    date: &str,
    body: &[u8],
) -> Result<Vec<(String, String)>> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let content_hash = b64.encode(digest::digest(&digest::SHA256, body));
    let host = url.host_str().context("url has no host")?;
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let string_to_sign = string_to_sign(method, url, date, &host, &content_hash);
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let signature = b64.encode(hmac::sign(&key, string_to_sign.as_bytes()));

    Ok(vec![
        ("x-ms-date".to_string(), date.to_string()),
        ("x-ms-content-sha256".to_string(), content_hash),
        (
            "Authorization".to_string(),
            format!(
                "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature={}",
                signature
            ),
        ),
    ])
}

fn string_to_sign(method: &str, url: &Url, date: &str, host: &str, content_hash: &str) -> String {
    let path_and_query = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    format!(
        "{}\n{}\n{};{};{}",
        method, path_and_query, date, host, content_hash
    )
}

#[async_trait]
impl Notifier for AcsEmailClient {
    async fn send(&self, message: &EmailMessage) -> Result<String> {
        let url = self.send_url();
        let body = serde_json::to_vec(message)?;
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let mut request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        let headers = sign_request(&self.connection.access_key, "POST", &url, &date, &body)?;
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let resp = request
            .body(body)
            .send()
            .await
            .context("email send request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("email service rejected message ({}): {}", status, body);
        }

        let sent: SendResponse = resp
            .json()
            .await
            .context("failed to parse email send response")?;
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION: &str =
        "endpoint=https://alerts.unitedstates.communication.azure.com/;accesskey=c2VjcmV0LWtleQ==";

    #[test]
    fn parses_connection_string() {
        let conn = ConnectionString::parse(CONNECTION).unwrap();
        assert_eq!(
            conn.endpoint.host_str(),
            Some("alerts.unitedstates.communication.azure.com")
        );
        assert_eq!(conn.access_key, b"secret-key");
    }

    #[test]
    fn connection_string_keys_are_case_insensitive() {
        let conn = ConnectionString::parse(
            "AccessKey=c2VjcmV0LWtleQ==; Endpoint=https://example.communication.azure.com/",
        )
        .unwrap();
        assert_eq!(conn.endpoint.host_str(), Some("example.communication.azure.com"));
    }

    #[test]
    fn rejects_incomplete_connection_string() {
        assert!(ConnectionString::parse("endpoint=https://example.com/").is_err());
        assert!(ConnectionString::parse("accesskey=c2VjcmV0").is_err());
        assert!(ConnectionString::parse("endpoint=https://example.com/;accesskey=***").is_err());
    }

    #[test]
    fn send_url_includes_api_version() {
        let client = AcsEmailClient::new(ConnectionString::parse(CONNECTION).unwrap());
        let url = client.send_url();
        assert_eq!(
            url.as_str(),
            "https://alerts.unitedstates.communication.azure.com/emails:send?api-version=2023-03-31"
        );
    }

    #[test]
    fn string_to_sign_layout() {
        let url = Url::parse("https://example.com/emails:send?api-version=2023-03-31").unwrap();
        let date = "Mon, 19 Oct 2026 11:00:00 GMT";
        let s = string_to_sign("POST", &url, date, "example.com", "abc=");
        assert_eq!(
            s,
            format!(
                "POST\n/emails:send?api-version=2023-03-31\n{};example.com;abc=",
                date
            )
        );
    }

    #[test]
    fn signed_headers() {
        let url = Url::parse("https://example.com/emails:send?api-version=2023-03-31").unwrap();
        let date = "Mon, 19 Oct 2026 11:00:00 GMT";
        let headers = sign_request(b"secret-key", "POST", &url, date, b"").unwrap();

        assert_eq!(headers[0], ("x-ms-date".to_string(), date.to_string()));
        // SHA-256 of the empty body
        assert_eq!(headers[1].1, "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
        let expected_prefix =
            "HMAC-SHA256 SignedHeaders=x-ms-date;host;x-ms-content-sha256&Signature=";
        assert!(headers[2].1.starts_with(expected_prefix));

        let again = sign_request(b"secret-key", "POST", &url, date, b"").unwrap();
        assert_eq!(headers, again);
        let other_key = sign_request(b"other-key", "POST", &url, date, b"").unwrap();
        assert_ne!(headers[2], other_key[2]);
    }
}
