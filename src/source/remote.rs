use crate::error::{ReaderError, Result};
use crate::http::{header_map, HttpClient};
use crate::models::PageDescriptor;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long an issued image-host assignment stays valid, and how long a
/// token-endpoint response may be reused before a round-trip is forced.
const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Resolves a chapter id to its ordered page descriptors and a page
/// descriptor to raw image bytes.
#[async_trait::async_trait]
pub trait PageListSource: Send + Sync {
    async fn list_pages(&self, chapter_id: &str) -> Result<Vec<PageDescriptor>>;

    /// Turns a page's opaque source reference into a direct image URL,
    /// exchanging an authorization token with the host when needed.
    async fn resolve_image_url(&self, source_url: &str) -> Result<String>;

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes>;
}

/// A page source reference that carries an image-host token triple:
/// `host,token_url,issued_millis,path`. References without the triple
/// are already direct image URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRef {
    pub host: String,
    pub token_url: String,
    pub issued_at: DateTime<Utc>,
    pub path: String,
}

impl HostRef {
    pub fn parse(source_url: &str) -> Option<Self> {
        let mut parts = source_url.splitn(4, ',');
        let host = parts.next()?.to_string();
        let token_url = parts.next()?.to_string();
        let millis: i64 = parts.next()?.parse().ok()?;
        let path = parts.next()?.to_string();
        let issued_at = DateTime::from_timestamp_millis(millis)?;
        Some(Self {
            host,
            token_url,
            issued_at,
            path,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{},{},{},{}",
            self.host,
            self.token_url,
            self.issued_at.timestamp_millis(),
            self.path
        )
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    base_url: String,
}

struct TokenRecord {
    host: String,
    fetched_at: Instant,
}

/// Per-endpoint bookkeeping for the time-limited host assignment scheme.
///
/// A host encoded less than five minutes ago is used as-is. Past that,
/// an endpoint response fetched within the last five minutes is reused;
/// otherwise a network round-trip is forced and its time recorded. A 504
/// from the endpoint is retried exactly once.
pub struct TokenGate {
    http: HttpClient,
    records: tokio::sync::Mutex<HashMap<String, TokenRecord>>,
}

impl TokenGate {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            records: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn valid_host(&self, host_ref: &HostRef) -> Result<String> {
        let age = Utc::now() - host_ref.issued_at;
        if age < ChronoDuration::from_std(TOKEN_TTL).expect("TTL fits chrono") {
            return Ok(host_ref.host.clone());
        }

        // The lock is held across the exchange so concurrent resolutions
        // against one endpoint cannot race each other into extra fetches.
        let mut records = self.records.lock().await;
        if let Some(record) = records.get(&host_ref.token_url) {
            if record.fetched_at.elapsed() < TOKEN_TTL {
                debug!("Reusing token host for endpoint: {}", host_ref.token_url);
                return Ok(record.host.clone());
            }
        }

        let host = self.fetch_host(&host_ref.token_url).await?;
        records.insert(
            host_ref.token_url.clone(),
            TokenRecord {
                host: host.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(host)
    }

    async fn fetch_host(&self, token_url: &str) -> Result<String> {
        info!("Requesting image host from token endpoint: {}", token_url);
        let headers = header_map(&[("Cache-Control", "no-cache")]);

        let mut response = self.http.get_unchecked(token_url, headers.clone()).await?;
        if response.status() == StatusCode::GATEWAY_TIMEOUT {
            // Known transient failure mode of the upstream token service.
            warn!("Token endpoint returned 504, retrying once: {}", token_url);
            response = self.http.get_unchecked(token_url, headers).await?;
        }

        if response.status() == StatusCode::GATEWAY_TIMEOUT {
            return Err(ReaderError::token_exchange(format!(
                "504 from {} after retry",
                token_url
            )));
        }
        if !response.status().is_success() {
            return Err(ReaderError::token_exchange(format!(
                "{} from {}",
                response.status(),
                token_url
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.base_url)
    }
}

/// HTTP-backed page-list source for remote chapters.
pub struct HttpPageListSource {
    http: HttpClient,
    api_url: String,
    tokens: TokenGate,
}

impl HttpPageListSource {
    pub fn new(http: HttpClient, api_url: impl Into<String>) -> Self {
        let tokens = TokenGate::new(http.clone());
        Self {
            http,
            api_url: api_url.into(),
            tokens,
        }
    }
}

#[async_trait::async_trait]
impl PageListSource for HttpPageListSource {
    async fn list_pages(&self, chapter_id: &str) -> Result<Vec<PageDescriptor>> {
        let url = format!("{}/chapter/{}/pages", self.api_url, chapter_id);
        debug!("Fetching page list: {}", url);
        let pages: Vec<PageDescriptor> = self.http.get_json(&url).await?;
        Ok(pages)
    }

    async fn resolve_image_url(&self, source_url: &str) -> Result<String> {
        match HostRef::parse(source_url) {
            Some(host_ref) => {
                let host = self.tokens.valid_host(&host_ref).await?;
                Ok(format!("{}{}", host, host_ref.path))
            }
            None => Ok(source_url.to_string()),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        // The page cache is authoritative; keep transports from caching.
        let headers = header_map(&[("Cache-Control", "no-store")]);
        self.http.get_bytes(url, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    fn http() -> HttpClient {
        HttpClient::new(&HttpConfig {
            timeout_secs: 5,
            connect_timeout_secs: 5,
            user_agent: None,
        })
    }

    fn host_ref(token_url: &str, age: ChronoDuration) -> HostRef {
        HostRef {
            host: "https://stale.example".to_string(),
            token_url: token_url.to_string(),
            issued_at: Utc::now() - age,
            path: "/data/p1.jpg".to_string(),
        }
    }

    #[test]
    fn host_ref_round_trips() {
        let reference = host_ref("https://t.example/token", ChronoDuration::minutes(1));
        let parsed = HostRef::parse(&reference.encode()).unwrap();
        assert_eq!(parsed.host, reference.host);
        assert_eq!(parsed.token_url, reference.token_url);
        assert_eq!(parsed.path, reference.path);
    }

    #[test]
    fn plain_urls_are_not_host_refs() {
        assert!(HostRef::parse("https://img.example/direct.png").is_none());
    }

    #[tokio::test]
    async fn fresh_timestamp_uses_encoded_host_without_network() {
        // No server at all: a network call would fail the resolution.
        let gate = TokenGate::new(http());
        let reference = host_ref("http://127.0.0.1:1/token", ChronoDuration::minutes(1));
        assert_eq!(
            gate.valid_host(&reference).await.unwrap(),
            "https://stale.example"
        );
    }

    #[tokio::test]
    async fn stale_timestamp_forces_one_round_trip_then_reuses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/token")
            .with_status(200)
            .with_body(r#"{"base_url":"https://fresh.example"}"#)
            .expect(1)
            .create_async()
            .await;

        let gate = TokenGate::new(http());
        let token_url = format!("{}/token", server.url());
        let reference = host_ref(&token_url, ChronoDuration::minutes(6));

        assert_eq!(
            gate.valid_host(&reference).await.unwrap(),
            "https://fresh.example"
        );
        // Recorded round-trip is recent: the second resolution reuses it.
        assert_eq!(
            gate.valid_host(&reference).await.unwrap(),
            "https://fresh.example"
        );
        mock.assert_async().await;
    }

    /// Serves the given status/body pairs to consecutive connections,
    /// then stops accepting. Needed because the 504 retry sees two
    /// different responses on the same URL.
    async fn serve_statuses(responses: Vec<(u16, &'static str)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let reason = if status == 504 { "Gateway Timeout" } else { "OK" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn gateway_timeout_is_retried_exactly_once() {
        let base = serve_statuses(vec![
            (504, ""),
            (200, r#"{"base_url":"https://retried.example"}"#),
        ])
        .await;

        let gate = TokenGate::new(http());
        let token_url = format!("{}/token", base);
        let reference = host_ref(&token_url, ChronoDuration::minutes(6));

        assert_eq!(
            gate.valid_host(&reference).await.unwrap(),
            "https://retried.example"
        );
    }

    #[tokio::test]
    async fn second_gateway_timeout_propagates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/token")
            .with_status(504)
            .expect(2)
            .create_async()
            .await;

        let gate = TokenGate::new(http());
        let token_url = format!("{}/token", server.url());
        let reference = host_ref(&token_url, ChronoDuration::minutes(6));

        assert!(matches!(
            gate.valid_host(&reference).await,
            Err(ReaderError::TokenExchangeFailed(_))
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn resolve_combines_host_and_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/token")
            .with_status(200)
            .with_body(r#"{"base_url":"https://assigned.example"}"#)
            .create_async()
            .await;

        let source = HttpPageListSource::new(http(), "https://api.example");
        let reference = HostRef {
            host: "https://stale.example".to_string(),
            token_url: format!("{}/token", server.url()),
            issued_at: Utc::now() - ChronoDuration::minutes(10),
            path: "/data/p7.png".to_string(),
        };

        let resolved = source.resolve_image_url(&reference.encode()).await.unwrap();
        assert_eq!(resolved, "https://assigned.example/data/p7.png");
    }

    #[tokio::test]
    async fn list_pages_parses_descriptors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chapter/ch-9/pages")
            .with_status(200)
            .with_body(r#"[{"index":5,"url":"a"},{"index":9,"url":"b","image_url":"https://img.example/b"}]"#)
            .create_async()
            .await;

        let source = HttpPageListSource::new(http(), server.url());
        let pages = source.list_pages("ch-9").await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].image_url.as_deref(), Some("https://img.example/b"));
    }
}
