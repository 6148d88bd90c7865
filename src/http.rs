use crate::config::HttpConfig;
use crate::error::{ReaderError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Yomu/1.0 (Manga Reader)";

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(
                config
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get_raw(url, HeaderMap::new()).await?;
        let value = response.json::<T>().await?;
        Ok(value)
    }

    pub async fn get_bytes(&self, url: &str, headers: HeaderMap) -> Result<Bytes> {
        let response = self.get_raw(url, headers).await?;
        let bytes = response.bytes().await?;
        Ok(bytes)
    }

    /// Issues a GET and checks the status, but leaves body handling to
    /// the caller. Callers that need the raw status (the token gate and
    /// its 504 handling) use `get_unchecked` instead.
    pub async fn get_raw(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        let response = self.get_unchecked(url, headers).await?;

        if !response.status().is_success() {
            return Err(ReaderError::Http(response.error_for_status().unwrap_err()));
        }

        Ok(response)
    }

    pub async fn get_unchecked(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        let response = self.client.get(url).headers(headers).send().await?;
        Ok(response)
    }
}

pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}
