use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use reqwest::{redirect, Client};

use crate::app::Result;
use crate::fetcher::{FetchResponse, Fetcher};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_REDIRECTS: usize = 5;

pub struct HttpFetcher {
    client: Client,
    timeout_ms: AtomicU64,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("freshet/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchResponse> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    header_map.insert(name, value);
                }
                _ => tracing::debug!("Skipping invalid header {}", name),
            }
        }

        let response = self
            .client
            .get(url)
            .headers(header_map)
            .timeout(self.timeout())
            .send()
            .await?;
        let status = response.status().as_u16();

        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();

        let body = response.bytes().await?.to_vec();

        Ok(FetchResponse {
            status,
            body,
            set_cookies,
        })
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(timeout.as_millis() as u64, Ordering::Relaxed);
    }
}
