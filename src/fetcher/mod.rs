pub mod http_fetcher;
pub mod parallel;
pub mod session;
#[cfg(test)]
pub mod stub;

use std::time::Duration;

use async_trait::async_trait;

use crate::app::{FreshetError, Result};

/// Raw HTTP answer. Non-2xx statuses are returned, not raised, so callers can
/// react to 403s.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Raw `Set-Cookie` header values.
    pub set_cookies: Vec<String>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            set_cookies: Vec::new(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            set_cookies: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Body of a successful response, or an `HttpStatus` error.
    pub fn into_body(self, url: &str) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(FreshetError::HttpStatus {
                status: self.status,
                url: url.to_string(),
            })
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchResponse>;

    /// Timeout applied to every later request. Called at the start of each run.
    fn set_timeout(&self, _timeout: Duration) {}
}
