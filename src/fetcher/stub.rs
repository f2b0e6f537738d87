//! Scripted fetcher for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{FreshetError, Result};
use crate::fetcher::{FetchResponse, Fetcher};

#[derive(Default)]
pub struct StubFetcher {
    /// Responses per URL. The last one repeats.
    responses: Mutex<HashMap<String, Vec<FetchResponse>>>,
    failures: HashMap<String, String>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
    delay: Option<Duration>,
    timeout: Mutex<Option<Duration>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, response: FetchResponse) -> Self {
        self.respond_seq(url, vec![response])
    }

    pub fn respond_seq(self, url: &str, responses: Vec<FetchResponse>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), responses);
        self
    }

    pub fn html(self, url: &str, body: &str) -> Self {
        self.respond(url, FetchResponse::ok(body.as_bytes().to_vec()))
    }

    /// Transport-level failure, as on a timeout.
    pub fn fail(mut self, url: &str, message: &str) -> Self {
        self.failures.insert(url.to_string(), message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Last timeout handed over by `set_timeout`.
    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock().unwrap()
    }

    pub fn headers_for(&self, url: &str) -> Option<Vec<(String, String)>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, h)| h.clone())
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failures.get(url) {
            return Err(FreshetError::Other(message.clone()));
        }

        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
            Some(queue) => Ok(queue[0].clone()),
            None => Ok(FetchResponse::status(404)),
        }
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock().unwrap() = Some(timeout);
    }
}
