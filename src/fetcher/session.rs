//! Browser-like crawl session: cookie jar, user-agent rotation and the
//! single 403 retry.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::app::Result;
use crate::fetcher::{FetchResponse, Fetcher};

pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Random pause drawn from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let millis = rand::rng().random_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(millis as u64)
    }

    pub async fn sleep(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Pause after the homepage warm-up request.
    pub warm_up: Backoff,
    /// Pause before retrying a 403.
    pub forbidden: Backoff,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            warm_up: Backoff::new(Duration::from_secs(2), Duration::from_secs(5)),
            forbidden: Backoff::new(Duration::from_secs(3), Duration::from_secs(10)),
        }
    }
}

impl SessionTiming {
    pub fn immediate() -> Self {
        Self {
            warm_up: Backoff::none(),
            forbidden: Backoff::none(),
        }
    }
}

/// Cookie jar and identity for one run. Never shared across runs.
#[derive(Debug)]
pub struct Session {
    jar: Arc<Jar>,
    user_agent: &'static str,
    timing: SessionTiming,
}

impl Session {
    pub fn new(timing: SessionTiming) -> Self {
        Self {
            jar: Arc::new(Jar::default()),
            user_agent: random_user_agent(),
            timing,
        }
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }

    /// True when the jar holds a live cookie that would be sent to `url`.
    pub fn has_cookies_for(&self, url: &str) -> bool {
        self.cookie_header(url).is_some()
    }

    /// `Cookie` header value for a request to `url`.
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.jar
            .cookies(&url)
            .and_then(|value| value.to_str().ok().map(String::from))
            .filter(|value| !value.is_empty())
    }

    /// Store the `Set-Cookie` headers of a response from `url`. Expired
    /// cookies remove earlier ones with the same name.
    pub fn absorb_cookies(&self, url: &str, set_cookies: &[String]) {
        let Ok(url) = Url::parse(url) else {
            return;
        };
        for raw in set_cookies {
            self.jar.add_cookie_str(raw, &url);
        }
    }

    /// Drop all cookies and pick a new user agent.
    pub fn reset(&mut self) {
        self.jar = Arc::new(Jar::default());
        self.user_agent = random_user_agent();
    }

    pub fn browser_headers(&self, url: &str, referer: Option<&str>) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.to_string()),
            ("Accept".to_string(), ACCEPT_HTML.to_string()),
            ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
            ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
            ("Sec-Fetch-Dest".to_string(), "document".to_string()),
            ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
            (
                "Sec-Fetch-Site".to_string(),
                if referer.is_some() { "same-origin" } else { "none" }.to_string(),
            ),
            ("Cache-Control".to_string(), "max-age=0".to_string()),
        ];
        if let Some(referer) = referer {
            headers.push(("Referer".to_string(), referer.to_string()));
        }
        if let Some(cookie) = self.cookie_header(url) {
            headers.push(("Cookie".to_string(), cookie));
        }
        headers
    }

    /// Visit the homepage to collect cookies, then pause.
    pub async fn warm_up<F>(&mut self, fetcher: &F, homepage: &str) -> Result<()>
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        tracing::debug!("Warming up session against {}", homepage);
        let response = fetcher.fetch(homepage, &self.browser_headers(homepage, None)).await?;
        self.absorb_cookies(homepage, &response.set_cookies);
        self.timing.warm_up.sleep().await;
        response.into_body(homepage).map(|_| ())
    }

    async fn get<F>(&mut self, fetcher: &F, url: &str, referer: Option<&str>) -> Result<FetchResponse>
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        let response = fetcher.fetch(url, &self.browser_headers(url, referer)).await?;
        self.absorb_cookies(url, &response.set_cookies);
        Ok(response)
    }

    /// GET with browser headers. A 403 is retried exactly once after a reset,
    /// a random pause and a fresh warm-up against `homepage`.
    pub async fn get_with_retry<F>(
        &mut self,
        fetcher: &F,
        url: &str,
        referer: Option<&str>,
        homepage: &str,
    ) -> Result<Vec<u8>>
    where
        F: Fetcher + Send + Sync + ?Sized,
    {
        let response = self.get(fetcher, url, referer).await?;
        if response.status != 403 {
            return response.into_body(url);
        }

        tracing::warn!("403 for {}, retrying with a fresh session", url);
        self.reset();
        self.timing.forbidden.sleep().await;
        if let Err(e) = self.warm_up(fetcher, homepage).await {
            tracing::debug!("Warm-up before retry failed: {}", e);
        }

        self.get(fetcher, url, referer).await?.into_body(url)
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
