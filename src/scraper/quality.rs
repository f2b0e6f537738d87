//! Deterministic quality gate for extracted article bodies.

use html_escape::{encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;

/// Markers of interstitials, paywalls and bot walls. Matched case-insensitively.
pub const BLOCKED_MARKERS: &[&str] = &[
    "bg-charcoal-25 absolute left-0 top-0",
    "Please enable JavaScript",
    "Access denied",
    "Cloudflare",
    "Loading...",
    "Subscribe to continue",
    "Register to read",
];

/// Tickers whose `SYMBOL$` form marks a price ticker widget.
pub const PRICE_TICKERS: &[&str] = &[
    "TRX", "DOGE", "ADA", "HYPE", "WBT", "BTC", "ETH", "SOL", "XRP", "USDC", "USDT",
];

/// More hits than this and the text is a price widget.
pub const PRICE_WIDGET_THRESHOLD: usize = 3;

/// Feed-path floor for plain text.
pub const MIN_FEED_TEXT: usize = 200;

static PRICE_HIT: Lazy<Regex> = Lazy::new(|| {
    let tickers = PRICE_TICKERS.join("|");
    Regex::new(&format!(
        r"\b(?:{})\$|(?:^|[^\w.])[+\-]\d+(?:\.\d+)?%",
        tickers
    ))
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Blocked,
    PriceWidget,
    TooThin,
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        *self == Verdict::Ok
    }
}

pub fn is_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    BLOCKED_MARKERS
        .iter()
        .any(|marker| lower.contains(&marker.to_lowercase()))
}

pub fn price_widget_hits(text: &str) -> usize {
    PRICE_HIT.find_iter(text).count()
}

pub fn is_price_widget(text: &str) -> bool {
    price_widget_hits(text) > PRICE_WIDGET_THRESHOLD
}

/// Classify a body. `min_text` of zero disables the length check.
pub fn assess(html: &str, text: &str, min_text: usize) -> Verdict {
    if is_blocked(html) {
        Verdict::Blocked
    } else if is_price_widget(text) {
        Verdict::PriceWidget
    } else if text.chars().count() < min_text {
        Verdict::TooThin
    } else {
        Verdict::Ok
    }
}

/// Excerpt plus a link to the source, used in place of a rejected body.
pub fn degraded_body(excerpt: &str, source_url: &str) -> String {
    let notice = format!(
        "<p><em>Full text is available at <a href=\"{}\" target=\"_blank\" rel=\"noopener\">the source</a>.</em></p>",
        encode_double_quoted_attribute(source_url)
    );
    let excerpt = excerpt.trim();
    if excerpt.is_empty() {
        notice
    } else {
        format!(
            "<p><strong>Summary:</strong></p><p>{}</p>{}",
            encode_text(excerpt),
            notice
        )
    }
}
