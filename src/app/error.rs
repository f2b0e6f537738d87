use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreshetError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid selector: {0}")]
    Selector(String),

    #[error("Slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("A run is already in progress")]
    RunInProgress,

    #[error("{0}")]
    Other(String),
}

impl FreshetError {
    /// True when the error was caused by the remote answering 403.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, FreshetError::HttpStatus { status: 403, .. })
    }
}

pub type Result<T> = std::result::Result<T, FreshetError>;
