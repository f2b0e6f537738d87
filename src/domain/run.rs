use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling history keeps this many runs.
pub const RUN_HISTORY_LIMIT: usize = 50;

/// Error strings kept per run.
pub const MAX_RUN_ERRORS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Feed,
    Page,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Feed => "feed",
            RunMode::Page => "page",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(RunMode::Feed),
            "page" => Some(RunMode::Page),
            _ => None,
        }
    }
}

/// Why a candidate did not become an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Duplicate,
    TooShort,
    ParseError,
    SaveError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Duplicate => "duplicate",
            RejectReason::TooShort => "too_short",
            RejectReason::ParseError => "parse_error",
            RejectReason::SaveError => "save_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub mode: RunMode,
    pub target: usize,
    pub found: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
    pub status: RunStatus,
}

impl RunResult {
    pub fn start(target: usize, mode: RunMode) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            mode,
            target,
            found: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
            duplicates: 0,
            errors: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        if self.errors.len() < MAX_RUN_ERRORS {
            self.errors.push(error.into());
        }
    }

    pub fn record_failure(&mut self, reason: RejectReason, subject: &str, detail: Option<&str>) {
        self.failed += 1;
        match detail {
            Some(detail) => self.push_error(format!("{}: {} ({})", subject, reason.as_str(), detail)),
            None => self.push_error(format!("{}: {}", subject, reason.as_str())),
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.succeeded as f64 / self.processed.max(1) as f64
    }

    pub fn target_met(&self) -> bool {
        self.succeeded >= self.target
    }

    /// Stamp the end time and derive the terminal status.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = if self.target_met() {
            RunStatus::Success
        } else if self.succeeded > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };
    }

    /// Terminate early with a fatal error.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.push_error(error);
        self.finished_at = Some(Utc::now());
        self.status = RunStatus::Failed;
    }

    pub fn elapsed_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end.signed_duration_since(self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Lifetime counters. Only ever incremented.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeStats {
    pub total_runs: u64,
    pub total_found: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_duplicates: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}
