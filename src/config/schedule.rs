use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed set of scheduler periods, aligned to the UTC wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Schedule {
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[default]
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    Daily,
}

impl Schedule {
    pub const ALL: [Schedule; 8] = [
        Schedule::FifteenMinutes,
        Schedule::ThirtyMinutes,
        Schedule::OneHour,
        Schedule::TwoHours,
        Schedule::FourHours,
        Schedule::EightHours,
        Schedule::TwelveHours,
        Schedule::Daily,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Schedule::FifteenMinutes => "15min",
            Schedule::ThirtyMinutes => "30min",
            Schedule::OneHour => "1h",
            Schedule::TwoHours => "2h",
            Schedule::FourHours => "4h",
            Schedule::EightHours => "8h",
            Schedule::TwelveHours => "12h",
            Schedule::Daily => "24h",
        }
    }

    /// Cron expression (with a seconds field) for this period.
    pub fn cron_expression(&self) -> &'static str {
        match self {
            Schedule::FifteenMinutes => "0 */15 * * * *",
            Schedule::ThirtyMinutes => "0 */30 * * * *",
            Schedule::OneHour => "0 0 * * * *",
            Schedule::TwoHours => "0 0 */2 * * *",
            Schedule::FourHours => "0 0 */4 * * *",
            Schedule::EightHours => "0 0 */8 * * *",
            Schedule::TwelveHours => "0 0 */12 * * *",
            Schedule::Daily => "0 0 0 * * *",
        }
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        cron::Schedule::from_str(self.cron_expression())
            .ok()?
            .after(&after)
            .next()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Schedule::ALL
            .iter()
            .copied()
            .find(|schedule| schedule.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = Schedule::ALL.iter().map(|s| s.as_str()).collect();
                format!("Unknown schedule '{}'. Use one of: {}", s, valid.join(", "))
            })
    }
}
