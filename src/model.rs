use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An issue as captured in the local snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_key: String,
    pub project_key: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub summary: String,
    pub epic_key: Option<String>,
    pub parent_key: Option<String>,
    pub assignee: Option<String>,
    pub current_status: String,
    /// Creation instant, when the tracker reported one.
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn new(
        issue_key: impl Into<String>,
        issue_type: impl Into<String>,
        summary: impl Into<String>,
        current_status: impl Into<String>,
    ) -> Self {
        let issue_key = issue_key.into();
        Self {
            project_key: project_key_of(&issue_key).to_string(),
            issue_key,
            issue_type: issue_type.into(),
            summary: summary.into(),
            epic_key: None,
            parent_key: None,
            assignee: None,
            current_status: current_status.into(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Project prefix of an issue key: `ABC` for `ABC-123`.
pub fn project_key_of(issue_key: &str) -> &str {
    issue_key
        .split_once('-')
        .map(|(prefix, _)| prefix)
        .unwrap_or(issue_key)
}

/// A recorded status change.
///
/// `from_status` is `None` for the creation record. `seq` is the arrival
/// order assigned by the store and breaks ties between equal `at` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub issue_key: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

impl Transition {
    pub fn new(
        issue_key: impl Into<String>,
        from_status: Option<&str>,
        to_status: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            issue_key: issue_key.into(),
            from_status: from_status.map(str::to_string),
            to_status: to_status.into(),
            at,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// How elapsed time is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    WallClock,
    BusinessHours,
}

impl TimeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeMode::WallClock => "wall_clock",
            TimeMode::BusinessHours => "business_hours",
        }
    }
}

impl FromStr for TimeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "wall_clock" | "wall" | "24x7" => Ok(TimeMode::WallClock),
            "business_hours" | "business" => Ok(TimeMode::BusinessHours),
            other => Err(Error::Config(format!("unknown time mode: {other}"))),
        }
    }
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
