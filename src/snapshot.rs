//! JSON snapshot of issues and their status history, as written by a
//! tracker sync tool.

use std::path::Path;

use serde::Deserialize;

use crate::date_util::parse_timestamp;
use crate::error::{Error, Result};
use crate::model::{project_key_of, Issue, Transition};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub issues: Vec<IssueSnapshot>,
    #[serde(default)]
    pub transitions: Vec<TransitionSnapshot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueSnapshot {
    pub key: String,
    #[serde(default, alias = "type")]
    pub issue_type: String,
    #[serde(default)]
    pub summary: String,
    pub status: String,
    pub epic_key: Option<String>,
    pub parent_key: Option<String>,
    pub assignee: Option<String>,
    pub project_key: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionSnapshot {
    pub issue_key: String,
    pub from_status: Option<String>,
    pub to_status: String,
    #[serde(alias = "at")]
    pub when: String,
}

impl Snapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Snapshot(e.to_string()))
    }

    /// Read and parse a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Snapshot(format!("{}: {e}", path.display())))?;
        let snapshot = Self::from_json(&json)?;
        log::debug!(
            "Loaded snapshot {} ({} issues, {} transitions)",
            path.display(),
            snapshot.issues.len(),
            snapshot.transitions.len()
        );
        Ok(snapshot)
    }

    /// Convert into model records. Transitions keep their file order, which
    /// becomes their sequence number when stored.
    pub fn into_records(self) -> Result<(Vec<Issue>, Vec<Transition>)> {
        let issues = self
            .issues
            .into_iter()
            .map(IssueSnapshot::into_issue)
            .collect::<Result<Vec<_>>>()?;
        let transitions = self
            .transitions
            .into_iter()
            .map(TransitionSnapshot::into_transition)
            .collect::<Result<Vec<_>>>()?;
        Ok((issues, transitions))
    }
}

impl IssueSnapshot {
    fn into_issue(self) -> Result<Issue> {
        let key = self.key.trim().to_string();
        if key.is_empty() {
            return Err(Error::Snapshot("issue with empty key".into()));
        }
        let project_key = self
            .project_key
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| project_key_of(&key).to_string());

        Ok(Issue {
            project_key,
            issue_type: self.issue_type,
            summary: self.summary,
            epic_key: non_empty(self.epic_key),
            parent_key: non_empty(self.parent_key),
            assignee: non_empty(self.assignee),
            current_status: self.status,
            created_at: parse_optional(self.created.as_deref(), &key)?,
            updated_at: parse_optional(self.updated.as_deref(), &key)?,
            issue_key: key,
        })
    }
}

impl TransitionSnapshot {
    fn into_transition(self) -> Result<Transition> {
        let at = parse_timestamp(&self.when)
            .map_err(|e| Error::Snapshot(format!("transition of {}: {e}", self.issue_key)))?;
        Ok(Transition {
            issue_key: self.issue_key.trim().to_string(),
            from_status: non_empty(self.from_status),
            to_status: self.to_status,
            at,
            seq: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_optional(value: Option<&str>, key: &str) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_timestamp(v)
            .map(Some)
            .map_err(|e| Error::Snapshot(format!("issue {key}: {e}"))),
        None => Ok(None),
    }
}
