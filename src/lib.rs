pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod date_util;
pub mod error;
pub mod model;
pub mod period;
pub mod report;
pub mod sequence;
pub mod snapshot;
pub mod storage;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

pub use aggregate::{BucketSet, IssueBuckets, StatusStat};
pub use config::{BusinessCalendar, Config};
pub use error::{Error, Result};
pub use model::{Issue, TimeMode, Transition};
pub use period::Period;
pub use report::{
    CsvKind, ExportTarget, GenerateReportRequest, Report, ReportData, ReportResult, ReportSummary,
    Series,
};
pub use sequence::{Interval, Timeline, Window};
pub use snapshot::Snapshot;
pub use storage::repository::{ImportCounts, StoreCounts};
pub use storage::Database;

use storage::repository;

/// Main entry point: a local store of tracker issues and the time-in-status
/// reports computed over them.
pub struct JiraTime {
    db: Database,
}

impl JiraTime {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Snapshot ───────────────────────────────────────────────────

    pub async fn import_snapshot(&self, snapshot: Snapshot) -> Result<ImportCounts> {
        let (issues, transitions) = snapshot.into_records()?;
        let counts = self
            .db
            .writer()
            .call(move |conn| repository::import_records(conn, &issues, &transitions))
            .await?;
        log::info!(
            "Imported {} issues and {} transitions",
            counts.issues,
            counts.transitions
        );
        Ok(counts)
    }

    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<ImportCounts> {
        self.import_snapshot(Snapshot::load(path)?).await
    }

    pub async fn status(&self) -> Result<StoreCounts> {
        Ok(self.db.reader().call(|conn| repository::counts(conn)).await?)
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Compute and store a new report. `now` bounds open-ended windows and
    /// the time of issues still in their current status.
    pub async fn generate_report(
        &self,
        request: GenerateReportRequest,
        now: DateTime<Utc>,
    ) -> Result<ReportResult> {
        let now = date_util::whole_seconds(now);
        let title = request.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::Config("report title must not be empty".into()));
        }

        let config = self.load_config().await?;
        let window = request.resolve_window(&config, now)?;
        log::info!(
            "Generating report '{title}' ({}) for {} .. {}",
            request.time_mode,
            window.start,
            window.end
        );

        let (issues, transitions) = self
            .db
            .reader()
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::list_issues(conn)?,
                    repository::list_transitions(conn)?,
                ))
            })
            .await?;

        let data = report::build(
            &issues,
            &transitions,
            &window,
            request.time_mode,
            &config,
            &request.projects,
            now,
        )?;

        let new = repository::NewReport {
            title,
            created_at: now,
            time_mode: request.time_mode,
            window,
            projects: request.projects,
        };
        let (header, data) = self
            .db
            .writer()
            .call(move |conn| {
                let header = repository::insert_report(conn, &new, &data)?;
                Ok::<_, rusqlite::Error>((header, data))
            })
            .await?;
        log::info!("Stored report {} with {} issues", header.id, data.issues.len());

        Ok(report::assemble(
            header,
            data.issues,
            data.buckets,
            data.transitions,
        ))
    }

    pub async fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_reports(conn))
            .await?)
    }

    /// Load a stored report in full.
    pub async fn report(&self, report_id: i64) -> Result<ReportResult> {
        let loaded = self
            .db
            .reader()
            .call(move |conn| {
                let loaded = match repository::get_report(conn, report_id)? {
                    Some(header) => Some((
                        header,
                        repository::list_report_issues(conn, report_id)?,
                        repository::load_report_buckets(conn, report_id)?,
                        repository::list_report_transitions(conn, report_id)?,
                    )),
                    None => None,
                };
                Ok::<_, rusqlite::Error>(loaded)
            })
            .await?;

        let (header, issues, buckets, transitions) =
            loaded.ok_or_else(|| Error::NotFound(format!("report {report_id}")))?;
        Ok(report::assemble(header, issues, buckets, transitions))
    }

    pub async fn export_csv(&self, report_id: i64, kind: CsvKind) -> Result<Vec<u8>> {
        let result = self.report(report_id).await?;
        report::to_csv(kind, &result)
    }

    /// Delete a report and its derived rows. Imported issues are kept.
    pub async fn delete_report(&self, report_id: i64) -> Result<()> {
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_report(conn, report_id))
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("report {report_id}")));
        }
        log::info!("Deleted report {report_id}");
        Ok(())
    }

    // ── Config ─────────────────────────────────────────────────────

    /// Resolve the stored settings into a `Config`.
    pub async fn load_config(&self) -> Result<Config> {
        let settings: BTreeMap<String, String> = self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?
            .into_iter()
            .collect();
        Config::from_settings(&settings)
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    /// Validate and store one setting.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        config::validate_setting(key, value)?;
        let value = if key == config::KEY_BUSINESS_DAYS {
            config::format_business_days(&config::parse_business_days(value)?)
        } else {
            value.trim().to_string()
        };
        let key = key.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    /// All stored settings, with the API token masked.
    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        let entries = self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                if key == config::KEY_JIRA_API_TOKEN {
                    let masked = mask_secret(&value);
                    (key, masked)
                } else {
                    (key, value)
                }
            })
            .collect())
    }

    /// Write the default settings. Existing values are kept unless `overwrite`.
    /// Returns the keys that were written.
    pub async fn config_init(&self, overwrite: bool) -> Result<Vec<String>> {
        Ok(self
            .db
            .writer()
            .call(move |conn| {
                let mut written = Vec::new();
                for (key, value) in config::default_settings() {
                    if overwrite || repository::get_config(conn, key)?.is_none() {
                        repository::set_config(conn, key, &value)?;
                        written.push(key.to_string());
                    }
                }
                Ok::<_, rusqlite::Error>(written)
            })
            .await?)
    }
}

fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
