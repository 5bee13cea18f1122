use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::aggregate::{BucketSet, IssueBuckets, StatusStat};
use crate::model::{Issue, TimeMode, Transition};
use crate::report::{Report, ReportData, ReportSummary};
use crate::sequence::Window;

const ISSUE_COLUMNS: &str = "issue_key, project_key, issue_type, summary, epic_key, parent_key, \
                             assignee, current_status, created_at, updated_at";

// ── Issues ─────────────────────────────────────────────────────────

pub fn upsert_issue(conn: &Connection, issue: &Issue) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO issues (issue_key, project_key, issue_type, summary, epic_key, parent_key,
                             assignee, current_status, created_at, updated_at, imported_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
         ON CONFLICT(issue_key) DO UPDATE SET
           project_key = excluded.project_key,
           issue_type = excluded.issue_type,
           summary = excluded.summary,
           epic_key = excluded.epic_key,
           parent_key = excluded.parent_key,
           assignee = excluded.assignee,
           current_status = excluded.current_status,
           created_at = COALESCE(excluded.created_at, issues.created_at),
           updated_at = COALESCE(excluded.updated_at, issues.updated_at),
           imported_at = excluded.imported_at",
        params![
            issue.issue_key,
            issue.project_key,
            issue.issue_type,
            issue.summary,
            issue.epic_key,
            issue.parent_key,
            issue.assignee,
            issue.current_status,
            issue.created_at.as_ref().map(to_sql_ts),
            issue.updated_at.as_ref().map(to_sql_ts),
        ],
    )?;
    Ok(())
}

pub fn list_issues(conn: &Connection) -> Result<Vec<Issue>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues ORDER BY issue_key"
    ))?;
    let rows = stmt.query_map([], issue_from_row)?;
    rows.collect()
}

fn issue_from_row(row: &Row<'_>) -> Result<Issue, rusqlite::Error> {
    Ok(Issue {
        issue_key: row.get(0)?,
        project_key: row.get(1)?,
        issue_type: row.get(2)?,
        summary: row.get(3)?,
        epic_key: row.get(4)?,
        parent_key: row.get(5)?,
        assignee: row.get(6)?,
        current_status: row.get(7)?,
        created_at: opt_ts(row, 8)?,
        updated_at: opt_ts(row, 9)?,
    })
}

// ── Transitions ────────────────────────────────────────────────────

/// Replace the stored history of one issue. Rows are inserted in slice
/// order, so the autoincrement id records arrival order.
pub fn replace_transitions(
    conn: &Connection,
    issue_key: &str,
    transitions: &[Transition],
) -> Result<usize, rusqlite::Error> {
    conn.execute("DELETE FROM transitions WHERE issue_key = ?1", params![issue_key])?;
    let mut stmt = conn.prepare(
        "INSERT INTO transitions (issue_key, from_status, to_status, at) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut inserted = 0;
    for t in transitions.iter().filter(|t| t.issue_key == issue_key) {
        stmt.execute(params![t.issue_key, t.from_status, t.to_status, to_sql_ts(&t.at)])?;
        inserted += 1;
    }
    Ok(inserted)
}

/// All stored transitions, with `seq` set to their arrival order.
pub fn list_transitions(conn: &Connection) -> Result<Vec<Transition>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT issue_key, from_status, to_status, at, id FROM transitions ORDER BY issue_key, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Transition {
            issue_key: row.get(0)?,
            from_status: row.get(1)?,
            to_status: row.get(2)?,
            at: ts(row, 3)?,
            seq: Some(row.get(4)?),
        })
    })?;
    rows.collect()
}

// ── Import ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    pub issues: usize,
    pub transitions: usize,
}

/// Upsert issues and replace the history of every issue key that appears
/// in either list, in one transaction.
pub fn import_records(
    conn: &mut Connection,
    issues: &[Issue],
    transitions: &[Transition],
) -> Result<ImportCounts, rusqlite::Error> {
    let tx = conn.transaction()?;
    let mut counts = ImportCounts::default();

    for issue in issues {
        upsert_issue(&tx, issue)?;
        counts.issues += 1;
    }

    let mut keys: Vec<&str> = transitions.iter().map(|t| t.issue_key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();
    for key in keys {
        counts.transitions += replace_transitions(&tx, key, transitions)?;
    }

    tx.commit()?;
    Ok(counts)
}

// ── Reports ────────────────────────────────────────────────────────

/// Header fields of a report about to be stored.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub time_mode: TimeMode,
    pub window: Window,
    pub projects: Vec<String>,
}

/// Store a report with its issues, buckets and consumed transitions.
/// Either everything is written or nothing is.
pub fn insert_report(
    conn: &mut Connection,
    new: &NewReport,
    data: &ReportData,
) -> Result<Report, rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO reports (title, created_at, time_mode, window_start, window_end, projects)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.title,
            to_sql_ts(&new.created_at),
            new.time_mode.as_str(),
            to_sql_ts(&new.window.start),
            to_sql_ts(&new.window.end),
            new.projects.join(","),
        ],
    )?;
    let report_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO report_issues (report_id, issue_key, project_key, issue_type, summary,
                                        epic_key, parent_key, assignee, current_status,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for issue in &data.issues {
            stmt.execute(params![
                report_id,
                issue.issue_key,
                issue.project_key,
                issue.issue_type,
                issue.summary,
                issue.epic_key,
                issue.parent_key,
                issue.assignee,
                issue.current_status,
                issue.created_at.as_ref().map(to_sql_ts),
                issue.updated_at.as_ref().map(to_sql_ts),
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO report_buckets
                (report_id, issue_key, status, seconds, entered_count, wall_seconds, business_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for buckets in data.buckets.issues() {
            for (status, stat) in buckets.stats() {
                stmt.execute(params![
                    report_id,
                    buckets.issue_key,
                    status,
                    stat.seconds,
                    stat.entered_count,
                    stat.wall_seconds,
                    stat.business_seconds,
                ])?;
            }
        }

        let mut stmt = tx.prepare(
            "INSERT INTO report_transitions (report_id, issue_key, from_status, to_status, at, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for t in &data.transitions {
            stmt.execute(params![
                report_id,
                t.issue_key,
                t.from_status,
                t.to_status,
                to_sql_ts(&t.at),
                t.seq,
            ])?;
        }
    }

    tx.commit()?;

    Ok(Report {
        id: report_id,
        title: new.title.clone(),
        created_at: new.created_at,
        time_mode: new.time_mode,
        window_start: new.window.start,
        window_end: new.window.end,
        projects: new.projects.clone(),
    })
}

pub fn get_report(conn: &Connection, report_id: i64) -> Result<Option<Report>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, title, created_at, time_mode, window_start, window_end, projects
         FROM reports WHERE id = ?1",
        params![report_id],
        report_from_row,
    )
    .optional()
}

/// Newest first.
pub fn list_reports(conn: &Connection) -> Result<Vec<ReportSummary>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.title, r.created_at, r.time_mode, r.window_start, r.window_end, r.projects,
                (SELECT COUNT(*) FROM report_issues ri WHERE ri.report_id = r.id)
         FROM reports r
         ORDER BY r.created_at DESC, r.id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ReportSummary {
            report: report_from_row(row)?,
            issue_count: row.get(7)?,
        })
    })?;
    rows.collect()
}

fn report_from_row(row: &Row<'_>) -> Result<Report, rusqlite::Error> {
    let mode: String = row.get(3)?;
    let time_mode = mode
        .parse::<TimeMode>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let projects: String = row.get(6)?;
    Ok(Report {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: ts(row, 2)?,
        time_mode,
        window_start: ts(row, 4)?,
        window_end: ts(row, 5)?,
        projects: projects
            .split(',')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

pub fn list_report_issues(conn: &Connection, report_id: i64) -> Result<Vec<Issue>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ISSUE_COLUMNS} FROM report_issues WHERE report_id = ?1 ORDER BY issue_key"
    ))?;
    let rows = stmt.query_map(params![report_id], issue_from_row)?;
    rows.collect()
}

/// Buckets of a stored report. Issues with no recorded time still get an
/// (empty) entry.
pub fn load_report_buckets(conn: &Connection, report_id: i64) -> Result<BucketSet, rusqlite::Error> {
    let mut keys_stmt =
        conn.prepare("SELECT issue_key FROM report_issues WHERE report_id = ?1 ORDER BY issue_key")?;
    let keys = keys_stmt
        .query_map(params![report_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT issue_key, status, seconds, entered_count, wall_seconds, business_seconds
         FROM report_buckets
         WHERE report_id = ?1 ORDER BY issue_key, status",
    )?;
    let rows = stmt
        .query_map(params![report_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                StatusStat {
                    seconds: row.get(2)?,
                    entered_count: row.get(3)?,
                    wall_seconds: row.get(4)?,
                    business_seconds: row.get(5)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut set = BucketSet::default();
    for key in keys {
        let mut buckets = IssueBuckets::new(key.as_str());
        for (_, status, stat) in rows.iter().filter(|(k, _, _)| *k == key) {
            buckets.insert_stat(status.as_str(), *stat);
        }
        set.insert(buckets);
    }
    Ok(set)
}

pub fn list_report_transitions(
    conn: &Connection,
    report_id: i64,
) -> Result<Vec<Transition>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT issue_key, from_status, to_status, at, seq FROM report_transitions
         WHERE report_id = ?1 ORDER BY issue_key, at, seq",
    )?;
    let rows = stmt.query_map(params![report_id], |row| {
        Ok(Transition {
            issue_key: row.get(0)?,
            from_status: row.get(1)?,
            to_status: row.get(2)?,
            at: ts(row, 3)?,
            seq: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Remove a report and everything derived for it. The issue snapshot is
/// left untouched. Returns false if the report did not exist.
pub fn delete_report(conn: &mut Connection, report_id: i64) -> Result<bool, rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM report_transitions WHERE report_id = ?1", params![report_id])?;
    tx.execute("DELETE FROM report_buckets WHERE report_id = ?1", params![report_id])?;
    tx.execute("DELETE FROM report_issues WHERE report_id = ?1", params![report_id])?;
    let deleted = tx.execute("DELETE FROM reports WHERE id = ?1", params![report_id])?;
    tx.commit()?;
    Ok(deleted > 0)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub issues: i64,
    pub transitions: i64,
    pub reports: i64,
}

pub fn counts(conn: &Connection) -> Result<StoreCounts, rusqlite::Error> {
    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    };
    Ok(StoreCounts {
        issues: count("issues")?,
        transitions: count("transitions")?,
        reports: count("reports")?,
    })
}

// ── Timestamps ─────────────────────────────────────────────────────

/// Fixed-width RFC 3339, so stored timestamps also sort as text.
fn to_sql_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_sql_ts(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ts(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let s: String = row.get(idx)?;
    parse_sql_ts(idx, &s)
}

fn opt_ts(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_sql_ts(idx, &s)).transpose()
}
