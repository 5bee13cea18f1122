use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::Writer;

use super::ReportResult;
use crate::date_util::format_utc;
use crate::error::{Error, Result};

/// Which table of a report to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvKind {
    Issues,
    Transitions,
    Stats,
}

impl CsvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsvKind::Issues => "issues",
            CsvKind::Transitions => "transitions",
            CsvKind::Stats => "stats",
        }
    }

    /// Suggested download name for a report's table.
    pub fn file_name(&self, report_id: i64) -> String {
        format!("report-{report_id}-{}.csv", self.as_str())
    }
}

/// Where an export is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Stdout,
    File(PathBuf),
}

impl ExportTarget {
    /// `-` selects stdout. Without an explicit path the kind's file name is
    /// used in the current directory.
    pub fn resolve(output: Option<&Path>, kind: CsvKind, report_id: i64) -> Self {
        match output {
            Some(path) if path == Path::new("-") => ExportTarget::Stdout,
            Some(path) => ExportTarget::File(path.to_path_buf()),
            None => ExportTarget::File(PathBuf::from(kind.file_name(report_id))),
        }
    }
}

impl FromStr for CsvKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "issues" => Ok(CsvKind::Issues),
            "transitions" => Ok(CsvKind::Transitions),
            "stats" => Ok(CsvKind::Stats),
            other => Err(Error::Csv(format!(
                "unknown export kind '{other}' (expected issues, transitions or stats)"
            ))),
        }
    }
}

impl fmt::Display for CsvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn to_csv(kind: CsvKind, result: &ReportResult) -> Result<Vec<u8>> {
    match kind {
        CsvKind::Issues => issues_csv(result),
        CsvKind::Transitions => transitions_csv(result),
        CsvKind::Stats => stats_csv(result),
    }
}

/// One row per issue, in issue-key order.
pub fn issues_csv(result: &ReportResult) -> Result<Vec<u8>> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record([
        "issue_key",
        "type",
        "summary",
        "epic_key",
        "parent_key",
        "current_status",
        "assignee",
    ])?;
    for issue in &result.issues {
        wtr.write_record([
            issue.issue_key.as_str(),
            issue.issue_type.as_str(),
            issue.summary.as_str(),
            issue.epic_key.as_deref().unwrap_or(""),
            issue.parent_key.as_deref().unwrap_or(""),
            issue.current_status.as_str(),
            issue.assignee.as_deref().unwrap_or(""),
        ])?;
    }
    finish(wtr)
}

/// One row per consumed transition, sorted by issue key then instant.
pub fn transitions_csv(result: &ReportResult) -> Result<Vec<u8>> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record(["issue_key", "from_status", "to_status", "at"])?;
    for t in result.transitions() {
        let at = format_utc(&t.at);
        wtr.write_record([
            t.issue_key.as_str(),
            t.from_status.as_deref().unwrap_or(""),
            t.to_status.as_str(),
            at.as_str(),
        ])?;
    }
    finish(wtr)
}

/// One row per issue and status held, including zero-time statuses.
pub fn stats_csv(result: &ReportResult) -> Result<Vec<u8>> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record([
        "issue_key",
        "project_key",
        "issue_type",
        "assignee",
        "parent_key",
        "epic_key",
        "status",
        "entered_count",
        "seconds",
        "hours",
        "wall_hours",
        "business_hours",
    ])?;
    for issue in &result.issues {
        let Some(buckets) = result.bucket_set().get(&issue.issue_key) else {
            continue;
        };
        for (status, stat) in buckets.stats() {
            wtr.write_record([
                issue.issue_key.clone(),
                issue.project_key.clone(),
                issue.issue_type.clone(),
                issue.assignee.clone().unwrap_or_default(),
                issue.parent_key.clone().unwrap_or_default(),
                issue.epic_key.clone().unwrap_or_default(),
                status.clone(),
                stat.entered_count.to_string(),
                stat.seconds.to_string(),
                hours(stat.seconds),
                hours(stat.wall_seconds),
                stat.business_seconds.map(hours).unwrap_or_default(),
            ])?;
        }
    }
    finish(wtr)
}

fn hours(seconds: i64) -> String {
    format!("{:.3}", seconds as f64 / 3600.0)
}

fn finish(wtr: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    wtr.into_inner().map_err(|e| Error::Csv(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{BucketSet, IssueBuckets, StatusStat};
    use crate::model::{Issue, TimeMode, Transition};
    use crate::report::{assemble, Report};
    use chrono::{TimeZone, Utc};

    fn header() -> Report {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Report {
            id: 7,
            title: "Export".into(),
            created_at: start,
            time_mode: TimeMode::WallClock,
            window_start: start,
            window_end: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            projects: vec![],
        }
    }

    fn sample() -> ReportResult {
        let mut issue = Issue::new("ABC-1", "Story", "Fix login, then logout", "Done");
        issue.assignee = Some("ann".into());
        issue.epic_key = Some("ABC-100".into());
        let other = Issue::new("ABC-2", "Bug", "Say \"hi\"", "Open");

        let mut buckets = BucketSet::default();
        let mut b = IssueBuckets::new("ABC-1");
        b.insert_stat(
            "Done",
            StatusStat {
                seconds: 5400,
                entered_count: 1,
                wall_seconds: 5400,
                business_seconds: Some(3600),
            },
        );
        b.insert_stat(
            "Open",
            StatusStat {
                seconds: 0,
                entered_count: 2,
                wall_seconds: 7200,
                business_seconds: Some(0),
            },
        );
        buckets.insert(b);
        buckets.insert(IssueBuckets::new("ABC-2"));

        let transitions = vec![
            Transition::new("ABC-2", None, "Open", Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
            Transition::new(
                "ABC-1",
                Some("Open"),
                "Done",
                Utc.with_ymd_and_hms(2024, 1, 3, 4, 5, 6).unwrap(),
            ),
            Transition::new("ABC-1", None, "Open", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        ];
        assemble(header(), vec![other, issue], buckets, transitions)
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_csv_kind_parse() {
        assert_eq!("issues".parse::<CsvKind>().unwrap(), CsvKind::Issues);
        assert_eq!("Transitions".parse::<CsvKind>().unwrap(), CsvKind::Transitions);
        assert_eq!("stats".parse::<CsvKind>().unwrap(), CsvKind::Stats);
        assert!("people".parse::<CsvKind>().is_err());
        assert_eq!(CsvKind::Stats.file_name(3), "report-3-stats.csv");
    }

    #[test]
    fn test_export_target_defaults_to_file_name() {
        assert_eq!(
            ExportTarget::resolve(None, CsvKind::Transitions, 12),
            ExportTarget::File(PathBuf::from("report-12-transitions.csv"))
        );
        assert_eq!(
            ExportTarget::resolve(Some(Path::new("-")), CsvKind::Stats, 12),
            ExportTarget::Stdout
        );
        assert_eq!(
            ExportTarget::resolve(Some(Path::new("out/stats.csv")), CsvKind::Stats, 12),
            ExportTarget::File(PathBuf::from("out/stats.csv"))
        );
    }

    #[test]
    fn test_empty_report_is_header_only() {
        let result = assemble(header(), vec![], BucketSet::default(), vec![]);
        assert_eq!(
            text(to_csv(CsvKind::Issues, &result).unwrap()),
            "issue_key,type,summary,epic_key,parent_key,current_status,assignee\n"
        );
        assert_eq!(
            text(to_csv(CsvKind::Transitions, &result).unwrap()),
            "issue_key,from_status,to_status,at\n"
        );
        assert_eq!(text(to_csv(CsvKind::Stats, &result).unwrap()).lines().count(), 1);
    }

    #[test]
    fn test_issues_csv_quotes_and_round_trips() {
        let result = sample();
        let out = text(to_csv(CsvKind::Issues, &result).unwrap());
        assert!(out.contains("\"Fix login, then logout\""));
        assert!(out.contains("\"Say \"\"hi\"\"\""));

        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "ABC-1");
        assert_eq!(&rows[0][2], "Fix login, then logout");
        assert_eq!(&rows[0][3], "ABC-100");
        assert_eq!(&rows[0][4], "");
        assert_eq!(&rows[0][6], "ann");
        assert_eq!(&rows[1][2], "Say \"hi\"");
    }

    #[test]
    fn test_transitions_csv_order_and_format() {
        let out = text(to_csv(CsvKind::Transitions, &sample()).unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "issue_key,from_status,to_status,at",
                "ABC-1,,Open,2024-01-01T00:00:00Z",
                "ABC-1,Open,Done,2024-01-03T04:05:06Z",
                "ABC-2,,Open,2024-01-02T00:00:00Z",
            ]
        );
    }

    #[test]
    fn test_stats_csv_rows() {
        let out = text(to_csv(CsvKind::Stats, &sample()).unwrap());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "issue_key,project_key,issue_type,assignee,parent_key,epic_key,status,entered_count,seconds,hours,wall_hours,business_hours"
        );
        assert_eq!(lines[1], "ABC-1,ABC,Story,ann,,ABC-100,Done,1,5400,1.500,1.500,1.000");
        assert_eq!(lines[2], "ABC-1,ABC,Story,ann,,ABC-100,Open,2,0,0.000,2.000,0.000");
    }

    #[test]
    fn test_stats_csv_without_business_calendar() {
        let issue = Issue::new("ABC-1", "Task", "Wall only", "Open");
        let mut b = IssueBuckets::new("ABC-1");
        b.insert_stat(
            "Open",
            StatusStat {
                seconds: 9000,
                entered_count: 1,
                wall_seconds: 9000,
                business_seconds: None,
            },
        );
        let mut buckets = BucketSet::default();
        buckets.insert(b);
        let result = assemble(header(), vec![issue], buckets, vec![]);

        let out = text(to_csv(CsvKind::Stats, &result).unwrap());
        assert_eq!(out.lines().nth(1), Some("ABC-1,ABC,Task,,,,Open,1,9000,2.500,2.500,"));
    }

    #[test]
    fn test_csv_is_deterministic() {
        for kind in [CsvKind::Issues, CsvKind::Transitions, CsvKind::Stats] {
            let a = to_csv(kind, &sample()).unwrap();
            let b = to_csv(kind, &sample()).unwrap();
            assert_eq!(a, b);
        }
    }
}
