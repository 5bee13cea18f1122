//! Report assembly: turns a snapshot of issues and transitions into the
//! per-issue status buckets of one report.

pub mod csv;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{self, BucketSet};
use crate::config::Config;
use crate::error::Result;
use crate::model::{Issue, TimeMode, Transition};
use crate::period::Period;
use crate::sequence::{self, Window};

pub use self::csv::{to_csv, CsvKind, ExportTarget};

/// A stored report's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub time_mode: TimeMode,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Project keys the report was restricted to. Empty means all projects.
    pub projects: Vec<String>,
}

impl Report {
    pub fn window(&self) -> Window {
        Window {
            start: self.window_start,
            end: self.window_end,
        }
    }
}

/// A report header plus the number of issues it covers, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    #[serde(flatten)]
    pub report: Report,
    pub issue_count: i64,
}

/// Parameters for a new report.
#[derive(Debug, Clone)]
pub struct GenerateReportRequest {
    pub title: String,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub period: Option<Period>,
    pub time_mode: TimeMode,
    pub projects: Vec<String>,
}

impl GenerateReportRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window_start: None,
            window_end: None,
            period: None,
            time_mode: TimeMode::WallClock,
            projects: Vec::new(),
        }
    }

    /// The report window.
    ///
    /// Explicit bounds win over a period, and a period wins over the
    /// configured default window. A missing end defaults to `now`; a
    /// missing start goes back `default_window_days` from the end.
    pub fn resolve_window(&self, config: &Config, now: DateTime<Utc>) -> Result<Window> {
        if self.period.is_some() && (self.window_start.is_some() || self.window_end.is_some()) {
            log::warn!("Explicit window bounds given, ignoring period");
        }
        match (self.window_start, self.window_end, self.period) {
            (Some(start), Some(end), _) => Window::new(start, end),
            (Some(start), None, _) => Window::new(start, now),
            (None, Some(end), _) => Window::ending_at(end, config.default_window_days),
            (None, None, Some(period)) => {
                let tz = config.business.as_ref().map_or(Tz::UTC, |b| b.tz);
                period.window(tz, now)
            }
            (None, None, None) => Window::ending_at(now, config.default_window_days),
        }
    }
}

/// Output of the computation, before it has been given a report id.
#[derive(Debug, Clone, Default)]
pub struct ReportData {
    pub issues: Vec<Issue>,
    pub buckets: BucketSet,
    /// Transitions that determined the buckets, sorted by key, instant, seq.
    pub transitions: Vec<Transition>,
}

/// Sequence and aggregate every matching issue over `window`.
///
/// Issues are included when they held any status inside the window. For an
/// empty window, issues that already existed at its start are included with
/// no time recorded.
pub fn build(
    issues: &[Issue],
    transitions: &[Transition],
    window: &Window,
    mode: TimeMode,
    config: &Config,
    projects: &[String],
    now: DateTime<Utc>,
) -> Result<ReportData> {
    if mode == TimeMode::BusinessHours {
        config.require_business()?;
    }

    let mut by_issue: HashMap<&str, Vec<Transition>> = HashMap::new();
    for t in transitions {
        by_issue.entry(t.issue_key.as_str()).or_default().push(t.clone());
    }

    let selected: Vec<&Issue> = issues
        .iter()
        .filter(|issue| in_projects(issue, projects))
        .collect();

    let sequenced: Vec<(&Issue, sequence::Timeline)> = selected
        .par_iter()
        .map(|issue| {
            let own = by_issue
                .get(issue.issue_key.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            sequence::sequence(issue, own, window, now).map(|t| (*issue, t))
        })
        .collect::<Result<_>>()?;

    let mut included_issues = Vec::new();
    let mut timelines = Vec::new();
    for (issue, timeline) in sequenced {
        let keep = if window.is_empty() {
            existed_at(issue, &timeline, window.start, &by_issue)
        } else {
            !timeline.intervals.is_empty()
        };
        if keep {
            included_issues.push(issue.clone());
            timelines.push(timeline);
        }
    }

    let buckets = aggregate::aggregate_all(&timelines, mode, config)?;

    let mut consumed: Vec<Transition> = timelines.into_iter().flat_map(|t| t.consumed).collect();
    consumed.sort_by(|a, b| {
        a.issue_key
            .cmp(&b.issue_key)
            .then(a.at.cmp(&b.at))
            .then(a.seq.cmp(&b.seq))
    });
    included_issues.sort_by(|a, b| a.issue_key.cmp(&b.issue_key));

    log::info!(
        "Built report data: {} of {} issues, {} transitions, {} statuses",
        included_issues.len(),
        issues.len(),
        consumed.len(),
        buckets.statuses().len()
    );

    Ok(ReportData {
        issues: included_issues,
        buckets,
        transitions: consumed,
    })
}

fn in_projects(issue: &Issue, projects: &[String]) -> bool {
    projects.is_empty()
        || projects
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&issue.project_key))
}

fn existed_at(
    issue: &Issue,
    timeline: &sequence::Timeline,
    instant: DateTime<Utc>,
    by_issue: &HashMap<&str, Vec<Transition>>,
) -> bool {
    if let Some(created) = issue.created_at {
        return created <= instant;
    }
    let creation = by_issue
        .get(timeline.issue_key.as_str())
        .into_iter()
        .flatten()
        .filter(|t| t.from_status.is_none())
        .map(|t| t.at)
        .min();
    creation.is_none_or(|at| at <= instant)
}

/// A fully assembled report, ready for JSON or CSV output.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResult {
    pub report: Report,
    pub issues: Vec<Issue>,
    /// `issue_key -> status -> seconds`, zero totals omitted.
    pub buckets: BTreeMap<String, BTreeMap<String, i64>>,
    /// Every status observed in the report, sorted.
    pub statuses: Vec<String>,
    #[serde(skip)]
    bucket_set: BucketSet,
    #[serde(skip)]
    transitions: Vec<Transition>,
}

/// One chart series: a status and its seconds per issue, in issue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Series {
    pub status: String,
    pub values: Vec<i64>,
}

/// Combine a report header with its issues, buckets and consumed transitions.
pub fn assemble(
    report: Report,
    mut issues: Vec<Issue>,
    buckets: BucketSet,
    mut transitions: Vec<Transition>,
) -> ReportResult {
    issues.sort_by(|a, b| a.issue_key.cmp(&b.issue_key));
    transitions.sort_by(|a, b| {
        a.issue_key
            .cmp(&b.issue_key)
            .then(a.at.cmp(&b.at))
            .then(a.seq.cmp(&b.seq))
    });
    ReportResult {
        report,
        issues,
        buckets: buckets.durations(),
        statuses: buckets.statuses().iter().cloned().collect(),
        bucket_set: buckets,
        transitions,
    }
}

impl ReportResult {
    pub fn bucket_set(&self) -> &BucketSet {
        &self.bucket_set
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Per-status series aligned with `issues`, zero-filled.
    pub fn series(&self) -> Vec<Series> {
        self.statuses
            .iter()
            .map(|status| Series {
                status: status.clone(),
                values: self
                    .issues
                    .iter()
                    .map(|issue| {
                        self.buckets
                            .get(&issue.issue_key)
                            .and_then(|b| b.get(status))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar;
    use crate::config::BusinessCalendar;
    use crate::error::Error;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn week() -> Window {
        Window::new(day(1), day(8)).unwrap()
    }

    fn config() -> Config {
        Config::with_business(7, BusinessCalendar::standard(Tz::UTC))
    }

    fn fixture() -> (Vec<Issue>, Vec<Transition>) {
        let issues = vec![
            Issue::new("B-2", "Bug", "Crash on save", "Open").with_created_at(day(5)),
            Issue::new("A-1", "Task", "Scenario", "Done"),
            Issue::new("A-3", "Task", "Not yet", "Open").with_created_at(day(20)),
        ];
        let transitions = vec![
            Transition::new("A-1", Some("InProgress"), "Done", day(5)).with_seq(3),
            Transition::new("A-1", None, "Open", day(1)).with_seq(1),
            Transition::new("A-1", Some("Open"), "InProgress", day(3)).with_seq(2),
        ];
        (issues, transitions)
    }

    fn report_header(window: Window) -> Report {
        Report {
            id: 1,
            title: "Weekly".into(),
            created_at: later(),
            time_mode: TimeMode::WallClock,
            window_start: window.start,
            window_end: window.end,
            projects: vec![],
        }
    }

    #[test]
    fn test_build_wall_clock() {
        let (issues, transitions) = fixture();
        let data = build(&issues, &transitions, &week(), TimeMode::WallClock, &config(), &[], later())
            .unwrap();

        let keys: Vec<&str> = data.issues.iter().map(|i| i.issue_key.as_str()).collect();
        assert_eq!(keys, vec!["A-1", "B-2"]);

        let durations = data.buckets.durations();
        assert_eq!(durations["A-1"]["Open"], 172_800);
        assert_eq!(durations["A-1"]["InProgress"], 172_800);
        assert_eq!(durations["A-1"]["Done"], 259_200);
        assert_eq!(durations["B-2"]["Open"], 3 * 86_400);
        assert_eq!(data.transitions.len(), 3);
        assert_eq!(data.transitions[0].to_status, "Open");
    }

    #[test]
    fn test_build_project_filter() {
        let (issues, transitions) = fixture();
        let projects = vec!["b".to_string()];
        let data = build(&issues, &transitions, &week(), TimeMode::WallClock, &config(), &projects, later())
            .unwrap();
        assert_eq!(data.issues.len(), 1);
        assert_eq!(data.issues[0].issue_key, "B-2");
        assert!(data.transitions.is_empty());
    }

    #[test]
    fn test_build_business_hours_requires_config() {
        let (issues, transitions) = fixture();
        let err = build(
            &issues,
            &transitions,
            &week(),
            TimeMode::BusinessHours,
            &Config::wall_clock_only(7),
            &[],
            later(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
    }

    #[test]
    fn test_build_empty_window() {
        let (issues, transitions) = fixture();
        let window = Window::new(day(6), day(6)).unwrap();
        let data = build(&issues, &transitions, &window, TimeMode::WallClock, &config(), &[], later())
            .unwrap();
        let keys: Vec<&str> = data.issues.iter().map(|i| i.issue_key.as_str()).collect();
        assert_eq!(keys, vec!["A-1", "B-2"]);
        assert!(data.buckets.durations().values().all(|b| b.is_empty()));
    }

    #[test]
    fn test_build_no_issues() {
        let data = build(&[], &[], &week(), TimeMode::WallClock, &config(), &[], later()).unwrap();
        assert!(data.issues.is_empty());
        assert!(data.buckets.is_empty());
    }

    #[test]
    fn test_assemble_and_series() {
        let (issues, transitions) = fixture();
        let data = build(&issues, &transitions, &week(), TimeMode::WallClock, &config(), &[], later())
            .unwrap();
        let result = assemble(report_header(week()), data.issues, data.buckets, data.transitions);

        assert_eq!(result.statuses, vec!["Done", "InProgress", "Open"]);
        let series = result.series();
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].status, "Done");
        assert_eq!(series[0].values, vec![259_200, 0]);
        assert_eq!(series[2].values, vec![172_800, 3 * 86_400]);
    }

    #[test]
    fn test_result_json_shape() {
        let (issues, transitions) = fixture();
        let data = build(&issues, &transitions, &week(), TimeMode::WallClock, &config(), &[], later())
            .unwrap();
        let result = assemble(report_header(week()), data.issues, data.buckets, data.transitions);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["report"]["title"], "Weekly");
        assert_eq!(value["report"]["time_mode"], "wall_clock");
        assert_eq!(value["issues"][0]["issue_key"], "A-1");
        assert_eq!(value["buckets"]["A-1"]["Done"], 259_200);
        assert!(value.get("bucket_set").is_none());
        assert_eq!(value["statuses"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_resolve_window_order() {
        let cfg = config();
        let now = day(20);

        let mut req = GenerateReportRequest::new("r");
        assert_eq!(req.resolve_window(&cfg, now).unwrap(), Window::ending_at(now, 7).unwrap());

        req.period = Some(Period::Month(2024, 1));
        let w = req.resolve_window(&cfg, now).unwrap();
        assert_eq!(w.start, day(1));

        req.window_start = Some(day(2));
        req.window_end = Some(day(4));
        assert_eq!(req.resolve_window(&cfg, now).unwrap(), Window::new(day(2), day(4)).unwrap());

        req.window_end = None;
        assert_eq!(req.resolve_window(&cfg, now).unwrap().end, now);

        req.window_start = Some(day(9));
        req.window_end = Some(day(3));
        assert!(matches!(
            req.resolve_window(&cfg, now),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_resolve_window_default_days_out_of_range() {
        let cfg = Config::wall_clock_only(u32::MAX);
        let req = GenerateReportRequest::new("r");
        assert!(matches!(req.resolve_window(&cfg, day(20)), Err(Error::Config(_))));

        let mut req = GenerateReportRequest::new("r");
        req.window_end = Some(day(20));
        assert!(matches!(req.resolve_window(&cfg, day(20)), Err(Error::Config(_))));
    }

    #[test]
    fn test_build_fractional_instants_sum_to_window() {
        let ms = chrono::Duration::milliseconds;
        let issues = vec![Issue::new("A-1", "Task", "Fractional", "Done").with_created_at(day(1) + ms(300))];
        let transitions = vec![
            Transition::new("A-1", Some("Open"), "InProgress", day(2) + ms(500)).with_seq(1),
            Transition::new("A-1", Some("InProgress"), "Done", day(4) + ms(999)).with_seq(2),
        ];
        let now = day(6) + ms(750);

        let mut req = GenerateReportRequest::new("r");
        req.window_start = Some(day(1));
        let window = req.resolve_window(&config(), now).unwrap();
        assert_eq!(window.end, day(6));

        for mode in [TimeMode::WallClock, TimeMode::BusinessHours] {
            let data = build(&issues, &transitions, &window, mode, &config(), &[], now).unwrap();
            let expected = calendar::duration(window.start, window.end, mode, &config()).unwrap();
            assert_eq!(data.buckets.get("A-1").unwrap().total_seconds(), expected, "{mode}");
        }
    }
}
