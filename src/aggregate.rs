//! Folds status intervals into per-status durations.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::calendar;
use crate::config::Config;
use crate::error::Result;
use crate::model::TimeMode;
use crate::sequence::{Interval, Timeline};

/// Time spent in one status and how many separate times it was entered.
///
/// `seconds` is measured in the report's own mode. Wall-clock time is always
/// kept alongside it, and business time too whenever a business calendar is
/// configured, so one report can show both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusStat {
    pub seconds: i64,
    pub entered_count: u32,
    pub wall_seconds: i64,
    pub business_seconds: Option<i64>,
}

/// Per-status totals for one issue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueBuckets {
    pub issue_key: String,
    /// Every status the issue held in the window, including zero-duration ones.
    stats: BTreeMap<String, StatusStat>,
}

impl IssueBuckets {
    pub fn new(issue_key: impl Into<String>) -> Self {
        Self {
            issue_key: issue_key.into(),
            stats: BTreeMap::new(),
        }
    }

    fn add(&mut self, status: &str, seconds: i64, wall_seconds: i64, business_seconds: Option<i64>) {
        let stat = self.stats.entry(status.to_string()).or_default();
        stat.seconds += seconds;
        stat.entered_count += 1;
        stat.wall_seconds += wall_seconds;
        stat.business_seconds = business_seconds.map(|s| stat.business_seconds.unwrap_or(0) + s);
    }

    /// Restore a previously computed total, e.g. when loading a stored report.
    pub fn insert_stat(&mut self, status: impl Into<String>, stat: StatusStat) {
        self.stats.insert(status.into(), stat);
    }

    /// `status -> seconds`, omitting statuses with zero time.
    pub fn durations(&self) -> BTreeMap<String, i64> {
        self.stats
            .iter()
            .filter(|(_, s)| s.seconds > 0)
            .map(|(status, s)| (status.clone(), s.seconds))
            .collect()
    }

    pub fn stats(&self) -> &BTreeMap<String, StatusStat> {
        &self.stats
    }

    pub fn total_seconds(&self) -> i64 {
        self.stats.values().map(|s| s.seconds).sum()
    }
}

/// Buckets for every issue in a report plus the union of observed statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSet {
    issues: BTreeMap<String, IssueBuckets>,
    statuses: BTreeSet<String>,
}

impl BucketSet {
    pub fn insert(&mut self, buckets: IssueBuckets) {
        self.statuses.extend(buckets.stats.keys().cloned());
        self.issues.insert(buckets.issue_key.clone(), buckets);
    }

    pub fn get(&self, issue_key: &str) -> Option<&IssueBuckets> {
        self.issues.get(issue_key)
    }

    pub fn issues(&self) -> impl Iterator<Item = &IssueBuckets> {
        self.issues.values()
    }

    /// All statuses seen in any issue, even where every total is zero.
    pub fn statuses(&self) -> &BTreeSet<String> {
        &self.statuses
    }

    /// `issue_key -> status -> seconds`, zero totals omitted.
    pub fn durations(&self) -> BTreeMap<String, BTreeMap<String, i64>> {
        self.issues
            .iter()
            .map(|(key, b)| (key.clone(), b.durations()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Sum the duration of each interval into its status.
///
/// Wall-clock and, when configured, business seconds are summed as well,
/// whatever `mode` is.
pub fn aggregate(
    issue_key: &str,
    intervals: &[Interval],
    mode: TimeMode,
    config: &Config,
) -> Result<IssueBuckets> {
    let mut buckets = IssueBuckets::new(issue_key);
    for interval in intervals {
        let (start, end) = (interval.start, interval.end);
        let wall = calendar::duration(start, end, TimeMode::WallClock, config)?;
        let business = config
            .business
            .as_ref()
            .map(|cal| calendar::business_seconds(start, end, cal));
        let seconds = match (mode, business) {
            (TimeMode::WallClock, _) => wall,
            (TimeMode::BusinessHours, Some(secs)) => secs,
            (TimeMode::BusinessHours, None) => calendar::duration(start, end, mode, config)?,
        };
        buckets.add(&interval.status, seconds, wall, business);
    }
    Ok(buckets)
}

/// Aggregate every timeline in parallel and merge by issue key.
///
/// Business-hours configuration is checked before any work starts.
pub fn aggregate_all(timelines: &[Timeline], mode: TimeMode, config: &Config) -> Result<BucketSet> {
    if mode == TimeMode::BusinessHours {
        config.require_business()?;
    }

    let per_issue: Vec<IssueBuckets> = timelines
        .par_iter()
        .map(|t| aggregate(&t.issue_key, &t.intervals, mode, config))
        .collect::<Result<_>>()?;

    let mut set = BucketSet::default();
    for buckets in per_issue {
        set.insert(buckets);
    }
    log::debug!(
        "Aggregated {} issues across {} statuses ({mode})",
        set.len(),
        set.statuses().len()
    );
    Ok(set)
}
