//! Turns an issue's raw status changes into gapless status intervals
//! covering a reporting window.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::date_util::whole_seconds;
use crate::error::{Error, Result};
use crate::model::{Issue, Transition};

/// Status assigned to time before the first known transition when the
/// issue predates it and no prior status was recorded.
pub const UNKNOWN_STATUS: &str = "Unknown";

/// A half-open reporting window `[start, end)`. Bounds are whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// `start == end` is a valid, empty window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let (start, end) = (whole_seconds(start), whole_seconds(end));
        if start > end {
            return Err(Error::invalid_range("report window", start, end));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Result<Self> {
        let end = whole_seconds(end);
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| Error::Config(format!("a {days}-day window ending at {end} is out of range")))?;
        Ok(Self { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A span during which an issue held one status. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub issue_key: String,
    pub status: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Sequenced history of one issue within a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub issue_key: String,
    /// Contiguous, non-overlapping, never zero-length.
    pub intervals: Vec<Interval>,
    /// Raw transitions that determined the intervals, in chronological order.
    pub consumed: Vec<Transition>,
}

/// Build the interval sequence for `issue` over `window`.
///
/// `transitions` may be unordered and may contain other issues' records;
/// only those matching the issue key are used. The covered span is
/// `[max(window.start, origin), min(window.end, now))`, where the origin is
/// the issue's creation instant when known.
pub fn sequence(
    issue: &Issue,
    transitions: &[Transition],
    window: &Window,
    now: DateTime<Utc>,
) -> Result<Timeline> {
    let key = issue.issue_key.as_str();
    let ordered = order_transitions(key, transitions)?;

    let origin = issue.created_at.or_else(|| {
        ordered
            .first()
            .filter(|t| t.from_status.is_none())
            .map(|t| t.at)
    });
    let (window_start, window_end) = (whole_seconds(window.start), whole_seconds(window.end));
    let span_start = origin.map_or(window_start, |o| whole_seconds(o).max(window_start));
    let span_end = window_end.min(whole_seconds(now));

    let mut timeline = Timeline {
        issue_key: key.to_string(),
        intervals: Vec::new(),
        consumed: Vec::new(),
    };
    if span_end <= span_start {
        return Ok(timeline);
    }

    // Everything before `split` happened at or before the span start.
    let split = ordered.partition_point(|t| whole_seconds(t.at) <= span_start);
    let anchor = split.checked_sub(1).map(|i| ordered[i]);

    let mut status = match anchor {
        Some(t) => t.to_status.clone(),
        None => match ordered.first() {
            Some(first) => match &first.from_status {
                Some(from) => from.clone(),
                None => {
                    log::debug!(
                        "{key}: no status recorded before {}, using {UNKNOWN_STATUS}",
                        first.at
                    );
                    UNKNOWN_STATUS.to_string()
                }
            },
            None => issue.current_status.clone(),
        },
    };
    if let Some(t) = anchor {
        timeline.consumed.push(t.clone());
    }

    let mut cursor = span_start;
    for t in &ordered[split..] {
        let at = whole_seconds(t.at);
        if at >= span_end {
            break;
        }
        if let Some(from) = t.from_status.as_deref() {
            if from != status {
                log::debug!(
                    "{key}: transition at {} leaves '{from}' but issue was in '{status}'",
                    t.at
                );
            }
        }
        push_interval(&mut timeline.intervals, key, &status, cursor, at);
        cursor = at;
        status = t.to_status.clone();
        timeline.consumed.push((*t).clone());
    }
    push_interval(&mut timeline.intervals, key, &status, cursor, span_end);

    Ok(timeline)
}

/// The issue's transitions sorted by `(at, seq)`.
///
/// Equal instants are only accepted when both records carry distinct
/// sequence numbers.
fn order_transitions<'a>(key: &str, transitions: &'a [Transition]) -> Result<Vec<&'a Transition>> {
    let mut ordered: Vec<&Transition> = transitions.iter().filter(|t| t.issue_key == key).collect();
    ordered.sort_by(|a, b| a.at.cmp(&b.at).then(a.seq.cmp(&b.seq)));

    for pair in ordered.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.at == b.at && (a.seq.is_none() || b.seq.is_none() || a.seq == b.seq) {
            return Err(Error::UnorderedData {
                issue_key: key.to_string(),
                at: a.at,
            });
        }
    }
    Ok(ordered)
}

fn push_interval(
    intervals: &mut Vec<Interval>,
    key: &str,
    status: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) {
    if end > start {
        intervals.push(Interval {
            issue_key: key.to_string(),
            status: status.to_string(),
            start,
            end,
        });
    }
}
