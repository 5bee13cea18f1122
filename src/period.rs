use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

use crate::calendar::resolve_local;
use crate::date_util::{last_day_of_month, quarter_of};
use crate::error::{Error, Result};
use crate::sequence::Window;

static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,4})[dD]$").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})$").unwrap());
static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// A named reporting period.
///
/// Calendar periods cover whole local days in the configured timezone.
/// To-date periods run from the start of the current period up to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Rolling(u32),
    Year(i32),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    YearToDate,
    QuarterToDate,
    MonthToDate,
    WeekToDate,
}

impl Period {
    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `30d`: the last N days
    /// - `2025`: year
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `2025-W05`: ISO week
    /// - `ytd`, `qtd`, `mtd`, `wtd`: current period to date
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        match s.to_lowercase().as_str() {
            "ytd" => return Ok(Period::YearToDate),
            "qtd" => return Ok(Period::QuarterToDate),
            "mtd" => return Ok(Period::MonthToDate),
            "wtd" => return Ok(Period::WeekToDate),
            _ => {}
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let days: u32 = parse_num(&caps[1], s)?;
            if days == 0 {
                return Err(Error::PeriodParse(format!("rolling period must be at least 1 day: {s}")));
            }
            return Ok(Period::Rolling(days));
        }

        if let Some(caps) = RE_YEAR.captures(s) {
            return Ok(Period::Year(parse_num(&caps[1], s)?));
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            return Ok(Period::Quarter(parse_num(&caps[1], s)?, parse_num(&caps[2], s)?));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let week: u8 = parse_num(&caps[2], s)?;
            if (1..=53).contains(&week) {
                return Ok(Period::Week(parse_num(&caps[1], s)?, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let month: u8 = parse_num(&caps[2], s)?;
            if (1..=12).contains(&month) {
                return Ok(Period::Month(parse_num(&caps[1], s)?, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Canonical string form, accepted back by `parse`.
    pub fn to_key(&self) -> String {
        match self {
            Period::Rolling(n) => format!("{n}d"),
            Period::Year(y) => format!("{y}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::YearToDate => "ytd".to_string(),
            Period::QuarterToDate => "qtd".to_string(),
            Period::MonthToDate => "mtd".to_string(),
            Period::WeekToDate => "wtd".to_string(),
        }
    }

    /// First and last local date (both inclusive) for calendar periods.
    fn date_range(&self, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        match self {
            Period::Rolling(_) => None,
            Period::Year(y) => Some((
                NaiveDate::from_ymd_opt(*y, 1, 1)?,
                NaiveDate::from_ymd_opt(*y, 12, 31)?,
            )),
            Period::Quarter(y, q) => {
                if *q > 4 {
                    return None;
                }
                let start_month = u32::from(*q).checked_sub(1)? * 3 + 1;
                Some((
                    NaiveDate::from_ymd_opt(*y, start_month, 1)?,
                    last_day_of_month(*y, start_month + 2)?,
                ))
            }
            Period::Month(y, m) => Some((
                NaiveDate::from_ymd_opt(*y, *m as u32, 1)?,
                last_day_of_month(*y, *m as u32)?,
            )),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon)?;
                Some((start, start + Duration::days(6)))
            }
            Period::YearToDate => Some((NaiveDate::from_ymd_opt(today.year(), 1, 1)?, today)),
            Period::QuarterToDate => {
                let start_month = (quarter_of(today) as u32 - 1) * 3 + 1;
                Some((NaiveDate::from_ymd_opt(today.year(), start_month, 1)?, today))
            }
            Period::MonthToDate => Some((today.with_day(1)?, today)),
            Period::WeekToDate => {
                let back = today.weekday().num_days_from_monday() as i64;
                Some((today - Duration::days(back), today))
            }
        }
    }

    fn is_to_date(&self) -> bool {
        matches!(
            self,
            Period::YearToDate | Period::QuarterToDate | Period::MonthToDate | Period::WeekToDate
        )
    }

    /// Resolve the period into a UTC window, taking day boundaries in `tz`.
    pub fn window(&self, tz: Tz, now: DateTime<Utc>) -> Result<Window> {
        if let Period::Rolling(days) = self {
            return Window::ending_at(now, *days);
        }

        let today = now.with_timezone(&tz).date_naive();
        let (first, last) = self
            .date_range(today)
            .ok_or_else(|| Error::PeriodParse(format!("no such period: {}", self.to_key())))?;

        let start = local_midnight(tz, first);
        let end = if self.is_to_date() {
            now
        } else {
            let day_after = last
                .succ_opt()
                .ok_or_else(|| Error::PeriodParse(format!("period out of range: {}", self.to_key())))?;
            local_midnight(tz, day_after)
        };
        Window::new(start, end)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl std::str::FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Period::parse(s)
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    resolve_local(tz, date.and_time(chrono::NaiveTime::MIN))
}

fn parse_num<T: std::str::FromStr>(digits: &str, input: &str) -> Result<T> {
    digits
        .parse()
        .map_err(|_| Error::PeriodParse(format!("number out of range in: {input}")))
}
