//! Turns an absolute interval into a duration, either literal elapsed time
//! or only the part that falls inside configured working hours.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::config::{BusinessCalendar, Config};
use crate::error::{Error, Result};
use crate::model::TimeMode;

/// Seconds between `start` and `end` under `mode`.
///
/// Fails with `InvalidRange` when `end < start`, and with `ConfigMissing`
/// when business hours are requested but not configured.
pub fn duration(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    mode: TimeMode,
    config: &Config,
) -> Result<i64> {
    if end < start {
        return Err(Error::invalid_range("duration", start, end));
    }
    match mode {
        TimeMode::WallClock => Ok((end - start).num_seconds()),
        TimeMode::BusinessHours => Ok(business_seconds(start, end, config.require_business()?)),
    }
}

/// Seconds of `[start, end)` that fall inside the calendar's working hours.
///
/// Days are local calendar dates in the calendar's timezone, so a DST
/// transition day is 23 or 25 hours long and the working window is resolved
/// against that day's own offset.
pub fn business_seconds(start: DateTime<Utc>, end: DateTime<Utc>, cal: &BusinessCalendar) -> i64 {
    if end <= start {
        return 0;
    }

    let last = end.with_timezone(&cal.tz).date_naive();
    let mut day = start.with_timezone(&cal.tz).date_naive();
    let mut total = 0;

    while day <= last {
        if cal.is_business_day(day.weekday()) {
            let open = resolve_local(cal.tz, day.and_time(cal.start));
            let close = resolve_local(cal.tz, day.and_time(cal.end));
            let lo = open.max(start);
            let hi = close.min(end);
            if hi > lo {
                total += (hi - lo).num_seconds();
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    total
}

/// Map a local wall-clock time to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that
/// do not exist (clocks going forward) move to the first valid instant after
/// the gap.
pub(crate) fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let mut probe = naive;
            // DST gaps are whole multiples of 15 minutes and shorter than a day.
            for _ in 0..96 {
                probe += Duration::minutes(15);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            log::warn!("Could not resolve local time {naive} in {tz}, reading it as UTC");
            naive.and_utc()
        }
    }
}
