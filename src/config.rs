use std::collections::BTreeMap;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;

use crate::error::{Error, Result};

pub const KEY_JIRA_BASE_URL: &str = "jira_base_url";
pub const KEY_JIRA_EMAIL: &str = "jira_email";
pub const KEY_JIRA_API_TOKEN: &str = "jira_api_token";
pub const KEY_DEFAULT_WINDOW_DAYS: &str = "default_window_days";
pub const KEY_TIMEZONE: &str = "timezone";
pub const KEY_BUSINESS_HOURS_START: &str = "business_hours_start";
pub const KEY_BUSINESS_HOURS_END: &str = "business_hours_end";
pub const KEY_BUSINESS_DAYS: &str = "business_days";

/// Every settings key the store understands, in display order.
pub const KNOWN_KEYS: [&str; 8] = [
    KEY_JIRA_BASE_URL,
    KEY_JIRA_EMAIL,
    KEY_JIRA_API_TOKEN,
    KEY_DEFAULT_WINDOW_DAYS,
    KEY_TIMEZONE,
    KEY_BUSINESS_HOURS_START,
    KEY_BUSINESS_HOURS_END,
    KEY_BUSINESS_DAYS,
];

pub const DEFAULT_WINDOW_DAYS: u32 = 180;
/// Upper bound for `default_window_days`, roughly a century.
pub const MAX_WINDOW_DAYS: u32 = 36_600;
pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_BUSINESS_HOURS_START: &str = "09:00";
pub const DEFAULT_BUSINESS_HOURS_END: &str = "17:00";
pub const DEFAULT_BUSINESS_DAYS: &str = "Mon,Tue,Wed,Thu,Fri";

/// Working hours and days in a single timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessCalendar {
    pub tz: Tz,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Sorted Monday-first, no duplicates, never empty.
    days: Vec<Weekday>,
}

impl BusinessCalendar {
    pub fn new(tz: Tz, start: NaiveTime, end: NaiveTime, days: &[Weekday]) -> Result<Self> {
        if start >= end {
            return Err(Error::Config(format!(
                "business hours start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        let mut days = days.to_vec();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        if days.is_empty() {
            return Err(Error::Config("business_days must not be empty".into()));
        }
        Ok(Self {
            tz,
            start,
            end,
            days,
        })
    }

    /// Monday to Friday, 09:00 to 17:00 in `tz`.
    pub fn standard(tz: Tz) -> Self {
        Self {
            tz,
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    pub fn is_business_day(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    /// Length of one working day in seconds, ignoring DST shifts.
    pub fn seconds_per_day(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// Resolved settings for one report run. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub default_window_days: u32,
    pub business: Option<BusinessCalendar>,
    /// Business-hours keys absent from the settings store.
    missing_business_fields: Vec<String>,
}

impl Config {
    pub fn wall_clock_only(default_window_days: u32) -> Self {
        Self {
            default_window_days,
            business: None,
            missing_business_fields: vec![
                KEY_TIMEZONE.to_string(),
                KEY_BUSINESS_HOURS_START.to_string(),
                KEY_BUSINESS_HOURS_END.to_string(),
                KEY_BUSINESS_DAYS.to_string(),
            ],
        }
    }

    pub fn with_business(default_window_days: u32, calendar: BusinessCalendar) -> Self {
        Self {
            default_window_days,
            business: Some(calendar),
            missing_business_fields: Vec::new(),
        }
    }

    /// Build a config from the raw key/value settings store.
    ///
    /// Present but malformed values are rejected here. Absent business-hours
    /// keys are tolerated and only reported when business hours are needed.
    pub fn from_settings(settings: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            settings
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let default_window_days = match get(KEY_DEFAULT_WINDOW_DAYS) {
            Some(raw) => parse_window_days(raw)?,
            None => DEFAULT_WINDOW_DAYS,
        };

        let tz = get(KEY_TIMEZONE).map(parse_timezone).transpose()?;
        let start = get(KEY_BUSINESS_HOURS_START).map(parse_hhmm).transpose()?;
        let end = get(KEY_BUSINESS_HOURS_END).map(parse_hhmm).transpose()?;
        let days = get(KEY_BUSINESS_DAYS)
            .map(parse_business_days)
            .transpose()?;

        match (tz, start, end, days) {
            (Some(tz), Some(start), Some(end), Some(days)) => Ok(Self::with_business(
                default_window_days,
                BusinessCalendar::new(tz, start, end, &days)?,
            )),
            (tz, start, end, days) => {
                let mut missing = Vec::new();
                if tz.is_none() {
                    missing.push(KEY_TIMEZONE.to_string());
                }
                if start.is_none() {
                    missing.push(KEY_BUSINESS_HOURS_START.to_string());
                }
                if end.is_none() {
                    missing.push(KEY_BUSINESS_HOURS_END.to_string());
                }
                if days.is_none() {
                    missing.push(KEY_BUSINESS_DAYS.to_string());
                }
                Ok(Self {
                    default_window_days,
                    business: None,
                    missing_business_fields: missing,
                })
            }
        }
    }

    /// The business calendar, or `ConfigMissing` naming the absent keys.
    pub fn require_business(&self) -> Result<&BusinessCalendar> {
        self.business
            .as_ref()
            .ok_or_else(|| Error::ConfigMissing(self.missing_business_fields.join(", ")))
    }
}

impl Default for Config {
    fn default() -> Self {
        let tz = DEFAULT_TIMEZONE.parse::<Tz>().unwrap_or(Tz::UTC);
        Self::with_business(DEFAULT_WINDOW_DAYS, BusinessCalendar::standard(tz))
    }
}

/// Settings written by `config init`.
pub fn default_settings() -> Vec<(&'static str, String)> {
    vec![
        (KEY_DEFAULT_WINDOW_DAYS, DEFAULT_WINDOW_DAYS.to_string()),
        (KEY_TIMEZONE, DEFAULT_TIMEZONE.to_string()),
        (KEY_BUSINESS_HOURS_START, DEFAULT_BUSINESS_HOURS_START.to_string()),
        (KEY_BUSINESS_HOURS_END, DEFAULT_BUSINESS_HOURS_END.to_string()),
        (KEY_BUSINESS_DAYS, DEFAULT_BUSINESS_DAYS.to_string()),
    ]
}

/// Check a value before it is stored under `key`.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    match key {
        KEY_DEFAULT_WINDOW_DAYS => parse_window_days(value).map(|_| ()),
        KEY_TIMEZONE => parse_timezone(value).map(|_| ()),
        KEY_BUSINESS_HOURS_START | KEY_BUSINESS_HOURS_END => parse_hhmm(value).map(|_| ()),
        KEY_BUSINESS_DAYS => parse_business_days(value).map(|_| ()),
        KEY_JIRA_BASE_URL | KEY_JIRA_EMAIL | KEY_JIRA_API_TOKEN => Ok(()),
        other => Err(Error::Config(format!(
            "unknown setting '{other}' (known: {})",
            KNOWN_KEYS.join(", ")
        ))),
    }
}

pub fn parse_timezone(s: &str) -> Result<Tz> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Config(format!("unknown timezone: {s}")))
}

/// Parse `HH:MM` (24h clock).
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| Error::Config(format!("invalid time of day (expected HH:MM): {s}")))
}

/// Parse a comma list of weekdays. Only the first three letters of each
/// entry are significant, so `Mon`, `monday` and `MON` are equivalent.
pub fn parse_business_days(s: &str) -> Result<Vec<Weekday>> {
    let mut days = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let prefix: String = part.chars().take(3).collect::<String>().to_lowercase();
        let day = match prefix.as_str() {
            "mon" => Weekday::Mon,
            "tue" => Weekday::Tue,
            "wed" => Weekday::Wed,
            "thu" => Weekday::Thu,
            "fri" => Weekday::Fri,
            "sat" => Weekday::Sat,
            "sun" => Weekday::Sun,
            _ => return Err(Error::Config(format!("unknown weekday: {part}"))),
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err(Error::Config("business_days must not be empty".into()));
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Ok(days)
}

pub fn format_business_days(days: &[Weekday]) -> String {
    days.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_window_days(s: &str) -> Result<u32> {
    match s.trim().parse::<u32>() {
        Ok(n) if (1..=MAX_WINDOW_DAYS).contains(&n) => Ok(n),
        _ => Err(Error::Config(format!(
            "default_window_days must be between 1 and {MAX_WINDOW_DAYS}, got '{s}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_settings_full() {
        let config = Config::from_settings(&settings(&[
            ("default_window_days", "30"),
            ("timezone", "Europe/Berlin"),
            ("business_hours_start", "08:30"),
            ("business_hours_end", "16:00"),
            ("business_days", "Mon,Wed,Fri"),
        ]))
        .unwrap();

        assert_eq!(config.default_window_days, 30);
        let cal = config.require_business().unwrap();
        assert_eq!(cal.tz, chrono_tz::Europe::Berlin);
        assert_eq!(cal.start, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
        assert_eq!(cal.days(), &[Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(cal.seconds_per_day(), 7 * 3600 + 1800);
    }

    #[test]
    fn test_from_settings_missing_business_fields() {
        let config = Config::from_settings(&settings(&[
            ("timezone", "UTC"),
            ("business_hours_start", "09:00"),
        ]))
        .unwrap();

        assert_eq!(config.default_window_days, DEFAULT_WINDOW_DAYS);
        match config.require_business() {
            Err(Error::ConfigMissing(fields)) => {
                assert_eq!(fields, "business_hours_end, business_days");
            }
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_from_settings_rejects_malformed() {
        assert!(Config::from_settings(&settings(&[("timezone", "Mars/Olympus")])).is_err());
        assert!(Config::from_settings(&settings(&[("default_window_days", "0")])).is_err());
        assert!(Config::from_settings(&settings(&[("default_window_days", "4000000000")])).is_err());
        assert!(Config::from_settings(&settings(&[("default_window_days", "36601")])).is_err());
        let longest = Config::from_settings(&settings(&[("default_window_days", "36600")])).unwrap();
        assert_eq!(longest.default_window_days, MAX_WINDOW_DAYS);
        assert!(Config::from_settings(&settings(&[("business_hours_start", "9am")])).is_err());

        let inverted = Config::from_settings(&settings(&[
            ("timezone", "UTC"),
            ("business_hours_start", "17:00"),
            ("business_hours_end", "09:00"),
            ("business_days", "Mon"),
        ]));
        assert!(matches!(inverted, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_business_days() {
        assert_eq!(
            parse_business_days("friday, mon ,TUE,Mon").unwrap(),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Fri]
        );
        assert!(parse_business_days("").is_err());
        assert!(parse_business_days(" , ").is_err());
        assert!(parse_business_days("Mon,Funday").is_err());
    }

    #[test]
    fn test_format_business_days() {
        assert_eq!(
            format_business_days(&[Weekday::Mon, Weekday::Sat]),
            "Mon,Sat"
        );
    }

    #[test]
    fn test_validate_setting() {
        assert!(validate_setting("timezone", "Asia/Tokyo").is_ok());
        assert!(validate_setting("jira_email", "anything").is_ok());
        assert!(validate_setting("business_days", "").is_err());
        assert!(validate_setting("colour", "blue").is_err());
    }

    #[test]
    fn test_default_settings_resolve() {
        let map: BTreeMap<String, String> = default_settings()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let config = Config::from_settings(&map).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_business_calendar_new_validates() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        assert!(BusinessCalendar::new(Tz::UTC, five, nine, &[Weekday::Mon]).is_err());
        assert!(BusinessCalendar::new(Tz::UTC, nine, five, &[]).is_err());
        let cal = BusinessCalendar::new(Tz::UTC, nine, five, &[Weekday::Fri, Weekday::Mon]).unwrap();
        assert!(cal.is_business_day(Weekday::Fri));
        assert!(!cal.is_business_day(Weekday::Sat));
    }
}
