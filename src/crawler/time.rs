//! Relative update-time normalization
//!
//! Listing entries report their last update as phrases such as `刚刚`,
//! `5分钟前` or `3天前`, falling back to a plain `YYYY-MM-DD` date for older
//! entries. This module turns those phrases into absolute local timestamps.

use chrono::{Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;

/// Phrase meaning "just now"
pub const JUST_NOW: &str = "刚刚";

const MINUTES_AGO: &str = "分钟前";
const HOURS_AGO: &str = "小时前";
const DAYS_AGO: &str = "天前";
const MONTHS_AGO: &str = "个月前";

/// Error returned for phrases that are neither relative nor a calendar date
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized update time: '{0}'")]
pub struct TimeParseError(pub String);

/// Converts an update-time phrase into an absolute timestamp relative to `now`
///
/// | Phrase | Result |
/// |--------|--------|
/// | `刚刚` | `now` truncated to the second |
/// | `N分钟前` | `now` truncated to the minute, minus N minutes |
/// | `N小时前` | `now` truncated to the minute, minus N hours |
/// | `N天前` | `now` truncated to the day, minus N days |
/// | `N个月前` | `now` truncated to the day, minus N months |
/// | `YYYY-MM-DD` | start of that day |
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use novel_spider::crawler::normalize_update_time;
///
/// let now = NaiveDate::from_ymd_opt(2024, 3, 10)
///     .unwrap()
///     .and_hms_opt(14, 25, 40)
///     .unwrap();
/// let ts = normalize_update_time("5分钟前", now).unwrap();
/// assert_eq!(ts.to_string(), "2024-03-10 14:20:00");
/// ```
pub fn normalize_update_time(
    phrase: &str,
    now: NaiveDateTime,
) -> Result<NaiveDateTime, TimeParseError> {
    let phrase = phrase.trim();
    let err = || TimeParseError(phrase.to_string());

    if phrase == JUST_NOW {
        return Ok(truncate_to_second(now));
    }

    if let Some(n) = phrase.strip_suffix(MINUTES_AGO) {
        let minutes = parse_amount(n).ok_or_else(err)?;
        return truncate_to_minute(now)
            .checked_sub_signed(Duration::try_minutes(minutes).ok_or_else(err)?)
            .ok_or_else(err);
    }

    if let Some(n) = phrase.strip_suffix(HOURS_AGO) {
        let hours = parse_amount(n).ok_or_else(err)?;
        return truncate_to_minute(now)
            .checked_sub_signed(Duration::try_hours(hours).ok_or_else(err)?)
            .ok_or_else(err);
    }

    if let Some(n) = phrase.strip_suffix(DAYS_AGO) {
        let days = parse_amount(n).ok_or_else(err)?;
        return truncate_to_day(now)
            .checked_sub_signed(Duration::try_days(days).ok_or_else(err)?)
            .ok_or_else(err);
    }

    if let Some(n) = phrase.strip_suffix(MONTHS_AGO) {
        let months = u32::try_from(parse_amount(n).ok_or_else(err)?).map_err(|_| err())?;
        return truncate_to_day(now)
            .checked_sub_months(Months::new(months))
            .ok_or_else(err);
    }

    NaiveDate::parse_from_str(phrase, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(err)
}

fn parse_amount(n: &str) -> Option<i64> {
    n.trim().parse::<i64>().ok().filter(|n| *n >= 0)
}

fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    let ts = truncate_to_second(ts);
    ts.with_second(0).unwrap_or(ts)
}

fn truncate_to_day(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(chrono::NaiveTime::MIN)
}
