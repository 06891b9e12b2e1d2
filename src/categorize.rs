//! Temporal bucketing of scheduled fixtures.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Weekday};

use crate::models::DateCategory;

/// Feed timestamp format, e.g. "2025-06-14 18:30"
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Parse a feed timestamp. Only the canonical zero-padded form is accepted,
/// so accepted timestamps also order correctly as strings.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let parsed = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()?;
    (parsed.format(TIMESTAMP_FORMAT).to_string() == s).then_some(parsed)
}

/// Bucket a fixture's timestamp relative to `now`. Only the calendar date is
/// considered. Past fixtures and unparseable timestamps yield `None`.
pub fn categorize(timestamp: &str, now: NaiveDateTime) -> Option<DateCategory> {
    let event_date = parse_timestamp(timestamp)?.date();
    categorize_date(event_date, now.date())
}

pub fn categorize_date(event_date: NaiveDate, today: NaiveDate) -> Option<DateCategory> {
    if event_date < today {
        return None;
    }
    let tomorrow = today.checked_add_days(Days::new(1))?;
    let week_out = today.checked_add_days(Days::new(7))?;

    if event_date == today {
        Some(DateCategory::Today)
    } else if event_date == tomorrow {
        Some(DateCategory::Tomorrow)
    } else if is_weekend(event_date) && event_date <= week_out {
        // Weekend wins over the generic "within a week" bucket
        Some(DateCategory::Weekend)
    } else {
        // Anything further out also lands in NEXT_WEEK
        Some(DateCategory::NextWeek)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
