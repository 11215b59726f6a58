//! Calendar keys for daily aggregates and leaderboard periods (all UTC).
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// `YYYY-MM-DD` key of the daily session document.
#[must_use]
pub fn day_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// ISO-8601 week id, e.g. `2024-W09`. The year is the ISO week-numbering year.
#[must_use]
pub fn week_id(at: DateTime<Utc>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Calendar month id, e.g. `2024-03`.
#[must_use]
pub fn month_id(at: DateTime<Utc>) -> String {
    format!("{}-{:02}", at.year(), at.month())
}

/// Streak after studying on `today`, given the previous study day.
#[must_use]
pub fn next_streak(previous_day: Option<NaiveDate>, today: NaiveDate, streak: u32) -> u32 {
    match previous_day {
        Some(day) if day == today => streak.max(1),
        Some(day) if day.succ_opt() == Some(today) => streak.saturating_add(1),
        _ => 1,
    }
}
