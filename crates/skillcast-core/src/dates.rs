//! Posting timestamps as boards publish them.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%B %d, %Y", "%b %d, %Y"];

/// Parse a published timestamp into a calendar date. Relative forms such as
/// `3 days ago` resolve against `as_of`.
pub fn parse_posted_date(text: &str, as_of: DateTime<Utc>) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    parse_relative(text, as_of)
}

fn parse_relative(text: &str, as_of: DateTime<Utc>) -> Option<NaiveDate> {
    let lower = text.to_ascii_lowercase();
    let today = as_of.date_naive();
    match lower.as_str() {
        "today" | "just now" | "just posted" => return Some(today),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }

    let rest = lower.strip_prefix("posted ").unwrap_or(&lower);
    let rest = rest.strip_suffix(" ago")?;
    let mut words = rest.split_whitespace();
    let amount = match words.next()? {
        "a" | "an" | "one" => 1,
        n => n.trim_end_matches('+').parse::<i64>().ok()?,
    };
    let unit = words.next()?;
    if words.next().is_some() {
        return None;
    }
    let days = match unit.trim_end_matches('s') {
        "minute" | "min" | "hour" | "hr" => 0,
        "day" => amount,
        "week" => amount * 7,
        "month" => amount * 30,
        "year" => amount * 365,
        _ => return None,
    };
    Some(today - Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    #[test]
    fn absolute_formats() {
        assert_eq!(parse_posted_date("2026-03-02T08:30:00Z", as_of()), d(2026, 3, 2));
        assert_eq!(parse_posted_date("2026-03-02", as_of()), d(2026, 3, 2));
        assert_eq!(parse_posted_date("03/02/2026", as_of()), d(2026, 3, 2));
        assert_eq!(parse_posted_date("25/02/2026", as_of()), d(2026, 2, 25));
        assert_eq!(parse_posted_date("March 2, 2026", as_of()), d(2026, 3, 2));
        assert_eq!(parse_posted_date("Mar 2, 2026", as_of()), d(2026, 3, 2));
    }

    #[test]
    fn relative_forms_use_as_of() {
        assert_eq!(parse_posted_date("3 days ago", as_of()), d(2026, 3, 7));
        assert_eq!(parse_posted_date("Posted 2 weeks ago", as_of()), d(2026, 2, 24));
        assert_eq!(parse_posted_date("a month ago", as_of()), d(2026, 2, 8));
        assert_eq!(parse_posted_date("30+ days ago", as_of()), d(2026, 2, 8));
        assert_eq!(parse_posted_date("5 hours ago", as_of()), d(2026, 3, 10));
        assert_eq!(parse_posted_date("yesterday", as_of()), d(2026, 3, 9));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_posted_date("", as_of()), None);
        assert_eq!(parse_posted_date("sometime soon", as_of()), None);
        assert_eq!(parse_posted_date("many days ago", as_of()), None);
    }
}
