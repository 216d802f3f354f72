use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Bucket size for demand series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    #[default]
    IsoWeek,
    Month,
}

impl Granularity {
    /// Truncate a date to the start of its bucket.
    pub fn bucket(self, date: NaiveDate) -> Period {
        let start = match self {
            Granularity::Day => date,
            Granularity::IsoWeek => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        };
        Period(start)
    }

    pub fn next(self, period: Period) -> Period {
        self.advance(period, 1)
    }

    pub fn advance(self, period: Period, steps: u32) -> Period {
        let start = match self {
            Granularity::Day => period.0 + Duration::days(i64::from(steps)),
            Granularity::IsoWeek => period.0 + Duration::weeks(i64::from(steps)),
            Granularity::Month => period
                .0
                .checked_add_months(Months::new(steps))
                .unwrap_or(period.0),
        };
        Period(start)
    }

    /// Number of whole buckets from `from` to `to` (negative when `to` is earlier).
    pub fn steps_between(self, from: Period, to: Period) -> i64 {
        match self {
            Granularity::Day => (to.0 - from.0).num_days(),
            Granularity::IsoWeek => (to.0 - from.0).num_days().div_euclid(7),
            Granularity::Month => {
                let a = i64::from(from.0.year()) * 12 + i64::from(from.0.month0());
                let b = i64::from(to.0.year()) * 12 + i64::from(to.0.month0());
                b - a
            }
        }
    }

    pub fn default_season_length(self) -> usize {
        match self {
            Granularity::Day => 7,
            Granularity::IsoWeek => 52,
            Granularity::Month => 12,
        }
    }

    pub fn label(self, period: Period) -> String {
        match self {
            Granularity::Day => period.0.format("%Y-%m-%d").to_string(),
            Granularity::IsoWeek => {
                let week = period.0.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Granularity::Month => period.0.format("%Y-%m").to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::IsoWeek => "iso_week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "iso_week" | "week" | "weekly" => Ok(Granularity::IsoWeek),
            "month" | "monthly" => Ok(Granularity::Month),
            other => Err(format!("unknown granularity `{other}`")),
        }
    }
}

/// Start date of a bucket. Only meaningful together with its [`Granularity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(pub NaiveDate);

impl Period {
    pub fn start(self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn iso_week_buckets_start_on_monday() {
        // 2026-03-05 is a Thursday.
        let p = Granularity::IsoWeek.bucket(d(2026, 3, 5));
        assert_eq!(p.start(), d(2026, 3, 2));
        assert_eq!(Granularity::IsoWeek.label(p), "2026-W10");
        assert_eq!(Granularity::IsoWeek.bucket(d(2026, 3, 8)), p);
    }

    #[test]
    fn month_steps_cross_year_boundary() {
        let from = Granularity::Month.bucket(d(2025, 11, 20));
        let to = Granularity::Month.bucket(d(2026, 2, 1));
        assert_eq!(Granularity::Month.steps_between(from, to), 3);
        assert_eq!(Granularity::Month.advance(from, 3), to);
    }

    #[test]
    fn granularity_parses_aliases() {
        assert_eq!("weekly".parse::<Granularity>().unwrap(), Granularity::IsoWeek);
        assert!("fortnight".parse::<Granularity>().is_err());
    }
}
