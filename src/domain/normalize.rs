// Time normalization - flooring device timestamps to a fixed UTC grid
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::domain::ConfigurationError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Pure, monotonic, idempotent mapping from a raw timestamp to the start of
/// its slot on a fixed grid. Built from specs like `"5-minutes"`, `"1-days"`
/// or `"1-months"`; an unknown spec fails at construction, never at apply
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionDivider {
    Minutes(u32),
    Hours(u32),
    Days,
    Months,
    Years,
}

impl ResolutionDivider {
    pub fn new(spec: &str) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidResolutionSpec(spec.to_string());
        let (count, unit) = spec.split_once('-').ok_or_else(invalid)?;
        let count: u32 = count.parse().map_err(|_| invalid())?;
        match unit {
            // Slot boundaries must line up with day boundaries, otherwise
            // the grid would drift across midnight.
            "minutes" if count >= 1 && MINUTES_PER_DAY % count == 0 => {
                Ok(ResolutionDivider::Minutes(count))
            }
            "hours" if count >= 1 && 24 % count == 0 => Ok(ResolutionDivider::Hours(count)),
            "days" if count == 1 => Ok(ResolutionDivider::Days),
            "months" if count == 1 => Ok(ResolutionDivider::Months),
            "years" if count == 1 => Ok(ResolutionDivider::Years),
            _ => Err(invalid()),
        }
    }

    pub fn apply(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let naive = timestamp.naive_utc();
        let date = naive.date();
        let floored = match self {
            ResolutionDivider::Minutes(n) => {
                let minute_of_day = naive.hour() * 60 + naive.minute();
                let floored_minute = minute_of_day - minute_of_day % n;
                at_minute_of_day(date, floored_minute)
            }
            ResolutionDivider::Hours(n) => {
                at_minute_of_day(date, (naive.hour() - naive.hour() % n) * 60)
            }
            ResolutionDivider::Days => date.and_time(NaiveTime::MIN),
            ResolutionDivider::Months => date
                .with_day(1)
                .expect("day 1 exists in every month")
                .and_time(NaiveTime::MIN),
            ResolutionDivider::Years => date
                .with_day(1)
                .and_then(|d| d.with_month(1))
                .expect("january 1 exists in every year")
                .and_time(NaiveTime::MIN),
        };
        floored.and_utc()
    }
}

fn at_minute_of_day(date: chrono::NaiveDate, minute_of_day: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)
        .expect("floored minute is within the day");
    date.and_time(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_floors_to_grid() {
        let cases = [
            ("5-minutes", ts(2026, 6, 3, 10, 43, 59), ts(2026, 6, 3, 10, 40, 0)),
            ("1-hours", ts(2026, 6, 3, 10, 43, 59), ts(2026, 6, 3, 10, 0, 0)),
            ("2-hours", ts(2026, 6, 3, 11, 43, 59), ts(2026, 6, 3, 10, 0, 0)),
            ("1-days", ts(2026, 6, 3, 10, 43, 59), ts(2026, 6, 3, 0, 0, 0)),
            ("1-months", ts(2026, 6, 13, 10, 43, 59), ts(2026, 6, 1, 0, 0, 0)),
            ("1-years", ts(2026, 6, 13, 10, 43, 59), ts(2026, 1, 1, 0, 0, 0)),
        ];
        for (spec, input, expected) in cases {
            let divider = ResolutionDivider::new(spec).unwrap();
            assert_eq!(divider.apply(input), expected, "spec {}", spec);
        }
    }

    #[test]
    fn test_idempotent() {
        for spec in ["5-minutes", "1-hours", "1-days", "1-months", "1-years"] {
            let divider = ResolutionDivider::new(spec).unwrap();
            let t = ts(2026, 2, 28, 23, 57, 31);
            assert_eq!(divider.apply(divider.apply(t)), divider.apply(t));
        }
    }

    #[test]
    fn test_monotonic() {
        let divider = ResolutionDivider::new("15-minutes").unwrap();
        let mut t = ts(2026, 12, 31, 22, 0, 0);
        let mut previous = divider.apply(t);
        for _ in 0..300 {
            t += chrono::Duration::seconds(97);
            let floored = divider.apply(t);
            assert!(floored >= previous);
            previous = floored;
        }
    }

    #[test]
    fn test_unknown_spec_fails_at_construction() {
        for spec in ["1-weeks", "7-minutes", "0-days", "2-days", "minutes", "x-hours"] {
            assert!(
                matches!(
                    ResolutionDivider::new(spec),
                    Err(ConfigurationError::InvalidResolutionSpec(_))
                ),
                "spec {} should be rejected",
                spec
            );
        }
    }
}
