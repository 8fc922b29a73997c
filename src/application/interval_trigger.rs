// Recurring trigger state machine: time-of-day plus repeat interval,
// evaluated in a configured time zone
use chrono::{DateTime, Days, Duration, LocalResult, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("repeat interval must be positive")]
    NonPositiveInterval,
    #[error("time of day must be non-negative and smaller than the repeat interval")]
    TimeOfDayOutsideInterval,
}

/// Decides, given "now", whether a recurring action is due, and re-arms only
/// on explicit `advance`. The reference point moves exclusively through
/// `advance`, so an action that never confirms execution keeps reporting
/// due.
///
/// Construction takes a UTC epoch (non-UTC timestamps cannot reach this API;
/// every entry point is typed `DateTime<Utc>`). Whole-day repeat intervals
/// step through civil days in the configured zone, keeping the trigger at
/// the same wall-clock time across DST transitions.
#[derive(Debug, Clone)]
pub struct IntervalTrigger<Tz: TimeZone> {
    time_zone: Tz,
    reference: DateTime<Utc>,
    time_of_day: Duration,
    interval: Duration,
}

impl<Tz: TimeZone> IntervalTrigger<Tz> {
    pub fn new(time_zone: Tz, epoch: DateTime<Utc>) -> Self {
        Self {
            time_zone,
            reference: epoch,
            time_of_day: Duration::zero(),
            interval: Duration::days(1),
        }
    }

    /// Configure the trigger time-of-day offset within each period and the
    /// repeat interval. Requires `time_of_day < interval`: a target outside
    /// one period could never be reached.
    pub fn setup(&mut self, time_of_day: Duration, interval: Duration) -> Result<(), TriggerError> {
        if interval <= Duration::zero() {
            return Err(TriggerError::NonPositiveInterval);
        }
        if time_of_day < Duration::zero() || time_of_day >= interval {
            return Err(TriggerError::TimeOfDayOutsideInterval);
        }
        self.time_of_day = time_of_day;
        self.interval = interval;
        Ok(())
    }

    /// True iff `now` is at least one full period past the reference and at
    /// or past the trigger time-of-day within that period.
    pub fn is_trigger_time(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_period(self.reference) + self.time_of_day
    }

    /// Re-arm after a confirmed execution. Must only be called right after
    /// `is_trigger_time(now)` returned true. Missed periods are caught up in
    /// one call: the reference jumps forward by as many whole intervals as
    /// fit, there is no per-period replay.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        loop {
            let next = self.next_period(self.reference);
            if now >= next + self.time_of_day {
                self.reference = next;
            } else {
                break;
            }
        }
    }

    fn next_period(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        let whole_days = self.interval.num_days();
        if whole_days >= 1 && self.interval == Duration::days(whole_days) {
            let local = from.with_timezone(&self.time_zone);
            let shifted = local.naive_local() + Days::new(whole_days as u64);
            match self.time_zone.from_local_datetime(&shifted) {
                LocalResult::Single(dt) => dt.with_timezone(&Utc),
                // DST-ambiguous wall time: take the earlier instant.
                LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
                // Wall time skipped by a DST gap: fall back to absolute time.
                LocalResult::None => from + self.interval,
            }
        } else {
            from + self.interval
        }
    }
}
