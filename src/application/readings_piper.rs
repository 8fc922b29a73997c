// Rollup cascade: live -> day -> month -> year, trigger-gated and
// backlog-gated
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::application::interval_trigger::{IntervalTrigger, TriggerError};
use crate::application::repositories::PipeRepository;

/// Upper bound on repository pipe calls per invocation per step: enough to
/// drain a realistic backlog in one round without looping unbounded on a
/// misbehaving repository.
const LIVE_TO_DAY_MAX_PIPES: usize = 50;
const DAY_TO_MONTH_MAX_PIPES: usize = 13;
const MONTH_TO_YEAR_MAX_PIPES: usize = 2;

/// Time-of-day offsets (zone-local, past midnight) for the three rollup
/// steps; all run on a daily cadence, ordered so each finer step fires
/// before the coarser one.
#[derive(Debug, Clone)]
pub struct PipeSchedule {
    pub live_pipe_time: Duration,
    pub day_pipe_time: Duration,
    pub month_pipe_time: Duration,
}

impl Default for PipeSchedule {
    fn default() -> Self {
        Self {
            live_pipe_time: Duration::minutes(45),
            day_pipe_time: Duration::minutes(50),
            month_pipe_time: Duration::minutes(55),
        }
    }
}

/// Cascades rollups through the `PipeRepository`. Each step is gated by its
/// own interval trigger and by the immediately finer step having drained its
/// backlog in the same invocation round - a coarser rollup never runs
/// against a stale, partially-piped finer layer. Triggers advance only
/// after the step actually ran.
pub struct ReadingsPiper<Tz: TimeZone> {
    pipe_repository: Arc<dyn PipeRepository>,
    live_trigger: IntervalTrigger<Tz>,
    day_trigger: IntervalTrigger<Tz>,
    month_trigger: IntervalTrigger<Tz>,
    live_drained: bool,
    day_drained: bool,
}

impl<Tz: TimeZone + Clone> ReadingsPiper<Tz> {
    pub fn new(
        time_zone: Tz,
        epoch: DateTime<Utc>,
        schedule: &PipeSchedule,
        pipe_repository: Arc<dyn PipeRepository>,
    ) -> Result<Self, TriggerError> {
        let daily = Duration::days(1);
        let mut live_trigger = IntervalTrigger::new(time_zone.clone(), epoch);
        live_trigger.setup(schedule.live_pipe_time, daily)?;
        let mut day_trigger = IntervalTrigger::new(time_zone.clone(), epoch);
        day_trigger.setup(schedule.day_pipe_time, daily)?;
        let mut month_trigger = IntervalTrigger::new(time_zone, epoch);
        month_trigger.setup(schedule.month_pipe_time, daily)?;
        Ok(Self {
            pipe_repository,
            live_trigger,
            day_trigger,
            month_trigger,
            live_drained: false,
            day_drained: false,
        })
    }

    /// Start of an invocation round: pipe live readings into day rollups.
    /// Resets the round's drain flags before anything else.
    pub async fn pipe_live_readings(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.live_drained = false;
        self.day_drained = false;
        if !self.live_trigger.is_trigger_time(now) {
            return Ok(());
        }
        self.live_drained = self
            .drain("live-to-day", LIVE_TO_DAY_MAX_PIPES, |repo| {
                repo.pipe_live_to_day(now)
            })
            .await?;
        self.live_trigger.advance(now);
        Ok(())
    }

    /// Pipe day rollups into month rollups; only attempted when the
    /// live-to-day step reported an exhausted backlog this round.
    pub async fn pipe_day_readings(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        if !self.live_drained || !self.day_trigger.is_trigger_time(now) {
            return Ok(());
        }
        self.day_drained = self
            .drain("day-to-month", DAY_TO_MONTH_MAX_PIPES, |repo| {
                repo.pipe_day_to_month(now)
            })
            .await?;
        self.day_trigger.advance(now);
        Ok(())
    }

    /// Pipe month rollups into year rollups; gated on the day-to-month step
    /// having drained this round.
    pub async fn pipe_month_readings(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        if !self.day_drained || !self.month_trigger.is_trigger_time(now) {
            return Ok(());
        }
        self.drain("month-to-year", MONTH_TO_YEAR_MAX_PIPES, |repo| {
            repo.pipe_month_to_year(now)
        })
        .await?;
        self.month_trigger.advance(now);
        Ok(())
    }

    /// Drain up to `max_pipes` units of backlog; returns true when the
    /// repository reported no more work within the bound.
    async fn drain<'a, F>(
        &'a self,
        step: &str,
        max_pipes: usize,
        mut pipe_one: F,
    ) -> anyhow::Result<bool>
    where
        F: FnMut(
            &'a dyn PipeRepository,
        ) -> futures::future::BoxFuture<'a, anyhow::Result<bool>>,
    {
        let repo = self.pipe_repository.as_ref();
        for piped in 0..max_pipes {
            if !pipe_one(repo).await? {
                tracing::debug!("{} drained after {} pipe(s)", step, piped);
                return Ok(true);
            }
        }
        tracing::warn!(
            "{} still has backlog after {} pipe(s); continuing next round",
            step,
            max_pipes
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted repository: each level pops from a list of bool results,
    /// recording the calls it received.
    struct ScriptedPipeRepository {
        live_results: Mutex<Vec<bool>>,
        day_results: Mutex<Vec<bool>>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedPipeRepository {
        fn new(live_results: Vec<bool>, day_results: Vec<bool>) -> Self {
            Self {
                live_results: Mutex::new(live_results),
                day_results: Mutex::new(day_results),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn pop(results: &Mutex<Vec<bool>>) -> bool {
            let mut results = results.lock().unwrap();
            if results.is_empty() {
                false
            } else {
                results.remove(0)
            }
        }
    }

    #[async_trait]
    impl PipeRepository for ScriptedPipeRepository {
        async fn pipe_live_to_day(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push("live");
            Ok(Self::pop(&self.live_results))
        }

        async fn pipe_day_to_month(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push("day");
            Ok(Self::pop(&self.day_results))
        }

        async fn pipe_month_to_year(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.calls.lock().unwrap().push("month");
            Ok(false)
        }
    }

    fn piper(repo: Arc<ScriptedPipeRepository>) -> ReadingsPiper<Utc> {
        let epoch = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        ReadingsPiper::new(Utc, epoch, &PipeSchedule::default(), repo).unwrap()
    }

    fn due_now() -> DateTime<Utc> {
        // Past every schedule slot of the day after the epoch.
        Utc.with_ymd_and_hms(2026, 5, 2, 1, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_drains_backlog_then_cascades() {
        let repo = Arc::new(ScriptedPipeRepository::new(
            vec![true, true, false],
            vec![false],
        ));
        let mut piper = piper(repo.clone());
        let now = due_now();
        piper.pipe_live_readings(now).await.unwrap();
        piper.pipe_day_readings(now).await.unwrap();
        piper.pipe_month_readings(now).await.unwrap();
        assert_eq!(
            *repo.calls.lock().unwrap(),
            vec!["live", "live", "live", "day", "month"]
        );
    }

    #[tokio::test]
    async fn test_day_step_gated_on_live_backlog_exhausted() {
        // 50+ units of live backlog: the bound is hit, live does not report
        // drained, so day-to-month must not be attempted this round.
        let repo = Arc::new(ScriptedPipeRepository::new(vec![true; 60], vec![false]));
        let mut piper = piper(repo.clone());
        let now = due_now();
        piper.pipe_live_readings(now).await.unwrap();
        piper.pipe_day_readings(now).await.unwrap();
        let calls = repo.calls.lock().unwrap();
        assert_eq!(calls.len(), 50);
        assert!(calls.iter().all(|c| *c == "live"));
    }

    #[tokio::test]
    async fn test_not_due_means_no_repository_calls() {
        let repo = Arc::new(ScriptedPipeRepository::new(vec![false], vec![false]));
        let mut piper = piper(repo.clone());
        let before_due = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        piper.pipe_live_readings(before_due).await.unwrap();
        piper.pipe_day_readings(before_due).await.unwrap();
        piper.pipe_month_readings(before_due).await.unwrap();
        assert!(repo.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_month_step_gated_on_day_drained() {
        // Day-to-month hits its bound (13 trues), so month-to-year is
        // skipped even though its trigger is due.
        let repo = Arc::new(ScriptedPipeRepository::new(vec![false], vec![true; 20]));
        let mut piper = piper(repo.clone());
        let now = due_now();
        piper.pipe_live_readings(now).await.unwrap();
        piper.pipe_day_readings(now).await.unwrap();
        piper.pipe_month_readings(now).await.unwrap();
        let calls = repo.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|c| **c == "day").count(), 13);
        assert_eq!(calls.iter().filter(|c| **c == "month").count(), 0);
    }

    #[tokio::test]
    async fn test_trigger_advances_only_after_run() {
        let repo = Arc::new(ScriptedPipeRepository::new(
            vec![false, false],
            vec![false, false],
        ));
        let mut piper = piper(repo.clone());
        let now = due_now();
        piper.pipe_live_readings(now).await.unwrap();
        // Second round at the same instant: live trigger already advanced.
        piper.pipe_live_readings(now).await.unwrap();
        assert_eq!(
            repo.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| **c == "live")
                .count(),
            1
        );
    }
}
