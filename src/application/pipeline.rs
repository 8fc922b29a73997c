// Pipeline coordinator - turns a "new readings arrived" signal into the
// fixed ordered step sequence on the event queue
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use crate::application::event_detector::{LeakCheck, MeterEventDetector};
use crate::application::event_notifier::MeterEventNotifier;
use crate::application::event_queue::EventQueue;
use crate::application::interval_trigger::{IntervalTrigger, TriggerError};
use crate::application::readings_piper::{PipeSchedule, ReadingsPiper};
use crate::application::repositories::{
    ControlActuator, EventNotifier, HealthCheck, LabelledReading, MeterEventRepository,
    PipeRepository, ProfileRepository, ReadingPublisher, ReadingRepository, RecipientRepository,
};

/// The engine's external collaborators, injected once at wiring time.
pub struct Collaborators {
    pub reading_repository: Arc<dyn ReadingRepository>,
    pub profile_repository: Arc<dyn ProfileRepository>,
    pub pipe_repository: Arc<dyn PipeRepository>,
    pub meter_event_repository: Arc<dyn MeterEventRepository>,
    pub recipient_repository: Arc<dyn RecipientRepository>,
    pub publisher: Arc<dyn ReadingPublisher>,
    pub actuator: Arc<dyn ControlActuator>,
    pub health_check: Arc<dyn HealthCheck>,
    pub notifier: Arc<dyn EventNotifier>,
}

/// Composes the queue, the rollup piper and the detection/notification pair.
/// Every side-effecting step goes through the single-consumer queue, so no
/// two steps ever run concurrently and a failing step never blocks the ones
/// behind it.
pub struct PipelineCoordinator<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send,
{
    queue: EventQueue,
    publisher: Arc<dyn ReadingPublisher>,
    actuator: Arc<dyn ControlActuator>,
    health_check: Arc<dyn HealthCheck>,
    reading_repository: Arc<dyn ReadingRepository>,
    piper: Arc<Mutex<ReadingsPiper<Tz>>>,
    detector: Arc<MeterEventDetector<Tz>>,
    notifier: Arc<MeterEventNotifier>,
    detect_trigger: Arc<Mutex<IntervalTrigger<Tz>>>,
}

impl<Tz> PipelineCoordinator<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send,
{
    /// Wires the engine. `detect_time` is the zone-local time-of-day at
    /// which the daily detect-and-notify step fires.
    pub fn new(
        time_zone: Tz,
        epoch: DateTime<Utc>,
        schedule: &PipeSchedule,
        leak_check: LeakCheck,
        detect_time: Duration,
        collaborators: Collaborators,
    ) -> Result<Self, TriggerError> {
        let piper = ReadingsPiper::new(
            time_zone.clone(),
            epoch,
            schedule,
            collaborators.pipe_repository.clone(),
        )?;
        let detector = MeterEventDetector::new(
            time_zone.clone(),
            leak_check,
            collaborators.profile_repository.clone(),
            collaborators.meter_event_repository.clone(),
        );
        let notifier = MeterEventNotifier::new(
            collaborators.meter_event_repository.clone(),
            collaborators.recipient_repository.clone(),
            collaborators.notifier.clone(),
        );
        let mut detect_trigger = IntervalTrigger::new(time_zone, epoch);
        detect_trigger.setup(detect_time, Duration::days(1))?;
        Ok(Self {
            queue: EventQueue::new(),
            publisher: collaborators.publisher,
            actuator: collaborators.actuator,
            health_check: collaborators.health_check,
            reading_repository: collaborators.reading_repository,
            piper: Arc::new(Mutex::new(piper)),
            detector: Arc::new(detector),
            notifier: Arc::new(notifier),
            detect_trigger: Arc::new(Mutex::new(detect_trigger)),
        })
    }

    /// Persist a batch of ingested readings ahead of anything already
    /// queued, then run the standard step sequence.
    pub fn ingest(&self, readings: Vec<LabelledReading>, now: DateTime<Utc>) {
        let repository = self.reading_repository.clone();
        self.queue.insert_first(
            "store-readings",
            Box::pin(async move { repository.add(&readings).await }),
        );
        self.readings_arrived(now);
    }

    /// Enqueue the fixed step sequence: publish, control actuation, health
    /// check, the three rollup steps, then detect-and-notify. The queue
    /// drains them one at a time in this order.
    pub fn readings_arrived(&self, now: DateTime<Utc>) {
        let publisher = self.publisher.clone();
        self.queue
            .enqueue("publish", Box::pin(async move { publisher.publish().await }));

        let actuator = self.actuator.clone();
        self.queue.enqueue(
            "control-actuation",
            Box::pin(async move { actuator.actuate().await }),
        );

        let health_check = self.health_check.clone();
        self.queue.enqueue(
            "health-check",
            Box::pin(async move { health_check.check().await }),
        );

        let piper = self.piper.clone();
        self.queue.enqueue(
            "pipe-live",
            Box::pin(async move { piper.lock().await.pipe_live_readings(now).await }),
        );

        let piper = self.piper.clone();
        self.queue.enqueue(
            "pipe-day",
            Box::pin(async move { piper.lock().await.pipe_day_readings(now).await }),
        );

        let piper = self.piper.clone();
        self.queue.enqueue(
            "pipe-month",
            Box::pin(async move { piper.lock().await.pipe_month_readings(now).await }),
        );

        let detector = self.detector.clone();
        let notifier = self.notifier.clone();
        let trigger = self.detect_trigger.clone();
        self.queue.enqueue(
            "detect-and-notify",
            Box::pin(async move {
                let mut trigger = trigger.lock().await;
                if !trigger.is_trigger_time(now) {
                    return Ok(());
                }
                detector.detect(now).await?;
                notifier.notify_on_new_events().await?;
                trigger.advance(now);
                Ok(())
            }),
        );
    }

    /// Diagnostic: whether the queue has fully drained.
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    /// Stop the engine: the in-flight step finishes, queued steps are
    /// discarded.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::MeterEvent;
    use crate::domain::register::{RegisterValue, TimeRegisterValue};
    use crate::domain::series::LabelSeriesSet;
    use crate::domain::unit::Unit;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration as StdDuration;

    type CallLog = Arc<StdMutex<Vec<&'static str>>>;

    struct RecordingCollaborator {
        log: CallLog,
    }

    #[async_trait]
    impl ReadingRepository for RecordingCollaborator {
        async fn add(&self, _readings: &[LabelledReading]) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("store");
            Ok(())
        }
    }

    #[async_trait]
    impl ReadingPublisher for RecordingCollaborator {
        async fn publish(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("publish");
            Ok(())
        }
    }

    #[async_trait]
    impl ControlActuator for RecordingCollaborator {
        async fn actuate(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("actuate");
            Ok(())
        }
    }

    #[async_trait]
    impl HealthCheck for RecordingCollaborator {
        async fn check(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push("health");
            Ok(())
        }
    }

    #[async_trait]
    impl PipeRepository for RecordingCollaborator {
        async fn pipe_live_to_day(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.log.lock().unwrap().push("pipe-live");
            Ok(false)
        }

        async fn pipe_day_to_month(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.log.lock().unwrap().push("pipe-day");
            Ok(false)
        }

        async fn pipe_month_to_year(&self, _now: DateTime<Utc>) -> anyhow::Result<bool> {
            self.log.lock().unwrap().push("pipe-month");
            Ok(false)
        }
    }

    #[async_trait]
    impl ProfileRepository for RecordingCollaborator {
        async fn get_series_set(
            &self,
            _pre_start: DateTime<Utc>,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> anyhow::Result<LabelSeriesSet<TimeRegisterValue>> {
            self.log.lock().unwrap().push("detect");
            Ok(LabelSeriesSet::new(start, end, Vec::new()))
        }
    }

    #[async_trait]
    impl MeterEventRepository for RecordingCollaborator {
        async fn get_latest_events_by_label(&self) -> anyhow::Result<Vec<MeterEvent>> {
            Ok(Vec::new())
        }

        async fn add_events(&self, _events: &[MeterEvent]) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_max_flagged_event_id(&self) -> anyhow::Result<Option<i64>> {
            self.log.lock().unwrap().push("notify");
            Ok(None)
        }
    }

    #[async_trait]
    impl RecipientRepository for RecordingCollaborator {
        async fn get_recipients_with_last_notified_position(
            &self,
        ) -> anyhow::Result<Vec<(crate::application::repositories::Recipient, Option<i64>)>>
        {
            Ok(Vec::new())
        }

        async fn set_last_notified_position(
            &self,
            _recipient: &crate::application::repositories::Recipient,
            _event_id: i64,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventNotifier for RecordingCollaborator {
        async fn notify(
            &self,
            _recipient: &crate::application::repositories::Recipient,
            _newest_event_id: i64,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn coordinator(log: CallLog) -> PipelineCoordinator<Utc> {
        let shared = Arc::new(RecordingCollaborator { log });
        let collaborators = Collaborators {
            reading_repository: shared.clone(),
            profile_repository: shared.clone(),
            pipe_repository: shared.clone(),
            meter_event_repository: shared.clone(),
            recipient_repository: shared.clone(),
            publisher: shared.clone(),
            actuator: shared.clone(),
            health_check: shared.clone(),
            notifier: shared,
        };
        PipelineCoordinator::new(
            Utc,
            Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            &PipeSchedule::default(),
            LeakCheck::default(),
            Duration::hours(7),
            collaborators,
        )
        .unwrap()
    }

    async fn wait_idle<Tz>(coordinator: &PipelineCoordinator<Tz>)
    where
        Tz: TimeZone + Send + Sync + 'static,
        Tz::Offset: Send,
    {
        for _ in 0..200 {
            if coordinator.is_idle() {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("pipeline did not drain");
    }

    #[tokio::test]
    async fn test_steps_run_in_fixed_order() {
        let log: CallLog = Arc::new(StdMutex::new(Vec::new()));
        let coordinator = coordinator(log.clone());
        // A moment past every daily slot, including detect at 07:00.
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap();
        let reading = LabelledReading {
            label: "Main".to_string(),
            reading: TimeRegisterValue::new("m1", now, RegisterValue::new(1, 0, Unit::WattHour)),
        };
        coordinator.ingest(vec![reading], now);
        wait_idle(&coordinator).await;
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "store", "publish", "actuate", "health", "pipe-live", "pipe-day", "pipe-month",
                "detect", "notify"
            ]
        );
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_detect_skipped_before_its_trigger_time() {
        let log: CallLog = Arc::new(StdMutex::new(Vec::new()));
        let coordinator = coordinator(log.clone());
        // Rollup slots passed, but detect (07:00) has not.
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 2, 0, 0).unwrap();
        coordinator.readings_arrived(now);
        wait_idle(&coordinator).await;
        let calls = log.lock().unwrap().clone();
        assert!(calls.contains(&"pipe-live"));
        assert!(!calls.contains(&"detect"));
        assert!(!calls.contains(&"notify"));
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn test_detect_runs_once_per_due_period() {
        let log: CallLog = Arc::new(StdMutex::new(Vec::new()));
        let coordinator = coordinator(log.clone());
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap();
        coordinator.readings_arrived(now);
        coordinator.readings_arrived(now);
        wait_idle(&coordinator).await;
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.iter().filter(|c| **c == "detect").count(), 1);
        coordinator.shutdown().await;
    }
}
