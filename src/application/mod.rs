// Application layer - orchestration of the domain against external collaborators
pub mod event_detector;
pub mod event_notifier;
pub mod event_queue;
pub mod interval_trigger;
pub mod pipeline;
pub mod readings_piper;
pub mod repositories;
pub mod series_service;

pub use event_detector::{LeakCheck, MeterEventDetector};
pub use event_notifier::MeterEventNotifier;
pub use event_queue::EventQueue;
pub use interval_trigger::{IntervalTrigger, TriggerError};
pub use pipeline::{Collaborators, PipelineCoordinator};
pub use readings_piper::{PipeSchedule, ReadingsPiper};
pub use series_service::{ComputedSeriesDef, DiffSeriesDef, SeriesComputeService};
