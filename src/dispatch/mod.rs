pub mod dispatcher;
pub mod events;
pub mod queue;
pub mod snapshot;

pub use dispatcher::{DispatcherHandle, DispatcherStats, StateDispatcher};
pub use events::{DetectionEvent, EventCategory, EventSeverity};
pub use queue::{create_event_queue, EventPublisher, EventReceiver, QueueMonitor, QueueStats};
pub use snapshot::{PerformanceSample, SeatState, TableSnapshot};
