//! Engine event bus
//!
//! Events are published on a `tokio::sync::broadcast` channel. Publishing
//! never blocks and never fails the engine: with no subscriber the event is
//! simply dropped, and a slow subscriber sees `RecvError::Lagged`.

use photosync_core::domain::{RecordId, RemoteLocator};
use tokio::sync::broadcast;

use crate::pool::BatchReport;
use crate::scheduler::SchedulerState;

/// Capacity of the event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Something observable happened inside the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A non-empty batch was selected and is about to run
    PassStarted { batch: usize },
    /// A record reached `Synced`
    RecordSynced { id: RecordId, locator: RemoteLocator },
    /// An attempt failed; the record went back to `Local`
    ///
    /// Published exactly once per failed attempt.
    RecordFailed { id: RecordId, error: String },
    /// Every task of the batch reached a terminal state
    PassCompleted { report: BatchReport },
    /// The scheduler moved to a new state
    StateChanged(SchedulerState),
}

/// Creates the sender side of a new event channel
pub fn channel() -> broadcast::Sender<EngineEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publishes an event, ignoring the absence of subscribers
pub(crate) fn publish(events: &broadcast::Sender<EngineEvent>, event: EngineEvent) {
    let _ = events.send(event);
}
