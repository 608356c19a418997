use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::Event;

/// Fan-out of decision and playback events.
///
/// A session and its playback buffer publish through clones of one bus;
/// several sessions may share a bus when a caller wants a single timeline.
/// Publishing never waits: with no subscribers the event is dropped, and a
/// subscriber that falls more than `capacity` events behind loses the oldest.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Enough for a few hundred segments of decisions and state changes.
    pub const DEFAULT_CAPACITY: usize = 256;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Accepts sub-enum values directly: `bus.publish(PlaybackEvent::Ended)`.
    pub fn publish<E: Into<Event>>(&self, event: E) {
        let _ = self.tx.send(event.into());
    }

    /// Receiver for every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Everything already queued for `rx`, oldest first, without waiting.
///
/// A lagged receiver continues from the oldest event still buffered.
pub fn drain_ready(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
        }
    }
}
