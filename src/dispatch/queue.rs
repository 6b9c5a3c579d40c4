//! Bounded event queue between the detection loop and the transport.
//!
//! Publishing never blocks: when the queue is full the oldest queued event is
//! dropped. A single receiver drains it. Events published before the receiver
//! starts draining stay queued up to the bound.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::events::DetectionEvent;

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub capacity: usize,
    pub queued: usize,
    pub published: u64,
    pub dropped: u64,
}

struct QueueState {
    events: VecDeque<DetectionEvent>,
    publishers: usize,
    published: u64,
    dropped: u64,
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A publisher panicking mid-push leaves the deque intact.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            capacity: self.capacity,
            queued: state.events.len(),
            published: state.published,
            dropped: state.dropped,
        }
    }
}

/// Producer side. Cloneable; the queue closes when the last one is dropped.
pub struct EventPublisher {
    shared: Arc<Shared>,
}

/// Stats-only view. Does not keep the queue open.
#[derive(Clone)]
pub struct QueueMonitor {
    shared: Arc<Shared>,
}

impl QueueMonitor {
    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }
}

/// Consumer side.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

/// Creates a new event queue holding at most `capacity` events.
///
/// Returns a tuple of (publisher, receiver):
/// - The publisher is used by the detection loop
/// - The receiver is used by the transport's consumer thread
pub fn create_event_queue(capacity: usize) -> (EventPublisher, EventReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            events: VecDeque::with_capacity(capacity.max(1)),
            publishers: 1,
            published: 0,
            dropped: 0,
        }),
        available: Condvar::new(),
        capacity: capacity.max(1),
    });

    (
        EventPublisher {
            shared: Arc::clone(&shared),
        },
        EventReceiver { shared },
    )
}

impl EventPublisher {
    /// Queues `event`. Returns `false` when an older event had to be dropped.
    pub fn publish(&self, event: DetectionEvent) -> bool {
        let mut state = self.shared.lock();
        let mut kept_all = true;

        if state.events.len() >= self.shared.capacity {
            if let Some(old) = state.events.pop_front() {
                state.dropped += 1;
                kept_all = false;
                log::warn!(
                    "Event queue full ({}), dropped event #{} ({})",
                    self.shared.capacity,
                    old.sequence,
                    old.category
                );
            }
        }

        state.events.push_back(event);
        state.published += 1;
        drop(state);

        self.shared.available.notify_one();
        kept_all
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }

    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Clone for EventPublisher {
    fn clone(&self) -> Self {
        self.shared.lock().publishers += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.publishers = state.publishers.saturating_sub(1);
        drop(state);
        self.shared.available.notify_all();
    }
}

impl EventReceiver {
    /// Blocks until an event is available. Returns `None` once every
    /// publisher is gone and the queue is empty.
    pub fn recv(&self) -> Option<DetectionEvent> {
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.publishers == 0 {
                return None;
            }
            state = self
                .shared
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<DetectionEvent, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Ok(event);
            }
            if state.publishers == 0 {
                return Err(RecvTimeoutError::Disconnected);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecvTimeoutError::Timeout);
            }
            state = self
                .shared
                .available
                .wait_timeout(state, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    pub fn try_recv(&self) -> Option<DetectionEvent> {
        self.shared.lock().events.pop_front()
    }

    /// Takes everything currently queued.
    pub fn drain(&self) -> Vec<DetectionEvent> {
        self.shared.lock().events.drain(..).collect()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }
}
