//! Event consumer thread.
//!
//! Drains the event queue into a sink until every publisher is gone.
//! Delivery failures are retried with backoff and then dropped; they never
//! reach back into the detection loop.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatch::{DetectionEvent, EventReceiver};

/// Where events are forwarded.
pub trait EventSink: Send {
    fn deliver(&mut self, event: &DetectionEvent) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn deliver(&mut self, event: &DetectionEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| anyhow!("Failed to serialize event #{}: {}", event.sequence, e))?;
        writeln!(self.writer, "{}", line)
            .map_err(|e| anyhow!("Failed to write event #{}: {}", event.sequence, e))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| anyhow!("Failed to flush event sink: {}", e))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Attempts per event, including the first
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ConsumerStats {
    pub delivered: u64,
    pub retries: u64,
    pub dropped: u64,
}

/// Runs the consumer loop. Blocks until the queue is closed and empty, so
/// it should be run in a dedicated thread.
pub fn run_consumer(
    receiver: EventReceiver,
    sink: &mut dyn EventSink,
    policy: RetryPolicy,
) -> ConsumerStats {
    log::info!("Event consumer started");
    let mut stats = ConsumerStats::default();

    while let Some(event) = receiver.recv() {
        let mut delay = policy.backoff;
        let mut attempt = 1;
        loop {
            match sink.deliver(&event) {
                Ok(()) => {
                    stats.delivered += 1;
                    break;
                }
                Err(e) if attempt < policy.attempts.max(1) => {
                    log::warn!(
                        "Delivery of event #{} failed (attempt {}): {}",
                        event.sequence,
                        attempt,
                        e
                    );
                    stats.retries += 1;
                    attempt += 1;
                    thread::sleep(delay);
                    delay *= 2;
                }
                Err(e) => {
                    log::warn!("Dropping event #{} after {} attempts: {}", event.sequence, attempt, e);
                    stats.dropped += 1;
                    break;
                }
            }
        }

        // Flush per event; a flush failure shows up on the next delivery.
        if let Err(e) = sink.flush() {
            log::warn!("{}", e);
        }
    }

    log::info!(
        "Event consumer finished: {} delivered, {} dropped",
        stats.delivered,
        stats.dropped
    );
    stats
}

/// Spawns the consumer on its own thread.
pub fn spawn_consumer<S: EventSink + 'static>(
    receiver: EventReceiver,
    mut sink: S,
    policy: RetryPolicy,
) -> Result<JoinHandle<ConsumerStats>> {
    thread::Builder::new()
        .name("event-consumer".to_string())
        .spawn(move || run_consumer(receiver, &mut sink, policy))
        .map_err(|e| anyhow!("Failed to spawn event consumer: {}", e))
}
