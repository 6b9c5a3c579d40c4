//! Point-in-time status for health checks.
//!
//! The tracker and ensemble live on the detection worker, so the loop
//! publishes their counters here after every cycle. Dispatcher counters are
//! read live through its handle.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, RwLock};

use crate::dispatch::{DispatcherHandle, DispatcherStats};
use crate::ocr::EnsembleStats;
use crate::roi::TrackerStats;

/// Counters owned by the detection loop.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LoopStats {
    pub running: bool,
    pub cycles: u64,
    pub failed_frames: u64,
    pub last_cycle_ms: f64,
    pub avg_cycle_ms: f64,
    pub started_at: Option<DateTime<Local>>,
    pub last_cycle_at: Option<DateTime<Local>>,
}

impl LoopStats {
    pub fn record_cycle(&mut self, elapsed_ms: f64) {
        self.cycles += 1;
        self.last_cycle_ms = elapsed_ms;
        self.avg_cycle_ms += (elapsed_ms - self.avg_cycle_ms) / self.cycles as f64;
        self.last_cycle_at = Some(Local::now());
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub taken_at: DateTime<Local>,
    #[serde(rename = "loop")]
    pub loop_stats: LoopStats,
    pub tracker: TrackerStats,
    pub ocr: EnsembleStats,
    pub dispatcher: DispatcherStats,
}

#[derive(Default)]
struct Published {
    loop_stats: LoopStats,
    tracker: TrackerStats,
    ocr: EnsembleStats,
}

/// Shared status surface. Cloneable; the loop writes, anyone reads.
#[derive(Clone)]
pub struct StatusBoard {
    published: Arc<RwLock<Published>>,
    dispatcher: DispatcherHandle,
}

impl StatusBoard {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self {
            published: Arc::new(RwLock::new(Published::default())),
            dispatcher,
        }
    }

    pub(crate) fn publish(&self, loop_stats: &LoopStats, tracker: TrackerStats, ocr: EnsembleStats) {
        let mut published = self.published.write().unwrap_or_else(|e| e.into_inner());
        published.loop_stats = loop_stats.clone();
        published.tracker = tracker;
        published.ocr = ocr;
    }

    pub fn report(&self) -> StatusReport {
        let (loop_stats, tracker, ocr) = {
            let published = self.published.read().unwrap_or_else(|e| e.into_inner());
            (
                published.loop_stats.clone(),
                published.tracker.clone(),
                published.ocr.clone(),
            )
        };

        StatusReport {
            taken_at: Local::now(),
            loop_stats,
            tracker,
            ocr,
            dispatcher: self.dispatcher.stats(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.published
            .read()
            .map(|p| p.loop_stats.running)
            .unwrap_or(false)
    }
}
