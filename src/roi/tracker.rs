//! Region-of-interest change tracking.
//!
//! Each region keeps the fingerprint from the last time it was reported
//! changed. A cycle compares the fresh fingerprint of every region against
//! it and only regions that moved past their sensitivity get re-read.

use chrono::{DateTime, Local};
use image::RgbaImage;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use super::fingerprint::{crop_region, fingerprint, Fingerprint};
use crate::config::RelativeRect;

/// A named region of the frame. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoiDefinition {
    pub tag: String,
    pub rect: RelativeRect,
    /// 1 = checked first / changes often, 3 = checked last / rarely changes
    pub priority: u8,
    /// Normalized Hamming distance a region must exceed to count as changed.
    /// Lower is more sensitive.
    pub sensitivity: f32,
}

impl RoiDefinition {
    pub fn new(tag: &str, rect: RelativeRect, priority: u8, sensitivity: f32) -> Self {
        Self {
            tag: tag.to_string(),
            rect,
            priority,
            sensitivity: sensitivity.clamp(0.0, 1.0),
        }
    }
}

/// Mutable tracking state for one region.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RoiState {
    #[serde(skip)]
    pub fingerprint: Option<Fingerprint>,
    pub last_update: Option<DateTime<Local>>,
    pub checks: u64,
    pub changes: u64,
    pub skips: u64,
}

impl RoiState {
    fn reset(&mut self) {
        self.fingerprint = None;
        self.last_update = None;
    }
}

/// Outcome of one detection cycle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RoiChangeReport {
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub total: usize,
    pub detection_time_ms: f64,
}

impl RoiChangeReport {
    /// Percentage of regions that did not need reprocessing.
    pub fn skip_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.unchanged.len() as f64 / self.total as f64 * 100.0
    }

    pub fn is_changed(&self, tag: &str) -> bool {
        self.changed.iter().any(|t| t == tag)
    }
}

/// Cumulative tracker counters.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackerStats {
    pub cycles: u64,
    pub total_checks: u64,
    pub total_changes: u64,
    pub total_skips: u64,
    pub avg_detection_time_ms: f64,
    pub enabled: bool,
    pub regions: usize,
}

impl TrackerStats {
    pub fn skip_rate(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        self.total_skips as f64 / self.total_checks as f64 * 100.0
    }
}

/// Tracks a set of regions across frames.
pub struct RoiTracker {
    /// Kept sorted by priority, then insertion order.
    regions: Vec<RoiDefinition>,
    states: HashMap<String, RoiState>,
    enabled: bool,
    stats: TrackerStats,
}

impl RoiTracker {
    pub fn new(regions: Vec<RoiDefinition>) -> Self {
        let mut tracker = Self {
            regions: Vec::new(),
            states: HashMap::new(),
            enabled: true,
            stats: TrackerStats {
                enabled: true,
                ..Default::default()
            },
        };
        for region in regions {
            tracker.add_region(region);
        }
        tracker
    }

    /// Adds a region, replacing any existing region with the same tag.
    pub fn add_region(&mut self, region: RoiDefinition) {
        self.regions.retain(|r| r.tag != region.tag);
        self.states.insert(region.tag.clone(), RoiState::default());
        self.regions.push(region);
        // Stable sort keeps insertion order within a tier.
        self.regions.sort_by_key(|r| r.priority);
        self.stats.regions = self.regions.len();
    }

    pub fn remove_region(&mut self, tag: &str) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| r.tag != tag);
        self.states.remove(tag);
        self.stats.regions = self.regions.len();
        self.regions.len() != before
    }

    pub fn regions(&self) -> &[RoiDefinition] {
        &self.regions
    }

    pub fn region(&self, tag: &str) -> Option<&RoiDefinition> {
        self.regions.iter().find(|r| r.tag == tag)
    }

    pub fn state(&self, tag: &str) -> Option<&RoiState> {
        self.states.get(tag)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.stats.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Clears every stored fingerprint so the next cycle reports all regions changed.
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            state.reset();
        }
        log::debug!("ROI tracker reset ({} regions)", self.regions.len());
    }

    /// Forgets one region's fingerprint so the next cycle reports it changed.
    /// Returns false for an unknown tag.
    pub fn invalidate(&mut self, tag: &str) -> bool {
        match self.states.get_mut(tag) {
            Some(state) => {
                state.reset();
                log::debug!("ROI {}: invalidated", tag);
                true
            }
            None => false,
        }
    }

    /// Compares every region of `frame` against its stored fingerprint.
    ///
    /// `max_priority` restricts the scan to regions whose tier is at or above
    /// it (numerically <=). Regions that clamp to zero area or fail to hash
    /// are left out of the report and retried next cycle.
    pub fn detect_changes(&mut self, frame: &RgbaImage, max_priority: Option<u8>) -> RoiChangeReport {
        let start = Instant::now();
        let mut report = RoiChangeReport::default();

        for region in &self.regions {
            if let Some(limit) = max_priority {
                if region.priority > limit {
                    continue;
                }
            }

            let state = self.states.entry(region.tag.clone()).or_default();

            let Some(crop) = crop_region(frame, &region.rect) else {
                log::debug!("ROI {}: empty after clamping, skipped", region.tag);
                continue;
            };
            let Some(current) = fingerprint(&crop) else {
                log::debug!("ROI {}: fingerprint failed, retrying next cycle", region.tag);
                continue;
            };

            state.checks += 1;

            // Disabled tracking reports every scannable region as changed
            let changed = !self.enabled
                || match &state.fingerprint {
                    None => true,
                    Some(previous) => previous.distance(&current) > region.sensitivity,
                };

            if changed {
                state.fingerprint = Some(current);
                state.last_update = Some(Local::now());
                state.changes += 1;
                report.changed.push(region.tag.clone());
            } else {
                state.skips += 1;
                report.unchanged.push(region.tag.clone());
            }
        }

        report.total = report.changed.len() + report.unchanged.len();
        report.detection_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.record(&report);

        log::debug!(
            "ROI cycle: {}/{} changed, skip {:.1}% in {:.2}ms",
            report.changed.len(),
            report.total,
            report.skip_percentage(),
            report.detection_time_ms
        );

        report
    }

    fn record(&mut self, report: &RoiChangeReport) {
        let stats = &mut self.stats;
        stats.cycles += 1;
        stats.total_checks += report.total as u64;
        stats.total_changes += report.changed.len() as u64;
        stats.total_skips += report.unchanged.len() as u64;
        stats.avg_detection_time_ms +=
            (report.detection_time_ms - stats.avg_detection_time_ms) / stats.cycles as f64;
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats.clone()
    }
}
