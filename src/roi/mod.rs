//! Region-of-interest change detection.
//!
//! This module provides:
//! - Cheap per-region fingerprints (8x8 average hash)
//! - A tracker that reports which regions changed since the last frame

pub mod fingerprint;
pub mod tracker;

pub use fingerprint::{crop_region, fingerprint, Fingerprint};
pub use tracker::{RoiChangeReport, RoiDefinition, RoiState, RoiTracker, TrackerStats};
