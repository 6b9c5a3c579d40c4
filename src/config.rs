//! Configuration types for the table watcher.
//!
//! Loads settings from config.json at startup. Provides region layout,
//! polling cadence, OCR thresholds, and queue sizing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::bindings::{CardPart, RegionTarget, SeatAttr};
use crate::roi::RoiDefinition;

/// Number of seats in the default layout.
pub const DEFAULT_SEATS: u8 = 9;

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with capture resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl RelativeRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Converts to absolute pixel coordinates `(x, y, width, height)`,
    /// clamped to the frame bounds. The result may have zero area.
    pub fn to_absolute(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let w = frame_width;
        let h = frame_height;

        let x0 = ((self.x.max(0.0) * w as f32) as u32).min(w);
        let y0 = ((self.y.max(0.0) * h as f32) as u32).min(h);
        let rw = ((self.width.max(0.0) * w as f32) as u32).min(w - x0);
        let rh = ((self.height.max(0.0) * h as f32) as u32).min(h - y0);

        (x0, y0, rw, rh)
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
        }
    }
}

/// One tracked region as written in config.json.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Semantic tag, e.g. "pot", "board-1-rank", "seat-3-stack"
    pub tag: String,
    pub rect: RelativeRect,
    /// 1 = checked first, 3 = checked last
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Overrides the sensitivity of the bound field type
    #[serde(default)]
    pub sensitivity: Option<f32>,
    /// Which table field this region feeds
    pub target: RegionTarget,
}

impl RegionConfig {
    /// Builds the tracker definition, falling back to the field type's sensitivity.
    pub fn to_definition(&self) -> RoiDefinition {
        let sensitivity = self
            .sensitivity
            .unwrap_or_else(|| self.target.field_type().sensitivity());
        RoiDefinition::new(&self.tag, self.rect, self.priority, sensitivity)
    }
}

fn default_priority() -> u8 {
    2
}

/// Complete watcher configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between capture cycles (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Bound of the event queue; oldest events are dropped beyond it
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Deadline for a single OCR engine call (milliseconds)
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
    /// When false every region is reported changed every cycle
    #[serde(default = "default_roi_tracking_enabled")]
    pub roi_tracking_enabled: bool,
    /// Only scan regions with priority <= this tier
    #[serde(default)]
    pub max_priority: Option<u8>,
    /// OCR brightness threshold (pixels with R, G, B all > threshold are kept)
    #[serde(default = "default_ocr_threshold")]
    pub ocr_threshold: u8,
    /// Explicit tesseract executable; PATH is searched when absent
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_event_queue_capacity() -> usize {
    256
}

fn default_engine_timeout_ms() -> u64 {
    3000
}

fn default_roi_tracking_enabled() -> bool {
    true
}

fn default_ocr_threshold() -> u8 {
    190
}

fn default_regions() -> Vec<RegionConfig> {
    default_table_layout(DEFAULT_SEATS)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            event_queue_capacity: default_event_queue_capacity(),
            engine_timeout_ms: default_engine_timeout_ms(),
            roi_tracking_enabled: default_roi_tracking_enabled(),
            max_priority: None,
            ocr_threshold: default_ocr_threshold(),
            tesseract_path: None,
            regions: default_regions(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Engine deadline; zero means the ensemble default.
    pub fn engine_timeout(&self) -> Duration {
        if self.engine_timeout_ms == 0 {
            return crate::ocr::ensemble::DEFAULT_ENGINE_TIMEOUT;
        }
        Duration::from_millis(self.engine_timeout_ms)
    }

    pub fn region_definitions(&self) -> Vec<RoiDefinition> {
        self.regions.iter().map(RegionConfig::to_definition).collect()
    }
}

/// Builds the default layout for an oval table with `seats` seats.
///
/// Pot and board sit in the middle; hero cards bottom-centre; seats are spread
/// around an ellipse starting at the bottom (seat 1 is the hero seat).
pub fn default_table_layout(seats: u8) -> Vec<RegionConfig> {
    let mut regions = vec![RegionConfig {
        tag: "pot".to_string(),
        rect: RelativeRect::new(0.42, 0.34, 0.16, 0.05),
        priority: 1,
        sensitivity: None,
        target: RegionTarget::Pot,
    }];

    for slot in 0..5u8 {
        let x = 0.33 + slot as f32 * 0.07;
        regions.push(card_region("board", slot, x, 0.42, 1, true));
        regions.push(card_region("board", slot, x, 0.42, 1, false));
    }

    for slot in 0..2u8 {
        let x = 0.45 + slot as f32 * 0.05;
        regions.push(card_region("hero", slot, x, 0.72, 1, true));
        regions.push(card_region("hero", slot, x, 0.72, 1, false));
    }

    for seat in 1..=seats {
        // Seat 1 at the bottom, going clockwise.
        let angle = std::f32::consts::PI / 2.0
            + (seat - 1) as f32 * 2.0 * std::f32::consts::PI / seats as f32;
        let cx = 0.5 + 0.40 * angle.cos();
        let cy = 0.5 + 0.36 * angle.sin();
        let x = (cx - 0.06).clamp(0.0, 0.86);
        let y = (cy - 0.04).clamp(0.0, 0.88);

        regions.push(RegionConfig {
            tag: format!("seat-{}-name", seat),
            rect: RelativeRect::new(x, y, 0.12, 0.03),
            priority: 3,
            sensitivity: None,
            target: RegionTarget::Seat {
                seat,
                attr: SeatAttr::Name,
            },
        });
        regions.push(RegionConfig {
            tag: format!("seat-{}-stack", seat),
            rect: RelativeRect::new(x, y + 0.03, 0.12, 0.03),
            priority: 2,
            sensitivity: None,
            target: RegionTarget::Seat {
                seat,
                attr: SeatAttr::Stack,
            },
        });
        regions.push(RegionConfig {
            tag: format!("seat-{}-position", seat),
            rect: RelativeRect::new(x, y + 0.06, 0.04, 0.02),
            priority: 3,
            sensitivity: None,
            target: RegionTarget::Seat {
                seat,
                attr: SeatAttr::Position,
            },
        });
    }

    regions
}

fn card_region(group: &str, slot: u8, x: f32, y: f32, priority: u8, rank: bool) -> RegionConfig {
    let (part, suffix, rect) = if rank {
        (CardPart::Rank, "rank", RelativeRect::new(x, y, 0.03, 0.04))
    } else {
        (CardPart::Suit, "suit", RelativeRect::new(x, y + 0.04, 0.03, 0.03))
    };
    let target = if group == "board" {
        RegionTarget::Board { slot, part }
    } else {
        RegionTarget::Hero { slot, part }
    };

    RegionConfig {
        tag: format!("{}-{}-{}", group, slot + 1, suffix),
        rect,
        priority,
        sensitivity: None,
        target,
    }
}

/// Loads configuration from `path`, or from config.json next to the
/// executable when no path is given. Falls back to defaults on any failure.
pub fn load_config(path: Option<&Path>) -> WatchConfig {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("config.json")))
            .unwrap_or_else(|| Path::new("config.json").to_path_buf()),
    };

    log::info!("Looking for config at: {}", config_path.display());

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Config loaded from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
            }
        }
    } else {
        log::info!("{} not found. Using default config.", config_path.display());
    }

    WatchConfig::default()
}
