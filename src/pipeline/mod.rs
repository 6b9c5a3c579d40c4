//! The capture loop.
//!
//! This module provides:
//! - Frame sources (directory replay, in-memory frames)
//! - Region bindings from tags to table fields
//! - The detection loop and its worker thread
//! - The event consumer thread and sinks
//! - The status surface

pub mod bindings;
pub mod consumer;
pub mod runner;
pub mod source;
pub mod status;

pub use bindings::{CardPart, RegionBindings, RegionTarget, SeatAttr};
pub use consumer::{spawn_consumer, EventSink, JsonLinesSink, RetryPolicy};
pub use runner::{CycleReport, Watcher};
pub use source::{DirectorySource, FrameSource, MemorySource};
pub use status::{StatusBoard, StatusReport};
