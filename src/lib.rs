//! Table watcher core.
//!
//! Turns captures of a card table into a de-duplicated stream of state
//! change events: ROI change tracking, OCR ensemble with lexical validation,
//! sanity checks and the state dispatcher, wired together by the capture loop.

pub mod config;
pub mod dispatch;
pub mod ocr;
pub mod pipeline;
pub mod roi;
pub mod sanity;
pub mod table;
