//! Detection loop - capture, ROI diff, OCR, dispatch.
//!
//! One `Watcher` owns the tracker, the ensemble and the dispatcher for one
//! table. `run` polls a frame source until it is exhausted or the active flag
//! is cleared; `spawn` does the same on a dedicated worker thread.

use anyhow::{anyhow, Result};
use chrono::Local;
use image::RgbaImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::bindings::{RegionBindings, Touched};
use super::source::FrameSource;
use super::status::{LoopStats, StatusBoard};
use crate::config::WatchConfig;
use crate::dispatch::{EventPublisher, StateDispatcher};
use crate::ocr::OcrEnsemble;
use crate::roi::{crop_region, RoiTracker};
use crate::table::Street;

/// Sleep granularity while waiting for the next cycle, so that clearing the
/// active flag is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Floor for the frame time used in the fps figure.
const MIN_FRAME_TIME_MS: f64 = 0.1;

/// Frames per second the pipeline could sustain at this cycle's processing
/// time. The poll interval is a deliberate idle and is not counted.
fn processing_fps(elapsed_ms: f64) -> f64 {
    1000.0 / elapsed_ms.max(MIN_FRAME_TIME_MS)
}

/// What one capture cycle did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleReport {
    pub correlation_id: String,
    pub changed_regions: usize,
    pub total_regions: usize,
    pub recognized: usize,
    pub events: u64,
    pub elapsed_ms: f64,
}

pub struct Watcher {
    tracker: RoiTracker,
    ensemble: OcrEnsemble,
    dispatcher: StateDispatcher,
    bindings: RegionBindings,
    max_priority: Option<u8>,
    poll_interval: Duration,
    active: Arc<AtomicBool>,
    status: StatusBoard,
    loop_stats: LoopStats,
}

impl Watcher {
    pub fn new(config: &WatchConfig, ensemble: OcrEnsemble, publisher: EventPublisher) -> Self {
        let mut tracker = RoiTracker::new(config.region_definitions());
        tracker.set_enabled(config.roi_tracking_enabled);

        let bindings = RegionBindings::new(
            config
                .regions
                .iter()
                .map(|region| (region.tag.as_str(), region.target)),
        );

        let dispatcher = StateDispatcher::new(publisher);
        let status = StatusBoard::new(dispatcher.handle());

        Self {
            tracker,
            ensemble,
            dispatcher,
            bindings,
            max_priority: config.max_priority,
            poll_interval: config.poll_interval(),
            active: Arc::new(AtomicBool::new(true)),
            status,
            loop_stats: LoopStats::default(),
        }
    }

    /// Flag checked at the top of every iteration. Store `false` to stop the
    /// loop after the current cycle.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn tracker(&self) -> &RoiTracker {
        &self.tracker
    }

    pub fn ensemble(&self) -> &OcrEnsemble {
        &self.ensemble
    }

    pub fn dispatcher(&self) -> &StateDispatcher {
        &self.dispatcher
    }

    /// Runs one capture cycle over `frame`.
    pub fn run_cycle(&mut self, frame: &RgbaImage) -> CycleReport {
        let start = Instant::now();
        let events_before = self.dispatcher.get_stats().events_total;
        let correlation_id = self.dispatcher.begin_frame();

        let changes = self.tracker.detect_changes(frame, self.max_priority);

        let mut touched = Touched::default();
        let mut recognized = 0;
        for tag in &changes.changed {
            let Some(rect) = self.tracker.region(tag).map(|region| region.rect) else {
                continue;
            };
            let Some(target) = self.bindings.target(tag) else {
                continue;
            };
            let Some(crop) = crop_region(frame, &rect) else {
                continue;
            };

            let result = self.ensemble.recognize(&crop, target.field_type(), None);
            if result.validation_passed {
                recognized += 1;
            }
            if !result.has_observations() {
                // Nothing was read; keep the region changed until an engine answers
                self.tracker.invalidate(tag);
            }
            self.bindings.apply(tag, &result, &mut touched);
        }

        if !touched.is_empty() {
            self.dispatch(touched);
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.dispatcher
            .update_performance(processing_fps(elapsed_ms), elapsed_ms, None, None);

        self.dispatcher.end_frame();

        let report = CycleReport {
            correlation_id,
            changed_regions: changes.changed.len(),
            total_regions: changes.total,
            recognized,
            events: self.dispatcher.get_stats().events_total - events_before,
            elapsed_ms,
        };
        log::debug!(
            "Cycle {}: {}/{} regions changed, {} recognized, {} events in {:.1}ms",
            report.correlation_id,
            report.changed_regions,
            report.total_regions,
            report.recognized,
            report.events,
            report.elapsed_ms
        );
        report
    }

    /// Feeds the fields touched this cycle to the dispatcher.
    ///
    /// Hero cards go first: losing them or seeing a different pair means the
    /// hand is over, and the reset must precede this cycle's other updates.
    fn dispatch(&mut self, mut touched: Touched) {
        if touched.hero {
            let (cards, confidence) = self.bindings.hero_cards();
            let current = self.dispatcher.snapshot().hero_cards;
            let hand_over = !current.is_empty() && cards != current;
            if hand_over {
                self.dispatcher.reset_hand();
                // The reset cleared pot and board; resync them from the cache.
                touched.pot = true;
                touched.board = true;
            }
            if !cards.is_empty() {
                self.dispatcher.update_hero_cards(&cards, confidence);
            }
        }

        for (seat, reading) in self
            .bindings
            .seats()
            .into_iter()
            .filter(|(seat, _)| touched.seats.contains(seat))
        {
            self.dispatcher.update_player(
                seat,
                reading.stack,
                reading.name.as_deref(),
                reading.position.as_deref(),
                reading.is_active,
                reading.confidence,
            );
        }

        if touched.board {
            let (cards, confidence) = self.bindings.board_cards();
            if Street::from_board_count(cards.len()).is_some() {
                self.dispatcher.update_board_cards(&cards, confidence);
            } else {
                log::debug!("Partial board ({} cards), waiting", cards.len());
            }
        }

        if touched.pot {
            if let Some((pot, confidence)) = self.bindings.pot() {
                let side_pots = self.dispatcher.snapshot().side_pots;
                self.dispatcher.update_pot(pot, &side_pots, confidence);
            }
        }
    }

    /// Polls `source` until it is exhausted or the active flag is cleared.
    /// Per-cycle failures are logged and never end the loop.
    pub fn run(&mut self, source: &mut dyn FrameSource) {
        self.loop_stats.running = true;
        self.loop_stats.started_at = Some(Local::now());
        self.publish_status();
        log::info!(
            "Detection loop started ({} regions, {} OCR engines, every {:?})",
            self.tracker.regions().len(),
            self.ensemble.registry().len(),
            self.poll_interval
        );

        while self.active.load(Ordering::SeqCst) {
            let cycle_start = Instant::now();

            match source.next_frame() {
                Ok(Some(frame)) => {
                    let report = self.run_cycle(&frame);
                    self.loop_stats.record_cycle(report.elapsed_ms);
                }
                Ok(None) => {
                    log::info!("Frame source exhausted");
                    break;
                }
                Err(e) => {
                    self.loop_stats.failed_frames += 1;
                    log::warn!("Skipping frame: {}", e);
                }
            }
            self.publish_status();

            self.wait_for_next_cycle(cycle_start);
        }

        self.loop_stats.running = false;
        self.publish_status();
        log::info!(
            "Detection loop stopped after {} cycles ({} failed frames)",
            self.loop_stats.cycles,
            self.loop_stats.failed_frames
        );
    }

    fn wait_for_next_cycle(&self, cycle_start: Instant) {
        let deadline = cycle_start + self.poll_interval;
        while self.active.load(Ordering::SeqCst) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }

    fn publish_status(&self) {
        self.status
            .publish(&self.loop_stats, self.tracker.stats(), self.ensemble.stats());
    }

    /// Runs the loop on a dedicated worker thread. The watcher is handed
    /// back when the loop ends; dropping it closes the event queue.
    pub fn spawn(mut self, mut source: Box<dyn FrameSource>) -> Result<JoinHandle<Watcher>> {
        thread::Builder::new()
            .name("table-watch".to_string())
            .spawn(move || {
                self.run(source.as_mut());
                self
            })
            .map_err(|e| anyhow!("Failed to spawn detection thread: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegionConfig, RelativeRect};
    use crate::dispatch::{create_event_queue, DetectionEvent, EventCategory, EventReceiver};
    use crate::ocr::{EngineOutput, EngineRegistry, OcrEngine, OcrEngineError};
    use crate::pipeline::bindings::{CardPart, RegionTarget, SeatAttr};
    use crate::pipeline::source::MemorySource;
    use anyhow::anyhow;
    use image::Rgba;
    use std::collections::HashMap;

    const FRAME_SIZE: u32 = 400;

    /// Reads an 8-column bar code painted into the crop and looks the code
    /// up in a palette. Code 0 (no bars) reads as blank.
    struct PaletteEngine {
        palette: HashMap<u8, &'static str>,
    }

    impl OcrEngine for PaletteEngine {
        fn name(&self) -> &str {
            "palette"
        }

        fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            let (w, h) = image.dimensions();
            let mut code = 0u8;
            for col in 0..8 {
                let x = col * w / 8 + w / 16;
                if image.get_pixel(x, h / 2).0[0] > 128 {
                    code |= 1 << col;
                }
            }
            if code == 0 {
                return Ok(EngineOutput::new("", 0.9));
            }
            self.palette
                .get(&code)
                .map(|text| EngineOutput::new(text, 0.9))
                .ok_or_else(|| OcrEngineError::Failed(format!("unknown code {}", code)))
        }
    }

    const PALETTE: [(&str, u8); 12] = [
        ("A", 0b0000_0011),
        ("K", 0b0000_0101),
        ("Q", 0b0000_0110),
        ("7", 0b0000_1001),
        ("2", 0b0000_1010),
        ("h", 0b0000_1100),
        ("d", 0b0001_0001),
        ("s", 0b0001_0010),
        ("c", 0b0001_0100),
        ("$3", 0b0001_1000),
        ("$7", 0b0010_0001),
        ("100", 0b0010_0010),
    ];

    fn code(text: &str) -> u8 {
        PALETTE
            .iter()
            .find(|(t, _)| *t == text)
            .map(|(_, c)| *c)
            .unwrap_or_else(|| panic!("no palette code for {}", text))
    }

    fn region(tag: &str, x: f32, y: f32, target: RegionTarget) -> RegionConfig {
        RegionConfig {
            tag: tag.to_string(),
            rect: RelativeRect::new(x, y, 0.1, 0.05),
            priority: 1,
            sensitivity: None,
            target,
        }
    }

    fn card_regions(group: &str, slot: u8, x: f32, y: f32) -> Vec<RegionConfig> {
        let target = |part| {
            if group == "hero" {
                RegionTarget::Hero { slot, part }
            } else {
                RegionTarget::Board { slot, part }
            }
        };
        vec![
            region(&format!("{}-{}-rank", group, slot + 1), x, y, target(CardPart::Rank)),
            region(&format!("{}-{}-suit", group, slot + 1), x, y + 0.1, target(CardPart::Suit)),
        ]
    }

    fn test_config() -> WatchConfig {
        let mut regions = Vec::new();
        regions.extend(card_regions("hero", 0, 0.1, 0.1));
        regions.extend(card_regions("hero", 1, 0.3, 0.1));
        regions.extend(card_regions("board", 0, 0.1, 0.4));
        regions.extend(card_regions("board", 1, 0.3, 0.4));
        regions.extend(card_regions("board", 2, 0.5, 0.4));
        regions.push(region("pot", 0.1, 0.7, RegionTarget::Pot));
        regions.push(region(
            "seat-2-stack",
            0.5,
            0.7,
            RegionTarget::Seat {
                seat: 2,
                attr: SeatAttr::Stack,
            },
        ));

        WatchConfig {
            poll_interval_ms: 0,
            regions,
            ..Default::default()
        }
    }

    /// Paints `text`'s bar code into the region tagged `tag`.
    fn paint(frame: &mut RgbaImage, config: &WatchConfig, tag: &str, text: &str) {
        let rect = config
            .regions
            .iter()
            .find(|r| r.tag == tag)
            .map(|r| r.rect)
            .unwrap_or_else(|| panic!("no region {}", tag));
        let (x0, y0, w, h) = rect.to_absolute(FRAME_SIZE, FRAME_SIZE);
        let bars = code(text);
        for x in 0..w {
            if bars & (1 << (x * 8 / w)) == 0 {
                continue;
            }
            for y in 0..h {
                frame.put_pixel(x0 + x, y0 + y, Rgba([255, 255, 255, 255]));
            }
        }
    }

    fn frame(config: &WatchConfig, contents: &[(&str, &str)]) -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgba([0, 0, 0, 255]));
        for (tag, text) in contents {
            paint(&mut frame, config, tag, text);
        }
        frame
    }

    fn palette_engine() -> PaletteEngine {
        PaletteEngine {
            palette: PALETTE.iter().map(|(t, c)| (*c, *t)).collect(),
        }
    }

    fn watcher(config: &WatchConfig) -> (Watcher, EventReceiver) {
        watcher_with(config, Arc::new(palette_engine()))
    }

    fn watcher_with(config: &WatchConfig, engine: Arc<dyn OcrEngine>) -> (Watcher, EventReceiver) {
        let mut registry = EngineRegistry::new();
        registry.register(engine);
        let ensemble = OcrEnsemble::new(registry, config.engine_timeout());
        let (publisher, receiver) = create_event_queue(config.event_queue_capacity);
        (Watcher::new(config, ensemble, publisher), receiver)
    }

    fn table_events(receiver: &EventReceiver) -> Vec<DetectionEvent> {
        receiver
            .drain()
            .into_iter()
            .filter(|e| e.category != EventCategory::Performance)
            .collect()
    }

    const PREFLOP: [(&str, &str); 6] = [
        ("hero-1-rank", "A"),
        ("hero-1-suit", "h"),
        ("hero-2-rank", "K"),
        ("hero-2-suit", "d"),
        ("pot", "$3"),
        ("seat-2-stack", "100"),
    ];

    const FLOP: [(&str, &str); 6] = [
        ("board-1-rank", "Q"),
        ("board-1-suit", "s"),
        ("board-2-rank", "7"),
        ("board-2-suit", "h"),
        ("board-3-rank", "2"),
        ("board-3-suit", "c"),
    ];

    fn flop_frame(config: &WatchConfig) -> RgbaImage {
        let mut contents: Vec<(&str, &str)> = PREFLOP
            .iter()
            .copied()
            .filter(|(tag, _)| *tag != "pot")
            .collect();
        contents.push(("pot", "$7"));
        contents.extend(FLOP);
        frame(config, &contents)
    }

    #[test]
    fn test_pipeline_preflop_then_flop() {
        let config = test_config();
        let (mut watcher, receiver) = watcher(&config);

        // Preflop: hero cards, a seat stack and the pot
        let report = watcher.run_cycle(&frame(&config, &PREFLOP));
        assert_eq!(report.changed_regions, report.total_regions);

        let events = table_events(&receiver);
        assert_eq!(
            events.iter().map(|e| e.category).collect::<Vec<_>>(),
            vec![
                EventCategory::Card,
                EventCategory::StateTransition,
                EventCategory::Player,
                EventCategory::Pot,
            ]
        );
        assert_eq!(events[1].transition(), Some("hand_start"));
        assert!(events
            .iter()
            .all(|e| e.correlation_id.as_deref() == Some(report.correlation_id.as_str())));

        // Flop dealt and the pot grows
        let report = watcher.run_cycle(&flop_frame(&config));
        assert_eq!(report.changed_regions, 7);

        let events = table_events(&receiver);
        assert_eq!(
            events.iter().map(|e| e.category).collect::<Vec<_>>(),
            vec![
                EventCategory::Card,
                EventCategory::StateTransition,
                EventCategory::Pot,
            ]
        );
        assert_eq!(events[1].payload["to"], "flop");

        let snapshot = watcher.dispatcher().snapshot();
        assert_eq!(snapshot.hero_cards, vec!["Ah", "Kd"]);
        assert_eq!(snapshot.board_cards, vec!["Qs", "7h", "2c"]);
        assert_eq!(snapshot.pot, 7.0);
        assert_eq!(snapshot.street, Street::Flop);
        assert_eq!(snapshot.seats[&2].stack, Some(100.0));
    }

    #[test]
    fn test_unchanged_frame_skips_ocr() {
        let config = test_config();
        let (mut watcher, receiver) = watcher(&config);

        let first = frame(&config, &PREFLOP);
        watcher.run_cycle(&first);
        receiver.drain();
        let calls = watcher.ensemble().stats().total_calls;

        let report = watcher.run_cycle(&first);
        assert_eq!(report.changed_regions, 0);
        assert_eq!(watcher.ensemble().stats().total_calls, calls);
        assert!(table_events(&receiver).is_empty());
    }

    #[test]
    fn test_new_hero_cards_reset_hand() {
        let config = test_config();
        let (mut watcher, receiver) = watcher(&config);

        watcher.run_cycle(&flop_frame(&config));
        let first_hand = watcher.dispatcher().snapshot().hand_id;
        receiver.drain();

        // Hero cards disappear: the hand is over
        watcher.run_cycle(&frame(&config, &[("seat-2-stack", "100")]));
        let events = table_events(&receiver);
        assert_eq!(events[0].transition(), Some("hand_end"));
        assert_eq!(events[0].payload["hand_id"], first_hand.clone().unwrap().as_str());

        let snapshot = watcher.dispatcher().snapshot();
        assert!(snapshot.hero_cards.is_empty());
        assert!(snapshot.board_cards.is_empty());
        assert_ne!(snapshot.hand_id, first_hand);
        assert_eq!(snapshot.seats[&2].stack, Some(100.0));
    }

    #[test]
    fn test_failing_engine_keeps_state() {
        let config = test_config();
        let (mut watcher, receiver) = watcher(&config);
        watcher.run_cycle(&frame(&config, &PREFLOP));
        receiver.drain();

        // A code the palette does not know: the engine fails, pot is kept
        let mut garbled = frame(&config, &PREFLOP);
        let (x0, y0, _, h) = RelativeRect::new(0.1, 0.7, 0.1, 0.05).to_absolute(FRAME_SIZE, FRAME_SIZE);
        for y in 0..h {
            for x in 0..5 {
                garbled.put_pixel(x0 + x, y0 + y, Rgba([0, 0, 0, 255]));
            }
            for x in 35..40 {
                garbled.put_pixel(x0 + x, y0 + y, Rgba([255, 255, 255, 255]));
            }
        }
        let report = watcher.run_cycle(&garbled);
        assert_eq!(report.changed_regions, 1);
        assert_eq!(report.recognized, 0);
        assert!(table_events(&receiver).is_empty());
        assert_eq!(watcher.dispatcher().snapshot().pot, 3.0);
    }

    /// Palette reader that times out while `healthy` is cleared.
    struct StallingEngine {
        inner: PaletteEngine,
        healthy: Arc<AtomicBool>,
    }

    impl OcrEngine for StallingEngine {
        fn name(&self) -> &str {
            "stalling"
        }

        fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(OcrEngineError::Timeout(Duration::from_millis(5)));
            }
            self.inner.recognize(image)
        }
    }

    #[test]
    fn test_unread_region_retried_next_cycle() {
        let config = test_config();
        let healthy = Arc::new(AtomicBool::new(true));
        let (mut watcher, _receiver) = watcher_with(
            &config,
            Arc::new(StallingEngine {
                inner: palette_engine(),
                healthy: Arc::clone(&healthy),
            }),
        );
        watcher.run_cycle(&frame(&config, &PREFLOP));
        assert_eq!(watcher.dispatcher().snapshot().pot, 3.0);

        let mut contents: Vec<(&str, &str)> = PREFLOP
            .iter()
            .copied()
            .filter(|(tag, _)| *tag != "pot")
            .collect();
        contents.push(("pot", "$7"));
        let grown = frame(&config, &contents);

        // The pot changes while the engine is stalled
        healthy.store(false, Ordering::SeqCst);
        let report = watcher.run_cycle(&grown);
        assert_eq!(report.changed_regions, 1);
        assert_eq!(watcher.dispatcher().snapshot().pot, 3.0);

        // Same frame, engine back: the pot is read again
        healthy.store(true, Ordering::SeqCst);
        let report = watcher.run_cycle(&grown);
        assert_eq!(report.changed_regions, 1);
        assert_eq!(report.recognized, 1);
        assert_eq!(watcher.dispatcher().snapshot().pot, 7.0);

        let report = watcher.run_cycle(&grown);
        assert_eq!(report.changed_regions, 0);
        assert_eq!(watcher.dispatcher().snapshot().pot, 7.0);
    }

    #[test]
    fn test_fps_from_processing_time() {
        assert_eq!(processing_fps(5.0), 200.0);
        assert_eq!(processing_fps(250.0), 4.0);
        assert_eq!(processing_fps(0.0), 10_000.0);
    }

    #[test]
    fn test_cycle_reports_performance() {
        let config = test_config();
        let (mut watcher, receiver) = watcher(&config);

        watcher.run_cycle(&frame(&config, &PREFLOP));
        let sample = watcher
            .dispatcher()
            .snapshot()
            .performance
            .expect("performance sample");
        assert!(sample.fps > 0.0);
        assert!(receiver
            .drain()
            .iter()
            .any(|e| e.category == EventCategory::Performance));
    }

    #[test]
    fn test_loop_runs_until_source_exhausted() {
        let config = test_config();
        let (watcher, receiver) = watcher(&config);
        let status = watcher.status();

        let source = MemorySource::new(vec![
            frame(&config, &PREFLOP),
            flop_frame(&config),
            flop_frame(&config),
        ]);
        let handle = watcher.spawn(Box::new(source)).unwrap();
        let watcher = handle.join().expect("detection thread panicked");

        let report = status.report();
        assert!(!report.loop_stats.running);
        assert_eq!(report.loop_stats.cycles, 3);
        assert_eq!(report.tracker.cycles, 3);
        assert_eq!(report.dispatcher.hands_started, 1);

        // Dropping the watcher closes the queue for the consumer
        drop(watcher);
        let mut count = 0;
        while receiver.recv().is_some() {
            count += 1;
        }
        assert!(count >= 7);
    }

    /// Fails every other frame.
    struct FlakySource {
        frames: Vec<RgbaImage>,
        calls: usize,
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(anyhow!("capture failed"));
            }
            Ok(self.frames.pop())
        }
    }

    #[test]
    fn test_loop_survives_frame_errors() {
        let config = test_config();
        let (mut watcher, _receiver) = watcher(&config);
        let mut source = FlakySource {
            frames: vec![frame(&config, &PREFLOP), flop_frame(&config)],
            calls: 0,
        };

        watcher.run(&mut source);
        let report = watcher.status().report();
        assert_eq!(report.loop_stats.cycles, 2);
        assert_eq!(report.loop_stats.failed_frames, 2);
    }

    #[test]
    fn test_cleared_flag_stops_loop() {
        let config = test_config();
        let (mut watcher, _receiver) = watcher(&config);
        watcher.active_flag().store(false, Ordering::SeqCst);

        let mut source = MemorySource::new(vec![frame(&config, &PREFLOP)]);
        watcher.run(&mut source);
        assert_eq!(watcher.status().report().loop_stats.cycles, 0);
    }

    /// Blinds, a flop, a bet and a fold, fed straight to the dispatcher the
    /// way the loop and an action reader would within two capture cycles.
    #[test]
    fn test_end_to_end_hand_event_order() {
        let (publisher, receiver) = create_event_queue(64);
        let mut dispatcher = StateDispatcher::new(publisher);
        let cards = |list: &[&str]| list.iter().map(|c| c.to_string()).collect::<Vec<_>>();

        dispatcher.update_player(2, Some(100.0), Some("alice"), Some("SB"), Some(true), 0.9);
        dispatcher.update_player(3, Some(100.0), Some("bob"), Some("BB"), Some(true), 0.9);
        receiver.drain();

        let first = dispatcher.begin_frame();
        dispatcher.update_hero_cards(&cards(&["Ah", "Kd"]), 0.9);
        dispatcher.emit_player_action(2, "post_blind", Some(1.0), 0.9);
        dispatcher.emit_player_action(3, "post_blind", Some(2.0), 0.9);
        dispatcher.update_pot(3.0, &[], 0.9);
        dispatcher.end_frame();

        let second = dispatcher.begin_frame();
        dispatcher.update_board_cards(&cards(&["Qs", "7h", "2c"]), 0.9);
        dispatcher.emit_player_action(2, "bet", Some(4.0), 0.9);
        dispatcher.update_pot(7.0, &[], 0.9);
        dispatcher.emit_player_action(3, "fold", None, 0.9);
        dispatcher.end_frame();

        let events = receiver.drain();
        assert_eq!(
            events.iter().map(|e| e.category).collect::<Vec<_>>(),
            vec![
                EventCategory::Card,
                EventCategory::StateTransition,
                EventCategory::Action,
                EventCategory::Action,
                EventCategory::Pot,
                EventCategory::Card,
                EventCategory::StateTransition,
                EventCategory::Action,
                EventCategory::Pot,
                EventCategory::Action,
            ]
        );
        assert!(events[..5]
            .iter()
            .all(|e| e.correlation_id.as_deref() == Some(first.as_str())));
        assert!(events[5..]
            .iter()
            .all(|e| e.correlation_id.as_deref() == Some(second.as_str())));
        assert_eq!(events[2].payload["player"], "alice");
        assert_eq!(events[9].payload["player"], "bob");
        assert_eq!(events[9].payload["street"], "flop");
    }
}
