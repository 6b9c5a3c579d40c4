//! Multi-engine OCR with confidence-weighted voting.
//!
//! Every selected engine runs on its own worker thread against the same crop.
//! Engines that fail, panic, or miss the deadline are left out of the vote.
//! An engine still busy with an earlier crop is not started again; it counts
//! as timed out until that call returns. The winning text is then checked
//! against the field's validation rule.

use image::RgbaImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::engine::{EngineObservation, EngineOutput, OcrEngine, OcrEngineError};
use super::validate::{validate, FieldType, FieldValue};

pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(3);

/// Engines registered at startup. May be empty.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn OcrEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine. A later engine with the same name replaces the earlier one.
    pub fn register(&mut self, engine: Arc<dyn OcrEngine>) {
        let name = engine.name().to_string();
        self.engines.retain(|e| e.name() != name);
        log::info!("OCR engine registered: {}", name);
        self.engines.push(engine);
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    /// Registered engines that currently report themselves available.
    pub fn available(&self) -> Vec<Arc<dyn OcrEngine>> {
        self.engines
            .iter()
            .filter(|e| e.is_available())
            .cloned()
            .collect()
    }
}

/// Fused output for one region.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub field: FieldType,
    pub text: String,
    pub confidence: f32,
    pub observations: Vec<EngineObservation>,
    pub validation_passed: bool,
    pub messages: Vec<String>,
    /// Normalized value, present when validation passed
    pub value: Option<FieldValue>,
}

impl EnsembleResult {
    fn failure(field: FieldType, message: String) -> Self {
        Self {
            field,
            text: String::new(),
            confidence: 0.0,
            observations: Vec::new(),
            validation_passed: false,
            messages: vec![message],
            value: None,
        }
    }

    /// True when at least one engine produced an observation.
    pub fn has_observations(&self) -> bool {
        !self.observations.is_empty()
    }
}

/// Per-engine usage counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineUsage {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
}

/// Cumulative ensemble counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnsembleStats {
    pub total_calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub validation_failures: u64,
    pub auto_corrections: u64,
    pub engines: BTreeMap<String, EngineUsage>,
}

pub struct OcrEnsemble {
    registry: EngineRegistry,
    timeout: Duration,
    /// Set while an engine's worker thread is running, keyed by engine name
    in_flight: HashMap<String, Arc<AtomicBool>>,
    stats: EnsembleStats,
}

impl OcrEnsemble {
    pub fn new(registry: EngineRegistry, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            in_flight: HashMap::new(),
            stats: EnsembleStats::default(),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EngineRegistry {
        &mut self.registry
    }

    pub fn stats(&self) -> EnsembleStats {
        self.stats.clone()
    }

    /// Reads `image` as `field` with the available engines, or with the
    /// named subset when `engines` is given. Never fails: with no usable
    /// engine the result is empty with a failure message.
    pub fn recognize(
        &mut self,
        image: &RgbaImage,
        field: FieldType,
        engines: Option<&[&str]>,
    ) -> EnsembleResult {
        self.stats.total_calls += 1;

        let selected: Vec<Arc<dyn OcrEngine>> = self
            .registry
            .available()
            .into_iter()
            .filter(|e| engines.is_none_or(|names| names.contains(&e.name())))
            .collect();

        if selected.is_empty() {
            self.stats.failures += 1;
            return EnsembleResult::failure(field, "no OCR engines available".to_string());
        }

        let busy: Vec<Arc<AtomicBool>> = selected
            .iter()
            .map(|e| Arc::clone(self.in_flight.entry(e.name().to_string()).or_default()))
            .collect();
        let outcomes = run_engines(image, &selected, &busy, self.timeout);

        let mut observations = Vec::new();
        let mut errors = Vec::new();
        for (engine, outcome) in selected.iter().zip(outcomes) {
            let usage = self.stats.engines.entry(engine.name().to_string()).or_default();
            usage.calls += 1;
            match outcome {
                Ok(output) => {
                    log::debug!(
                        "OCR {} ({:?}): '{}' @ {:.2}",
                        engine.name(),
                        field,
                        output.text,
                        output.confidence
                    );
                    observations.push(EngineObservation::from_output(engine.name(), output));
                }
                Err(e) => {
                    if matches!(e, OcrEngineError::Timeout(_)) {
                        usage.timeouts += 1;
                    }
                    usage.failures += 1;
                    log::warn!("OCR engine {} excluded: {}", engine.name(), e);
                    errors.push(format!("{}: {}", engine.name(), e));
                }
            }
        }

        let Some((text, confidence)) = vote(&observations) else {
            self.stats.failures += 1;
            let mut result =
                EnsembleResult::failure(field, "all OCR engines failed".to_string());
            result.messages.extend(errors);
            return result;
        };
        self.stats.successes += 1;

        let validation = validate(field, &text);
        if validation.corrected {
            self.stats.auto_corrections += 1;
        }
        if !validation.passed() {
            self.stats.validation_failures += 1;
        }

        EnsembleResult {
            field,
            text: validation.text,
            confidence,
            observations,
            validation_passed: validation.value.is_some(),
            messages: validation.messages,
            value: validation.value,
        }
    }
}

/// Runs every engine in parallel and collects outcomes in engine order.
///
/// `busy[i]` is engine i's in-flight flag. An engine whose flag is already
/// set is reported as a timeout without starting a thread. Engines still
/// running at the deadline are reported as timeouts and keep their flag
/// until the call returns.
fn run_engines(
    image: &RgbaImage,
    engines: &[Arc<dyn OcrEngine>],
    busy: &[Arc<AtomicBool>],
    timeout: Duration,
) -> Vec<Result<EngineOutput, OcrEngineError>> {
    let image = Arc::new(image.clone());
    let (tx, rx) = mpsc::channel();
    let mut outcomes: Vec<Option<Result<EngineOutput, OcrEngineError>>> = vec![None; engines.len()];
    let mut pending = 0usize;

    for (idx, (engine, flag)) in engines.iter().zip(busy).enumerate() {
        if flag.swap(true, Ordering::SeqCst) {
            log::debug!("OCR engine {} still busy, not started", engine.name());
            outcomes[idx] = Some(Err(OcrEngineError::Timeout(timeout)));
            continue;
        }

        let tx = tx.clone();
        let engine = Arc::clone(engine);
        let image = Arc::clone(&image);
        let thread_flag = Arc::clone(flag);
        let spawned = thread::Builder::new()
            .name(format!("ocr-{}", engine.name()))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| engine.recognize(&image)))
                    .unwrap_or(Err(OcrEngineError::Panicked));
                thread_flag.store(false, Ordering::SeqCst);
                let _ = tx.send((idx, result));
            });

        match spawned {
            Ok(_) => pending += 1,
            Err(e) => {
                flag.store(false, Ordering::SeqCst);
                outcomes[idx] = Some(Err(OcrEngineError::Failed(e.to_string())));
            }
        }
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((idx, result)) => {
                outcomes[idx] = Some(result);
                pending -= 1;
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    outcomes
        .into_iter()
        .map(|o| o.unwrap_or(Err(OcrEngineError::Timeout(timeout))))
        .collect()
}

/// Confidence-weighted vote over observations.
///
/// Identical texts pool their confidence; the heaviest text wins with
/// confidence = its weight / total weight. When every confidence is zero the
/// most frequent text wins with confidence 0. Ties go to the text seen first.
/// Returns `None` when there are no observations.
pub fn vote(observations: &[EngineObservation]) -> Option<(String, f32)> {
    match observations {
        [] => return None,
        [single] => return Some((single.text.trim().to_string(), single.confidence)),
        _ => {}
    }

    // (text, weight, count) in first-seen order
    let mut groups: Vec<(&str, f32, usize)> = Vec::new();
    for obs in observations {
        let text = obs.text.trim();
        match groups.iter_mut().find(|(t, _, _)| *t == text) {
            Some(group) => {
                group.1 += obs.confidence;
                group.2 += 1;
            }
            None => groups.push((text, obs.confidence, 1)),
        }
    }

    let total: f32 = groups.iter().map(|g| g.1).sum();

    if total <= 0.0 {
        let mut best = &groups[0];
        for group in &groups[1..] {
            if group.2 > best.2 {
                best = group;
            }
        }
        return Some((best.0.to_string(), 0.0));
    }

    let mut best = &groups[0];
    for group in &groups[1..] {
        if group.1 > best.1 {
            best = group;
        }
    }
    Some((best.0.to_string(), best.1 / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct FixedEngine {
        name: String,
        text: String,
        confidence: f32,
        calls: AtomicU32,
    }

    impl FixedEngine {
        fn new(name: &str, text: &str, confidence: f32) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                text: text.to_string(),
                confidence,
                calls: AtomicU32::new(0),
            })
        }
    }

    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            &self.name
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EngineOutput::new(&self.text, self.confidence))
        }
    }

    struct BrokenEngine;

    impl OcrEngine for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            Err(OcrEngineError::Failed("model not loaded".to_string()))
        }
    }

    struct PanickingEngine;

    impl OcrEngine for PanickingEngine {
        fn name(&self) -> &str {
            "panicky"
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            panic!("engine crashed");
        }
    }

    struct SlowEngine;

    impl OcrEngine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            thread::sleep(Duration::from_millis(500));
            Ok(EngineOutput::new("late", 1.0))
        }
    }

    /// Blocks until `release` is set.
    #[derive(Default)]
    struct HungEngine {
        release: AtomicBool,
        started: AtomicU32,
        finished: AtomicU32,
    }

    impl OcrEngine for HungEngine {
        fn name(&self) -> &str {
            "hung"
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            while !self.release.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(EngineOutput::new("Q", 0.9))
        }
    }

    struct OfflineEngine;

    impl OcrEngine for OfflineEngine {
        fn name(&self) -> &str {
            "offline"
        }

        fn is_available(&self) -> bool {
            false
        }

        fn recognize(&self, _image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
            Ok(EngineOutput::new("never", 1.0))
        }
    }

    fn obs(engine: &str, text: &str, confidence: f32) -> EngineObservation {
        EngineObservation::from_output(engine, EngineOutput::new(text, confidence))
    }

    fn ensemble(engines: Vec<Arc<dyn OcrEngine>>) -> OcrEnsemble {
        let mut registry = EngineRegistry::new();
        for engine in engines {
            registry.register(engine);
        }
        OcrEnsemble::new(registry, Duration::from_millis(200))
    }

    fn crop() -> RgbaImage {
        RgbaImage::new(20, 10)
    }

    #[test]
    fn test_vote_weighted() {
        let (text, confidence) = vote(&[
            obs("a", "AKs", 0.9),
            obs("b", "AKs", 0.6),
            obs("c", "AK5", 0.3),
        ])
        .unwrap();
        assert_eq!(text, "AKs");
        assert!((confidence - 1.5 / 1.8).abs() < 1e-3);
    }

    #[test]
    fn test_vote_zero_confidence_most_frequent() {
        let (text, confidence) = vote(&[
            obs("a", "QQ", 0.0),
            obs("b", "JJ", 0.0),
            obs("c", "JJ", 0.0),
        ])
        .unwrap();
        assert_eq!(text, "JJ");
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn test_vote_single_as_is() {
        assert_eq!(vote(&[obs("a", "BTN", 0.42)]), Some(("BTN".to_string(), 0.42)));
        assert_eq!(vote(&[]), None);
    }

    #[test]
    fn test_vote_heavier_minority_wins() {
        let (text, _) = vote(&[
            obs("a", "100", 0.2),
            obs("b", "100", 0.2),
            obs("c", "180", 0.95),
        ])
        .unwrap();
        assert_eq!(text, "180");
    }

    #[test]
    fn test_no_engines() {
        let mut ensemble = ensemble(vec![]);
        let result = ensemble.recognize(&crop(), FieldType::PotSize, None);

        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.validation_passed);
        assert!(!result.messages.is_empty());
        assert_eq!(ensemble.stats().failures, 1);
    }

    #[test]
    fn test_single_engine() {
        let mut ensemble = ensemble(vec![FixedEngine::new("only", "$1,234.56", 0.8)]);
        let result = ensemble.recognize(&crop(), FieldType::PotSize, None);

        assert!(result.validation_passed);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.value, Some(FieldValue::Amount(1234.56)));
    }

    #[test]
    fn test_failing_engines_excluded() {
        let mut ensemble = ensemble(vec![
            Arc::new(BrokenEngine),
            Arc::new(PanickingEngine),
            FixedEngine::new("good", "BTN", 0.7),
        ]);
        let result = ensemble.recognize(&crop(), FieldType::Position, None);

        assert_eq!(result.text, "BTN");
        assert_eq!(result.observations.len(), 1);
        assert!(result.validation_passed);

        let stats = ensemble.stats();
        assert_eq!(stats.engines["broken"].failures, 1);
        assert_eq!(stats.engines["panicky"].failures, 1);
        assert_eq!(stats.engines["good"].calls, 1);
    }

    #[test]
    fn test_all_engines_fail() {
        let mut ensemble = ensemble(vec![Arc::new(BrokenEngine)]);
        let result = ensemble.recognize(&crop(), FieldType::CardRank, None);

        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
        assert!(!result.validation_passed);
        assert!(result.messages.iter().any(|m| m.contains("all OCR engines failed")));
    }

    #[test]
    fn test_timeout_excluded() {
        let mut ensemble = ensemble(vec![
            Arc::new(SlowEngine),
            FixedEngine::new("fast", "K", 0.9),
        ]);
        let started = Instant::now();
        let result = ensemble.recognize(&crop(), FieldType::CardRank, None);

        assert!(started.elapsed() < Duration::from_millis(450));
        assert_eq!(result.text, "K");
        assert_eq!(ensemble.stats().engines["slow"].timeouts, 1);
    }

    #[test]
    fn test_hung_engine_not_restarted() {
        let hung = Arc::new(HungEngine::default());
        let mut registry = EngineRegistry::new();
        registry.register(hung.clone());
        let mut ensemble = OcrEnsemble::new(registry, Duration::from_millis(20));

        for _ in 0..10 {
            let result = ensemble.recognize(&crop(), FieldType::CardRank, None);
            assert!(!result.has_observations());
        }
        assert_eq!(hung.started.load(Ordering::SeqCst), 1);
        assert_eq!(ensemble.stats().engines["hung"].timeouts, 10);

        // Once the stuck call returns the engine is started again
        hung.release.store(true, Ordering::SeqCst);
        let waited = Instant::now();
        while hung.finished.load(Ordering::SeqCst) == 0 && waited.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        let mut read = None;
        while read.is_none() && waited.elapsed() < Duration::from_secs(5) {
            let result = ensemble.recognize(&crop(), FieldType::CardRank, None);
            if result.has_observations() {
                read = Some(result.text);
            }
        }
        assert_eq!(read.as_deref(), Some("Q"));
        assert!(hung.started.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_unavailable_engine_skipped() {
        let mut ensemble = ensemble(vec![
            Arc::new(OfflineEngine),
            FixedEngine::new("online", "h", 0.5),
        ]);
        let result = ensemble.recognize(&crop(), FieldType::CardSuit, None);

        assert_eq!(result.value, Some(FieldValue::Suit('h')));
        assert!(!ensemble.stats().engines.contains_key("offline"));
    }

    #[test]
    fn test_engine_selection() {
        let first = FixedEngine::new("first", "SB", 0.9);
        let second = FixedEngine::new("second", "BB", 0.9);
        let mut ensemble = ensemble(vec![first.clone(), second.clone()]);

        let result = ensemble.recognize(&crop(), FieldType::Blind, Some(&["second"]));
        assert_eq!(result.text, "BB");
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_validation_failure_keeps_text() {
        let mut ensemble = ensemble(vec![FixedEngine::new("e", "XYZ", 0.6)]);
        let result = ensemble.recognize(&crop(), FieldType::Position, None);

        assert!(!result.validation_passed);
        assert_eq!(result.text, "XYZ");
        assert_eq!(result.confidence, 0.6);
        assert_eq!(ensemble.stats().validation_failures, 1);
    }

    #[test]
    fn test_auto_correction_reported() {
        let mut ensemble = ensemble(vec![FixedEngine::new("e", "$2O0", 0.6)]);
        let result = ensemble.recognize(&crop(), FieldType::BetSize, None);

        assert!(result.validation_passed);
        assert_eq!(result.text, "$200");
        assert!(result.messages.iter().any(|m| m.contains("auto-corrected")));
        assert_eq!(ensemble.stats().auto_corrections, 1);
    }
}
