pub mod engine;
pub mod ensemble;
pub mod preprocess;
pub mod setup;
pub mod validate;

pub use engine::{EngineObservation, EngineOutput, OcrEngine, OcrEngineError, TesseractEngine};
pub use ensemble::{EngineRegistry, EnsembleResult, EnsembleStats, OcrEnsemble};
pub use setup::find_tesseract;
pub use validate::{validate, FieldType, FieldValue};

use std::sync::Arc;

use crate::config::WatchConfig;

/// Builds an ensemble with the engines that can be set up from `config`.
///
/// Two Tesseract variants are registered when Tesseract is installed; the
/// ensemble is returned empty (and reports empty results) otherwise.
pub fn ensemble_from_config(config: &WatchConfig) -> OcrEnsemble {
    let mut registry = EngineRegistry::new();

    if let Some(executable) = find_tesseract(config.tesseract_path.as_deref()) {
        registry.register(Arc::new(
            TesseractEngine::single_line(Some(executable.clone()), config.ocr_threshold)
                .with_timeout(config.engine_timeout()),
        ));
        registry.register(Arc::new(
            TesseractEngine::single_word(Some(executable)).with_timeout(config.engine_timeout()),
        ));
    }

    OcrEnsemble::new(registry, config.engine_timeout())
}
