use anyhow::{anyhow, Result};
use image::{GrayImage, RgbaImage};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

use super::ensemble::DEFAULT_ENGINE_TIMEOUT;
use super::preprocess::{threshold_bright_pixels, to_grayscale};

/// How often a running Tesseract process is checked for exit.
const PROCESS_POLL: Duration = Duration::from_millis(5);

/// Why an engine produced no observation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OcrEngineError {
    #[error("engine unavailable")]
    Unavailable,
    #[error("engine failed: {0}")]
    Failed(String),
    #[error("engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("engine panicked")]
    Panicked,
}

/// Raw output of one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    pub text: String,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub char_confidences: Option<Vec<f32>>,
}

impl EngineOutput {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            char_confidences: None,
        }
    }
}

/// One engine's reading of one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineObservation {
    pub engine: String,
    pub text: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_confidences: Option<Vec<f32>>,
}

impl EngineObservation {
    pub fn from_output(engine: &str, output: EngineOutput) -> Self {
        Self {
            engine: engine.to_string(),
            text: output.text,
            confidence: output.confidence.clamp(0.0, 1.0),
            char_confidences: output.char_confidences,
        }
    }
}

/// A pluggable OCR engine.
///
/// Engines are called from worker threads, so implementations must be
/// `Send + Sync` and must not assume they run on the caller's thread.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can currently be called. Checked before each call.
    fn is_available(&self) -> bool {
        true
    }

    fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, OcrEngineError>;
}

/// How a Tesseract variant prepares the crop before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Keep only bright pixels (text on a dark table)
    BrightThreshold(u8),
    /// Plain grayscale
    Grayscale,
}

/// Tesseract invoked as an external process with TSV output.
pub struct TesseractEngine {
    name: String,
    executable: Option<PathBuf>,
    /// Tesseract page segmentation mode
    psm: u8,
    preparation: Preparation,
    /// The process is killed when it runs longer than this
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(name: &str, executable: Option<PathBuf>, psm: u8, preparation: Preparation) -> Self {
        Self {
            name: name.to_string(),
            executable,
            psm,
            preparation,
            timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Single text line on the bright-pixel binarization.
    pub fn single_line(executable: Option<PathBuf>, threshold: u8) -> Self {
        Self::new(
            "tesseract-line",
            executable,
            7,
            Preparation::BrightThreshold(threshold),
        )
    }

    /// Single word on the plain grayscale crop.
    pub fn single_word(executable: Option<PathBuf>) -> Self {
        Self::new("tesseract-word", executable, 8, Preparation::Grayscale)
    }

    fn prepare(&self, image: &RgbaImage) -> GrayImage {
        match self.preparation {
            Preparation::BrightThreshold(t) => threshold_bright_pixels(image, t),
            Preparation::Grayscale => to_grayscale(image),
        }
    }

    fn run(&self, img: &GrayImage) -> Result<EngineOutput> {
        let executable = self
            .executable
            .as_ref()
            .ok_or_else(|| anyhow!("Tesseract executable not found"))?;

        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Create temporary output file (Tesseract adds .tsv extension)
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut child = Command::new(executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                log::debug!("{}: killed after {:?}", self.name, self.timeout);
                return Err(OcrEngineError::Timeout(self.timeout).into());
            }
            thread::sleep(PROCESS_POLL);
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.executable.as_ref().is_some_and(|p| p.exists())
    }

    fn recognize(&self, image: &RgbaImage) -> Result<EngineOutput, OcrEngineError> {
        if !self.is_available() {
            return Err(OcrEngineError::Unavailable);
        }
        let prepared = self.prepare(image);
        self.run(&prepared).map_err(|e| match e.downcast::<OcrEngineError>() {
            Ok(engine_error) => engine_error,
            Err(e) => OcrEngineError::Failed(e.to_string()),
        })
    }
}

/// Parses Tesseract TSV output into one line of text.
///
/// Words are joined with spaces; confidence is the mean word confidence
/// scaled to 0.0-1.0. Per-word confidences stand in for per-character ones.
pub fn parse_tsv_output(tsv: &str) -> EngineOutput {
    let mut words: Vec<&str> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();

    for line in tsv.lines().skip(1) {
        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Level 5 = word
        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }

        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        words.push(text);
        confidences.push((conf / 100.0).clamp(0.0, 1.0));
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };

    EngineOutput {
        text: words.join(" "),
        confidence,
        char_confidences: if confidences.is_empty() {
            None
        } else {
            Some(confidences)
        },
    }
}
