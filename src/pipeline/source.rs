//! Frame sources for the detection loop.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Supplies captured frames to the loop.
///
/// `Ok(None)` means the source is exhausted and the loop should stop.
/// An error is a per-cycle failure: the loop logs it and carries on.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>>;
}

/// Replays PNG screenshots from a directory in file-name order.
pub struct DirectorySource {
    frames: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .map_err(|e| anyhow!("Failed to read frame directory {}: {}", dir.display(), e))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
            .collect();
        frames.sort();

        log::info!("Found {} frames in {}", frames.len(), dir.display());
        Ok(Self { frames, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let img = image::open(path)
            .map_err(|e| anyhow!("Failed to load frame {}: {}", path.display(), e))?;
        log::debug!("Loaded frame {}", path.display());
        Ok(Some(img.to_rgba8()))
    }
}

/// Frames held in memory, returned in order.
pub struct MemorySource {
    frames: std::vec::IntoIter<RgbaImage>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
        Ok(self.frames.next())
    }
}
