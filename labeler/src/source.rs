//! Random-access frame sources
//!
//! Decoding real video containers is left to callers; they only need to
//! implement [`FrameSource`]. Two sources ship here: an in-memory one and a
//! directory of still images read with the `image` crate.

use crate::error::{LabelError, Result};
use floctrack::FrameIdx;
use image::GrayImage;
use std::path::{Path, PathBuf};

/// Frame reader addressed by integer index
pub trait FrameSource: Send {
    type Frame: Send;

    /// Position the reader so the next `read` returns `frame_idx`
    fn seek(&mut self, frame_idx: FrameIdx) -> Result<()>;

    /// Read the frame at the current position and advance by one
    fn read(&mut self) -> Result<Self::Frame>;

    /// Total number of frames
    fn frame_count(&self) -> usize;
}

/// Frames held in memory
#[derive(Debug, Clone)]
pub struct MemorySource<F> {
    frames: Vec<F>,
    pos: usize,
}

impl<F> MemorySource<F> {
    pub fn new(frames: Vec<F>) -> Self {
        Self { frames, pos: 0 }
    }
}

impl<F: Clone + Send> FrameSource for MemorySource<F> {
    type Frame = F;

    fn seek(&mut self, frame_idx: FrameIdx) -> Result<()> {
        let idx = frame_idx as usize;
        if idx >= self.frames.len() {
            return Err(LabelError::FrameOutOfRange {
                frame_idx,
                frame_count: self.frames.len(),
            });
        }
        self.pos = idx;
        Ok(())
    }

    fn read(&mut self) -> Result<F> {
        let frame = self
            .frames
            .get(self.pos)
            .cloned()
            .ok_or_else(|| LabelError::source(format!("read past end at frame {}", self.pos)))?;
        self.pos += 1;
        Ok(frame)
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

/// Extensions recognised by [`ImageSequenceSource`]
const IMAGE_EXTENSIONS: &[&str] = &["png", "bmp", "tif", "tiff", "jpg", "jpeg"];

/// Still images in a directory, ordered by file name, decoded to 8-bit grey
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    pos: usize,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(LabelError::source(format!(
                "no images found in {}",
                dir.as_ref().display()
            )));
        }
        log::info!("Opened image sequence: {} frames", paths.len());
        Ok(Self { paths, pos: 0 })
    }
}

impl FrameSource for ImageSequenceSource {
    type Frame = GrayImage;

    fn seek(&mut self, frame_idx: FrameIdx) -> Result<()> {
        if frame_idx as usize >= self.paths.len() {
            return Err(LabelError::FrameOutOfRange {
                frame_idx,
                frame_count: self.paths.len(),
            });
        }
        self.pos = frame_idx as usize;
        Ok(())
    }

    fn read(&mut self) -> Result<GrayImage> {
        let path = self
            .paths
            .get(self.pos)
            .ok_or_else(|| LabelError::source(format!("read past end at frame {}", self.pos)))?;
        self.pos += 1;
        Ok(image::open(path)?.to_luma8())
    }

    fn frame_count(&self) -> usize {
        self.paths.len()
    }
}
