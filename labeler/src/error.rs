//! Error types for the labeling pipeline

use floctrack::{FrameIdx, StoreError};
use thiserror::Error;

/// Result type alias for the labeler
pub type Result<T> = std::result::Result<T, LabelError>;

/// Errors that abort a labeling call before or while it runs.
///
/// Per-frame detector failures are not errors at this level; they are
/// collected as [`crate::pipeline::FrameFailure`]s next to the results.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Invalid frame range: {x1}..={x2}")]
    InvalidRange { x1: FrameIdx, x2: FrameIdx },

    #[error("Frame {frame_idx} out of range (source has {frame_count} frames)")]
    FrameOutOfRange {
        frame_idx: FrameIdx,
        frame_count: usize,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Frame source error: {0}")]
    SourceError(String),

    #[error("Pipeline thread panicked: {0}")]
    WorkerPanic(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LabelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn source<S: Into<String>>(msg: S) -> Self {
        Self::SourceError(msg.into())
    }
}
