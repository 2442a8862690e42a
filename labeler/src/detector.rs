//! Detector plug-in interface
//!
//! The pipeline only needs something that turns one frame into a map of
//! objects. Implementations are shared across worker threads and called
//! through `&self`; tunables come in per call as an opaque JSON bag.
use crate::error::{LabelError, Result};
use crate::threshold::ThresholdDetector;
use floctrack::{FrameIdx, FrameObjects};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form detector parameters, forwarded untouched by the pipeline
pub type DetectorParams = serde_json::Map<String, Value>;

/// Common interface for per-frame object detectors
pub trait ObjectDetector<F>: Send + Sync {
    /// Detect objects in a single frame.
    ///
    /// Every returned object must carry `frame_idx`; keys are the object
    /// indices within the frame.
    fn detect(&self, frame: &F, frame_idx: FrameIdx, params: &DetectorParams) -> std::result::Result<FrameObjects, String>;

    /// Get the detector name (for logging/debugging)
    fn name(&self) -> &str;
}

impl<F, D: ObjectDetector<F> + ?Sized> ObjectDetector<F> for Box<D> {
    fn detect(&self, frame: &F, frame_idx: FrameIdx, params: &DetectorParams) -> std::result::Result<FrameObjects, String> {
        (**self).detect(frame, frame_idx, params)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Detector type enum for selecting which detector to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    #[default]
    Threshold,
}

impl DetectorKind {
    /// Create a detector instance of this type
    pub fn create(&self) -> Box<dyn ObjectDetector<GrayImage>> {
        match self {
            DetectorKind::Threshold => Box::new(ThresholdDetector),
        }
    }

    /// Look a detector up by its registered name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "threshold" => Ok(DetectorKind::Threshold),
            other => Err(LabelError::config(format!("unknown detector '{}'", other))),
        }
    }
}
