//! Floc Labeling Library
//!
//! Runs a per-frame object detector over a range of video frames on a pool
//! of worker threads, collects the detected objects per frame, and feeds
//! them into a [`floctrack::TrackStore`] for linking into tracks.
//!
//! # Usage
//!
//! ```rust,ignore
//! use floc_labeler::{ImageSequenceSource, Session, SessionConfig};
//!
//! let mut session = Session::new(SessionConfig::from_file("session.json")?)?;
//! let mut source = ImageSequenceSource::open("frames/")?;
//! let report = session.label(&mut source, 0, 99)?;
//! let summary = session.link(0, 100);
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod threshold;

pub use config::{LabelerConfig, SessionConfig, DEFAULT_QUEUE_CAPACITY};
pub use detector::{DetectorKind, DetectorParams, ObjectDetector};
pub use error::{LabelError, Result};
pub use pipeline::{run_labeler, CancelToken, FrameFailure, LabelOutput, ProgressFn};
pub use session::{LabelReport, Session};
pub use source::{FrameSource, ImageSequenceSource, MemorySource};
pub use threshold::{ThresholdDetector, ThresholdParams};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
