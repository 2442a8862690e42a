//! Error types for store mutations

use crate::object::{FrameIdx, ObjIdx, TrackIdx};
use thiserror::Error;

/// A store operation referred to a key that does not exist or is already
/// taken. The store is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object {obj_idx} is not in the pool of frame {frame_idx}")]
    ObjectNotPooled { frame_idx: FrameIdx, obj_idx: ObjIdx },

    #[error("track {0} does not exist")]
    TrackNotFound(TrackIdx),

    #[error("track {track_idx} already has an entry at frame {frame_idx}")]
    FrameOccupied {
        track_idx: TrackIdx,
        frame_idx: FrameIdx,
    },

    #[error("frame {0} already holds labeled objects")]
    FrameAlreadyLabeled(FrameIdx),
}
