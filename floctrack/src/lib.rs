//! Object/track store and greedy frame-to-frame linker
//!
//! This crate holds the data model shared by the labeling pipeline and the
//! linker: per-frame pools of detected objects, a sparse track table, and the
//! nearest-neighbour linker that moves objects from one to the other.
//!
//! # Usage
//!
//! ```rust,ignore
//! use floctrack::{Linker, LinkerConfig, NearestNeighborLinker, ObjectSelection, TrackStore};
//!
//! let mut store = TrackStore::new();
//! store.insert_frame(0, objects_from_frame_0)?;
//! store.insert_frame(1, objects_from_frame_1)?;
//!
//! let linker = NearestNeighborLinker::new(LinkerConfig {
//!     auto_select: ObjectSelection::Auto,
//!     ..LinkerConfig::default()
//! });
//! let summary = linker.link(&mut store, 0, 2);
//! ```

pub mod error;
pub mod linker;
pub mod matching;
pub mod object;
pub mod store;

pub use error::StoreError;
pub use linker::{LinkSummary, Linker, LinkerKind, NearestNeighborLinker};
pub use matching::{match_in_frame, LinkerConfig, Match, ObjectSelection};
pub use object::{BoundingBox, FrameIdx, FrameObjects, ObjIdx, Object, ObjectHandle, Point, TrackIdx};
pub use store::TrackStore;
