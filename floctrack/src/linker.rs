//! Sequential frame-to-frame linking
//!
//! Linking walks frames in ascending order. At frame `f` only tracks with an
//! entry exactly at `f - 1` are candidates for extension; a track that misses
//! one frame is never resumed by the linker. Tracks are served one after the
//! other in ascending id order, each against what is left of the pool, so two
//! tracks competing for the same object resolve in favour of the lower id.

use crate::matching::{match_in_frame, LinkerConfig, ObjectSelection};
use crate::object::{FrameIdx, TrackIdx};
use crate::store::TrackStore;
use serde::{Deserialize, Serialize};

/// Counts from one linking run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Frames visited
    pub frames: usize,
    /// Track extensions made by cost matching
    pub matched: usize,
    /// Active tracks that failed to extend
    pub stale: usize,
    /// Tracks founded by auto-selection
    pub created: usize,
    /// Frames without any labeled objects
    pub missing_frames: Vec<FrameIdx>,
}

/// Common interface for linker variants
///
/// A linker has exclusive use of the store for the whole call; the store is
/// left consistent after every frame.
pub trait Linker: Send + Sync {
    /// Link objects through `start_frame .. start_frame + n_frames`
    fn link(&self, store: &mut TrackStore, start_frame: FrameIdx, n_frames: u32) -> LinkSummary;

    /// Linker name (for logging/debugging)
    fn name(&self) -> &str;
}

/// Available linker variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkerKind {
    /// Greedy nearest neighbour on centroid distance and area
    #[default]
    LinearFlocs,
}

impl LinkerKind {
    /// Create a linker instance of this kind
    pub fn create(&self, config: LinkerConfig) -> Box<dyn Linker> {
        match self {
            LinkerKind::LinearFlocs => Box::new(NearestNeighborLinker::new(config)),
        }
    }
}

/// Greedy per-track nearest-neighbour linker
#[derive(Debug, Clone, Default)]
pub struct NearestNeighborLinker {
    pub config: LinkerConfig,
}

impl NearestNeighborLinker {
    pub fn new(config: LinkerConfig) -> Self {
        Self { config }
    }

    /// Process a single frame, accumulating into `summary`
    pub fn link_frame(&self, store: &mut TrackStore, frame_idx: FrameIdx, summary: &mut LinkSummary) {
        let active: Vec<TrackIdx> = match frame_idx.checked_sub(1) {
            Some(prev_frame) => store.tracks_at(prev_frame),
            None => Vec::new(),
        };

        if !store.has_frame(frame_idx) {
            log::warn!(
                "Frame {} has no labeled objects, {} active tracks end here",
                frame_idx,
                active.len()
            );
            summary.missing_frames.push(frame_idx);
        }

        let mut matched = 0;
        for track_idx in &active {
            let Some(prev_frame) = frame_idx.checked_sub(1) else {
                break;
            };
            if store.entry(*track_idx, frame_idx).is_some() {
                log::trace!("Track {} already has frame {}", track_idx, frame_idx);
                continue;
            }
            let Some(prev) = store.entry(*track_idx, prev_frame) else {
                continue;
            };

            let found = match_in_frame(prev, store.pool_objects(frame_idx), &self.config);
            match found {
                Some(m) => {
                    if let Err(e) = store.extend_track(*track_idx, frame_idx, m.obj_idx, m.cost) {
                        log::error!("Track {} could not take its match: {}", track_idx, e);
                        summary.stale += 1;
                        continue;
                    }
                    matched += 1;
                }
                None => {
                    log::trace!("Track {} stale at frame {}", track_idx, frame_idx);
                    summary.stale += 1;
                }
            }
        }
        summary.matched += matched;

        let created = match self.config.auto_select {
            ObjectSelection::Auto => store.add_all_objs(frame_idx).len(),
            ObjectSelection::None => 0,
        };
        summary.created += created;
        summary.frames += 1;

        log::debug!(
            "Frame {}: {} active, {} matched, {} new tracks",
            frame_idx,
            active.len(),
            matched,
            created
        );
    }
}

impl Linker for NearestNeighborLinker {
    fn link(&self, store: &mut TrackStore, start_frame: FrameIdx, n_frames: u32) -> LinkSummary {
        let mut summary = LinkSummary::default();
        let end = start_frame.saturating_add(n_frames);

        for frame_idx in start_frame..end {
            self.link_frame(store, frame_idx, &mut summary);
        }

        log::info!(
            "Linked frames {}..{}: {} matched, {} stale, {} created, {} missing",
            start_frame,
            end,
            summary.matched,
            summary.stale,
            summary.created,
            summary.missing_frames.len()
        );
        summary
    }

    fn name(&self) -> &str {
        "linear_flocs"
    }
}
