//! Labeling and linking session
//!
//! Owns the track store together with the configured detector and linker,
//! and ingests labeler output into the object pool.

use crate::config::SessionConfig;
use crate::detector::ObjectDetector;
use crate::error::Result;
use crate::pipeline::{run_labeler, CancelToken, FrameFailure, ProgressFn};
use crate::source::FrameSource;
use floctrack::{
    FrameIdx, LinkSummary, Linker, LinkerConfig, LinkerKind, ObjIdx, ObjectHandle, StoreError, TrackIdx, TrackStore,
};
use image::GrayImage;

/// What one [`Session::label`] call added to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelReport {
    /// Frames newly pooled
    pub frames: usize,
    /// Objects newly pooled
    pub objects: usize,
    /// Frames that were already labeled and left untouched
    pub skipped: Vec<FrameIdx>,
    pub failures: Vec<FrameFailure>,
    pub cancelled: bool,
}

/// Track store plus the detector and linker that fill it
pub struct Session<F = GrayImage> {
    config: SessionConfig,
    store: TrackStore,
    detector: Box<dyn ObjectDetector<F>>,
    linker: Box<dyn Linker>,
}

impl Session<GrayImage> {
    /// Create a session with the detector named in `config`
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let detector = config.detector.create();
        Ok(Self::with_detector(config, detector))
    }
}

impl<F: Send> Session<F> {
    /// Create a session around a caller-supplied detector
    pub fn with_detector(config: SessionConfig, detector: Box<dyn ObjectDetector<F>>) -> Self {
        let linker = LinkerKind::LinearFlocs.create(config.linker.clone());
        log::info!(
            "Session created: detector '{}', linker '{}'",
            detector.name(),
            linker.name()
        );
        Self {
            config,
            store: TrackStore::new(),
            detector,
            linker,
        }
    }

    /// Label `x1..=x2` and pool the results
    pub fn label<S>(&mut self, source: &mut S, x1: FrameIdx, x2: FrameIdx) -> Result<LabelReport>
    where
        S: FrameSource<Frame = F>,
    {
        self.label_with(source, x1, x2, &CancelToken::new(), None)
    }

    /// [`Session::label`] with cancellation and progress reporting
    pub fn label_with<S>(
        &mut self,
        source: &mut S,
        x1: FrameIdx,
        x2: FrameIdx,
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<LabelReport>
    where
        S: FrameSource<Frame = F>,
    {
        let output = run_labeler(
            source,
            x1,
            x2,
            self.detector.as_ref(),
            &self.config.detector_params,
            &self.config.labeler,
            cancel,
            progress,
        )?;

        let mut report = LabelReport {
            failures: output.failures,
            cancelled: output.cancelled,
            ..LabelReport::default()
        };
        for (frame_idx, objects) in output.objects {
            match self.store.insert_frame(frame_idx, objects) {
                Ok(n) => {
                    report.frames += 1;
                    report.objects += n;
                }
                Err(StoreError::FrameAlreadyLabeled(f)) => {
                    log::warn!("Frame {} already labeled, keeping existing objects", f);
                    report.skipped.push(f);
                }
                Err(e) => return Err(e.into()),
            }
        }

        for failure in &report.failures {
            log::warn!("Frame {} left unlabeled: {}", failure.frame_idx, failure.reason);
        }
        Ok(report)
    }

    /// Link `start_frame .. start_frame + n_frames`
    pub fn link(&mut self, start_frame: FrameIdx, n_frames: u32) -> LinkSummary {
        self.linker.link(&mut self.store, start_frame, n_frames)
    }

    /// Swap the linker settings used by later [`Session::link`] calls
    pub fn set_linker_config(&mut self, linker: LinkerConfig) {
        self.linker = LinkerKind::LinearFlocs.create(linker.clone());
        self.config.linker = linker;
    }

    pub fn create_track_from_pool(&mut self, frame_idx: FrameIdx, obj_idx: ObjIdx) -> Result<TrackIdx> {
        Ok(self.store.create_track_from_pool(frame_idx, obj_idx)?)
    }

    pub fn extend_track_manually(
        &mut self,
        track_idx: TrackIdx,
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
        match_error: f64,
    ) -> Result<()> {
        Ok(self
            .store
            .extend_track_manually(track_idx, frame_idx, obj_idx, match_error)?)
    }

    pub fn remove_track(&mut self, track_idx: TrackIdx) -> Vec<ObjectHandle> {
        self.store.remove_track(track_idx)
    }

    /// Promote every pooled object of a frame to its own track
    pub fn add_all_objs(&mut self, frame_idx: FrameIdx) -> Vec<TrackIdx> {
        self.store.add_all_objs(frame_idx)
    }

    pub fn clear_all_tracks(&mut self) {
        self.store.clear_all_tracks();
    }

    pub fn clear_all_objs(&mut self) {
        self.store.clear_all_objs();
    }

    pub fn get_items_in_frame(&self, frame_idx: FrameIdx) -> (Vec<TrackIdx>, Vec<ObjIdx>) {
        self.store.get_items_in_frame(frame_idx)
    }

    /// Read-only view for writers
    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LabelError;
    use crate::source::MemorySource;
    use approx::assert_abs_diff_eq;
    use floctrack::ObjectSelection;
    use image::Luma;

    /// Blob A drifts right, blob B sinks, one pixel per frame
    fn settling_frames(n: u32) -> Vec<GrayImage> {
        (0..n)
            .map(|f| {
                let mut img = GrayImage::from_pixel(64, 48, Luma([230]));
                for (x0, y0) in [(5 + f, 6), (40, 20 + f)] {
                    for y in y0..y0 + 4 {
                        for x in x0..x0 + 4 {
                            img.put_pixel(x, y, Luma([20]));
                        }
                    }
                }
                img
            })
            .collect()
    }

    fn auto_config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.labeler.worker_count = 2;
        config.linker.auto_select = ObjectSelection::Auto;
        config
    }

    #[test]
    fn test_label_then_link() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(5));

        let report = session.label(&mut source, 0, 4).unwrap();
        assert_eq!(report.frames, 5);
        assert_eq!(report.objects, 10);
        assert!(report.failures.is_empty());
        assert_eq!(session.store().num_pooled(), 10);

        let summary = session.link(0, 5);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.matched, 8);
        assert!(summary.missing_frames.is_empty());

        let store = session.store();
        assert_eq!(store.track_ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(store.num_pooled(), 0);

        let drift: Vec<f64> = store.track(1).map(|(_, o)| o.centroid.x).collect();
        assert_eq!(drift, vec![6.5, 7.5, 8.5, 9.5, 10.5]);
        let sink: Vec<f64> = store.track(2).map(|(_, o)| o.centroid.y).collect();
        assert_eq!(sink, vec![21.5, 22.5, 23.5, 24.5, 25.5]);
        for (frame_idx, o) in store.track(1).skip(1) {
            assert_eq!(o.track_idx, Some(1));
            assert_eq!(o.frame_idx, frame_idx);
            assert_abs_diff_eq!(o.match_error, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_relabel_is_skipped() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(4));

        session.label(&mut source, 0, 1).unwrap();
        let report = session.label(&mut source, 0, 3).unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(report.skipped, vec![0, 1]);
        assert_eq!(session.store().num_pooled(), 8);
    }

    #[test]
    fn test_missing_frame_ends_tracks() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(5));
        session.label(&mut source, 0, 1).unwrap();
        session.label(&mut source, 3, 4).unwrap();

        let summary = session.link(0, 5);
        assert_eq!(summary.missing_frames, vec![2]);
        // two tracks over 0..=1 go stale, two new ones start at frame 3
        assert_eq!(session.store().num_tracks(), 4);
        assert_eq!(session.store().track(1).count(), 2);
        assert_eq!(session.store().track(3).map(|(f, _)| f).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn test_manual_lifecycle() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(3));
        session.label(&mut source, 0, 2).unwrap();
        session.link(0, 3);

        let released = session.remove_track(1);
        assert_eq!(released.len(), 3);
        assert_eq!(session.get_items_in_frame(0), (vec![2], vec![1]));

        let track = session.create_track_from_pool(0, 1).unwrap();
        assert_eq!(track, 3);
        session.extend_track_manually(track, 1, 1, 0.0).unwrap();
        assert_eq!(session.store().tail(track).map(|o| o.frame_idx), Some(1));

        let err = session.extend_track_manually(track, 1, 1, 0.0).unwrap_err();
        assert!(matches!(
            err,
            LabelError::StoreError(StoreError::FrameOccupied { track_idx: 3, frame_idx: 1 })
        ));
        let err = session.create_track_from_pool(0, 1).unwrap_err();
        assert!(matches!(err, LabelError::StoreError(StoreError::ObjectNotPooled { .. })));

        // frame 2 still holds blob A, released with track 1
        assert_eq!(session.add_all_objs(2), vec![4]);
        assert_eq!(session.get_items_in_frame(2), (vec![2, 4], vec![]));

        session.clear_all_tracks();
        assert_eq!(session.store().num_tracks(), 0);
        assert_eq!(session.store().num_pooled(), 6);
        session.clear_all_objs();
        assert_eq!(session.store().num_pooled(), 0);
    }

    #[test]
    fn test_linker_config_swap() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(3));
        session.label(&mut source, 0, 2).unwrap();

        session.set_linker_config(LinkerConfig {
            error_threshold: 0.5,
            auto_select: ObjectSelection::Auto,
            ..LinkerConfig::default()
        });
        let summary = session.link(0, 3);
        // one pixel of drift costs 1.0, above the new threshold
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.created, 6);
        assert_eq!(session.config().linker.error_threshold, 0.5);
    }

    #[test]
    fn test_invalid_range_leaves_store_untouched() {
        let mut session = Session::new(auto_config()).unwrap();
        let mut source = MemorySource::new(settling_frames(2));
        assert!(matches!(
            session.label(&mut source, 1, 0),
            Err(LabelError::InvalidRange { .. })
        ));
        assert_eq!(session.store().num_pooled(), 0);
    }
}
