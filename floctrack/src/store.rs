//! Object/track store
//!
//! Every object ingested from the labeler lives in a per-frame arena for the
//! lifetime of the store. Ownership is expressed through [`ObjectHandle`]s:
//! a handle sits either in the unassigned pool of its frame or under exactly
//! one `(track_idx, frame_idx)` key, never both. Moving an object between the
//! two is a handle move; object data is never cloned.

use crate::error::StoreError;
use crate::object::{FrameIdx, FrameObjects, ObjIdx, Object, ObjectHandle, TrackIdx};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct TrackStore {
    /// Arena of every object, keyed by frame then per-frame index
    objects: BTreeMap<FrameIdx, FrameObjects>,
    /// Unassigned objects per frame
    pool: BTreeMap<FrameIdx, BTreeSet<ObjIdx>>,
    /// Sparse (track_idx, frame_idx) -> handle table
    tracks: BTreeMap<TrackIdx, BTreeMap<FrameIdx, ObjectHandle>>,
    /// Reverse index: tracks holding an entry at a frame
    frame_tracks: BTreeMap<FrameIdx, BTreeSet<TrackIdx>>,
    next_track_idx: TrackIdx,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackStore {
    pub fn new() -> Self {
        TrackStore {
            objects: BTreeMap::new(),
            pool: BTreeMap::new(),
            tracks: BTreeMap::new(),
            frame_tracks: BTreeMap::new(),
            next_track_idx: 1,
        }
    }

    /// Ingest the detector output of one frame into the pool.
    ///
    /// Frames are write-once: a frame that already holds objects (pooled or
    /// tracked) is rejected. Each object's `frame_idx`/`obj_idx` is normalized
    /// to its key and its assignment state is cleared. Returns the number of
    /// pooled objects.
    pub fn insert_frame(
        &mut self,
        frame_idx: FrameIdx,
        objs: FrameObjects,
    ) -> Result<usize, StoreError> {
        if self.objects.get(&frame_idx).is_some_and(|f| !f.is_empty()) {
            return Err(StoreError::FrameAlreadyLabeled(frame_idx));
        }

        let mut frame = FrameObjects::new();
        for (obj_idx, mut obj) in objs {
            obj.frame_idx = frame_idx;
            obj.obj_idx = obj_idx;
            obj.release();
            frame.insert(obj_idx, obj);
        }

        let n = frame.len();
        self.pool.insert(frame_idx, frame.keys().copied().collect());
        self.objects.insert(frame_idx, frame);
        log::debug!("Frame {}: {} objects pooled", frame_idx, n);
        Ok(n)
    }

    /// Move a pooled object into a brand-new track and return its id
    pub fn add_obj_to_track(
        &mut self,
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
    ) -> Result<TrackIdx, StoreError> {
        self.take_from_pool(frame_idx, obj_idx)?;

        let track_idx = self.next_track_idx;
        self.next_track_idx += 1;
        self.attach(track_idx, ObjectHandle::new(frame_idx, obj_idx), 0.0);
        Ok(track_idx)
    }

    /// Alias of [`TrackStore::add_obj_to_track`] for user-driven creation
    pub fn create_track_from_pool(
        &mut self,
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
    ) -> Result<TrackIdx, StoreError> {
        self.add_obj_to_track(frame_idx, obj_idx)
    }

    /// Append a pooled object to an existing track with a caller-supplied
    /// match error. This is the same storage step the linker performs.
    pub fn extend_track(
        &mut self,
        track_idx: TrackIdx,
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
        match_error: f64,
    ) -> Result<(), StoreError> {
        let entries = self
            .tracks
            .get(&track_idx)
            .ok_or(StoreError::TrackNotFound(track_idx))?;
        if entries.contains_key(&frame_idx) {
            return Err(StoreError::FrameOccupied {
                track_idx,
                frame_idx,
            });
        }

        self.take_from_pool(frame_idx, obj_idx)?;
        self.attach(track_idx, ObjectHandle::new(frame_idx, obj_idx), match_error);
        Ok(())
    }

    /// Manual extension, typically with a zero match error
    pub fn extend_track_manually(
        &mut self,
        track_idx: TrackIdx,
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
        match_error: f64,
    ) -> Result<(), StoreError> {
        self.extend_track(track_idx, frame_idx, obj_idx, match_error)
    }

    /// Delete a track and return every constituent object to the pool of its
    /// frame. Removing an unknown id is a no-op returning nothing.
    pub fn remove_track(&mut self, track_idx: TrackIdx) -> Vec<ObjectHandle> {
        let Some(entries) = self.tracks.remove(&track_idx) else {
            return Vec::new();
        };

        let mut released = Vec::with_capacity(entries.len());
        for (frame_idx, handle) in entries {
            if let Some(ids) = self.frame_tracks.get_mut(&frame_idx) {
                ids.remove(&track_idx);
                if ids.is_empty() {
                    self.frame_tracks.remove(&frame_idx);
                }
            }
            if let Some(obj) = self.object_mut(handle) {
                obj.release();
            }
            self.pool
                .entry(handle.frame_idx)
                .or_default()
                .insert(handle.obj_idx);
            released.push(handle);
        }

        log::debug!(
            "Track {} removed, {} objects returned to pool",
            track_idx,
            released.len()
        );
        released
    }

    /// Remove every track, returning all objects to the pool
    pub fn clear_all_tracks(&mut self) {
        let ids: Vec<TrackIdx> = self.tracks.keys().copied().collect();
        for track_idx in ids {
            self.remove_track(track_idx);
        }
    }

    /// Found one new track per pooled object of a frame, in ascending
    /// `obj_idx` order. Returns the new track ids.
    pub fn add_all_objs(&mut self, frame_idx: FrameIdx) -> Vec<TrackIdx> {
        let (_, pooled) = self.get_items_in_frame(frame_idx);
        pooled
            .into_iter()
            .filter_map(|obj_idx| self.add_obj_to_track(frame_idx, obj_idx).ok())
            .collect()
    }

    /// Drop every pooled object. Objects owned by tracks are kept.
    pub fn clear_all_objs(&mut self) {
        for (frame_idx, obj_ids) in std::mem::take(&mut self.pool) {
            if let Some(frame) = self.objects.get_mut(&frame_idx) {
                for obj_idx in obj_ids {
                    frame.remove(&obj_idx);
                }
                if frame.is_empty() {
                    self.objects.remove(&frame_idx);
                }
            }
        }
    }

    /// Track ids with an entry exactly at `frame_idx` and the pooled object
    /// indices of that frame, both ascending
    pub fn get_items_in_frame(&self, frame_idx: FrameIdx) -> (Vec<TrackIdx>, Vec<ObjIdx>) {
        let track_ids = self
            .frame_tracks
            .get(&frame_idx)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let obj_ids = self
            .pool
            .get(&frame_idx)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        (track_ids, obj_ids)
    }

    /// Tracks whose entry at `frame_idx` exists, ascending
    pub fn tracks_at(&self, frame_idx: FrameIdx) -> Vec<TrackIdx> {
        self.get_items_in_frame(frame_idx).0
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&Object> {
        self.objects
            .get(&handle.frame_idx)
            .and_then(|frame| frame.get(&handle.obj_idx))
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut Object> {
        self.objects
            .get_mut(&handle.frame_idx)
            .and_then(|frame| frame.get_mut(&handle.obj_idx))
    }

    /// Pooled objects of a frame in ascending `obj_idx` order
    pub fn pool_objects(&self, frame_idx: FrameIdx) -> impl Iterator<Item = &Object> + '_ {
        let frame = self.objects.get(&frame_idx);
        self.pool
            .get(&frame_idx)
            .into_iter()
            .flatten()
            .filter_map(move |obj_idx| frame.and_then(|f| f.get(obj_idx)))
    }

    /// Whether the frame was ever labeled (it may hold zero objects)
    pub fn has_frame(&self, frame_idx: FrameIdx) -> bool {
        self.pool.contains_key(&frame_idx) || self.objects.contains_key(&frame_idx)
    }

    pub fn is_pooled(&self, handle: ObjectHandle) -> bool {
        self.pool
            .get(&handle.frame_idx)
            .is_some_and(|ids| ids.contains(&handle.obj_idx))
    }

    /// Entries of one track in frame order
    pub fn track(&self, track_idx: TrackIdx) -> impl Iterator<Item = (FrameIdx, &Object)> + '_ {
        self.tracks
            .get(&track_idx)
            .into_iter()
            .flatten()
            .filter_map(move |(frame_idx, handle)| self.object(*handle).map(|o| (*frame_idx, o)))
    }

    /// Object with the largest frame index stored for the track
    pub fn tail(&self, track_idx: TrackIdx) -> Option<&Object> {
        self.tracks
            .get(&track_idx)
            .and_then(|entries| entries.last_key_value())
            .and_then(|(_, handle)| self.object(*handle))
    }

    /// The track's entry at an exact frame
    pub fn entry(&self, track_idx: TrackIdx, frame_idx: FrameIdx) -> Option<&Object> {
        self.tracks
            .get(&track_idx)
            .and_then(|entries| entries.get(&frame_idx))
            .and_then(|handle| self.object(*handle))
    }

    pub fn track_ids(&self) -> impl Iterator<Item = TrackIdx> + '_ {
        self.tracks.keys().copied()
    }

    /// Read-only view of the full `(track_idx, frame_idx) -> Object` table
    pub fn track_entries(&self) -> impl Iterator<Item = ((TrackIdx, FrameIdx), &Object)> + '_ {
        self.tracks.iter().flat_map(move |(track_idx, entries)| {
            entries.iter().filter_map(move |(frame_idx, handle)| {
                self.object(*handle).map(|o| ((*track_idx, *frame_idx), o))
            })
        })
    }

    /// Frames that still have a pool entry, ascending
    pub fn pooled_frames(&self) -> impl Iterator<Item = FrameIdx> + '_ {
        self.pool.keys().copied()
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_pooled(&self) -> usize {
        self.pool.values().map(BTreeSet::len).sum()
    }

    /// Id the next created track will receive
    pub fn next_track_idx(&self) -> TrackIdx {
        self.next_track_idx
    }

    fn take_from_pool(&mut self, frame_idx: FrameIdx, obj_idx: ObjIdx) -> Result<(), StoreError> {
        let removed = self
            .pool
            .get_mut(&frame_idx)
            .is_some_and(|ids| ids.remove(&obj_idx));
        if removed {
            Ok(())
        } else {
            Err(StoreError::ObjectNotPooled { frame_idx, obj_idx })
        }
    }

    fn attach(&mut self, track_idx: TrackIdx, handle: ObjectHandle, match_error: f64) {
        if let Some(obj) = self.object_mut(handle) {
            obj.track_idx = Some(track_idx);
            obj.match_error = match_error;
        }
        self.tracks
            .entry(track_idx)
            .or_default()
            .insert(handle.frame_idx, handle);
        self.frame_tracks
            .entry(handle.frame_idx)
            .or_default()
            .insert(track_idx);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::object::{BoundingBox, Point};

    pub(crate) fn obj(area: u32, x: f64, y: f64) -> Object {
        let (xi, yi) = (x.round() as i32, y.round() as i32);
        let contour = vec![(xi - 1, yi - 1), (xi + 1, yi - 1), (xi + 1, yi + 1), (xi - 1, yi + 1)];
        Object::new(0, 0, Point::new(x, y), area, contour, BoundingBox::new(xi - 1, yi - 1, 3, 3))
    }

    pub(crate) fn frame(objs: Vec<(ObjIdx, Object)>) -> FrameObjects {
        objs.into_iter().collect()
    }

    /// No handle is both pooled and stored under a track key
    pub(crate) fn assert_exclusive(store: &TrackStore) {
        let mut seen = BTreeSet::new();
        for ((track_idx, frame_idx), o) in store.track_entries() {
            assert_eq!(o.frame_idx, frame_idx);
            assert_eq!(o.track_idx, Some(track_idx));
            assert!(!store.is_pooled(o.handle()), "{:?} pooled and tracked", o.handle());
            assert!(seen.insert(o.handle()), "{:?} in two tracks", o.handle());
        }
        for frame_idx in store.pooled_frames() {
            for o in store.pool_objects(frame_idx) {
                assert_eq!(o.track_idx, None);
            }
        }
    }

    fn two_frame_store() -> TrackStore {
        let mut store = TrackStore::new();
        store
            .insert_frame(0, frame(vec![(1, obj(50, 10.0, 10.0)), (2, obj(20, 40.0, 40.0))]))
            .unwrap();
        store
            .insert_frame(1, frame(vec![(1, obj(48, 11.0, 10.0)), (2, obj(21, 41.0, 40.0))]))
            .unwrap();
        store
    }

    #[test]
    fn test_insert_frame_normalizes_keys() {
        let store = two_frame_store();
        let o = store.object(ObjectHandle::new(1, 2)).unwrap();
        assert_eq!((o.frame_idx, o.obj_idx), (1, 2));
        assert_eq!(store.num_pooled(), 4);
    }

    #[test]
    fn test_insert_frame_is_write_once() {
        let mut store = two_frame_store();
        let err = store
            .insert_frame(0, frame(vec![(1, obj(5, 0.0, 0.0))]))
            .unwrap_err();
        assert_eq!(err, StoreError::FrameAlreadyLabeled(0));
        assert_eq!(store.object(ObjectHandle::new(0, 1)).unwrap().area, 50);
    }

    #[test]
    fn test_add_obj_to_track() {
        let mut store = two_frame_store();
        let t = store.add_obj_to_track(0, 2).unwrap();
        assert_eq!(t, 1);
        assert_eq!(store.add_obj_to_track(0, 1).unwrap(), 2);

        let tail = store.tail(t).unwrap();
        assert_eq!(tail.handle(), ObjectHandle::new(0, 2));
        assert_eq!(tail.match_error, 0.0);
        assert!(!store.is_pooled(ObjectHandle::new(0, 2)));
        assert_exclusive(&store);
    }

    #[test]
    fn test_add_missing_obj_is_noop() {
        let mut store = two_frame_store();
        let err = store.add_obj_to_track(0, 9).unwrap_err();
        assert_eq!(err, StoreError::ObjectNotPooled { frame_idx: 0, obj_idx: 9 });
        assert_eq!(store.next_track_idx(), 1);
        assert_eq!(store.num_tracks(), 0);

        store.add_obj_to_track(0, 1).unwrap();
        assert!(store.add_obj_to_track(0, 1).is_err());
        assert_eq!(store.num_tracks(), 1);
    }

    #[test]
    fn test_extend_track_manually() {
        let mut store = two_frame_store();
        let t = store.create_track_from_pool(0, 1).unwrap();
        store.extend_track_manually(t, 1, 2, 0.0).unwrap();

        assert_eq!(store.tail(t).unwrap().handle(), ObjectHandle::new(1, 2));
        assert_eq!(store.tracks_at(1), vec![t]);
        assert_eq!(
            store.extend_track_manually(t, 1, 1, 0.0),
            Err(StoreError::FrameOccupied { track_idx: t, frame_idx: 1 })
        );
        assert_eq!(
            store.extend_track_manually(99, 1, 1, 0.0),
            Err(StoreError::TrackNotFound(99))
        );
        assert!(store.is_pooled(ObjectHandle::new(1, 1)));
        assert_exclusive(&store);
    }

    #[test]
    fn test_remove_track_returns_objects() {
        let mut store = two_frame_store();
        let t = store.add_obj_to_track(0, 1).unwrap();
        store.extend_track(t, 1, 1, 1.5).unwrap();

        let released = store.remove_track(t);
        assert_eq!(released, vec![ObjectHandle::new(0, 1), ObjectHandle::new(1, 1)]);
        assert_eq!(store.num_tracks(), 0);
        assert_eq!(store.num_pooled(), 4);
        assert_eq!(store.get_items_in_frame(1), (vec![], vec![1, 2]));

        let o = store.object(ObjectHandle::new(1, 1)).unwrap();
        assert_eq!(o.track_idx, None);
        assert_eq!(o.match_error, 0.0);

        // idempotent
        assert!(store.remove_track(t).is_empty());
        assert_exclusive(&store);
    }

    #[test]
    fn test_track_ids_are_never_reused() {
        let mut store = two_frame_store();
        let t1 = store.add_obj_to_track(0, 1).unwrap();
        store.remove_track(t1);
        let t2 = store.add_obj_to_track(0, 1).unwrap();
        assert!(t2 > t1);
    }

    #[test]
    fn test_removal_round_trip_preserves_attributes() {
        let mut store = two_frame_store();
        let before: Vec<Object> = [ObjectHandle::new(0, 1), ObjectHandle::new(1, 1)]
            .iter()
            .map(|h| store.object(*h).unwrap().clone())
            .collect();

        let t = store.add_obj_to_track(0, 1).unwrap();
        store.extend_track(t, 1, 1, 3.25).unwrap();
        let released = store.remove_track(t);

        for (handle, original) in released.iter().zip(&before) {
            let t = store.create_track_from_pool(handle.frame_idx, handle.obj_idx).unwrap();
            let restored = store.tail(t).unwrap();
            assert_eq!(restored.centroid, original.centroid);
            assert_eq!(restored.area, original.area);
            assert_eq!(restored.contour, original.contour);
            assert_eq!(restored.bbox, original.bbox);
        }
        assert_exclusive(&store);
    }

    #[test]
    fn test_get_items_in_frame() {
        let mut store = two_frame_store();
        let t = store.add_obj_to_track(0, 2).unwrap();
        assert_eq!(store.get_items_in_frame(0), (vec![t], vec![1]));
        assert_eq!(store.get_items_in_frame(7), (vec![], vec![]));
    }

    #[test]
    fn test_clear_all_tracks_and_objs() {
        let mut store = two_frame_store();
        let t = store.add_obj_to_track(0, 1).unwrap();
        store.extend_track(t, 1, 1, 0.0).unwrap();
        store.add_obj_to_track(1, 2).unwrap();

        store.clear_all_objs();
        assert_eq!(store.num_pooled(), 0);
        assert_eq!(store.track(t).count(), 2);

        store.clear_all_tracks();
        assert_eq!(store.num_tracks(), 0);
        assert_eq!(store.num_pooled(), 3);
        assert_exclusive(&store);
    }

    #[test]
    fn test_add_all_objs_promotes_one_frame() {
        let mut store = two_frame_store();
        let first = store.add_obj_to_track(0, 2).unwrap();

        let created = store.add_all_objs(0);
        assert_eq!(created, vec![first + 1]);
        assert_eq!(store.get_items_in_frame(0), (vec![first, first + 1], vec![]));
        // frame 1 untouched
        assert_eq!(store.get_items_in_frame(1).1, vec![1, 2]);

        assert!(store.add_all_objs(0).is_empty());
        assert!(store.add_all_objs(9).is_empty());
        assert_exclusive(&store);
    }

    #[test]
    fn test_track_entries_view() {
        let mut store = two_frame_store();
        let t = store.add_obj_to_track(0, 1).unwrap();
        store.extend_track(t, 1, 2, 2.0).unwrap();

        let keys: Vec<_> = store.track_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![(t, 0), (t, 1)]);
        assert_eq!(store.entry(t, 1).unwrap().match_error, 2.0);
    }
}
