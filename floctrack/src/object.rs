//! Detected objects and their geometry

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type FrameIdx = u32;
pub type ObjIdx = u32;
pub type TrackIdx = u32;

/// Detector output for a single frame, keyed by dense per-frame object index
pub type FrameObjects = BTreeMap<ObjIdx, Object>;

/// Sub-pixel centroid position (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned bounding box in pixel units (x, y, w, h)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn long_side(&self) -> f64 {
        self.w.max(self.h) as f64
    }

    pub fn short_side(&self) -> f64 {
        self.w.min(self.h) as f64
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bbox({}, {}, {}, {})", self.x, self.y, self.w, self.h)
    }
}

/// Address of an object in the store: the frame it was detected in and its
/// per-frame index. Handles are what moves between the pool and tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub frame_idx: FrameIdx,
    pub obj_idx: ObjIdx,
}

impl ObjectHandle {
    pub fn new(frame_idx: FrameIdx, obj_idx: ObjIdx) -> Self {
        Self { frame_idx, obj_idx }
    }
}

/// One detected blob in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub frame_idx: FrameIdx,
    pub obj_idx: ObjIdx,
    pub centroid: Point,
    /// Pixel count of the blob
    pub area: u32,
    /// Closed outer contour, pixel coordinates (x, y)
    pub contour: Vec<(i32, i32)>,
    pub bbox: BoundingBox,
    /// Filled lazily by [`Object::fit_axes`]
    pub major_axis: Option<f64>,
    pub minor_axis: Option<f64>,
    /// Owning track, set once the object leaves the pool
    pub track_idx: Option<TrackIdx>,
    /// Cost that justified the assignment; 0 for track roots
    pub match_error: f64,
}

impl Object {
    pub fn new(
        frame_idx: FrameIdx,
        obj_idx: ObjIdx,
        centroid: Point,
        area: u32,
        contour: Vec<(i32, i32)>,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            frame_idx,
            obj_idx,
            centroid,
            area,
            contour,
            bbox,
            major_axis: None,
            minor_axis: None,
            track_idx: None,
            match_error: 0.0,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle::new(self.frame_idx, self.obj_idx)
    }

    /// Centroid distance to another object
    pub fn distance_to(&self, other: &Object) -> f64 {
        self.centroid.distance(&other.centroid)
    }

    /// Major/minor axis lengths of the equivalent ellipse of the contour.
    ///
    /// Computed once and cached on the object. Contours with fewer than five
    /// points, degenerate outlines and non-finite results fall back to the
    /// long and short sides of the bounding box.
    pub fn fit_axes(&mut self) -> (f64, f64) {
        if let (Some(major), Some(minor)) = (self.major_axis, self.minor_axis) {
            return (major, minor);
        }

        let (major, minor) = ellipse_axes(&self.contour)
            .filter(|(ma, mi)| ma.is_finite() && mi.is_finite() && *ma > 0.0)
            .unwrap_or((self.bbox.long_side(), self.bbox.short_side()));

        self.major_axis = Some(major);
        self.minor_axis = Some(minor);
        (major, minor)
    }

    /// Reset assignment state when the object goes back to the pool
    pub(crate) fn release(&mut self) {
        self.track_idx = None;
        self.match_error = 0.0;
    }
}

/// Full axis lengths of the ellipse with the same second-order central
/// moments as the polygon outline.
fn ellipse_axes(contour: &[(i32, i32)]) -> Option<(f64, f64)> {
    if contour.len() < 5 {
        return None;
    }

    // Green's theorem moments of the closed polygon
    let (mut a, mut cx, mut cy) = (0.0_f64, 0.0_f64, 0.0_f64);
    let (mut sxx, mut syy, mut sxy) = (0.0_f64, 0.0_f64, 0.0_f64);
    let n = contour.len();
    for i in 0..n {
        let (x0, y0) = (contour[i].0 as f64, contour[i].1 as f64);
        let (x1, y1) = (contour[(i + 1) % n].0 as f64, contour[(i + 1) % n].1 as f64);
        let cross = x0 * y1 - x1 * y0;
        a += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
        sxx += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
        syy += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
        sxy += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
    }
    a /= 2.0;
    if a.abs() < f64::EPSILON {
        return None;
    }
    cx /= 6.0 * a;
    cy /= 6.0 * a;
    let mu20 = sxx / (12.0 * a) - cx * cx;
    let mu02 = syy / (12.0 * a) - cy * cy;
    let mu11 = sxy / (24.0 * a) - cx * cy;

    let common = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
    let l1 = (mu20 + mu02 + common) / 2.0;
    let l2 = (mu20 + mu02 - common) / 2.0;
    if l2 < 0.0 {
        return None;
    }
    Some((4.0 * l1.sqrt(), 4.0 * l2.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square_object(side: i32) -> Object {
        let contour = vec![(0, 0), (side, 0), (side, side), (0, side), (0, side / 2)];
        Object::new(
            0,
            1,
            Point::new(side as f64 / 2.0, side as f64 / 2.0),
            (side * side) as u32,
            contour,
            BoundingBox::new(0, 0, side, side),
        )
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_abs_diff_eq!(a.distance(&b), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_axes_square_is_isotropic() {
        let mut obj = square_object(10);
        let (major, minor) = obj.fit_axes();
        // a square's equivalent ellipse is a circle of diameter 4*sqrt(side^2/12)
        let expected = 4.0 * (100.0_f64 / 12.0).sqrt();
        assert_abs_diff_eq!(major, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(minor, expected, epsilon = 1e-9);
        assert_eq!(obj.major_axis, Some(major));
    }

    #[test]
    fn test_fit_axes_elongated() {
        let contour = vec![(0, 0), (20, 0), (20, 4), (10, 4), (0, 4)];
        let mut obj = Object::new(
            0,
            1,
            Point::new(10.0, 2.0),
            80,
            contour,
            BoundingBox::new(0, 0, 21, 5),
        );
        let (major, minor) = obj.fit_axes();
        assert!(major > 4.0 * minor);
    }

    #[test]
    fn test_fit_axes_short_contour_falls_back_to_bbox() {
        let mut obj = Object::new(
            3,
            2,
            Point::new(1.0, 1.0),
            6,
            vec![(0, 0), (2, 0), (2, 1)],
            BoundingBox::new(0, 0, 3, 2),
        );
        assert_eq!(obj.fit_axes(), (3.0, 2.0));
    }

    #[test]
    fn test_fit_axes_is_cached() {
        let mut obj = square_object(10);
        obj.major_axis = Some(7.0);
        obj.minor_axis = Some(3.0);
        assert_eq!(obj.fit_axes(), (7.0, 3.0));
    }
}
