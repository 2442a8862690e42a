//! Reference grey-level threshold detector
//!
//! Global threshold, 8-connected component labeling and an outer contour
//! trace per component. Meant for exercising the pipeline on simple
//! backlit footage, not as a replacement for proper segmentation.
//!
//! Parameters (all optional):
//!
//! | key | type | default | meaning |
//! |-----|------|---------|---------|
//! | `img_thresh` | int 0..=255 | 120 | grey threshold |
//! | `thresh_inv` | bool | true | objects are darker than the field |
//! | `area_min_px` | int | 5 | drop smaller components |
//! | `clear_edge` | bool | false | drop components touching the border |

use crate::detector::{DetectorParams, ObjectDetector};
use floctrack::{BoundingBox, FrameIdx, FrameObjects, ObjIdx, Object, Point};
use image::GrayImage;

/// Parsed threshold detector parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdParams {
    pub img_thresh: u8,
    pub thresh_inv: bool,
    pub area_min_px: u32,
    pub clear_edge: bool,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            img_thresh: 120,
            thresh_inv: true,
            area_min_px: 5,
            clear_edge: false,
        }
    }
}

impl ThresholdParams {
    pub fn from_params(params: &DetectorParams) -> Result<Self, String> {
        let mut parsed = Self::default();
        if let Some(v) = params.get("img_thresh") {
            let t = v
                .as_u64()
                .filter(|t| *t <= 255)
                .ok_or_else(|| format!("img_thresh must be an integer in 0..=255, got {}", v))?;
            parsed.img_thresh = t as u8;
        }
        if let Some(v) = params.get("thresh_inv") {
            parsed.thresh_inv = v
                .as_bool()
                .ok_or_else(|| format!("thresh_inv must be a bool, got {}", v))?;
        }
        if let Some(v) = params.get("area_min_px") {
            let a = v
                .as_u64()
                .ok_or_else(|| format!("area_min_px must be a non-negative integer, got {}", v))?;
            parsed.area_min_px = u32::try_from(a).unwrap_or(u32::MAX);
        }
        if let Some(v) = params.get("clear_edge") {
            parsed.clear_edge = v
                .as_bool()
                .ok_or_else(|| format!("clear_edge must be a bool, got {}", v))?;
        }
        Ok(parsed)
    }

    fn is_foreground(&self, luma: u8) -> bool {
        if self.thresh_inv {
            luma <= self.img_thresh
        } else {
            luma > self.img_thresh
        }
    }
}

/// Stateless threshold detector on 8-bit grey frames
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdDetector;

impl ObjectDetector<GrayImage> for ThresholdDetector {
    fn detect(&self, frame: &GrayImage, frame_idx: FrameIdx, params: &DetectorParams) -> Result<FrameObjects, String> {
        let params = ThresholdParams::from_params(params)?;
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let mask: Vec<bool> = frame.pixels().map(|p| params.is_foreground(p[0])).collect();

        let (labels, components) = connected_components(&mask, width, height);

        let mut objects = FrameObjects::new();
        let mut next_idx: ObjIdx = 1;
        for comp in components {
            if comp.area < params.area_min_px {
                continue;
            }
            if params.clear_edge && comp.touches_edge(width, height) {
                continue;
            }
            let contour = trace_outer_contour(&labels, width, height, comp.label, comp.start);
            let centroid = Point::new(
                comp.sum_x as f64 / comp.area as f64,
                comp.sum_y as f64 / comp.area as f64,
            );
            let bbox = BoundingBox::new(
                comp.min_x as i32,
                comp.min_y as i32,
                (comp.max_x - comp.min_x + 1) as i32,
                (comp.max_y - comp.min_y + 1) as i32,
            );
            objects.insert(
                next_idx,
                Object::new(frame_idx, next_idx, centroid, comp.area, contour, bbox),
            );
            next_idx += 1;
        }

        log::debug!("frame {}: {} objects", frame_idx, objects.len());
        Ok(objects)
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

#[derive(Debug, Clone)]
struct Component {
    /// Root label after union-find resolution
    label: u32,
    /// First pixel in raster order, always on the outer border
    start: (usize, usize),
    area: u32,
    sum_x: u64,
    sum_y: u64,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

impl Component {
    fn new(label: u32, x: usize, y: usize) -> Self {
        Self {
            label,
            start: (x, y),
            area: 0,
            sum_x: 0,
            sum_y: 0,
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    fn touches_edge(&self, width: usize, height: usize) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 == width || self.max_y + 1 == height
    }
}

/// Two-pass 8-connected labeling.
///
/// Returns the resolved label image (0 is background) and the components in
/// raster order of their first pixel.
fn connected_components(mask: &[bool], width: usize, height: usize) -> (Vec<u32>, Vec<Component>) {
    let mut labels = vec![0u32; width * height];
    if width == 0 || height == 0 {
        return (labels, Vec::new());
    }
    let mut dsu = DisjointSet::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if !mask[idx] {
                continue;
            }

            let mut neighbors = [0u32; 4];
            let mut count = 0usize;
            let mut push = |label: u32| {
                if label != 0 {
                    neighbors[count] = label;
                    count += 1;
                }
            };
            if y > 0 {
                push(labels[idx - width]);
                if x > 0 {
                    push(labels[idx - width - 1]);
                }
                if x + 1 < width {
                    push(labels[idx - width + 1]);
                }
            }
            if x > 0 {
                push(labels[idx - 1]);
            }

            labels[idx] = if count == 0 {
                dsu.make_set()
            } else {
                let base = neighbors[0];
                for &n in neighbors.iter().take(count).skip(1) {
                    dsu.union(base, n);
                }
                base
            };
        }
    }

    let mut slots: Vec<Option<usize>> = vec![None; dsu.len()];
    let mut components: Vec<Component> = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if labels[idx] == 0 {
                continue;
            }
            let root = dsu.find(labels[idx]);
            labels[idx] = root;
            let slot = *slots[root as usize].get_or_insert_with(|| {
                components.push(Component::new(root, x, y));
                components.len() - 1
            });
            let comp = &mut components[slot];
            comp.area += 1;
            comp.sum_x += x as u64;
            comp.sum_y += y as u64;
            comp.min_x = comp.min_x.min(x);
            comp.max_x = comp.max_x.max(x);
            comp.min_y = comp.min_y.min(y);
            comp.max_y = comp.max_y.max(y);
        }
    }

    (labels, components)
}

/// Clockwise neighbour offsets in image coordinates, starting east
const DIRECTIONS: [(i64, i64); 8] = [(1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1)];

/// Moore-neighbour trace of the outer border of one component.
///
/// `start` must be the component's first pixel in raster order so its west
/// neighbour is known background. Stops when the start pixel is left in the
/// same direction a second time.
fn trace_outer_contour(labels: &[u32], width: usize, height: usize, label: u32, start: (usize, usize)) -> Vec<(i32, i32)> {
    let inside = |x: i64, y: i64| {
        x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height && labels[y as usize * width + x as usize] == label
    };

    let start = (start.0 as i64, start.1 as i64);
    let mut contour = vec![(start.0 as i32, start.1 as i32)];
    let mut p = start;
    let mut backtrack = 4usize;
    let mut first_dir: Option<usize> = None;
    let max_steps = 4 * width * height + 8;

    for _ in 0..max_steps {
        let Some(dir) = (1..=8)
            .map(|k| (backtrack + k) % 8)
            .find(|&d| inside(p.0 + DIRECTIONS[d].0, p.1 + DIRECTIONS[d].1))
        else {
            // isolated pixel
            break;
        };

        if p == start {
            match first_dir {
                Some(d0) if d0 == dir => break,
                Some(_) => {}
                None => first_dir = Some(dir),
            }
        }

        p = (p.0 + DIRECTIONS[dir].0, p.1 + DIRECTIONS[dir].1);
        // last background pixel examined, seen from the new position
        backtrack = if dir % 2 == 0 { (dir + 6) % 8 } else { (dir + 5) % 8 };
        contour.push((p.0 as i32, p.1 as i32));
    }

    if contour.len() > 1 && contour.last() == contour.first() {
        contour.pop();
    }
    contour
}

struct DisjointSet {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new() -> Self {
        // slot 0 is background
        Self {
            parent: vec![0],
            rank: vec![0],
        }
    }

    fn len(&self) -> usize {
        self.parent.len()
    }

    fn make_set(&mut self) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find(&mut self, x: u32) -> u32 {
        let mut root = x;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cur = x;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: u32, b: u32) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        let rank_a = self.rank[root_a as usize];
        let rank_b = self.rank[root_b as usize];
        if rank_a < rank_b {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b as usize] = root_a;
        if rank_a == rank_b {
            self.rank[root_a as usize] = rank_a + 1;
        }
    }
}
