//! Facial landmark types and the extractor contract

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// 2D point in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self {
            x: x as f64,
            y: y as f64,
        }
    }
}

/// Which eye
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn region(self) -> Region {
        match self {
            Eye::Left => Region::LeftEye,
            Eye::Right => Region::RightEye,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Anatomical region with a fixed landmark layout.
///
/// Points 0 and 1 are the horizontal extremes; the rest are vertical
/// measurement pairs (2,3), (4,5), ... read two at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    LeftEye,
    RightEye,
    Mouth,
}

impl Region {
    /// Number of landmarks in the region
    pub const fn point_count(self) -> usize {
        match self {
            Region::LeftEye | Region::RightEye => 16,
            Region::Mouth => 20,
        }
    }

    /// Number of vertical measurement pairs
    pub const fn pair_count(self) -> usize {
        (self.point_count() - 2) / 2
    }
}

/// Ordered landmarks for one region. The length is checked on construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkSet {
    region: Region,
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(region: Region, points: Vec<Point>) -> Result<Self, DmsError> {
        if points.len() != region.point_count() {
            return Err(DmsError::LandmarkCount {
                region,
                expected: region.point_count(),
                actual: points.len(),
            });
        }
        Ok(Self { region, points })
    }

    /// Build a set with the given width and vertical gaps, laid out as a
    /// horizontal line of corners with the pairs spread evenly between them.
    pub fn synthetic(region: Region, width: f64, heights: &[f64]) -> Result<Self, DmsError> {
        if heights.len() != region.pair_count() {
            return Err(DmsError::LandmarkCount {
                region,
                expected: region.pair_count() * 2 + 2,
                actual: heights.len() * 2 + 2,
            });
        }

        let mut points = Vec::with_capacity(region.point_count());
        points.push(Point::new(0.0, 0.0));
        points.push(Point::new(width, 0.0));
        let step = width / (heights.len() + 1) as f64;
        for (i, h) in heights.iter().enumerate() {
            let x = step * (i + 1) as f64;
            points.push(Point::new(x, -h / 2.0));
            points.push(Point::new(x, h / 2.0));
        }
        Self::new(region, points)
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Distance between the horizontal extremes
    pub fn width(&self) -> f64 {
        self.points[0].distance(&self.points[1])
    }

    /// Vertical gaps, one per measurement pair, in order
    pub fn heights(&self) -> impl Iterator<Item = f64> + '_ {
        self.points[2..]
            .chunks_exact(2)
            .map(|pair| pair[0].distance(&pair[1]))
    }
}

/// Landmarks for one detected face
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceLandmarks {
    pub left_eye: LandmarkSet,
    pub right_eye: LandmarkSet,
    pub mouth: LandmarkSet,
}

impl FaceLandmarks {
    pub fn eye(&self, eye: Eye) -> &LandmarkSet {
        match eye {
            Eye::Left => &self.left_eye,
            Eye::Right => &self.right_eye,
        }
    }

    /// Pick the region landmarks out of a full face mesh
    pub fn from_mesh(mesh: &[Point], indices: &MeshIndices) -> Result<Self, DmsError> {
        let select = |region: Region, idx: &[usize]| -> Result<LandmarkSet, DmsError> {
            let points = idx
                .iter()
                .map(|&i| {
                    mesh.get(i).copied().ok_or(DmsError::MeshIndex {
                        index: i,
                        mesh_len: mesh.len(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            LandmarkSet::new(region, points)
        };

        Ok(Self {
            left_eye: select(Region::LeftEye, indices.left_eye.as_slice())?,
            right_eye: select(Region::RightEye, indices.right_eye.as_slice())?,
            mouth: select(Region::Mouth, indices.mouth.as_slice())?,
        })
    }
}

/// Positions of each region's landmarks inside a full face mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshIndices {
    pub left_eye: Vec<usize>,
    pub right_eye: Vec<usize>,
    pub mouth: Vec<usize>,
}

impl Default for MeshIndices {
    fn default() -> Self {
        Self::face_mesh_468()
    }
}

impl MeshIndices {
    /// 468-point face mesh topology: corners first, then upper/lower lid
    /// (or lip) pairs from one corner to the other
    pub fn face_mesh_468() -> Self {
        Self {
            left_eye: vec![
                362, 263, 398, 382, 384, 381, 385, 380, 386, 374, 387, 373, 388, 390, 466, 249,
            ],
            right_eye: vec![
                133, 33, 173, 155, 157, 154, 158, 153, 159, 145, 160, 144, 161, 163, 246, 7,
            ],
            mouth: vec![
                61, 291, 185, 146, 40, 91, 39, 181, 37, 84, 0, 17, 267, 314, 269, 405, 270, 321,
                409, 375,
            ],
        }
    }
}

/// Landmark-extraction collaborator. `Ok(None)` means no face in the frame,
/// which is a normal outcome.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError>;
}

impl<F> LandmarkExtractor for F
where
    F: FnMut(&VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> + Send,
{
    fn extract(&mut self, frame: &VideoFrame) -> Result<Option<FaceLandmarks>, DmsError> {
        self(frame)
    }
}
