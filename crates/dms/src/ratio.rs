//! Geometric ratios over landmark regions
//!
//! All functions are pure. The typed entry points take a `LandmarkSet`,
//! whose length was validated on construction; the `*_points` variants take
//! raw slices and panic when handed the wrong number of points.

use serde::{Deserialize, Serialize};

use crate::landmarks::{FaceLandmarks, LandmarkSet, Point, Region};

/// Vertical pairs per eye
pub const EYE_PAIRS: usize = 7;

/// Normaliser shared by EAR and MAR. MAR sums nine pairs but still divides
/// by seven.
const ASPECT_DIVISOR: f64 = 7.0;

/// Magic ratio weights, outer pair to central pair and back
const MAGIC_WEIGHTS: [f64; EYE_PAIRS] = [1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0];

/// Width and the seven lid gaps of one eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeGeometry {
    pub width: f64,
    pub heights: [f64; EYE_PAIRS],
}

impl EyeGeometry {
    pub fn from_landmarks(eye: &LandmarkSet) -> Self {
        Self::from_points(eye.points())
    }

    /// # Panics
    ///
    /// If `points` does not hold exactly one eye's landmarks.
    pub fn from_points(points: &[Point]) -> Self {
        assert_region_len(points, Region::LeftEye);
        let mut heights = [0.0; EYE_PAIRS];
        for (h, pair) in heights.iter_mut().zip(points[2..].chunks_exact(2)) {
            *h = pair[0].distance(&pair[1]);
        }
        Self {
            width: points[0].distance(&points[1]),
            heights,
        }
    }

    pub fn height_sum(&self) -> f64 {
        self.heights.iter().sum()
    }
}

fn assert_region_len(points: &[Point], region: Region) {
    assert_eq!(
        points.len(),
        region.point_count(),
        "{:?} landmarks must have {} points",
        region,
        region.point_count()
    );
}

fn aspect(points: &[Point]) -> f64 {
    let width = points[0].distance(&points[1]);
    let height_sum: f64 = points[2..]
        .chunks_exact(2)
        .map(|pair| pair[0].distance(&pair[1]))
        .sum();
    height_sum / (ASPECT_DIVISOR * width)
}

/// Eye aspect ratio: mean lid gap over eye width. Lower means more closed.
pub fn eye_aspect_ratio(eye: &LandmarkSet) -> f64 {
    eye_aspect_ratio_points(eye.points())
}

/// # Panics
///
/// If `points` does not hold 16 landmarks.
pub fn eye_aspect_ratio_points(points: &[Point]) -> f64 {
    assert_region_len(points, Region::LeftEye);
    aspect(points)
}

/// Mouth aspect ratio. Higher means more open.
pub fn mouth_aspect_ratio(mouth: &LandmarkSet) -> f64 {
    mouth_aspect_ratio_points(mouth.points())
}

/// # Panics
///
/// If `points` does not hold 20 landmarks.
pub fn mouth_aspect_ratio_points(points: &[Point]) -> f64 {
    assert_region_len(points, Region::Mouth);
    aspect(points)
}

/// Weighted eye openness. The central lid gap counts 4x, its neighbours 3x,
/// the next ring 2x, the outer pairs 1x. The weighted mean gap is scaled by
/// the eye width, so the value is in square pixels and grows as the face
/// moves closer to the camera; `magic_ratio_threshold` uses the same scale.
pub fn magic_ratio(eye: &LandmarkSet) -> f64 {
    magic_ratio_points(eye.points())
}

/// # Panics
///
/// If `points` does not hold 16 landmarks.
pub fn magic_ratio_points(points: &[Point]) -> f64 {
    let geometry = EyeGeometry::from_points(points);
    let weight_sum: f64 = MAGIC_WEIGHTS.iter().sum();
    let weighted: f64 = MAGIC_WEIGHTS
        .iter()
        .zip(geometry.heights.iter())
        .map(|(w, h)| w * h)
        .sum();
    weighted / weight_sum * geometry.width
}

/// All per-frame ratios for one face
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatioSnapshot {
    pub eye_aspect_ratio_left: f64,
    pub eye_aspect_ratio_right: f64,
    pub mouth_aspect_ratio: f64,
    pub magic_ratio_left: f64,
    pub magic_ratio_right: f64,
}

impl RatioSnapshot {
    pub fn compute(face: &FaceLandmarks) -> Self {
        Self {
            eye_aspect_ratio_left: eye_aspect_ratio(&face.left_eye),
            eye_aspect_ratio_right: eye_aspect_ratio(&face.right_eye),
            mouth_aspect_ratio: mouth_aspect_ratio(&face.mouth),
            magic_ratio_left: magic_ratio(&face.left_eye),
            magic_ratio_right: magic_ratio(&face.right_eye),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eye(width: f64, heights: [f64; 7]) -> LandmarkSet {
        LandmarkSet::synthetic(Region::LeftEye, width, &heights).unwrap()
    }

    #[test]
    fn test_open_eye_ratio_is_height_over_width() {
        let set = eye(50.0, [12.0; 7]);
        assert!((eye_aspect_ratio(&set) - 12.0 / 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_magic_ratio_scales_with_width() {
        // Uniform gaps: weighted mean is the gap itself, times the width
        let set = eye(100.0, [10.0; 7]);
        assert!((magic_ratio(&set) - 1000.0).abs() < 1e-9);

        // (1*1 + 2*2 + 3*3 + 4*4 + 3*5 + 2*6 + 1*7) / 16 * 20
        let set = eye(20.0, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!((magic_ratio(&set) - 64.0 / 16.0 * 20.0).abs() < 1e-9);

        // Same eye twice as close to the camera
        let near = eye(200.0, [20.0; 7]);
        assert!((magic_ratio(&near) - 4.0 * 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_magic_ratio_weights_center() {
        let base = [10.0; 7];
        let reference = magic_ratio(&eye(100.0, base));

        let mut center = base;
        center[3] += 5.0;
        let mut outer_first = base;
        outer_first[0] += 5.0;
        let mut outer_last = base;
        outer_last[6] += 5.0;

        let center_delta = (magic_ratio(&eye(100.0, center)) - reference).abs();
        let first_delta = (magic_ratio(&eye(100.0, outer_first)) - reference).abs();
        let last_delta = (magic_ratio(&eye(100.0, outer_last)) - reference).abs();

        assert!(center_delta > first_delta);
        assert!(center_delta > last_delta);
        // EAR treats every pair the same
        let ear_center = eye_aspect_ratio(&eye(100.0, center));
        let ear_outer = eye_aspect_ratio(&eye(100.0, outer_first));
        assert!((ear_center - ear_outer).abs() < 1e-12);
    }

    #[test]
    fn test_mouth_ratio_divides_by_seven() {
        let mouth = LandmarkSet::synthetic(Region::Mouth, 70.0, &[7.0; 9]).unwrap();
        // 9 * 7 / (7 * 70)
        assert!((mouth_aspect_ratio(&mouth) - 63.0 / 490.0).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_uses_each_region() {
        let face = FaceLandmarks {
            left_eye: eye(100.0, [30.0; 7]),
            right_eye: LandmarkSet::synthetic(Region::RightEye, 100.0, &[10.0; 7]).unwrap(),
            mouth: LandmarkSet::synthetic(Region::Mouth, 100.0, &[0.0; 9]).unwrap(),
        };
        let ratios = RatioSnapshot::compute(&face);
        assert!((ratios.eye_aspect_ratio_left - 0.3).abs() < 1e-12);
        assert!((ratios.eye_aspect_ratio_right - 0.1).abs() < 1e-12);
        assert!((ratios.magic_ratio_right - 1000.0).abs() < 1e-9);
        assert_eq!(ratios.mouth_aspect_ratio, 0.0);
    }

    #[test]
    #[should_panic(expected = "must have 16 points")]
    fn test_short_slice_is_a_precondition_fault() {
        eye_aspect_ratio_points(&[Point::default(); 12]);
    }

    #[test]
    fn test_geometry_matches_synthetic_layout() {
        let geometry = EyeGeometry::from_landmarks(&eye(80.0, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]));
        assert!((geometry.width - 80.0).abs() < 1e-12);
        assert_eq!(geometry.heights, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(geometry.height_sum(), 28.0);
    }

    proptest! {
        #[test]
        fn prop_uniform_heights(width in 1.0f64..500.0, height in 0.0f64..200.0) {
            let set = eye(width, [height; 7]);
            prop_assert!((eye_aspect_ratio(&set) - height / width).abs() < 1e-9);
            prop_assert!((magic_ratio(&set) - height * width).abs() < 1e-6);
        }
    }
}
