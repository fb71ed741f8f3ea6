//! Hand landmark types and the detector boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::Frame;

// 21-point hand layout

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// One keypoint as reported by the detector. `z` is relative depth and may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Nothing here enforces the point count; the classifier rejects short sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn zeroed() -> Self {
        Self::new(vec![Landmark::default(); LANDMARK_COUNT])
    }

    /// Builder used to place individual points; grows the set if needed.
    pub fn with_point(mut self, index: usize, x: f32, y: f32) -> Self {
        if self.points.len() <= index {
            self.points.resize(index + 1, Landmark::default());
        }
        self.points[index] = Landmark::new(x, y);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("unsupported landmark layout '{0}'")]
    UnsupportedLayout(String),
    #[error("{0}")]
    Init(String),
}

pub trait LandmarkSource {
    /// Prepares the detector. Called by `TrackingSession::start` until it succeeds once.
    fn load(&mut self) -> Result<(), DetectorError>;

    fn estimate(&mut self, frame: &Frame) -> Option<LandmarkSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance_and_midpoint() {
        let a = Point::new(100.0, 100.0);
        let b = Point::new(100.0, 140.0);
        assert_eq!(a.distance_to(&b), 40.0);
        assert_eq!(a.midpoint(&b), Point::new(100.0, 120.0));
    }

    #[test]
    fn test_with_point_grows_short_sets() {
        let set = LandmarkSet::default().with_point(MIDDLE_MCP, 1.0, 2.0);
        assert_eq!(set.len(), MIDDLE_MCP + 1);
        assert_eq!(set.get(MIDDLE_MCP), Some(Landmark::new(1.0, 2.0)));
        assert_eq!(set.get(LANDMARK_COUNT), None);
    }

    #[test]
    fn test_landmark_z_is_optional_in_json() {
        let lm: Landmark = serde_json::from_str(r#"{"x": 1.5, "y": 2.0}"#).unwrap();
        assert_eq!(lm, Landmark::new(1.5, 2.0));
        let lm: Landmark = serde_json::from_str(r#"{"x": 1, "y": 2, "z": -0.25}"#).unwrap();
        assert_eq!(lm.z, -0.25);
    }
}
