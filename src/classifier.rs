use log::warn;
use thiserror::Error;

use crate::landmarks::{
    INDEX_PIP, INDEX_TIP, LANDMARK_COUNT, LandmarkSet, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP, Point,
    THUMB_TIP, WRIST,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureFeatures {
    pub centroid: Point,
    pub pinch_distance: f32,
    // screen y grows downward
    pub index_extended: bool,
    pub middle_closed: bool,
}

impl GestureFeatures {
    pub fn is_pointing(&self) -> bool {
        self.index_extended && self.middle_closed
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("malformed landmark set: {found} of 21 points present")]
    MalformedLandmarkSet { found: usize },
    #[error("malformed landmark set: point {index} is not finite")]
    NonFinitePoint { index: usize },
}

pub fn extract(set: &LandmarkSet) -> Result<GestureFeatures, ClassifyError> {
    if set.len() < LANDMARK_COUNT {
        return Err(ClassifyError::MalformedLandmarkSet { found: set.len() });
    }
    if let Some(index) = set.points().iter().position(|lm| !lm.is_finite()) {
        return Err(ClassifyError::NonFinitePoint { index });
    }

    let pt = |i: usize| set.points()[i].point();

    Ok(GestureFeatures {
        centroid: pt(WRIST).midpoint(&pt(MIDDLE_MCP)),
        pinch_distance: pt(THUMB_TIP).distance_to(&pt(INDEX_TIP)),
        index_extended: pt(INDEX_TIP).y < pt(INDEX_PIP).y,
        middle_closed: pt(MIDDLE_TIP).y > pt(MIDDLE_PIP).y,
    })
}

/// Returns `None` when no hand is present. A malformed set is logged and
/// treated the same as no hand.
pub fn classify(set: Option<&LandmarkSet>) -> Option<GestureFeatures> {
    match extract(set?) {
        Ok(features) => Some(features),
        Err(e) => {
            warn!("classifier: {e}; treating tick as hand lost");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    fn scenario_hand() -> LandmarkSet {
        LandmarkSet::zeroed()
            .with_point(WRIST, 0.0, 0.0)
            .with_point(MIDDLE_MCP, 0.0, 10.0)
            .with_point(THUMB_TIP, 100.0, 100.0)
            .with_point(INDEX_TIP, 100.0, 140.0)
    }

    #[test]
    fn test_features_from_scenario_hand() {
        let f = classify(Some(&scenario_hand())).unwrap();
        assert_eq!(f.centroid, Point::new(0.0, 5.0));
        assert_eq!(f.pinch_distance, 40.0);
        assert!(!f.index_extended);
        assert!(!f.middle_closed);
        assert!(!f.is_pointing());
    }

    #[test]
    fn test_pointing_pose() {
        let set = scenario_hand()
            .with_point(INDEX_PIP, 50.0, 80.0)
            .with_point(INDEX_TIP, 50.0, 40.0)
            .with_point(MIDDLE_PIP, 60.0, 80.0)
            .with_point(MIDDLE_TIP, 60.0, 95.0);
        let f = classify(Some(&set)).unwrap();
        assert!(f.index_extended);
        assert!(f.middle_closed);
        assert!(f.is_pointing());
    }

    #[test]
    fn test_equal_heights_are_neither_extended_nor_closed() {
        let set = LandmarkSet::zeroed();
        let f = classify(Some(&set)).unwrap();
        assert!(!f.index_extended);
        assert!(!f.middle_closed);
    }

    #[test]
    fn test_no_hand() {
        assert_eq!(classify(None), None);
    }

    #[test]
    fn test_short_set_is_treated_as_no_hand() {
        let set = LandmarkSet::new(vec![Landmark::default(); 13]);
        assert_eq!(
            extract(&set),
            Err(ClassifyError::MalformedLandmarkSet { found: 13 })
        );
        assert_eq!(classify(Some(&set)), None);
    }

    #[test]
    fn test_non_finite_point_is_treated_as_no_hand() {
        let set = LandmarkSet::zeroed().with_point(THUMB_TIP, f32::NAN, 0.0);
        assert_eq!(
            extract(&set),
            Err(ClassifyError::NonFinitePoint { index: THUMB_TIP })
        );
        assert_eq!(classify(Some(&set)), None);
    }
}
