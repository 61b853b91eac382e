//! Landmark vectors and the upstream landmark-provider boundary.

use crate::error::GestureError;
use serde::{Deserialize, Serialize};

/// Ordered numeric coordinates describing one captured hand pose.
///
/// Validated on construction (non-empty, all finite) and immutable
/// afterwards, so everything downstream can treat it as well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct LandmarkVector(Vec<f64>);

impl LandmarkVector {
    /// Build a vector from flat coordinates.
    pub fn new(coords: Vec<f64>) -> Result<Self, GestureError> {
        if coords.is_empty() {
            return Err(GestureError::EmptyVector);
        }
        if let Some((index, &value)) = coords.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(GestureError::NonFiniteCoordinate { index, value });
        }
        Ok(Self(coords))
    }

    /// Flatten per-point rows (e.g. 21 points × `[x, y, z]`) into one vector.
    ///
    /// Every row must have the arity of the first.
    pub fn from_points<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, GestureError> {
        let expected = rows.first().map_or(0, |r| r.as_ref().len());
        let mut coords = Vec::with_capacity(expected * rows.len());
        for (row, point) in rows.iter().enumerate() {
            let point = point.as_ref();
            if point.len() != expected {
                return Err(GestureError::RaggedPoints {
                    row,
                    expected,
                    found: point.len(),
                });
            }
            coords.extend_from_slice(point);
        }
        Self::new(coords)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Euclidean distance to `other`, computed over the overlapping prefix
    /// when the two lengths differ.
    pub fn distance_to(&self, other: &[f64]) -> f64 {
        self.0
            .iter()
            .zip(other)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

impl TryFrom<Vec<f64>> for LandmarkVector {
    type Error = GestureError;

    fn try_from(coords: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(coords)
    }
}

impl From<LandmarkVector> for Vec<f64> {
    fn from(vector: LandmarkVector) -> Self {
        vector.0
    }
}

/// Turns a raw captured frame into landmarks.
///
/// Implemented by the capture layer (camera + pose model). Returns `None`
/// when no hand is visible in the frame.
pub trait LandmarkProvider: Send + Sync {
    type Frame;

    fn extract(&self, frame: &Self::Frame) -> Option<LandmarkVector>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_vector() {
        assert_eq!(LandmarkVector::new(vec![]), Err(GestureError::EmptyVector));
    }

    #[test]
    fn rejects_non_finite_coordinate() {
        let err = LandmarkVector::new(vec![0.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, GestureError::NonFiniteCoordinate { index: 1, .. }));
    }

    #[test]
    fn from_points_flattens_rows() {
        let v = LandmarkVector::from_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_points_rejects_ragged_rows() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        let err = LandmarkVector::from_points(&rows).unwrap_err();
        assert_eq!(
            err,
            GestureError::RaggedPoints {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn distance_uses_overlapping_prefix() {
        let v = LandmarkVector::new(vec![3.0, 4.0, 100.0]).unwrap();
        assert!((v.distance_to(&[0.0, 0.0]) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_json::from_str::<LandmarkVector>("[]").is_err());
        let v: LandmarkVector = serde_json::from_str("[0.5, 1.5]").unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[0.5,1.5]");
    }
}
