use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceBBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box. 0.0 when disjoint or when
    /// either box is degenerate.
    pub fn iou(&self, other: &FaceBBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let inter = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Named 2D landmark points (left_eye, right_eye, nose, mouth_left, mouth_right).
pub type FaceLandmarks = HashMap<String, (f32, f32)>;

/// One detected face instance, bound to a photo and a resolved person.
/// Created once by the recognition pipeline and never mutated; re-running
/// detection produces new records.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FaceRecord {
    pub id: String,
    pub photo: String,
    pub person: String,
    pub bbox: FaceBBox,
    pub landmarks: FaceLandmarks,
    pub confidence: f32,
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,
    pub model_version: String,
    pub added: Option<i64>,
}

/// Listing shape for face records: the 512-d vector is too large to return on
/// every listing, only its dimension is exposed.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FaceForRead {
    pub id: String,
    pub photo: String,
    pub person: String,
    pub bbox: FaceBBox,
    pub landmarks: FaceLandmarks,
    pub confidence: f32,
    pub embedding_dim: usize,
    pub model_version: String,
    pub added: Option<i64>,
}

impl From<FaceRecord> for FaceForRead {
    fn from(face: FaceRecord) -> Self {
        FaceForRead {
            id: face.id,
            photo: face.photo,
            person: face.person,
            bbox: face.bbox,
            landmarks: face.landmarks,
            confidence: face.confidence,
            embedding_dim: face.embedding.len(),
            model_version: face.model_version,
            added: face.added,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_disjoint() {
        let a = FaceBBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = FaceBBox { x: 20.0, y: 20.0, width: 10.0, height: 10.0 };
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_identical() {
        let a = FaceBBox { x: 5.0, y: 5.0, width: 10.0, height: 20.0 };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_partial_overlap() {
        let a = FaceBBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = FaceBBox { x: 5.0, y: 0.0, width: 10.0, height: 10.0 };
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }
}
