//! Wire types exchanged with the central store.

use crate::gesture::{LearningAnalyticsSnapshot, SampleSource, TrainingSample};
use serde::{Deserialize, Serialize};

/// One training or correction record as the collector expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionUpload {
    pub id: String,
    /// The wrongly recognized gesture; absent for live captures.
    pub predicted_gesture: Option<String>,
    pub actual_gesture: String,
    pub confidence: Option<f64>,
    /// Landmark rows; a flat vector is sent as a single row.
    pub landmarks: Vec<Vec<f64>>,
    pub source: SampleSource,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl From<&TrainingSample> for CorrectionUpload {
    fn from(sample: &TrainingSample) -> Self {
        Self {
            id: sample.id.clone(),
            predicted_gesture: sample.predicted_gesture_id.clone(),
            actual_gesture: sample.gesture_definition_id.clone(),
            confidence: sample.confidence,
            landmarks: vec![sample.landmark_data.as_slice().to_vec()],
            source: sample.source,
            timestamp: sample.created_at.timestamp_millis(),
        }
    }
}

/// `POST <upload_url>` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub corrections: Vec<CorrectionUpload>,
}

impl UploadRequest {
    pub fn from_samples(samples: &[TrainingSample]) -> Self {
        Self {
            corrections: samples.iter().map(CorrectionUpload::from).collect(),
        }
    }
}

/// `GET <model_check_url>?currentVersion=..` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCheckResponse {
    pub has_new_model: bool,
    #[serde(default)]
    pub model_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// `POST <analytics_url>` body.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsUpload<'a> {
    pub snapshots: &'a [LearningAnalyticsSnapshot],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::LandmarkVector;

    #[test]
    fn correction_serializes_expected_fields() {
        let mut sample = TrainingSample::new(
            "drink",
            LandmarkVector::new(vec![0.5, 0.25]).unwrap(),
            SampleSource::Correction,
        );
        sample.predicted_gesture_id = Some("eat".into());
        sample.confidence = Some(0.61);

        let json = serde_json::to_value(UploadRequest::from_samples(&[sample.clone()])).unwrap();
        let item = &json["corrections"][0];
        assert_eq!(item["predictedGesture"], "eat");
        assert_eq!(item["actualGesture"], "drink");
        assert_eq!(item["confidence"], 0.61);
        assert_eq!(item["landmarks"], serde_json::json!([[0.5, 0.25]]));
        assert_eq!(item["source"], "correction");
        assert_eq!(item["timestamp"], sample.created_at.timestamp_millis());
    }

    #[test]
    fn model_check_tolerates_missing_optionals() {
        let resp: ModelCheckResponse = serde_json::from_str(r#"{"hasNewModel": false}"#).unwrap();
        assert!(!resp.has_new_model);
        assert!(resp.model_url.is_none());

        let resp: ModelCheckResponse = serde_json::from_str(
            r#"{"hasNewModel": true, "modelUrl": "http://x/m.json", "version": "v2"}"#,
        )
        .unwrap();
        assert_eq!(resp.version.as_deref(), Some("v2"));
    }
}
