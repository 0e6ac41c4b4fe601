//! Keypoint schemas, payloads, and detector-output normalization.
//!
//! Detector output is free-form rows; everything downstream works on a
//! schema-validated [`KeypointSet`]. Malformed output is caught here, at the
//! ingestion boundary, not in the annotation tooling.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::thresholds::validate_unit_range;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Detection row kind carrying a schema keypoint.
pub const DETECTION_KIND_KEYPOINT: &str = "keypoint";

/// Default visibility threshold when a schema does not set one.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.5;

/// Default bound on missing required keypoints.
pub const DEFAULT_MAX_MISSING_KEYPOINTS: usize = 3;

/// Confidence floor for the sufficiency check.
pub const SUFFICIENCY_CONFIDENCE_FLOOR: f64 = 0.3;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One keypoint slot in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaKeypoint {
    pub label: String,
    pub required: bool,
}

/// A versioned keypoint schema a batch is annotated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointSchema {
    pub name: String,
    pub version: String,
    pub keypoints: Vec<SchemaKeypoint>,
    /// Points below this confidence are ingested as not visible.
    pub min_visibility_threshold: f64,
    /// Detection output may omit at most this many required keypoints.
    pub max_missing_keypoints: usize,
}

impl KeypointSchema {
    pub fn new(name: impl Into<String>, version: impl Into<String>, keypoints: Vec<SchemaKeypoint>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            keypoints,
            min_visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            max_missing_keypoints: DEFAULT_MAX_MISSING_KEYPOINTS,
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.is_empty() {
            return Err(CoreError::Validation(
                "schema name must not be empty".to_string(),
            ));
        }
        if self.keypoints.is_empty() {
            return Err(CoreError::Validation(
                "schema must define at least one keypoint".to_string(),
            ));
        }
        validate_unit_range(self.min_visibility_threshold, "min_visibility_threshold")?;
        let mut seen = std::collections::HashSet::with_capacity(self.keypoints.len());
        for kp in &self.keypoints {
            if kp.label.is_empty() {
                return Err(CoreError::Validation(
                    "schema keypoint labels must not be empty".to_string(),
                ));
            }
            if !seen.insert(kp.label.as_str()) {
                return Err(CoreError::Validation(format!(
                    "duplicate schema keypoint label '{}'",
                    kp.label
                )));
            }
        }
        Ok(())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.keypoints.iter().map(|kp| kp.label.as_str())
    }

    pub fn required_labels(&self) -> impl Iterator<Item = &str> {
        self.keypoints
            .iter()
            .filter(|kp| kp.required)
            .map(|kp| kp.label.as_str())
    }

    fn contains_label(&self, label: &str) -> bool {
        self.keypoints.iter().any(|kp| kp.label == label)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A single placed keypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A schema-validated set of keypoints for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet {
    pub schema_name: String,
    pub schema_version: String,
    pub points: Vec<Keypoint>,
}

impl KeypointSet {
    /// Mean confidence across all points, if any.
    pub fn avg_confidence(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        let sum: f64 = self.points.iter().map(|p| p.confidence).sum();
        Some(sum / self.points.len() as f64)
    }

    /// Number of points at or above the given confidence floor.
    pub fn confident_count(&self, floor: f64) -> usize {
        self.points.iter().filter(|p| p.confidence >= floor).count()
    }
}

/// Raw detector output row, as received from the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub kind: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Normalization and validation
// ---------------------------------------------------------------------------

fn validate_point(label: &str, x: f64, y: f64, confidence: f64) -> Result<(), CoreError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(CoreError::Validation(format!(
            "keypoint '{label}' has non-finite coordinates"
        )));
    }
    if x < 0.0 || y < 0.0 {
        return Err(CoreError::Validation(format!(
            "keypoint '{label}' has negative coordinates ({x}, {y})"
        )));
    }
    validate_unit_range(confidence, &format!("confidence of keypoint '{label}'"))
}

/// Normalize raw detector output into a [`KeypointSet`] for `schema`.
///
/// Non-keypoint rows (bounding boxes, auxiliary labels) are dropped. An empty
/// detection list is valid and yields an empty set. Unknown or duplicate
/// labels, malformed values, and too many missing required keypoints are
/// ingestion errors.
pub fn normalize_detections(
    schema: &KeypointSchema,
    detections: &[RawDetection],
) -> Result<KeypointSet, CoreError> {
    let mut by_label: std::collections::HashMap<&str, &RawDetection> =
        std::collections::HashMap::new();

    for det in detections
        .iter()
        .filter(|d| d.kind == DETECTION_KIND_KEYPOINT)
    {
        if !schema.contains_label(&det.label) {
            return Err(CoreError::Validation(format!(
                "detector returned unknown keypoint label '{}' for schema {} {}",
                det.label, schema.name, schema.version
            )));
        }
        validate_point(&det.label, det.x, det.y, det.confidence)?;
        if by_label.insert(det.label.as_str(), det).is_some() {
            return Err(CoreError::Validation(format!(
                "detector returned duplicate keypoint label '{}'",
                det.label
            )));
        }
    }

    let missing_required = schema
        .required_labels()
        .filter(|label| !by_label.contains_key(label))
        .count();
    if missing_required > schema.max_missing_keypoints {
        return Err(CoreError::Validation(format!(
            "{missing_required} required keypoints missing, at most {} allowed",
            schema.max_missing_keypoints
        )));
    }

    // Schema order, not detector order.
    let points = schema
        .keypoints
        .iter()
        .filter_map(|slot| by_label.get(slot.label.as_str()))
        .map(|det| Keypoint {
            label: det.label.clone(),
            x: det.x,
            y: det.y,
            confidence: det.confidence,
            visible: det.confidence >= schema.min_visibility_threshold,
            note: None,
        })
        .collect();

    Ok(KeypointSet {
        schema_name: schema.name.clone(),
        schema_version: schema.version.clone(),
        points,
    })
}

/// Validate an annotator-submitted keypoint set against `schema`.
pub fn validate_keypoint_set(schema: &KeypointSchema, set: &KeypointSet) -> Result<(), CoreError> {
    if set.schema_name != schema.name || set.schema_version != schema.version {
        return Err(CoreError::Validation(format!(
            "payload targets schema {} {} but the batch uses {} {}",
            set.schema_name, set.schema_version, schema.name, schema.version
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(set.points.len());
    for point in &set.points {
        if !schema.contains_label(&point.label) {
            return Err(CoreError::Validation(format!(
                "unknown keypoint label '{}'",
                point.label
            )));
        }
        if !seen.insert(point.label.as_str()) {
            return Err(CoreError::Validation(format!(
                "duplicate keypoint label '{}'",
                point.label
            )));
        }
        validate_point(&point.label, point.x, point.y, point.confidence)?;
    }
    let missing_required = schema
        .required_labels()
        .filter(|label| !seen.contains(label))
        .count();
    if missing_required > schema.max_missing_keypoints {
        return Err(CoreError::Validation(format!(
            "{missing_required} required keypoints missing, at most {} allowed",
            schema.max_missing_keypoints
        )));
    }
    Ok(())
}

/// Whether a detection result carries enough confident points to be worth
/// annotating: all but `max_missing_keypoints` of the schema's slots at or
/// above the sufficiency floor.
pub fn has_sufficient_keypoints(schema: &KeypointSchema, set: &KeypointSet) -> bool {
    let needed = schema.keypoints.len().saturating_sub(schema.max_missing_keypoints);
    set.confident_count(SUFFICIENCY_CONFIDENCE_FLOOR) >= needed
}
