use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Result of one inference call against the detection backend.
///
/// Every field is optional on the wire. The backend is best effort, so missing
/// or malformed fields fall back to defaults instead of failing the decode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default = "default_success", deserialize_with = "null_as_success")]
    pub success: bool,
    /// True if any tracked object in this frame is classified as fallen.
    #[serde(default, deserialize_with = "null_as_default")]
    pub fall_detected: bool,
    /// Number of people the backend found. May be absent on older backends.
    #[serde(default)]
    pub detection_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub detections: Vec<Detection>,
    /// Annotated frame as a data URL. The video endpoint calls it `result_frame`.
    #[serde(default, alias = "result_frame")]
    pub result_image: Option<String>,
    /// Backend-side ISO-8601 timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn default_success() -> bool {
    true
}

impl DetectionResult {
    /// People counted in this result: the reported count when present,
    /// otherwise the number of detections carried.
    pub fn detected_count(&self) -> u32 {
        self.detection_count
            .unwrap_or_else(|| u32::try_from(self.detections.len()).unwrap_or(u32::MAX))
    }
}

/// One tracked person within a result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Tracker id, stable across frames for the same subject.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_fall: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fall_score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: Option<BoundingBox>,
    /// Auxiliary classifier output (angles, height ratios, ...).
    #[serde(default, deserialize_with = "lenient_details")]
    pub details: Map<String, Value>,
}

/// Pixel-space box as `[x1, y1, x2, y2]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

// `null` on the wire means the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn null_as_success<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(|v| v.unwrap_or_else(default_success))
}

// A box we cannot read is dropped, not fatal.
fn lenient_bbox<'de, D>(deserializer: D) -> Result<Option<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value::<BoundingBox>(v).ok()))
}

fn lenient_details<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => Ok(map),
        _ => Ok(Map::new()),
    }
}
