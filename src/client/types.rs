use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `GET /health`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Seconds since the backend started.
    #[serde(default)]
    pub uptime: f64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `GET /status`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub system: SystemMetrics,
    #[serde(default)]
    pub uptime: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_percent: f64,
    #[serde(default)]
    pub memory_used_gb: f64,
    #[serde(default)]
    pub memory_total_gb: f64,
    #[serde(default)]
    pub disk_percent: f64,
    #[serde(default)]
    pub disk_used_gb: f64,
    #[serde(default)]
    pub disk_total_gb: f64,
}

/// `POST /reset` response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// `GET /config` response. The backend layout is not fixed, so the
/// detector sections are kept as raw JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub config: Value,
}

impl DetectorConfig {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.config.get(name)
    }
}

/// Fall frame plus metadata uploaded for model retraining.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingSample {
    pub image: String,
    pub object_id: Option<i64>,
    pub fall_score: f64,
    pub confidence: f64,
    pub timestamp: String,
    pub details: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Error body shared by every endpoint: `{"success": false, "error": "..."}`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
