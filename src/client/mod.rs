//! Blocking HTTP client for the fall-detection backend.
//!
//! Each method is a thin wrapper over one endpoint. Failures are folded into
//! [`ApiError`] so callers can tell an unreachable backend from one that
//! answered with an error.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::detect::DetectionResult;

mod types;

use types::ErrorBody;
pub use types::{
    DetectorConfig, HealthStatus, ResetResponse, SaveResponse, SystemMetrics, SystemStatus,
    TrainingSample,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const UNREACHABLE_MESSAGE: &str = "unable to reach the detection backend; make sure it is running";
const FALLBACK_STATUS_MESSAGE: &str = "server error";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The backend answered with a non-2xx status.
    Status(u16),
    /// No response at all: refused, timed out, DNS, TLS.
    Unreachable,
    /// The response body was not the JSON we expected.
    Decode,
}

#[derive(Clone, Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    fn status(code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Status(code),
            message: message.into(),
        }
    }

    fn unreachable() -> Self {
        Self {
            kind: ApiErrorKind::Unreachable,
            message: UNREACHABLE_MESSAGE.to_string(),
        }
    }

    fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Decode,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ApiErrorKind::Status(code) => write!(f, "http {}: {}", code, self.message),
            ApiErrorKind::Unreachable => write!(f, "unreachable: {}", self.message),
            ApiErrorKind::Decode => write!(f, "decode: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Clone, Debug)]
pub struct DetectionClient {
    agent: ureq::Agent,
    base_url: String,
}

impl DetectionClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = validate_base_url(&config.base_url)?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self { agent, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get("health")
    }

    pub fn system_status(&self) -> Result<SystemStatus, ApiError> {
        self.get("status")
    }

    /// Submit a still image (data URL or bare base64) for detection.
    pub fn detect_image(&self, image: &str) -> Result<DetectionResult, ApiError> {
        self.post(&self.endpoint("detect_image"), &json!({ "image": image }))
    }

    /// Submit one video frame (data URL or bare base64) for detection.
    pub fn detect_video_frame(&self, frame: &str) -> Result<DetectionResult, ApiError> {
        self.post(&self.endpoint("detect_video"), &json!({ "frame": frame }))
    }

    /// Clear the backend's per-object pose history; `None` clears every object.
    pub fn reset_detector(&self, object_id: Option<i64>) -> Result<ResetResponse, ApiError> {
        self.post(&self.endpoint("reset"), &json!({ "object_id": object_id }))
    }

    pub fn detector_config(&self) -> Result<DetectorConfig, ApiError> {
        self.get("config")
    }

    /// Upload a fall frame to a training-image endpoint. `url` is absolute
    /// because the collector does not have to live on the detection backend.
    pub fn save_fall_image(
        &self,
        url: &str,
        sample: &TrainingSample,
    ) -> Result<SaveResponse, ApiError> {
        self.post(url, sample)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.endpoint(path);
        log::debug!("GET {}", url);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|err| map_call_error(&url, err))?;
        read_json(&url, response)
    }

    fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        log::debug!("POST {}", url);
        let body = serde_json::to_string(body)
            .map_err(|err| ApiError::decode(format!("encode request body: {}", err)))?;
        let response = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(&body)
            .map_err(|err| map_call_error(url, err))?;
        read_json(url, response)
    }
}

fn validate_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).with_context(|| format!("parse api base url '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(anyhow!(
            "unsupported api scheme '{}'; expected http or https",
            other
        )),
    }
}

fn read_json<T: DeserializeOwned>(url: &str, response: ureq::Response) -> Result<T, ApiError> {
    let body = response
        .into_string()
        .map_err(|err| ApiError::decode(format!("read response from {}: {}", url, err)))?;
    serde_json::from_str(&body)
        .map_err(|err| ApiError::decode(format!("invalid json from {}: {}", url, err)))
}

fn map_call_error(url: &str, err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(code, response) => {
            let message = response
                .into_string()
                .ok()
                .and_then(|body| serde_json::from_str::<ErrorBody>(&body).ok())
                .and_then(|body| body.error)
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_STATUS_MESSAGE.to_string());
            log::warn!("{} answered {}: {}", url, code, message);
            ApiError::status(code, message)
        }
        ureq::Error::Transport(transport) => {
            log::warn!("{} unreachable: {}", url, transport);
            ApiError::unreachable()
        }
    }
}
