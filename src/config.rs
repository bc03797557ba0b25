use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::imaging::{self, CompressOptions};
use crate::store::{DEFAULT_HISTORY_CAP, DEFAULT_RECENT_WINDOW};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FallwatchConfigFile {
    api: Option<ApiConfigFile>,
    history: Option<HistoryConfigFile>,
    alert: Option<AlertConfigFile>,
    training: Option<TrainingConfigFile>,
    imaging: Option<ImagingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    cap: Option<usize>,
    recent: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    enabled: Option<bool>,
    player: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TrainingConfigFile {
    upload_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ImagingConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
    jpeg_quality: Option<u8>,
    max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct FallwatchConfig {
    pub api_base_url: String,
    pub api_timeout: Duration,
    pub history_cap: usize,
    pub recent_window: usize,
    pub alert: AlertSettings,
    pub training_upload_url: Option<String>,
    pub imaging: ImagingSettings,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub enabled: bool,
    /// Command that plays a WAV from stdin, e.g. `aplay -q`.
    pub player: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImagingSettings {
    pub compress: CompressOptions,
    pub max_upload_bytes: u64,
}

impl Default for FallwatchConfig {
    fn default() -> Self {
        Self::from_file(FallwatchConfigFile::default())
    }
}

impl FallwatchConfig {
    /// Defaults, then `FALLWATCH_CONFIG` (TOML), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            timeout: self.api_timeout,
        }
    }

    fn from_file(file: FallwatchConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let history = file.history.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let image_file = file.imaging.unwrap_or_default();
        Self {
            api_base_url: api
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_timeout: api
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            history_cap: history.cap.unwrap_or(DEFAULT_HISTORY_CAP),
            recent_window: history.recent.unwrap_or(DEFAULT_RECENT_WINDOW),
            alert: AlertSettings {
                enabled: alert.enabled.unwrap_or(true),
                player: alert.player.filter(|p| !p.trim().is_empty()),
            },
            training_upload_url: file
                .training
                .and_then(|training| training.upload_url)
                .filter(|url| !url.trim().is_empty()),
            imaging: ImagingSettings {
                compress: CompressOptions {
                    max_width: image_file.max_width.unwrap_or(imaging::DEFAULT_MAX_WIDTH),
                    max_height: image_file.max_height.unwrap_or(imaging::DEFAULT_MAX_HEIGHT),
                    quality: image_file
                        .jpeg_quality
                        .unwrap_or(imaging::DEFAULT_JPEG_QUALITY),
                },
                max_upload_bytes: image_file
                    .max_upload_bytes
                    .unwrap_or(imaging::DEFAULT_MAX_FILE_BYTES),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("FALLWATCH_API_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Some(secs) = env_number::<u64>("FALLWATCH_API_TIMEOUT_SECS")? {
            self.api_timeout = Duration::from_secs(secs);
        }
        if let Some(cap) = env_number::<usize>("FALLWATCH_HISTORY_CAP")? {
            self.history_cap = cap;
        }
        if let Some(recent) = env_number::<usize>("FALLWATCH_HISTORY_RECENT")? {
            self.recent_window = recent;
        }
        if let Ok(player) = std::env::var("FALLWATCH_ALERT_PLAYER") {
            if !player.trim().is_empty() {
                self.alert.player = Some(player);
            }
        }
        if let Ok(url) = std::env::var("FALLWATCH_TRAINING_URL") {
            if !url.trim().is_empty() {
                self.training_upload_url = Some(url);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        check_http_url("api base url", &self.api_base_url)?;
        if let Some(url) = &self.training_upload_url {
            check_http_url("training upload url", url)?;
        }
        if self.api_timeout.is_zero() {
            return Err(anyhow!("api timeout must be greater than zero"));
        }
        if self.history_cap == 0 {
            return Err(anyhow!("history cap must be greater than zero"));
        }
        if self.recent_window == 0 {
            return Err(anyhow!("recent history window must be greater than zero"));
        }
        let quality = self.imaging.compress.quality;
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be between 1 and 100, got {}", quality));
        }
        if self.imaging.compress.max_width == 0 || self.imaging.compress.max_height == 0 {
            return Err(anyhow!("image bounds must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FallwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn check_http_url(what: &str, raw: &str) -> Result<()> {
    let url = url::Url::parse(raw.trim()).map_err(|e| anyhow!("invalid {} '{}': {}", what, raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("{} must be http or https, got '{}'", what, other)),
    }
}
