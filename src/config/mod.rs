//! Configuration and serialization module.
//!
//! Settings are stored as JSON under the platform config directory and can be
//! overridden from the environment for the backend connection.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the calibration service base URL.
pub const API_URL_ENV: &str = "DARTRIG_API_URL";
/// Environment variable carrying a bearer session token.
pub const SESSION_TOKEN_ENV: &str = "DARTRIG_SESSION_TOKEN";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote calibration service connection.
    pub backend: BackendConfig,
    /// Camera acquisition and capture settings.
    pub cameras: CameraConfig,
    /// Calibration polling settings.
    pub calibration: CalibrationConfig,
    /// Directory for saved calibration profiles.
    pub profiles_dir: Option<PathBuf>,
}

/// Remote calibration service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. `http://localhost:5000`.
    pub base_url: String,
    /// Deadline for every request.
    pub request_timeout_ms: u64,
    /// Optional bearer token sent with every request.
    pub session_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_ms: 10_000,
            session_token: None,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Camera acquisition and capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Maximum number of camera slots used by the rig.
    pub max_slots: usize,
    /// Wait after releasing streams before binding new ones.
    pub settle_delay_ms: u64,
    /// Wait between sequential slot binds.
    pub bind_interval_ms: u64,
    /// Wait before retrying a failed playback start.
    pub replay_delay_ms: u64,
    /// Requested frame width.
    pub requested_width: u32,
    /// Requested frame height.
    pub requested_height: u32,
    /// JPEG quality for submitted frames (1-100).
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            max_slots: 3,
            settle_delay_ms: 100,
            bind_interval_ms: 100,
            replay_delay_ms: 100,
            requested_width: 1280,
            requested_height: 720,
            jpeg_quality: 90,
        }
    }
}

impl CameraConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn bind_interval(&self) -> Duration {
        Duration::from_millis(self.bind_interval_ms)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }
}

/// Calibration polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Status polling interval.
    pub poll_interval_ms: u64,
    /// Camera slots used for the stereo pair.
    pub extrinsic_pair: [usize; 2],
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            extrinsic_pair: [0, 2],
        }
    }
}

impl CalibrationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("dartrig-calibrator");
            p.push("config.json");
            p
        })
    }

    /// Load from `path`, else the default location, else defaults.
    ///
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match resolved {
            Some(p) if p.exists() => {
                log::info!("Loading config from {}", p.display());
                Self::load_from_file(&p)?
            }
            Some(p) if path.is_some() => {
                return Err(Error::Config(format!("config file {} not found", p.display())));
            }
            _ => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend.base_url = url.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var(SESSION_TOKEN_ENV) {
            if !token.is_empty() {
                self.backend.session_token = Some(token);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(Error::Config("backend base_url is empty".to_string()));
        }
        if self.calibration.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.cameras.max_slots == 0 {
            return Err(Error::Config("max_slots must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.cameras.jpeg_quality) {
            return Err(Error::Config("jpeg_quality must be within 1-100".to_string()));
        }
        Ok(())
    }

    /// Directory where calibration profiles are stored.
    pub fn profiles_dir(&self) -> PathBuf {
        self.profiles_dir.clone().unwrap_or_else(|| {
            let mut p = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            p.push("dartrig-calibrator");
            p.push("profiles");
            p
        })
    }
}
