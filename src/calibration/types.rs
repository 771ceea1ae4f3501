//! Wire types for the remote calibration service.

use serde::{Deserialize, Serialize};

/// Remote job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Detecting,
    Calibrating,
    Complete,
    Error,
}

impl JobStatus {
    /// Polling stops once one of these is observed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Detecting | JobStatus::Calibrating)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Idle => write!(f, "Idle"),
            JobStatus::Detecting => write!(f, "Detecting"),
            JobStatus::Calibrating => write!(f, "Calibrating"),
            JobStatus::Complete => write!(f, "Complete"),
            JobStatus::Error => write!(f, "Error"),
        }
    }
}

/// Cached view of the remote calibration job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationJob {
    pub status: JobStatus,
    /// Percentage, 0-100.
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_matrix: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion_coeffs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reprojection_error: Option<f64>,
}

impl CalibrationJob {
    pub fn new(status: JobStatus, progress: f32, message: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.clamp(0.0, 100.0),
            message: message.into(),
            intrinsic_matrix: None,
            distortion_coeffs: None,
            reprojection_error: None,
        }
    }

    pub fn idle(message: impl Into<String>) -> Self {
        Self::new(JobStatus::Idle, 0.0, message)
    }

    /// Clamp out-of-range progress reported by the service.
    pub(crate) fn normalized(mut self) -> Self {
        self.progress = if self.progress.is_finite() {
            self.progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self
    }
}

impl Default for CalibrationJob {
    fn default() -> Self {
        Self::idle("Ready to start calibration")
    }
}

/// `POST /api/calibration/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub success: bool,
}

/// `POST /api/capture_checkerboard_image` body.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSubmission<'a> {
    pub image_data: &'a str,
    pub camera_index: usize,
}

/// `POST /api/capture_checkerboard_image` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "success")]
    pub accepted: bool,
    #[serde(default)]
    pub detected: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `POST /api/calibration/extrinsic` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtrinsicSubmission<'a> {
    pub image_data: &'a str,
    pub camera_indices: [usize; 2],
}

/// `POST /api/calibration/extrinsic` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrinsicResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// `POST /api/capture_checkerboard_image/stop`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    #[serde(rename = "success")]
    pub accepted: bool,
}
