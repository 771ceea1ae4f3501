//! Error taxonomy shared by the camera, calibration and wizard layers.

use thiserror::Error;

use crate::notify::Notification;

/// Errors raised by the wizard core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("camera permission was denied")]
    PermissionDenied,
    #[error("media devices are not supported on this platform")]
    Unsupported,
    #[error("no video input devices found")]
    NoDevices,
    #[error("failed to bind camera stream: {0}")]
    Bind(String),
    #[error("camera slot {0} is not producing frames")]
    NotReady(usize),
    #[error("network error: {0}")]
    Network(String),
    #[error("calibration service returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("a calibration session is already running")]
    AlreadyRunning,
    #[error("failed to encode frame: {0}")]
    Encode(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// User-facing notification for this error.
    ///
    /// The description always tells the user what to do next; the raw error
    /// text is only appended where it adds information.
    pub fn notification(&self) -> Notification {
        match self {
            Error::PermissionDenied => Notification::error(
                "Camera Access Error",
                "Unable to access camera. Please check permissions and try again.",
            ),
            Error::Unsupported => Notification::error(
                "Camera Error",
                "This platform doesn't support camera access.",
            ),
            Error::NoDevices => Notification::error(
                "No Cameras Found",
                "Please ensure you have at least one camera connected.",
            ),
            Error::Bind(reason) => Notification::error(
                "Camera Error",
                format!(
                    "Failed to start camera ({}). Ensure the camera is connected and not used by another application.",
                    reason
                ),
            ),
            Error::NotReady(slot) => Notification::error(
                "Camera Not Ready",
                format!(
                    "Camera {} has no video feed yet. Wait for the preview or re-initialize cameras.",
                    slot + 1
                ),
            ),
            Error::Network(reason) => Notification::error(
                "Connection Error",
                format!(
                    "Could not reach the calibration service ({}). Check that the backend is running.",
                    reason
                ),
            ),
            Error::Remote { status, message } => Notification::error(
                "Calibration Service Error",
                format!(
                    "The service rejected the request (HTTP {}: {}). Adjust and try again.",
                    status, message
                ),
            ),
            Error::AlreadyRunning => Notification::warning(
                "Calibration Running",
                "A calibration is already in progress. Stop it before starting a new one.",
            ),
            Error::Encode(reason) => Notification::error(
                "Capture Error",
                format!("Failed to encode the camera image ({}). Try capturing again.", reason),
            ),
            Error::Config(reason) => Notification::error(
                "Configuration Error",
                format!("{}. Fix the configuration file and restart.", reason),
            ),
            Error::Io(e) => Notification::error(
                "File Error",
                format!("{}. Check the file location and permissions.", e),
            ),
            Error::Json(e) => Notification::error(
                "Data Error",
                format!("Malformed data ({}). The file or response may be corrupted.", e),
            ),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Network("request timed out".to_string())
        } else if e.is_decode() {
            Error::Network(format!("invalid response body: {}", e))
        } else {
            Error::Network(e.to_string())
        }
    }
}
