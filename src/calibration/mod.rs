//! Calibration module
//!
//! Client for the remote calibration service and the coordinator that tracks
//! a running calibration job.

mod client;
mod progress;
mod types;

pub use client::{CalibrationApi, CalibrationClient};
pub use progress::CalibrationProgressCoordinator;
pub use types::{
    CalibrationJob, ExtrinsicResponse, ExtrinsicSubmission, FrameSubmission, JobStatus,
    StartResponse, StopResponse, SubmitResponse,
};
