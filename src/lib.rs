//! Dart Rig Calibrator
//!
//! Setup wizard core for a multi-camera dart-scoring rig:
//! - Camera discovery and per-slot stream binding (nokhwa)
//! - Stream lifecycle across wizard steps with safe teardown
//! - Frame capture and encoding for calibration submissions
//! - Remote calibration service client and progress polling

pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod notify;
pub mod profile;
pub mod telemetry;
pub mod wizard;

pub use error::{Error, Result};
