//! Setup wizard
//!
//! Step sequencing, per-step camera requirements and capture bookkeeping.

mod captures;
mod controller;
mod steps;

pub use captures::{CaptureRecord, REQUIRED_CAPTURES};
pub use controller::{CaptureOutcome, StepEntry, WizardController};
pub use steps::{required_slots, WizardStep};
