//! Camera module
//!
//! Device discovery, per-slot stream binding, stream lifecycle across wizard
//! steps and frame capture for calibration.

mod binder;
mod capture;
mod device;
mod lifecycle;
mod native;
mod stream;
mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use binder::StreamBinder;
pub use capture::{compose_side_by_side, EncodedImage, FrameCapturer};
pub use device::{list_video_devices, DeviceList, MediaBackend, VideoDevice};
pub use lifecycle::{BoundSlots, CameraSlot, InitializeOutcome, LifecyclePhase, StreamLifecycleManager};
pub use native::{NokhwaBackend, NokhwaStream};
pub use stream::{CameraFrame, StreamConstraint, StreamHandle, VideoStream};
pub use surface::{DisplaySurface, PreviewSurface};
